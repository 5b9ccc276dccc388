//! Domain types shared by every crate in the workspace: decimals, clock and
//! market calendar, candles, option contracts, signals, and positions.
//!
//! Nothing in this crate talks to a broker, a database, or the network —
//! it's the vocabulary the rest of the workspace is written in.

pub mod candle;
pub mod clock;
pub mod decimal;
pub mod error;
pub mod option_contract;
pub mod position;
pub mod signal;
pub mod symbol;

pub use candle::Candle;
pub use clock::{Clock, FixedClock, HolidayTable, MarketCalendar, SystemClock, Timeframe};
pub use decimal::{Price, Quantity};
pub use error::{CoreError, Result};
pub use option_contract::{OptionContract, OptionType};
pub use position::{ExitReason, Position, PositionMode, PositionStatus, WarningReason};
pub use signal::{Signal, SignalAction, SignalStatus, SignalStrength};
pub use symbol::{AssetClass, Symbol};
