//! `trait Strategy`, the registry Runners consult, and one concrete
//! illustrative strategy.

mod moving_average_cross;
mod registry;

pub use moving_average_cross::MovingAverageCrossStrategy;
pub use registry::{Strategy, StrategyConfig, StrategyRegistry};
