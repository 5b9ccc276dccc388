//! Strike selection: resolves an equity/index signal to a concrete,
//! liquid option contract.

mod error;
mod strike_selector;

pub use error::{OptionsError, Result};
pub use strike_selector::{describe_strength, StrikeMode, StrikeSelector, StrikeSelectorConfig};
