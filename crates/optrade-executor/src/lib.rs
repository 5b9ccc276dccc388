//! Signal-to-position dispatch: validation gates, strike resolution,
//! sizing and the three-mode (`LOG_ONLY`/`PAPER`/`LIVE`) order path.

mod error;
mod executor;
mod sizing;

pub use error::{ExecutorError, Result};
pub use executor::{Executor, ExecutorConfig};
pub use sizing::{compute_quantity, SizingConfig};
