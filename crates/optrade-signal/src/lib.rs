//! Signal lifecycle: idempotent submission, status transitions, and the
//! lifecycle events published for every stage a signal passes through.

mod error;
mod manager;

pub use error::{Result, SignalError};
pub use manager::SignalManager;
