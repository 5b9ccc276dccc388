//! Error types for optrade-options.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("broker error: {0}")]
    Broker(#[from] optrade_broker::BrokerError),

    /// Every chain filter (expiry, liquidity, strike window) left an empty
    /// candidate set. The caller rejects the signal.
    #[error("no suitable strike for {underlying} {option_type}: {reason}")]
    NoSuitableStrike {
        underlying: String,
        option_type: String,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, OptionsError>;
