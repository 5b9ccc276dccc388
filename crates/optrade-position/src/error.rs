//! Error types for optrade-position.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("store error: {0}")]
    Store(#[from] optrade_store::StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] optrade_broker::BrokerError),

    #[error("signal error: {0}")]
    Signal(#[from] optrade_signal::SignalError),

    #[error("LIVE exit order for position {position_id} did not fill: {reason}")]
    ExitOrderFailed { position_id: uuid::Uuid, reason: String },
}

pub type Result<T> = std::result::Result<T, PositionError>;
