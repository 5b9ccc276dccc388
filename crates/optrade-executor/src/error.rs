//! Error types for optrade-executor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("store error: {0}")]
    Store(#[from] optrade_store::StoreError),

    #[error("signal error: {0}")]
    Signal(#[from] optrade_signal::SignalError),

    #[error("options error: {0}")]
    Options(#[from] optrade_options::OptionsError),

    #[error("broker error: {0}")]
    Broker(#[from] optrade_broker::BrokerError),

    #[error("risk gate blocked: {0}")]
    Risk(#[from] optrade_risk::RiskError),

    /// Idempotency hit: a position already exists for this signal. Not an
    /// error the caller should log loudly — this is the expected outcome
    /// when a crashed run is resumed and re-delivers the same signal.
    #[error("position already exists for signal {0}")]
    AlreadyExecuted(uuid::Uuid),

    #[error("live order {order_id} did not fill: {reason}")]
    OrderNotFilled { order_id: String, reason: String },

    #[error("available margin {available} is below the {required} required for this order")]
    InsufficientMargin {
        required: rust_decimal::Decimal,
        available: rust_decimal::Decimal,
    },
}

pub type Result<T> = std::result::Result<T, ExecutorError>;
