//! Error types for optrade-runners.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("store error: {0}")]
    Store(#[from] optrade_store::StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] optrade_broker::BrokerError),
}

pub type Result<T> = std::result::Result<T, RunnerError>;
