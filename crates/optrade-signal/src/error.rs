//! Error types for optrade-signal.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("store error: {0}")]
    Store(#[from] optrade_store::StoreError),

    #[error("duplicate signal: fingerprint already has a non-terminal or executed signal this session")]
    DuplicateSignal,

    #[error("invalid signal: {0}")]
    InvalidSignal(String),

    #[error("signal {0} not found")]
    NotFound(uuid::Uuid),

    #[error("illegal status transition for signal {id}: {from:?} -> {to:?}")]
    IllegalTransition {
        id: uuid::Uuid,
        from: optrade_core::SignalStatus,
        to: optrade_core::SignalStatus,
    },
}

pub type Result<T> = std::result::Result<T, SignalError>;
