//! Error types for optrade-broker.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("not authenticated: call authenticate() first")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("session expired, re-authenticate")]
    AuthExpired,

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("http request failed: {0}")]
    Http(String),

    #[error("broker returned error status {status}: {body}")]
    BrokerStatus { status: u16, body: String },

    #[error("failed to parse broker response: {0}")]
    Parse(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("order rejected by broker: {0}")]
    OrderRejected(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
