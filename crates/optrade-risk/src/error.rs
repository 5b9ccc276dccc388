//! Error types for optrade-risk.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("gate {gate} blocked: {reason}")]
    GateBlocked { gate: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RiskError>;
