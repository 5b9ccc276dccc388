//! Error types for optrade-eventbus.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("handler {subscriber_id} returned an error: {reason}")]
    Handler { subscriber_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, EventBusError>;
