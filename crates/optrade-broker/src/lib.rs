//! Broker connectivity behind a `BrokerClient` trait: quotes, historical
//! candles, option chains, and order placement/cancellation, all
//! rate-limited the way a real exchange gateway requires.

pub mod client;
pub mod error;
pub mod http_client;
pub mod mock;
pub mod rate_limiter;
pub mod types;

pub use client::BrokerClient;
pub use error::{BrokerError, Result};
pub use http_client::HttpBrokerClient;
pub use mock::MockBrokerClient;
pub use rate_limiter::RateLimiter;
pub use types::{BrokerOrderStatus, OrderAck, OrderRequest, OrderSide, OrderType, Quote};
