//! The `BrokerClient` contract every execution and data path is written against.

use crate::error::Result;
use crate::types::{OrderAck, OrderRequest, Quote};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optrade_core::{Candle, OptionContract, Price, Symbol, Timeframe};
use std::collections::HashMap;

/// Everything the rest of the workspace needs from a broker: auth state,
/// market data reads, and order placement/cancellation. Implementations
/// are responsible for their own rate limiting and retry policy; callers
/// only see `BrokerError::RateLimited` if that policy gives up.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Perform whatever handshake the broker requires (token exchange,
    /// session login). Idempotent: safe to call again to refresh a
    /// near-expiry session.
    async fn authenticate(&self) -> Result<()>;

    fn is_authenticated(&self) -> bool;

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote>;

    /// Fetch quotes for every symbol in `symbols` in a single round-trip.
    /// Runners poll one asset class per loop tick and must not make one
    /// HTTP call per symbol; a symbol the broker has no quote for is
    /// simply absent from the returned map rather than an error.
    async fn get_quotes(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, Quote>>;

    /// Margin currently available for new positions, in the broker's
    /// reporting currency. Consulted by the executor's pre-trade check
    /// before any LIVE order.
    async fn get_available_margin(&self) -> Result<Price>;

    async fn get_historical_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// Every listed expiry for `underlying` in one round-trip; callers
    /// filter down to the expiries they actually want (`spec.md` §4.9 step
    /// 1-2 reads the whole chain, then picks an expiry out of it — the
    /// broker is never asked for a single expiry up front).
    async fn get_option_chain(&self, underlying: &Symbol) -> Result<Vec<OptionContract>>;

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck>;

    async fn cancel_order(&self, broker_order_id: &str) -> Result<()>;

    async fn get_order_status(&self, broker_order_id: &str) -> Result<OrderAck>;
}
