//! In-memory `BrokerClient` for tests: scripted quotes/chains/fills, no
//! network access.

use crate::client::BrokerClient;
use crate::error::{BrokerError, Result};
use crate::types::{BrokerOrderStatus, OrderAck, OrderRequest, Quote};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use optrade_core::{Candle, OptionContract, Price, Quantity, Symbol, Timeframe};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

struct State {
    quotes: HashMap<Symbol, Quote>,
    candles: HashMap<(Symbol, Timeframe), Vec<Candle>>,
    /// Every contract scripted for an underlying, across every expiry
    /// pushed — `get_option_chain` takes no expiry, so this has to return
    /// the whole listed chain the way a real broker would.
    chains: HashMap<Symbol, Vec<OptionContract>>,
    orders: HashMap<String, OrderAck>,
    next_order_id: u64,
    placed_orders: Vec<OrderRequest>,
    available_margin: Price,
}

impl Default for State {
    fn default() -> Self {
        Self {
            quotes: HashMap::new(),
            candles: HashMap::new(),
            chains: HashMap::new(),
            orders: HashMap::new(),
            next_order_id: 0,
            placed_orders: Vec::new(),
            available_margin: Price::ZERO,
        }
    }
}

pub struct MockBrokerClient {
    state: Mutex<State>,
    authenticated: AtomicBool,
    fail_auth: AtomicBool,
    fail_orders: AtomicBool,
}

impl Default for MockBrokerClient {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            authenticated: AtomicBool::new(false),
            fail_auth: AtomicBool::new(false),
            fail_orders: AtomicBool::new(false),
        }
    }
}

impl MockBrokerClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_auth(&self, fail: bool) {
        self.fail_auth.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `place_order` call return `OrderRejected`,
    /// for exercising a `LIVE` exit's retry-then-warn path.
    pub fn set_fail_orders(&self, fail: bool) {
        self.fail_orders.store(fail, Ordering::SeqCst);
    }

    pub fn push_quote(&self, quote: Quote) {
        self.state.lock().quotes.insert(quote.symbol.clone(), quote);
    }

    pub fn push_candles(&self, symbol: Symbol, timeframe: Timeframe, candles: Vec<Candle>) {
        self.state.lock().candles.insert((symbol, timeframe), candles);
    }

    /// `expiry` is accepted for caller convenience (tests build contracts
    /// per expiry) but is not part of the storage key: contracts pushed for
    /// the same underlying accumulate into one listed chain, matching what
    /// `get_option_chain` actually returns.
    pub fn push_chain(&self, underlying: Symbol, _expiry: NaiveDate, chain: Vec<OptionContract>) {
        self.state.lock().chains.entry(underlying).or_default().extend(chain);
    }

    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.state.lock().placed_orders.clone()
    }

    pub fn set_available_margin(&self, margin: Price) {
        self.state.lock().available_margin = margin;
    }
}

#[async_trait]
impl BrokerClient for MockBrokerClient {
    async fn authenticate(&self) -> Result<()> {
        if self.fail_auth.load(Ordering::SeqCst) {
            return Err(BrokerError::AuthFailed("mock auth failure".into()));
        }
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn get_quote(&self, symbol: &Symbol) -> Result<Quote> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        self.state
            .lock()
            .quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownSymbol(symbol.to_string()))
    }

    async fn get_quotes(&self, symbols: &[Symbol]) -> Result<HashMap<Symbol, Quote>> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let state = self.state.lock();
        Ok(symbols
            .iter()
            .filter_map(|s| state.quotes.get(s).map(|q| (s.clone(), q.clone())))
            .collect())
    }

    async fn get_available_margin(&self) -> Result<Price> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        Ok(self.state.lock().available_margin)
    }

    async fn get_historical_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let state = self.state.lock();
        Ok(state
            .candles
            .get(&(symbol.clone(), timeframe))
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.bucket_start >= from && c.bucket_start < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_option_chain(&self, underlying: &Symbol) -> Result<Vec<OptionContract>> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        Ok(self.state.lock().chains.get(underlying).cloned().unwrap_or_default())
    }

    async fn place_order(&self, order: OrderRequest) -> Result<OrderAck> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        if self.fail_orders.load(Ordering::SeqCst) {
            return Err(BrokerError::OrderRejected("mock order failure".into()));
        }
        let mut state = self.state.lock();
        state.next_order_id += 1;
        let broker_order_id = format!("MOCK-{}", state.next_order_id);
        let ack = OrderAck {
            client_order_id: order.client_order_id,
            broker_order_id: broker_order_id.clone(),
            status: BrokerOrderStatus::Filled,
            filled_quantity: order.quantity,
            average_fill_price: order.limit_price,
            acknowledged_at: Utc::now(),
        };
        state.orders.insert(broker_order_id, ack.clone());
        state.placed_orders.push(order);
        Ok(ack)
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<()> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        let mut state = self.state.lock();
        if let Some(ack) = state.orders.get_mut(broker_order_id) {
            ack.status = BrokerOrderStatus::Cancelled;
            ack.filled_quantity = Quantity::ZERO;
            Ok(())
        } else {
            Err(BrokerError::BrokerStatus {
                status: 404,
                body: "unknown order".into(),
            })
        }
    }

    async fn get_order_status(&self, broker_order_id: &str) -> Result<OrderAck> {
        if !self.is_authenticated() {
            return Err(BrokerError::AuthRequired);
        }
        self.state
            .lock()
            .orders
            .get(broker_order_id)
            .cloned()
            .ok_or_else(|| BrokerError::BrokerStatus {
                status: 404,
                body: "unknown order".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::Price;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_requires_auth_before_quote() {
        let broker = MockBrokerClient::new();
        let err = broker.get_quote(&Symbol::new("NIFTY")).await.unwrap_err();
        assert!(matches!(err, BrokerError::AuthRequired));
    }

    #[tokio::test]
    async fn test_get_quotes_skips_unknown_symbols() {
        let broker = MockBrokerClient::new();
        broker.authenticate().await.unwrap();
        broker.push_quote(Quote {
            symbol: Symbol::new("NIFTY"),
            last_price: Price::new(dec!(23500)),
            bid: Price::new(dec!(23499)),
            ask: Price::new(dec!(23501)),
            volume: Quantity::new(dec!(1000)),
            timestamp: Utc::now(),
        });
        let quotes = broker
            .get_quotes(&[Symbol::new("NIFTY"), Symbol::new("BANKNIFTY")])
            .await
            .unwrap();
        assert_eq!(quotes.len(), 1);
        assert!(quotes.contains_key(&Symbol::new("NIFTY")));
    }

    #[tokio::test]
    async fn test_available_margin_defaults_zero_then_settable() {
        let broker = MockBrokerClient::new();
        broker.authenticate().await.unwrap();
        assert_eq!(broker.get_available_margin().await.unwrap(), Price::ZERO);
        broker.set_available_margin(Price::new(dec!(50000)));
        assert_eq!(broker.get_available_margin().await.unwrap(), Price::new(dec!(50000)));
    }

    #[tokio::test]
    async fn test_place_order_fills_immediately() {
        let broker = MockBrokerClient::new();
        broker.authenticate().await.unwrap();
        let order = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: Symbol::new("NIFTY"),
            side: crate::types::OrderSide::Buy,
            order_type: crate::types::OrderType::Market,
            quantity: Quantity::new(dec!(50)),
            limit_price: Some(Price::new(dec!(23500))),
        };
        let ack = broker.place_order(order).await.unwrap();
        assert_eq!(ack.status, BrokerOrderStatus::Filled);
        assert_eq!(broker.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_order_transitions_status() {
        let broker = MockBrokerClient::new();
        broker.authenticate().await.unwrap();
        let order = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: Symbol::new("NIFTY"),
            side: crate::types::OrderSide::Buy,
            order_type: crate::types::OrderType::Limit,
            quantity: Quantity::new(dec!(50)),
            limit_price: Some(Price::new(dec!(23500))),
        };
        let ack = broker.place_order(order).await.unwrap();
        broker.cancel_order(&ack.broker_order_id).await.unwrap();
        let status = broker.get_order_status(&ack.broker_order_id).await.unwrap();
        assert_eq!(status.status, BrokerOrderStatus::Cancelled);
    }
}
