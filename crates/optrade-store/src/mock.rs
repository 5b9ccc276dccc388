//! In-memory `Store` for unit tests that don't need real persistence.

use crate::error::Result;
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optrade_core::{Candle, OptionContract, Position, Price, Quantity, Signal, SignalStatus, Symbol, Timeframe};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct State {
    candles: HashMap<(Symbol, Timeframe, DateTime<Utc>), Candle>,
    signals_by_fingerprint: HashMap<String, Signal>,
    signals_by_id: HashMap<Uuid, Signal>,
    positions: HashMap<Uuid, Position>,
    option_snapshots: Vec<(OptionContract, DateTime<Utc>)>,
    intraday_quotes: Vec<(Symbol, DateTime<Utc>)>,
}

/// Hand-rolled fake rather than a generated mock: the trait is small and a
/// real in-memory model makes the dedup/idempotency tests more convincing
/// than a per-call expectation script would.
#[derive(Default)]
pub struct MockStore {
    state: Mutex<State>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn upsert_candle(&self, candle: &Candle) -> Result<()> {
        let key = (candle.symbol.clone(), candle.timeframe, candle.bucket_start);
        self.state.lock().candles.insert(key, candle.clone());
        Ok(())
    }

    async fn get_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let state = self.state.lock();
        let mut out: Vec<Candle> = state
            .candles
            .values()
            .filter(|c| {
                &c.symbol == symbol
                    && c.timeframe == timeframe
                    && c.bucket_start >= from
                    && c.bucket_start < to
            })
            .cloned()
            .collect();
        out.sort_by_key(|c| c.bucket_start);
        Ok(out)
    }

    async fn get_latest_candle(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    ) -> Result<Option<Candle>> {
        let state = self.state.lock();
        Ok(state
            .candles
            .values()
            .filter(|c| &c.symbol == symbol && c.timeframe == timeframe && c.bucket_start <= at)
            .max_by_key(|c| c.bucket_start)
            .cloned())
    }

    async fn get_last_n_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        n: usize,
        at: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let state = self.state.lock();
        let mut matched: Vec<Candle> = state
            .candles
            .values()
            .filter(|c| {
                &c.symbol == symbol
                    && c.timeframe == timeframe
                    && c.bucket_start <= at
                    && c.finalized
            })
            .cloned()
            .collect();
        matched.sort_by_key(|c| c.bucket_start);
        if matched.len() > n {
            matched.drain(0..matched.len() - n);
        }
        Ok(matched)
    }

    async fn insert_signal(&self, signal: &Signal, fingerprint: &str) -> Result<bool> {
        let mut state = self.state.lock();
        if state.signals_by_fingerprint.contains_key(fingerprint) {
            return Ok(false);
        }
        state
            .signals_by_fingerprint
            .insert(fingerprint.to_string(), signal.clone());
        state.signals_by_id.insert(signal.id, signal.clone());
        Ok(true)
    }

    async fn get_signal_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Signal>> {
        Ok(self
            .state
            .lock()
            .signals_by_fingerprint
            .get(fingerprint)
            .cloned())
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        Ok(self.state.lock().signals_by_id.get(&id).cloned())
    }

    async fn signals_since(
        &self,
        strategy: &str,
        symbol: &Symbol,
        since: DateTime<Utc>,
    ) -> Result<Vec<Signal>> {
        let state = self.state.lock();
        let mut out: Vec<Signal> = state
            .signals_by_id
            .values()
            .filter(|s| s.strategy_name == strategy && &s.symbol == symbol && s.generated_at >= since)
            .cloned()
            .collect();
        out.sort_by_key(|s| std::cmp::Reverse(s.generated_at));
        Ok(out)
    }

    async fn update_signal_status(
        &self,
        id: Uuid,
        status: SignalStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(signal) = state.signals_by_id.get_mut(&id) {
            signal.status = status;
            if let Some(reason) = reason {
                signal
                    .metadata
                    .insert("reason".to_string(), serde_json::json!(reason));
            }
            let fp = state
                .signals_by_fingerprint
                .iter()
                .find(|(_, s)| s.id == id)
                .map(|(fp, _)| fp.clone());
            if let Some(fp) = fp {
                if let Some(s) = state.signals_by_fingerprint.get_mut(&fp) {
                    s.status = status;
                    if let Some(reason) = reason {
                        s.metadata.insert("reason".to_string(), serde_json::json!(reason));
                    }
                }
            }
        }
        Ok(())
    }

    async fn insert_position(&self, position: &Position) -> Result<()> {
        self.state
            .lock()
            .positions
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn update_position(&self, position: &Position) -> Result<()> {
        self.state
            .lock()
            .positions
            .insert(position.id, position.clone());
        Ok(())
    }

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>> {
        Ok(self.state.lock().positions.get(&id).cloned())
    }

    async fn get_position_by_signal(&self, signal_id: Uuid) -> Result<Option<Position>> {
        Ok(self
            .state
            .lock()
            .positions
            .values()
            .find(|p| p.signal_id == signal_id)
            .cloned())
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>> {
        Ok(self
            .state
            .lock()
            .positions
            .values()
            .filter(|p| p.is_open())
            .cloned()
            .collect())
    }

    async fn upsert_option_snapshot(
        &self,
        contract: &OptionContract,
        captured_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.option_snapshots.retain(|(c, t)| {
            !(c.trading_symbol == contract.trading_symbol && *t == captured_at)
        });
        state.option_snapshots.push((contract.clone(), captured_at));
        Ok(())
    }

    async fn get_option_chain(&self, underlying: &Symbol, as_of: DateTime<Utc>) -> Result<Vec<OptionContract>> {
        let state = self.state.lock();
        let latest = state
            .option_snapshots
            .iter()
            .filter(|(c, t)| &c.underlying == underlying && *t <= as_of)
            .map(|(_, t)| *t)
            .max();
        let Some(latest) = latest else {
            return Ok(vec![]);
        };
        Ok(state
            .option_snapshots
            .iter()
            .filter(|(c, t)| &c.underlying == underlying && *t == latest)
            .map(|(c, _)| c.clone())
            .collect())
    }

    async fn insert_intraday_quote(
        &self,
        symbol: &Symbol,
        _price: Price,
        _volume: Quantity,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.state
            .lock()
            .intraday_quotes
            .push((symbol.clone(), ts));
        Ok(())
    }

    async fn daily_intraday_reset(&self, today_start: DateTime<Utc>) -> Result<()> {
        self.state
            .lock()
            .intraday_quotes
            .retain(|(_, ts)| *ts >= today_start);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::{AssetClass, SignalAction, SignalStrength, Timeframe};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_store_dedup_matches_sqlite_semantics() {
        let store = MockStore::new();
        let signal = Signal::new(
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            Price::new(dec!(23500)),
            Timeframe::M15,
            "2026-07-27T04:30:00Z".parse().unwrap(),
        );
        assert!(store.insert_signal(&signal, "fp-1").await.unwrap());
        assert!(!store.insert_signal(&signal, "fp-1").await.unwrap());
    }
}
