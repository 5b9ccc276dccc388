//! Per-`(symbol, timeframe)` cache of the finalized-candle tail, refreshed
//! from `Store` and, when the tail is too old, backfilled from
//! `BrokerClient` — the cache a `DataAssembler` reads from instead of
//! hitting the broker on every strategy invocation.
//!
//! Single-flight refresh is implemented with one `tokio::sync::Mutex` per
//! key rather than layering a separate `Notify` guard on top: holding the
//! lock for the refresh's full duration already makes every concurrent
//! `get` for the same key await the same in-flight refresh and then read
//! its result, which is the single-flight guarantee callers need.

use crate::error::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use optrade_broker::BrokerClient;
use optrade_core::{Candle, Clock, Symbol, Timeframe};
use optrade_store::Store;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Default staleness window before a cached tail is refreshed.
pub const DEFAULT_REFRESH_TTL: ChronoDuration = ChronoDuration::minutes(5);

#[derive(Default)]
struct CacheEntry {
    candles: Vec<Candle>,
    last_refresh: Option<DateTime<Utc>>,
}

type Key = (Symbol, Timeframe);

pub struct HistoricalCache {
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn Clock>,
    refresh_ttl: ChronoDuration,
    entries: DashMap<Key, Arc<Mutex<CacheEntry>>>,
}

impl HistoricalCache {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn BrokerClient>, clock: Arc<dyn Clock>) -> Self {
        Self::with_refresh_ttl(store, broker, clock, DEFAULT_REFRESH_TTL)
    }

    pub fn with_refresh_ttl(
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        clock: Arc<dyn Clock>,
        refresh_ttl: ChronoDuration,
    ) -> Self {
        Self {
            store,
            broker,
            clock,
            refresh_ttl,
            entries: DashMap::new(),
        }
    }

    /// Returns the last `periods` finalized candles for `symbol`/`timeframe`,
    /// ascending by `bucket_start`, refreshing from `Store`/`BrokerClient`
    /// first if the cached tail is absent or older than `refresh_ttl`.
    pub async fn get(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        periods: usize,
    ) -> Result<Vec<Candle>> {
        let now = self.clock.now();
        let key = (symbol.clone(), timeframe);
        let entry_arc = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(CacheEntry::default())))
            .clone();

        let mut entry = entry_arc.lock().await;
        let stale = entry
            .last_refresh
            .map(|t| now - t > self.refresh_ttl)
            .unwrap_or(true);
        if stale {
            self.refresh(symbol, timeframe, periods, now, &mut entry).await?;
        }

        let len = entry.candles.len();
        let skip = len.saturating_sub(periods);
        Ok(entry.candles[skip..].to_vec())
    }

    /// Eagerly populates the cache for every `(symbol, timeframe)` pair in
    /// `keys`, so the first `DataAssembler` read of a trading session hits a
    /// warm entry instead of paying the broker backfill inline. Errors for
    /// one key are logged and skipped rather than aborting the rest of the
    /// warm pass — a broker hiccup on one symbol shouldn't stall startup for
    /// every other symbol/timeframe pair.
    pub async fn warm(&self, keys: &[(Symbol, Timeframe)], periods: usize) {
        for (symbol, timeframe) in keys {
            if let Err(err) = self.get(symbol, *timeframe, periods).await {
                tracing::warn!(symbol = %symbol, timeframe = %timeframe, error = %err, "historical cache warm failed for key");
            }
        }
    }

    async fn refresh(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        periods: usize,
        now: DateTime<Utc>,
        entry: &mut CacheEntry,
    ) -> Result<()> {
        let lookback = periods.max(periods.saturating_mul(2)).max(1);
        let mut candles = self
            .store
            .get_last_n_candles(symbol, timeframe, lookback, now)
            .await?;

        let tail_stale = match candles.last() {
            None => true,
            Some(last) => now - last.bucket_start > self.refresh_ttl,
        };

        if tail_stale {
            let from = candles
                .last()
                .map(|c| c.bucket_start)
                .unwrap_or_else(|| now - timeframe.duration() * (lookback as i32));
            debug!(symbol = %symbol, timeframe = %timeframe, from = %from, "historical cache backfilling from broker");
            let fetched = self
                .broker
                .get_historical_candles(symbol, timeframe, from, now)
                .await?;
            if !fetched.is_empty() {
                self.store.bulk_upsert_candles(&fetched).await?;
                candles = self
                    .store
                    .get_last_n_candles(symbol, timeframe, lookback, now)
                    .await?;
            }
        }

        entry.candles = candles;
        entry.last_refresh = Some(now);
        Ok(())
    }
}
