//! Folds broker ticks into OHLCV candles across a configured set of
//! timeframes.
//!
//! One in-progress candle per `(symbol, timeframe)` plus a bounded ring of
//! its most recently finalized candles are kept in a [`DashMap`] so
//! multiple runner tasks can feed ticks for different symbols concurrently
//! without a global lock — the same per-key concurrency shape the teacher
//! uses for its position cache, applied here to in-progress candles
//! instead of positions. Persistence (`Store::upsert_candle`) and event
//! publication on finalization are the caller's responsibility: the
//! aggregator returns the candles that just closed and the caller (a
//! Runner) is the single writer for its own `(symbol, timeframe)` keys, so
//! it can persist and publish without a second round-trip through here.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use optrade_core::{Candle, MarketCalendar, Price, Quantity, Symbol, Timeframe};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::trace;

/// Bound on the finalized-candle ring kept per `(symbol, timeframe)` key,
/// per `spec.md` §3.
const RING_CAPACITY: usize = 2_000;

struct AggregatorState {
    current: Option<Candle>,
    ring: VecDeque<Candle>,
}

impl Default for AggregatorState {
    fn default() -> Self {
        Self {
            current: None,
            ring: VecDeque::with_capacity(RING_CAPACITY),
        }
    }
}

impl AggregatorState {
    fn push_finalized(&mut self, candle: Candle) {
        if self.ring.len() == RING_CAPACITY {
            self.ring.pop_front();
        }
        self.ring.push_back(candle);
    }
}

/// Folds ticks into candles for every timeframe in `timeframes`, one
/// in-progress bar per `(symbol, timeframe)` at a time, plus a bounded
/// read-only tail of recently finalized bars per key.
pub struct CandleAggregator {
    calendar: Arc<MarketCalendar>,
    timeframes: Vec<Timeframe>,
    state: DashMap<(Symbol, Timeframe), AggregatorState>,
    /// Last-seen broker-reported volume reading per symbol, so `on_tick`
    /// can diff a running day-cumulative quote into a per-tick delta
    /// before folding it into a candle (`spec.md` §4.3 step 5).
    last_cum_volume: DashMap<Symbol, Quantity>,
}

impl CandleAggregator {
    pub fn new(calendar: Arc<MarketCalendar>, timeframes: Vec<Timeframe>) -> Self {
        Self {
            calendar,
            timeframes,
            state: DashMap::new(),
            last_cum_volume: DashMap::new(),
        }
    }

    /// Broker quotes in this spec's domain (NSE-style) report `volume` as a
    /// running day-cumulative total, not a per-tick trade size, so a candle
    /// must absorb the *delta* against the last reading or every poll would
    /// double-count the whole day's volume into `volume`. Returns the delta
    /// to fold in, and records `volume` as the new last-seen reading.
    ///
    /// A reading lower than the last one means the cumulative counter reset
    /// (a fresh session, or a broker restart) rather than that volume went
    /// backwards; the full reading is used as the delta in that case.
    fn cum_volume_delta(&self, symbol: &Symbol, volume: Quantity) -> Quantity {
        let mut last = self.last_cum_volume.entry(symbol.clone()).or_insert(Quantity::ZERO);
        let delta = if volume.inner() >= last.inner() {
            Quantity::new(volume.inner() - last.inner())
        } else {
            volume
        };
        *last = volume;
        delta
    }

    /// Fold one tick into every tracked timeframe for `symbol`. Returns the
    /// candles that just closed (one per timeframe whose bucket rolled
    /// over), in the same order as `timeframes`. Never mutates a candle
    /// after it has been returned as closed.
    ///
    /// Rejects (returns an empty vec, touching no state) ticks outside
    /// market hours, per `spec.md` §4.3 step 1 — this prevents an
    /// after-hours broker heartbeat from polluting the aggregator's data.
    /// `volume` is the broker's cumulative day-volume reading; this is
    /// diffed against the previous reading before it touches any candle.
    pub fn on_tick(
        &self,
        symbol: &Symbol,
        price: Price,
        volume: Quantity,
        ts: DateTime<Utc>,
    ) -> Vec<Candle> {
        if !self.calendar.is_market_open(ts) {
            return Vec::new();
        }
        let delta = self.cum_volume_delta(symbol, volume);
        let mut closed = Vec::new();
        for &timeframe in &self.timeframes {
            let bucket_start = self.calendar.align_to_bucket(ts, timeframe);
            let key = (symbol.clone(), timeframe);
            let mut entry = self.state.entry(key).or_default();
            match &mut entry.current {
                Some(candle) if candle.bucket_start == bucket_start => {
                    candle.absorb_tick(price, delta);
                }
                Some(candle) => {
                    let mut finished = candle.clone();
                    finished.finalize();
                    trace!(
                        symbol = %symbol,
                        timeframe = %timeframe,
                        bucket_start = %finished.bucket_start,
                        "candle bucket rolled over"
                    );
                    *candle = Candle::from_tick(symbol.clone(), timeframe, bucket_start, price, delta);
                    entry.push_finalized(finished.clone());
                    closed.push(finished);
                }
                None => {
                    entry.current = Some(Candle::from_tick(
                        symbol.clone(),
                        timeframe,
                        bucket_start,
                        price,
                        delta,
                    ));
                }
            }
        }
        closed
    }

    /// Snapshot of the still-forming candle for `symbol`/`timeframe`, if any
    /// ticks have arrived for it yet.
    pub fn current(&self, symbol: &Symbol, timeframe: Timeframe) -> Option<Candle> {
        self.state
            .get(&(symbol.clone(), timeframe))
            .and_then(|entry| entry.current.clone())
    }

    /// The last `n` finalized candles for `symbol`/`timeframe` held in the
    /// in-memory ring, oldest first. A short snapshot read under the
    /// per-key shard lock, never a full actor round-trip.
    pub fn recent_finalized(&self, symbol: &Symbol, timeframe: Timeframe, n: usize) -> Vec<Candle> {
        self.state
            .get(&(symbol.clone(), timeframe))
            .map(|entry| {
                let len = entry.ring.len();
                let skip = len.saturating_sub(n);
                entry.ring.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Force-close every in-progress candle, e.g. at session close. Returns
    /// the closed candles and clears in-progress state (the ring is left
    /// intact) so the next session's first tick starts a fresh bar.
    pub fn flush_all(&self) -> Vec<Candle> {
        let mut candles = Vec::new();
        for mut entry in self.state.iter_mut() {
            if let Some(mut candle) = entry.current.take() {
                candle.finalize();
                entry.push_finalized(candle.clone());
                candles.push(candle);
            }
        }
        candles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::HolidayTable;
    use rust_decimal_macros::dec;

    fn calendar() -> Arc<MarketCalendar> {
        Arc::new(MarketCalendar::new(
            Arc::new(optrade_core::SystemClock),
            HolidayTable::default(),
        ))
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_tick_opens_candle_no_close() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M5]);
        let closed = agg.on_tick(
            &Symbol::new("NIFTY"),
            Price::new(dec!(100)),
            Quantity::new(dec!(10)),
            ts("2026-07-27T04:00:00Z"),
        );
        assert!(closed.is_empty());
        assert!(agg.current(&Symbol::new("NIFTY"), Timeframe::M5).is_some());
    }

    #[test]
    fn test_tick_within_same_bucket_absorbed() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M5]);
        let symbol = Symbol::new("NIFTY");
        agg.on_tick(&symbol, Price::new(dec!(100)), Quantity::new(dec!(10)), ts("2026-07-27T04:00:00Z"));
        agg.on_tick(&symbol, Price::new(dec!(105)), Quantity::new(dec!(5)), ts("2026-07-27T04:02:00Z"));
        let current = agg.current(&symbol, Timeframe::M5).unwrap();
        assert_eq!(current.close, Price::new(dec!(105)));
        assert_eq!(current.tick_count, 2);
    }

    #[test]
    fn test_tick_crossing_bucket_closes_previous() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M5]);
        let symbol = Symbol::new("NIFTY");
        agg.on_tick(&symbol, Price::new(dec!(100)), Quantity::new(dec!(10)), ts("2026-07-27T04:00:00Z"));
        let closed = agg.on_tick(
            &symbol,
            Price::new(dec!(110)),
            Quantity::new(dec!(10)),
            ts("2026-07-27T04:06:00Z"),
        );
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].close, Price::new(dec!(100)));
        assert!(closed[0].finalized);
        let current = agg.current(&symbol, Timeframe::M5).unwrap();
        assert_eq!(current.open, Price::new(dec!(110)));
        assert!(!current.finalized);
    }

    #[test]
    fn test_independent_timeframes_close_independently() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M1, Timeframe::M5]);
        let symbol = Symbol::new("NIFTY");
        agg.on_tick(&symbol, Price::new(dec!(100)), Quantity::new(dec!(1)), ts("2026-07-27T04:00:00Z"));
        let closed = agg.on_tick(
            &symbol,
            Price::new(dec!(101)),
            Quantity::new(dec!(1)),
            ts("2026-07-27T04:01:30Z"),
        );
        // M1 bucket rolled (04:00 -> 04:01), M5 bucket did not.
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].timeframe, Timeframe::M1);
    }

    #[test]
    fn test_flush_all_clears_current_state() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M5]);
        let symbol = Symbol::new("NIFTY");
        agg.on_tick(&symbol, Price::new(dec!(100)), Quantity::new(dec!(1)), ts("2026-07-27T04:00:00Z"));
        let flushed = agg.flush_all();
        assert_eq!(flushed.len(), 1);
        assert!(agg.current(&symbol, Timeframe::M5).is_none());
    }

    #[test]
    fn test_tick_outside_market_hours_rejected() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M5]);
        let symbol = Symbol::new("NIFTY");
        // 16:00 IST = 10:30 UTC, after the 15:30 close.
        let closed = agg.on_tick(&symbol, Price::new(dec!(100)), Quantity::new(dec!(1)), ts("2026-07-27T10:30:00Z"));
        assert!(closed.is_empty());
        assert!(agg.current(&symbol, Timeframe::M5).is_none());
    }

    #[test]
    fn test_recent_finalized_returns_ring_tail_oldest_first() {
        let agg = CandleAggregator::new(calendar(), vec![Timeframe::M1]);
        let symbol = Symbol::new("NIFTY");
        let mut t = ts("2026-07-27T04:00:00Z");
        for i in 0..5 {
            agg.on_tick(&symbol, Price::new(dec!(100) + rust_decimal::Decimal::from(i)), Quantity::new(dec!(1)), t);
            t += chrono::Duration::minutes(1);
        }
        let recent = agg.recent_finalized(&symbol, Timeframe::M1, 3);
        assert_eq!(recent.len(), 3);
        assert!(recent.windows(2).all(|w| w[0].bucket_start < w[1].bucket_start));
        assert!(recent.iter().all(|c| c.finalized));
    }
}
