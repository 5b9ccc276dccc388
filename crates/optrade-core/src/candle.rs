//! OHLCV candle, the unit the aggregator produces and the cache stores.

use crate::clock::Timeframe;
use crate::decimal::{Price, Quantity};
use crate::error::{CoreError, Result};
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One OHLCV bar for `symbol` over `[bucket_start, bucket_start + timeframe)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub bucket_start: DateTime<Utc>,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    /// Number of ticks folded into this bar. Zero-tick (synthetic /
    /// carried-forward) candles are allowed but must say so.
    pub tick_count: u32,
    /// `true` once `now >= bucket_start + timeframe`; finalized candles are
    /// immutable and are the only ones a `DataAssembler` dataset may
    /// contain (aside from the single optional in-progress tail candle a
    /// caller explicitly opts into).
    pub finalized: bool,
}

impl Candle {
    /// Construct a single-tick, still-forming candle: open == high == low
    /// == close, `finalized = false`.
    pub fn from_tick(
        symbol: Symbol,
        timeframe: Timeframe,
        bucket_start: DateTime<Utc>,
        price: Price,
        volume: Quantity,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            tick_count: 1,
            finalized: false,
        }
    }

    /// Mark this candle immutable. Called by the aggregator when a bucket
    /// rolls over; never reversed.
    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    /// Fold another tick into this bar in place.
    pub fn absorb_tick(&mut self, price: Price, volume: Quantity) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume = self.volume + volume;
        self.tick_count += 1;
    }

    /// `high >= open, close, low` and `low <= open, close, high` and all
    /// prices positive. Volume may be zero (illiquid instrument) but never
    /// negative.
    pub fn validate(&self) -> Result<()> {
        if self.high < self.open
            || self.high < self.close
            || self.high < self.low
            || self.low > self.open
            || self.low > self.close
        {
            return Err(CoreError::InvalidCandle(format!(
                "OHLC out of order for {} @ {}: o={} h={} l={} c={}",
                self.symbol, self.bucket_start, self.open, self.high, self.low, self.close
            )));
        }
        if !self.open.is_positive() || !self.close.is_positive() {
            return Err(CoreError::InvalidCandle(format!(
                "non-positive open/close for {} @ {}",
                self.symbol, self.bucket_start
            )));
        }
        if self.volume.inner().is_sign_negative() {
            return Err(CoreError::InvalidCandle(format!(
                "negative volume for {} @ {}",
                self.symbol, self.bucket_start
            )));
        }
        Ok(())
    }

    pub fn bucket_end(&self) -> DateTime<Utc> {
        self.bucket_start + self.timeframe.duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        "2026-07-27T04:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_from_tick_is_degenerate_ohlc() {
        let c = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M5,
            ts(),
            Price::new(dec!(100)),
            Quantity::new(dec!(10)),
        );
        assert_eq!(c.open, c.high);
        assert_eq!(c.open, c.low);
        assert_eq!(c.open, c.close);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_absorb_tick_updates_high_low_close() {
        let mut c = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M5,
            ts(),
            Price::new(dec!(100)),
            Quantity::new(dec!(10)),
        );
        c.absorb_tick(Price::new(dec!(105)), Quantity::new(dec!(5)));
        c.absorb_tick(Price::new(dec!(95)), Quantity::new(dec!(5)));
        c.absorb_tick(Price::new(dec!(102)), Quantity::new(dec!(5)));
        assert_eq!(c.high, Price::new(dec!(105)));
        assert_eq!(c.low, Price::new(dec!(95)));
        assert_eq!(c.close, Price::new(dec!(102)));
        assert_eq!(c.volume, Quantity::new(dec!(25)));
        assert_eq!(c.tick_count, 4);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_high_below_open() {
        let mut c = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M5,
            ts(),
            Price::new(dec!(100)),
            Quantity::new(dec!(0)),
        );
        c.high = Price::new(dec!(50));
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_bucket_end() {
        let c = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M15,
            ts(),
            Price::new(dec!(100)),
            Quantity::new(dec!(0)),
        );
        assert_eq!(c.bucket_end(), ts() + chrono::Duration::minutes(15));
    }
}
