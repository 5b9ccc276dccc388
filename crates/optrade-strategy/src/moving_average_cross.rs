//! A two-period SMA cross strategy. Deliberately simple numerics — this
//! crate exists to give the Runner/SignalManager/Executor pipeline a
//! non-trivial, deterministic signal source to test against, not to ship a
//! production-grade strategy (`spec.md` §1 puts strategy numerics out of
//! scope).

use crate::registry::{Strategy, StrategyConfig};
use optrade_core::{Price, Signal, SignalAction, SignalStrength, Symbol};
use optrade_data::Dataset;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub struct MovingAverageCrossStrategy {
    config: StrategyConfig,
    fast_period: usize,
    slow_period: usize,
    underlying_target_pct: Decimal,
    underlying_stop_pct: Decimal,
}

impl MovingAverageCrossStrategy {
    pub fn new(config: StrategyConfig, fast_period: usize, slow_period: usize) -> Self {
        Self {
            config,
            fast_period,
            slow_period,
            underlying_target_pct: dec!(0.01),
            underlying_stop_pct: dec!(0.005),
        }
    }

    pub fn with_bracket_pct(mut self, target_pct: Decimal, stop_pct: Decimal) -> Self {
        self.underlying_target_pct = target_pct;
        self.underlying_stop_pct = stop_pct;
        self
    }

    fn sma(&self, closes: &[Decimal], period: usize) -> Option<Decimal> {
        if closes.len() < period {
            return None;
        }
        let window = &closes[closes.len() - period..];
        let sum: Decimal = window.iter().sum();
        Some(sum / Decimal::from(period as u64))
    }
}

impl Strategy for MovingAverageCrossStrategy {
    fn analyze(&self, symbol: &Symbol, dataset: &Dataset) -> Option<Signal> {
        if dataset.candles.len() < self.slow_period + 1 {
            return None;
        }
        let closes: Vec<Decimal> = dataset.candles.iter().map(|c| c.close.inner()).collect();
        let without_last = &closes[..closes.len() - 1];

        let fast_prev = self.sma(without_last, self.fast_period)?;
        let slow_prev = self.sma(without_last, self.slow_period)?;
        let fast_curr = self.sma(&closes, self.fast_period)?;
        let slow_curr = self.sma(&closes, self.slow_period)?;

        let action = if fast_prev <= slow_prev && fast_curr > slow_curr {
            SignalAction::EnterLong
        } else if fast_prev >= slow_prev && fast_curr < slow_curr {
            SignalAction::EnterShort
        } else {
            return None;
        };

        let reference_price = dataset.latest()?.close;
        let divergence_pct = if slow_curr.is_zero() {
            Decimal::ZERO
        } else {
            ((fast_curr - slow_curr) / slow_curr * Decimal::from(100)).abs()
        };
        let strength = if divergence_pct > dec!(1) {
            SignalStrength::Strong
        } else if divergence_pct > dec!(0.3) {
            SignalStrength::Moderate
        } else {
            SignalStrength::Weak
        };

        let (target_price, stop_loss_price) = match action {
            SignalAction::EnterLong => (
                reference_price * (Decimal::ONE + self.underlying_target_pct),
                reference_price * (Decimal::ONE - self.underlying_stop_pct),
            ),
            SignalAction::EnterShort => (
                reference_price * (Decimal::ONE - self.underlying_target_pct),
                reference_price * (Decimal::ONE + self.underlying_stop_pct),
            ),
        };

        let signal = Signal::new(
            self.config.name.clone(),
            symbol.clone(),
            self.config.asset_class,
            action,
            strength,
            reference_price,
            self.config.timeframe,
            dataset.latest()?.bucket_start,
        )
        .with_exit_levels(
            Price::new(target_price.max(Decimal::ZERO)),
            Price::new(stop_loss_price.max(Decimal::ZERO)),
        )
        .with_expected_move_pct(divergence_pct);

        Some(signal)
    }

    fn config(&self) -> &StrategyConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::{AssetClass, Candle, Quantity, Timeframe};

    fn config() -> StrategyConfig {
        StrategyConfig {
            name: "moving_average_cross".to_string(),
            asset_class: AssetClass::Index,
            symbols: vec![Symbol::new("NIFTY")],
            timeframe: Timeframe::M15,
            lookback_periods: 50,
            min_periods: 10,
        }
    }

    fn candle_at(i: i64, close: Decimal) -> Candle {
        let ts: chrono::DateTime<chrono::Utc> = "2026-07-27T04:00:00Z".parse().unwrap();
        let mut c = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M15,
            ts + chrono::Duration::minutes(15 * i),
            Price::new(close),
            Quantity::new(dec!(1000)),
        );
        c.finalize();
        c
    }

    fn dataset(closes: &[Decimal]) -> Dataset {
        Dataset {
            symbol: Symbol::new("NIFTY"),
            timeframe: Timeframe::M15,
            candles: closes
                .iter()
                .enumerate()
                .map(|(i, c)| candle_at(i as i64, *c))
                .collect(),
        }
    }

    #[test]
    fn test_bullish_cross_emits_enter_long() {
        let strategy = MovingAverageCrossStrategy::new(config(), 2, 4);
        // Fast SMA rises above slow SMA on the final bar.
        let closes = [
            dec!(100), dec!(100), dec!(100), dec!(100), dec!(100), dec!(120),
        ];
        let signal = strategy
            .analyze(&Symbol::new("NIFTY"), &dataset(&closes))
            .expect("expected a bullish cross signal");
        assert_eq!(signal.action, SignalAction::EnterLong);
        assert!(signal.has_valid_bracket());
    }

    #[test]
    fn test_bearish_cross_emits_enter_short() {
        let strategy = MovingAverageCrossStrategy::new(config(), 2, 4);
        let closes = [
            dec!(100), dec!(100), dec!(100), dec!(100), dec!(100), dec!(80),
        ];
        let signal = strategy
            .analyze(&Symbol::new("NIFTY"), &dataset(&closes))
            .expect("expected a bearish cross signal");
        assert_eq!(signal.action, SignalAction::EnterShort);
        assert!(signal.has_valid_bracket());
    }

    #[test]
    fn test_no_cross_returns_none() {
        let strategy = MovingAverageCrossStrategy::new(config(), 2, 4);
        let closes = [dec!(100); 6];
        assert!(strategy
            .analyze(&Symbol::new("NIFTY"), &dataset(&closes))
            .is_none());
    }

    #[test]
    fn test_insufficient_candles_returns_none() {
        let strategy = MovingAverageCrossStrategy::new(config(), 2, 4);
        let closes = [dec!(100), dec!(101)];
        assert!(strategy
            .analyze(&Symbol::new("NIFTY"), &dataset(&closes))
            .is_none());
    }
}
