//! `ExitEvaluator`: pure predicates over a `Position` and its current mark,
//! kept free of any `Store`/`BrokerClient` dependency so each rule is
//! independently testable. Split from the driving loop (`PositionMonitorLoop`
//! in `monitor.rs`) the same way the teacher's `time_stop::TimeStop::check`
//! is split from `TimeStopMonitor::run`.

use crate::config::ExitConfig;
use chrono::{DateTime, Utc};
use optrade_core::{ExitReason, MarketCalendar, Position, Price};

/// Checks a position's exit conditions in priority order: stop loss beats
/// target beats expiry, per `spec.md` §4.11.
pub struct ExitEvaluator {
    config: ExitConfig,
}

impl ExitEvaluator {
    pub fn new(config: ExitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExitConfig {
        &self.config
    }

    /// Returns the first exit reason that applies to `position` at `current`,
    /// or `None` if it should stay open.
    pub fn evaluate(
        &self,
        position: &Position,
        current: Price,
        now: DateTime<Utc>,
        calendar: &MarketCalendar,
    ) -> Option<ExitReason> {
        if let Some(stop_loss) = position.stop_loss {
            if current.inner() <= stop_loss.inner() {
                return Some(ExitReason::StopLoss);
            }
        }

        if let Some(target) = position.target {
            if current.inner() >= target.inner() {
                return Some(ExitReason::Target);
            }
        }

        if let Some(expiry) = position.expiry {
            let (_, session_close) = calendar.session_bounds_for(expiry);
            if session_close - now <= self.config.expiry_cutoff {
                return Some(ExitReason::ExpiryApproaching);
            }
        }

        None
    }

    /// Returns a raised stop-loss premium if `current` has crossed the
    /// trailing-stop trigger and the new level is tighter than the existing
    /// one, or `None` if trailing is disabled or hasn't triggered. The
    /// ratchet is monotonic: it only ever raises `stop_loss`, never lowers
    /// it, so the caller can apply the result unconditionally.
    pub fn ratchet_stop_loss(&self, position: &Position, current: Price) -> Option<Price> {
        let trigger_pct = self.config.trail_trigger_pct?;
        let entry = position.entry_price.inner();
        let trigger_level = entry * (rust_decimal::Decimal::ONE + trigger_pct);
        if current.inner() < trigger_level {
            return None;
        }

        let run_up = current.inner() - entry;
        let locked_in = entry + run_up / rust_decimal::Decimal::TWO;
        let candidate = Price::new(locked_in);

        match position.stop_loss {
            Some(existing) if candidate <= existing => None,
            _ => Some(candidate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::{AssetClass, FixedClock, HolidayTable, PositionMode, Quantity, Symbol};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn calendar_at(now: DateTime<Utc>) -> MarketCalendar {
        MarketCalendar::new(std::sync::Arc::new(FixedClock::new(now)), HolidayTable::default())
    }

    fn position() -> Position {
        let mut p = Position::open(
            Uuid::new_v4(),
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            PositionMode::Paper,
            Price::new(dec!(100)),
            Quantity::new(dec!(50)),
            "2026-07-27T04:30:00Z".parse().unwrap(),
        );
        p.stop_loss = Some(Price::new(dec!(70)));
        p.target = Some(Price::new(dec!(150)));
        p
    }

    #[test]
    fn test_stop_loss_beats_target_and_expiry() {
        let evaluator = ExitEvaluator::new(ExitConfig::default());
        let now: DateTime<Utc> = "2026-07-27T05:00:00Z".parse().unwrap();
        let calendar = calendar_at(now);
        let reason = evaluator.evaluate(&position(), Price::new(dec!(70)), now, &calendar);
        assert_eq!(reason, Some(ExitReason::StopLoss));
    }

    #[test]
    fn test_target_hit_when_above_stop_loss() {
        let evaluator = ExitEvaluator::new(ExitConfig::default());
        let now: DateTime<Utc> = "2026-07-27T05:00:00Z".parse().unwrap();
        let calendar = calendar_at(now);
        let reason = evaluator.evaluate(&position(), Price::new(dec!(150)), now, &calendar);
        assert_eq!(reason, Some(ExitReason::Target));
    }

    #[test]
    fn test_expiry_approaching_within_cutoff() {
        let evaluator = ExitEvaluator::new(ExitConfig {
            expiry_cutoff: chrono::Duration::minutes(60),
            trail_trigger_pct: None,
        });
        let mut p = position();
        let now: DateTime<Utc> = "2026-07-27T09:45:00Z".parse().unwrap();
        let calendar = calendar_at(now);
        // Session close for `now`'s date is 15:30 IST == 10:00 UTC; 15
        // minutes away, inside the 60-minute cutoff.
        p.expiry = Some(now.date_naive());
        let reason = evaluator.evaluate(&p, Price::new(dec!(100)), now, &calendar);
        assert_eq!(reason, Some(ExitReason::ExpiryApproaching));
    }

    #[test]
    fn test_no_exit_mid_range() {
        let evaluator = ExitEvaluator::new(ExitConfig::default());
        let now: DateTime<Utc> = "2026-07-27T05:00:00Z".parse().unwrap();
        let calendar = calendar_at(now);
        let reason = evaluator.evaluate(&position(), Price::new(dec!(100)), now, &calendar);
        assert_eq!(reason, None);
    }

    #[test]
    fn test_ratchet_disabled_by_default() {
        let evaluator = ExitEvaluator::new(ExitConfig::default());
        assert_eq!(evaluator.ratchet_stop_loss(&position(), Price::new(dec!(200))), None);
    }

    #[test]
    fn test_ratchet_locks_in_half_of_run_up_once_triggered() {
        let evaluator = ExitEvaluator::new(ExitConfig {
            expiry_cutoff: chrono::Duration::minutes(60),
            trail_trigger_pct: Some(dec!(0.2)),
        });
        // Entry 100, trigger at 120. At 140, run-up is 40, locked-in is 120.
        let new_stop = evaluator.ratchet_stop_loss(&position(), Price::new(dec!(140))).unwrap();
        assert_eq!(new_stop, Price::new(dec!(120)));
    }

    #[test]
    fn test_ratchet_never_lowers_an_existing_stop() {
        let evaluator = ExitEvaluator::new(ExitConfig {
            expiry_cutoff: chrono::Duration::minutes(60),
            trail_trigger_pct: Some(dec!(0.2)),
        });
        let mut p = position();
        p.stop_loss = Some(Price::new(dec!(130)));
        // Run-up to 140 would lock in 120, below the existing 130 stop.
        assert_eq!(evaluator.ratchet_stop_loss(&p, Price::new(dec!(140))), None);
    }

    #[test]
    fn test_ratchet_below_trigger_is_a_noop() {
        let evaluator = ExitEvaluator::new(ExitConfig {
            expiry_cutoff: chrono::Duration::minutes(60),
            trail_trigger_pct: Some(dec!(0.2)),
        });
        assert_eq!(evaluator.ratchet_stop_loss(&position(), Price::new(dec!(110))), None);
    }
}
