//! Pre-trade validation gates (`spec.md` §4.10 step 2), factored out of the
//! executor so each gate is an independently testable, independently
//! configurable predicate — the same shape as the teacher's
//! `hip3-risk::gates::RiskGate::check_all`: an ordered sequence of named
//! checks, early-returning on the first block rather than collecting every
//! failure, since later gates (e.g. the concurrency-count query) may be
//! more expensive and are skipped once a cheaper gate has already blocked.

use crate::error::{RiskError, Result};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use optrade_core::{Signal, Symbol};
use std::collections::HashSet;
use tracing::trace;

/// Default maximum age a signal may have before the executor refuses to
/// act on it (`spec.md` §4.10 step 2, §8: "23h59m passes, 24h01m rejected").
pub const DEFAULT_MAX_SIGNAL_AGE: ChronoDuration = ChronoDuration::hours(24);

#[derive(Debug, Clone)]
pub struct RiskConfig {
    /// Symbols the executor is permitted to open options positions on.
    pub options_tradeable_allow_list: HashSet<Symbol>,
    pub max_signal_age: ChronoDuration,
    pub trading_enabled: bool,
    pub max_concurrent_positions: usize,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            options_tradeable_allow_list: HashSet::new(),
            max_signal_age: DEFAULT_MAX_SIGNAL_AGE,
            trading_enabled: true,
            max_concurrent_positions: 10,
        }
    }
}

/// Outcome of a single gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Pass,
    Block(String),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// The ordered pre-trade validation gate. Holds no mutable state of its own
/// (unlike the teacher's spread-shock EWMA gate) since every check here is a
/// pure function of the signal, the clock, and the caller-supplied open
/// position count.
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Runs every gate in order, returning the first `Block` reason. Gate
    /// order: allow-list → signal age → trading-enabled → concurrency cap —
    /// cheapest and most-likely-to-reject checks first, matching the
    /// teacher's "prerequisites before side-effecting/expensive checks"
    /// ordering rule.
    pub fn check_all(
        &self,
        signal: &Signal,
        now: DateTime<Utc>,
        open_position_count: usize,
    ) -> Result<()> {
        let gate1 = self.check_allow_list(&signal.symbol);
        if let GateResult::Block(reason) = &gate1 {
            trace!(gate = "allow_list", reason, "validation gate blocked");
            return Err(RiskError::GateBlocked {
                gate: "allow_list".to_string(),
                reason: reason.clone(),
            });
        }

        let gate2 = self.check_signal_age(signal.generated_at, now);
        if let GateResult::Block(reason) = &gate2 {
            trace!(gate = "signal_age", reason, "validation gate blocked");
            return Err(RiskError::GateBlocked {
                gate: "signal_age".to_string(),
                reason: reason.clone(),
            });
        }

        let gate3 = self.check_trading_enabled();
        if let GateResult::Block(reason) = &gate3 {
            trace!(gate = "trading_enabled", reason, "validation gate blocked");
            return Err(RiskError::GateBlocked {
                gate: "trading_enabled".to_string(),
                reason: reason.clone(),
            });
        }

        let gate4 = self.check_max_concurrent(open_position_count);
        if let GateResult::Block(reason) = &gate4 {
            trace!(gate = "max_concurrent", reason, "validation gate blocked");
            return Err(RiskError::GateBlocked {
                gate: "max_concurrent".to_string(),
                reason: reason.clone(),
            });
        }

        Ok(())
    }

    pub fn check_allow_list(&self, symbol: &Symbol) -> GateResult {
        if self.config.options_tradeable_allow_list.contains(symbol) {
            GateResult::Pass
        } else {
            GateResult::Block(format!("{symbol} is not on the options-tradeable allow-list"))
        }
    }

    pub fn check_signal_age(&self, generated_at: DateTime<Utc>, now: DateTime<Utc>) -> GateResult {
        let age = now - generated_at;
        if age <= self.config.max_signal_age {
            GateResult::Pass
        } else {
            GateResult::Block(format!(
                "stale: signal is {}s old, max {}s",
                age.num_seconds(),
                self.config.max_signal_age.num_seconds()
            ))
        }
    }

    pub fn check_trading_enabled(&self) -> GateResult {
        if self.config.trading_enabled {
            GateResult::Pass
        } else {
            GateResult::Block("trading disabled in configuration".to_string())
        }
    }

    pub fn check_max_concurrent(&self, open_position_count: usize) -> GateResult {
        if open_position_count < self.config.max_concurrent_positions {
            GateResult::Pass
        } else {
            GateResult::Block(format!(
                "max_concurrent_positions reached: {open_position_count} >= {}",
                self.config.max_concurrent_positions
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::{AssetClass, Price, SignalAction, SignalStrength, Timeframe};
    use rust_decimal_macros::dec;

    fn signal(symbol: Symbol, generated_at: DateTime<Utc>) -> Signal {
        Signal::new(
            "moving_average_cross",
            symbol,
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            Price::new(dec!(23500)),
            Timeframe::M15,
            generated_at,
        )
    }

    fn allow_listed_config() -> RiskConfig {
        RiskConfig {
            options_tradeable_allow_list: HashSet::from([Symbol::new("NIFTY")]),
            ..RiskConfig::default()
        }
    }

    #[test]
    fn test_allow_list_blocks_unlisted_symbol() {
        let gate = RiskGate::new(allow_listed_config());
        let result = gate.check_allow_list(&Symbol::new("RELIANCE"));
        assert!(matches!(result, GateResult::Block(_)));
    }

    #[test]
    fn test_allow_list_passes_listed_symbol() {
        let gate = RiskGate::new(allow_listed_config());
        assert_eq!(gate.check_allow_list(&Symbol::new("NIFTY")), GateResult::Pass);
    }

    #[test]
    fn test_signal_age_boundary_23h59_passes_24h01_blocks() {
        let gate = RiskGate::new(RiskConfig::default());
        let generated_at: DateTime<Utc> = "2026-07-27T04:30:00Z".parse().unwrap();
        let within = generated_at + ChronoDuration::hours(23) + ChronoDuration::minutes(59);
        let stale = generated_at + ChronoDuration::hours(24) + ChronoDuration::minutes(1);
        assert_eq!(gate.check_signal_age(generated_at, within), GateResult::Pass);
        assert!(matches!(gate.check_signal_age(generated_at, stale), GateResult::Block(_)));
    }

    #[test]
    fn test_trading_disabled_blocks() {
        let gate = RiskGate::new(RiskConfig {
            trading_enabled: false,
            ..RiskConfig::default()
        });
        assert!(matches!(gate.check_trading_enabled(), GateResult::Block(_)));
    }

    #[test]
    fn test_max_concurrent_boundary() {
        let gate = RiskGate::new(RiskConfig {
            max_concurrent_positions: 3,
            ..RiskConfig::default()
        });
        assert_eq!(gate.check_max_concurrent(2), GateResult::Pass);
        assert!(matches!(gate.check_max_concurrent(3), GateResult::Block(_)));
    }

    #[test]
    fn test_check_all_stops_at_first_block() {
        let gate = RiskGate::new(RiskConfig::default());
        let s = signal(Symbol::new("RELIANCE"), "2026-07-27T04:30:00Z".parse().unwrap());
        let err = gate
            .check_all(&s, "2026-07-27T04:31:00Z".parse().unwrap(), 0)
            .unwrap_err();
        assert!(matches!(err, RiskError::GateBlocked { gate, .. } if gate == "allow_list"));
    }

    #[test]
    fn test_check_all_passes_when_every_gate_passes() {
        let gate = RiskGate::new(allow_listed_config());
        let s = signal(Symbol::new("NIFTY"), "2026-07-27T04:30:00Z".parse().unwrap());
        gate.check_all(&s, "2026-07-27T04:31:00Z".parse().unwrap(), 0)
            .unwrap();
    }
}
