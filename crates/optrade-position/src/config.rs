//! Knobs for exit evaluation and the monitor loop's cadence, `spec.md` §4.11.

use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use std::time::Duration;

/// Parameters `ExitEvaluator` checks against, independent of the loop that
/// drives it.
#[derive(Debug, Clone)]
pub struct ExitConfig {
    /// A position within this much of its contract's expiry is closed
    /// regardless of P&L.
    pub expiry_cutoff: ChronoDuration,
    /// Once unrealized run-up reaches `entry * (1 + trail_trigger_pct)`, the
    /// stop loss ratchets up to lock in half the run-up. `None` disables
    /// trailing entirely.
    pub trail_trigger_pct: Option<Decimal>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            expiry_cutoff: ChronoDuration::minutes(60),
            trail_trigger_pct: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PositionMonitorConfig {
    pub poll_interval: Duration,
    pub exit: ExitConfig,
    /// How often to poll `get_order_status` while waiting for a LIVE exit
    /// order to fill.
    pub order_poll_interval: Duration,
    /// Total time to wait for a LIVE exit order before retrying once.
    pub order_timeout: Duration,
}

impl Default for PositionMonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            exit: ExitConfig::default(),
            order_poll_interval: Duration::from_millis(500),
            order_timeout: Duration::from_secs(10),
        }
    }
}
