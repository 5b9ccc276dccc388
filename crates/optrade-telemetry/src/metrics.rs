//! Prometheus metrics for the runtime.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally: a registration
//! failure (e.g. a duplicate metric name) is a fatal configuration error
//! that should crash at startup, not fail silently. These panics only
//! occur during static initialization, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge_vec, register_int_gauge, register_int_gauge_vec,
    CounterVec, GaugeVec, IntGauge, IntGaugeVec,
};

/// Signals emitted by `SignalManager::submit`, by strategy/symbol/action.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_signals_total",
        "Total signals submitted",
        &["strategy", "symbol", "action"]
    )
    .unwrap()
});

/// `DataAssembler` validation failures, by symbol.
pub static DATA_UNAVAILABLE_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_data_unavailable_total",
        "Total DataUnavailable results from DataAssembler",
        &["symbol"]
    )
    .unwrap()
});

/// Currently open positions.
pub static POSITIONS_OPEN: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("optrade_positions_open", "Number of currently open positions").unwrap()
});

/// Risk/validation gate rejections, by gate name.
pub static GATE_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_gate_blocked_total",
        "Total signals rejected by a validation or risk gate",
        &["gate"]
    )
    .unwrap()
});

/// Unix timestamp (seconds) of each runner's last successful loop iteration.
pub static RUNNER_LAST_SUCCESS_TS: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "optrade_runner_last_success_ts",
        "Unix timestamp of the runner's last successful iteration",
        &["asset_class"]
    )
    .unwrap()
});

/// Duplicate signals suppressed by the fingerprint dedup check.
pub static DUPLICATE_SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_duplicate_signals_total",
        "Total signals suppressed as duplicates within a session",
        &["strategy", "symbol"]
    )
    .unwrap()
});

/// Positions closed, by exit reason.
pub static POSITIONS_CLOSED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_positions_closed_total",
        "Total positions closed, by exit reason",
        &["exit_reason"]
    )
    .unwrap()
});

/// Positions currently carrying a `warning_flag` (partial LIVE-exit failure).
pub static POSITIONS_WARNING: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "optrade_positions_warning",
        "Number of open positions with an unresolved warning flag"
    )
    .unwrap()
});

/// EventBus handler outcomes, by event type and outcome (ok/timeout/panic).
pub static EVENTBUS_HANDLER_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_eventbus_handler_total",
        "Total event handler invocations, by event type and outcome",
        &["event_type", "outcome"]
    )
    .unwrap()
});

/// Order placement/status outcomes, by mode and broker status.
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "optrade_orders_total",
        "Total orders dispatched, by mode and outcome",
        &["mode", "outcome"]
    )
    .unwrap()
});

/// Current available margin as last observed from the broker.
pub static AVAILABLE_MARGIN: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "optrade_available_margin",
        "Last observed available margin",
        &["currency"]
    )
    .unwrap()
});

/// Force-initializes every metric in this module. Call once at startup so
/// `/metrics` always shows a zero-valued series instead of an absent one
/// before the first event of each kind occurs.
pub fn init() {
    Lazy::force(&SIGNALS_TOTAL);
    Lazy::force(&DATA_UNAVAILABLE_TOTAL);
    Lazy::force(&POSITIONS_OPEN);
    Lazy::force(&GATE_BLOCKED_TOTAL);
    Lazy::force(&RUNNER_LAST_SUCCESS_TS);
    Lazy::force(&DUPLICATE_SIGNALS_TOTAL);
    Lazy::force(&POSITIONS_CLOSED_TOTAL);
    Lazy::force(&POSITIONS_WARNING);
    Lazy::force(&EVENTBUS_HANDLER_TOTAL);
    Lazy::force(&ORDERS_TOTAL);
    Lazy::force(&AVAILABLE_MARGIN);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_register_without_panicking() {
        init();
        SIGNALS_TOTAL
            .with_label_values(&["moving_average_cross", "NIFTY", "enter_long"])
            .inc();
        assert!(SIGNALS_TOTAL
            .with_label_values(&["moving_average_cross", "NIFTY", "enter_long"])
            .get()
            >= 1.0);
    }
}
