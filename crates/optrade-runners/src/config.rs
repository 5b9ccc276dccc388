//! Per-runner knobs: symbol universe, loop period, and the strategy worker
//! pool's shape. Interval defaults follow the per-asset-class cadence of
//! `spec.md` §4.6.

use optrade_core::AssetClass;
use optrade_core::Symbol;
use std::time::Duration;

/// Strategy time budget enforced per dispatch, `spec.md` §4.6 step 4.
pub const DEFAULT_STRATEGY_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub asset_class: AssetClass,
    pub symbols: Vec<Symbol>,
    pub interval: Duration,
    /// Bound on concurrently running strategy analyses for this runner.
    pub worker_concurrency: usize,
    pub strategy_timeout: Duration,
}

impl RunnerConfig {
    /// Builds a config using the typical per-asset-class interval from
    /// `spec.md` §4.6 and a worker pool sized to the available parallelism.
    pub fn new(asset_class: AssetClass, symbols: Vec<Symbol>) -> Self {
        Self {
            asset_class,
            symbols,
            interval: default_interval(asset_class),
            worker_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            strategy_timeout: DEFAULT_STRATEGY_TIMEOUT,
        }
    }
}

fn default_interval(asset_class: AssetClass) -> Duration {
    match asset_class {
        AssetClass::Index => Duration::from_secs(5),
        AssetClass::Equity => Duration::from_secs(5),
        AssetClass::Option => Duration::from_secs(3),
        AssetClass::Future => Duration::from_secs(5),
        AssetClass::Commodity => Duration::from_secs(10),
    }
}
