//! `trait Strategy` and the registry Runners consult for which strategies
//! are active against which symbol/asset-class, per `spec.md` §4.6 step 4.

use optrade_core::{AssetClass, Signal, Symbol, Timeframe};
use optrade_data::Dataset;
use std::collections::HashMap;
use std::sync::Arc;

/// Per-strategy knobs a `Strategy` implementation is constructed with and
/// that a Runner reads to decide which symbols/timeframe to feed it.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    pub name: String,
    pub asset_class: AssetClass,
    pub symbols: Vec<Symbol>,
    pub timeframe: Timeframe,
    pub lookback_periods: usize,
    pub min_periods: usize,
}

/// A strategy turns a validated candle dataset into at most one candidate
/// signal. Strategy numerics are intentionally out of scope for this
/// workspace (`spec.md` §1) — only the interface and one illustrative,
/// deterministic implementation live here.
pub trait Strategy: Send + Sync {
    fn analyze(&self, symbol: &Symbol, dataset: &Dataset) -> Option<Signal>;
    fn config(&self) -> &StrategyConfig;
}

/// Name -> strategy lookup. A Runner asks `for_asset_class` once per loop
/// tick rather than iterating every registered strategy for every symbol.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) {
        self.strategies
            .insert(strategy.config().name.clone(), strategy);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies.get(name).cloned()
    }

    /// Every registered strategy covering `asset_class`, in no particular
    /// order (a Runner dispatches each to its worker pool independently).
    pub fn for_asset_class(&self, asset_class: AssetClass) -> Vec<Arc<dyn Strategy>> {
        self.strategies
            .values()
            .filter(|s| s.config().asset_class == asset_class)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
