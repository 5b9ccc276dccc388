//! Merges `HistoricalCache` and `CandleAggregator` output into the single
//! validated sequence a `Strategy` is allowed to see, refusing loudly
//! rather than handing back a short or gap-riddled series.

use crate::cache::HistoricalCache;
use crate::error::{AssemblerError, Result};
use optrade_aggregator::CandleAggregator;
use optrade_core::{Candle, Symbol, Timeframe};
use std::sync::Arc;

/// Per-strategy knobs that shape what `DataAssembler` hands back.
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    pub timeframe: Timeframe,
    pub lookback_periods: usize,
    pub min_periods: usize,
    /// Include the current in-progress (unfinalized) candle in the merged
    /// sequence. Most strategies want only finalized candles.
    pub include_in_progress: bool,
}

/// The validated candle sequence a `Strategy::analyze` call receives.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl Dataset {
    pub fn latest(&self) -> Option<&Candle> {
        self.candles.last()
    }
}

pub struct DataAssembler {
    cache: Arc<HistoricalCache>,
    aggregator: Arc<CandleAggregator>,
}

impl DataAssembler {
    pub fn new(cache: Arc<HistoricalCache>, aggregator: Arc<CandleAggregator>) -> Self {
        Self { cache, aggregator }
    }

    /// Builds the merged historical + live dataset for one strategy
    /// invocation, failing with `AssemblerError` instead of ever returning
    /// a dataset that is too short or too gappy to trust.
    pub async fn dataset_for_strategy(
        &self,
        symbol: &Symbol,
        cfg: &AssemblerConfig,
    ) -> Result<Dataset> {
        let hist = self
            .cache
            .get(symbol, cfg.timeframe, cfg.lookback_periods)
            .await?;

        let mut live = self
            .aggregator
            .recent_finalized(symbol, cfg.timeframe, cfg.lookback_periods);
        if cfg.include_in_progress {
            if let Some(current) = self.aggregator.current(symbol, cfg.timeframe) {
                live.push(current);
            }
        }

        let merged = merge_candles(hist, live);
        validate(&merged, symbol, cfg.timeframe, cfg.min_periods)?;

        Ok(Dataset {
            symbol: symbol.clone(),
            timeframe: cfg.timeframe,
            candles: merged,
        })
    }
}

/// Deduplicates `hist` and `live` on `bucket_start`, with `live` taking
/// priority for buckets present in both, then sorts ascending.
fn merge_candles(hist: Vec<Candle>, live: Vec<Candle>) -> Vec<Candle> {
    use std::collections::BTreeMap;

    let mut by_bucket: BTreeMap<chrono::DateTime<chrono::Utc>, Candle> = BTreeMap::new();
    for c in hist {
        by_bucket.insert(c.bucket_start, c);
    }
    for c in live {
        by_bucket.insert(c.bucket_start, c);
    }
    by_bucket.into_values().collect()
}

/// Fails with `AssemblerError` when the merged sequence is too short, or
/// when its median inter-bucket gap strays more than 10% from the
/// configured timeframe — catching the case where a finer-grained stream
/// was substituted for a coarser one.
fn validate(
    merged: &[Candle],
    symbol: &Symbol,
    timeframe: Timeframe,
    min_periods: usize,
) -> std::result::Result<(), AssemblerError> {
    if merged.is_empty() {
        return Err(AssemblerError::DataUnavailable {
            symbol: symbol.as_str().to_string(),
        });
    }

    if merged.len() < min_periods {
        return Err(AssemblerError::InsufficientPeriods {
            symbol: symbol.as_str().to_string(),
            actual: merged.len(),
            required: min_periods,
        });
    }

    if merged.len() >= 2 {
        let mut gaps: Vec<i64> = merged
            .windows(2)
            .map(|w| (w[1].bucket_start - w[0].bucket_start).num_seconds())
            .collect();
        gaps.sort_unstable();
        let median_secs = gaps[gaps.len() / 2];
        let expected_secs = timeframe.duration().num_seconds();
        let tolerance = expected_secs / 10;
        if (median_secs - expected_secs).abs() > tolerance {
            return Err(AssemblerError::GapMismatch {
                symbol: symbol.as_str().to_string(),
                timeframe: timeframe.as_str().to_string(),
                actual_secs: median_secs,
                expected_secs,
            });
        }
    }

    Ok(())
}
