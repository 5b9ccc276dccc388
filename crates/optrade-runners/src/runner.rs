//! One periodic runner per asset class: polls the broker in a single
//! batch round-trip, folds ticks into candles, and dispatches strategy
//! analysis to a bounded worker pool with "freshest dataset wins"
//! backpressure, per `spec.md` §4.6. Structured as a `tokio::task` that
//! consumes `self` in `run`, the same "config/handles/run(self)" shape as
//! the teacher's `TimeStopMonitor`, generalized from a single watched
//! condition to the full quote -> aggregate -> analyze -> submit pipeline.

use crate::config::RunnerConfig;
use crate::error::Result;
use dashmap::DashMap;
use optrade_aggregator::CandleAggregator;
use optrade_broker::BrokerClient;
use optrade_core::{AssetClass, MarketCalendar, Symbol, Timeframe};
use optrade_data::{AssemblerConfig, DataAssembler};
use optrade_eventbus::{Event, EventBus};
use optrade_signal::SignalManager;
use optrade_store::Store;
use optrade_strategy::{Strategy, StrategyRegistry};
use optrade_telemetry::metrics::{DATA_UNAVAILABLE_TOTAL, RUNNER_LAST_SUCCESS_TS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Per-`(strategy, symbol)` generation counter: a worker that wakes up
/// from the semaphore holding a stale generation discards its work
/// instead of running the strategy, per `spec.md` §4.6's backpressure
/// rule.
type GenerationMap = Arc<DashMap<(String, Symbol), u64>>;

pub struct Runner {
    config: RunnerConfig,
    calendar: Arc<MarketCalendar>,
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    aggregator: Arc<CandleAggregator>,
    assembler: Arc<DataAssembler>,
    registry: Arc<StrategyRegistry>,
    signal_manager: Arc<SignalManager>,
    event_bus: Arc<EventBus>,
    semaphore: Arc<Semaphore>,
    generations: GenerationMap,
    cancel: CancellationToken,
}

impl Runner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: RunnerConfig,
        calendar: Arc<MarketCalendar>,
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        aggregator: Arc<CandleAggregator>,
        assembler: Arc<DataAssembler>,
        registry: Arc<StrategyRegistry>,
        signal_manager: Arc<SignalManager>,
        event_bus: Arc<EventBus>,
        cancel: CancellationToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.worker_concurrency));
        Self {
            config,
            calendar,
            store,
            broker,
            aggregator,
            assembler,
            registry,
            signal_manager,
            event_bus,
            semaphore,
            generations: Arc::new(DashMap::new()),
            cancel,
        }
    }

    pub fn asset_class(&self) -> AssetClass {
        self.config.asset_class
    }

    /// `spec.md` §4.6 "Startup behavior": backfill the 1-minute table from
    /// `today_09:15` to now for every symbol this runner owns, so a runner
    /// activated mid-session does not start its real-time table with a
    /// void. Called once by the Orchestrator before `spawn`.
    pub async fn backfill(&self) -> Result<()> {
        let now = self.calendar.now().with_timezone(&chrono::Utc);
        let (session_open, _) = self.calendar.today_session_bounds();
        if now <= session_open {
            return Ok(());
        }
        for symbol in &self.config.symbols {
            let candles = self
                .broker
                .get_historical_candles(symbol, Timeframe::M1, session_open, now)
                .await?;
            if candles.is_empty() {
                continue;
            }
            debug!(symbol = %symbol, count = candles.len(), "intraday backfill");
            self.store.bulk_upsert_candles(&candles).await?;
        }
        Ok(())
    }

    /// Spawn the supervised loop, consuming `self`. Returns a handle the
    /// Orchestrator holds for cancellation and join-on-shutdown.
    pub fn spawn(self) -> RunnerHandle {
        let asset_class = self.config.asset_class;
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        RunnerHandle {
            asset_class,
            cancel,
            join,
        }
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!(asset_class = %self.config.asset_class, "runner cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    async fn tick(&self) {
        if !self.calendar.is_market_open_now() {
            return;
        }

        let now = self.calendar.now().with_timezone(&chrono::Utc);
        let quotes = match self.broker.get_quotes(&self.config.symbols).await {
            Ok(quotes) => quotes,
            Err(err) => {
                warn!(asset_class = %self.config.asset_class, error = %err, "batch quote fetch failed");
                return;
            }
        };

        let strategies = self.registry.for_asset_class(self.config.asset_class);

        for symbol in &self.config.symbols {
            let Some(quote) = quotes.get(symbol) else {
                continue;
            };

            if let Err(err) = self
                .store
                .insert_intraday_quote(symbol, quote.last_price, quote.volume, now)
                .await
            {
                warn!(symbol = %symbol, error = %err, "failed to persist intraday quote");
                continue;
            }

            let closed = self
                .aggregator
                .on_tick(symbol, quote.last_price, quote.volume, now);
            for candle in closed {
                if let Err(err) = self.store.upsert_candle(&candle).await {
                    warn!(symbol = %symbol, error = %err, "failed to persist closed candle");
                    continue;
                }
                self.event_bus.publish(Event::CandleClosed {
                    symbol: symbol.clone(),
                    timeframe: candle.timeframe,
                    candle,
                });
            }

            for strategy in &strategies {
                if strategy.config().symbols.contains(symbol) {
                    self.dispatch(strategy.clone(), symbol.clone());
                }
            }
        }

        RUNNER_LAST_SUCCESS_TS
            .with_label_values(&[self.config.asset_class.to_string().as_str()])
            .set(now.timestamp());
    }

    /// Hand one `(strategy, symbol)` analysis to the worker pool. The
    /// generation counter is bumped before the permit is even requested,
    /// so a task that wakes up holding a stale generation (a newer tick
    /// for the same key already queued behind it) discards its work
    /// instead of running a now-superseded analysis.
    fn dispatch(&self, strategy: Arc<dyn Strategy>, symbol: Symbol) {
        let key = (strategy.config().name.clone(), symbol.clone());
        let generation = {
            let mut counter = self.generations.entry(key.clone()).or_insert(0);
            *counter += 1;
            *counter
        };

        let semaphore = self.semaphore.clone();
        let generations = self.generations.clone();
        let assembler = self.assembler.clone();
        let signal_manager = self.signal_manager.clone();
        let timeout = self.config.strategy_timeout;
        let assembler_cfg = AssemblerConfig {
            timeframe: strategy.config().timeframe,
            lookback_periods: strategy.config().lookback_periods,
            min_periods: strategy.config().min_periods,
            include_in_progress: false,
        };

        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };

            let current = generations.get(&key).map(|g| *g).unwrap_or(generation);
            if current != generation {
                debug!(strategy = %key.0, symbol = %key.1, "stale strategy dispatch discarded");
                return;
            }

            let dataset = match tokio::time::timeout(
                timeout,
                assembler.dataset_for_strategy(&symbol, &assembler_cfg),
            )
            .await
            {
                Ok(Ok(dataset)) => dataset,
                Ok(Err(optrade_data::DataError::Assembler(
                    optrade_data::AssemblerError::DataUnavailable { .. }
                    | optrade_data::AssemblerError::InsufficientPeriods { .. }
                    | optrade_data::AssemblerError::GapMismatch { .. },
                ))) => {
                    DATA_UNAVAILABLE_TOTAL.with_label_values(&[symbol.as_str()]).inc();
                    return;
                }
                Ok(Err(err)) => {
                    warn!(strategy = %key.0, symbol = %symbol, error = %err, "dataset assembly failed");
                    return;
                }
                Err(_) => {
                    warn!(strategy = %key.0, symbol = %symbol, "strategy analysis exceeded its time budget");
                    return;
                }
            };

            let Some(signal) = strategy.analyze(&symbol, &dataset) else {
                return;
            };

            match signal_manager.submit(signal).await {
                Ok(_) => {}
                Err(optrade_signal::SignalError::DuplicateSignal) => {}
                Err(err) => {
                    error!(strategy = %key.0, symbol = %symbol, error = %err, "signal submission failed");
                }
            }
        });
    }
}

/// Owns the cancellation token and join handle of one spawned `Runner`
/// task, matching the teacher's `CancellationToken`-plus-`JoinHandle`
/// supervision shape.
pub struct RunnerHandle {
    asset_class: AssetClass,
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl RunnerHandle {
    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    /// Request cancellation and wait for the task to observe it. Never
    /// panics even if the task already finished.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            warn!(asset_class = %self.asset_class, error = %err, "runner task panicked during shutdown");
        }
    }
}
