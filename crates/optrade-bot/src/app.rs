//! `Application`: constructs every component once and drives the
//! supervised-loop startup/shutdown sequence of `spec.md` §4.12, the same
//! "config/handles struct, `new` builds it, `run(self)` drives it" shape
//! as the teacher's `hip3-bot::app::Application`.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::metrics_server;
use optrade_aggregator::CandleAggregator;
use optrade_broker::{BrokerClient, HttpBrokerClient};
use optrade_core::{AssetClass, Clock, HolidayTable, MarketCalendar, Symbol, SystemClock, Timeframe};
use optrade_data::{DataAssembler, HistoricalCache};
use optrade_eventbus::{EventBus, EventType};
use optrade_executor::{Executor, ExecutorConfig};
use optrade_options::StrikeSelectorConfig;
use optrade_position::{ExitConfig, PositionMonitorConfig, PositionMonitorHandle, PositionMonitorLoop};
use optrade_risk::RiskConfig;
use optrade_runners::{Runner, RunnerConfig, RunnerHandle};
use optrade_signal::SignalManager;
use optrade_store::{SqliteStore, Store};
use optrade_strategy::{MovingAverageCrossStrategy, Strategy, StrategyConfig, StrategyRegistry};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// Lookback depth used when warming `HistoricalCache` at startup — matches
/// the default `AssemblerConfig::lookback_periods` a strategy reads on its
/// first tick, so the warm pass populates exactly what the first Runner
/// cycle would otherwise have to backfill inline.
const HISTORICAL_CACHE_WARM_PERIODS: usize = 100;

const ASSET_CLASSES: [AssetClass; 5] = [
    AssetClass::Index,
    AssetClass::Equity,
    AssetClass::Option,
    AssetClass::Future,
    AssetClass::Commodity,
];

/// Owns every long-lived component and the root cancellation token. Built
/// once by `new`, driven to completion by `run`.
pub struct Application {
    config: AppConfig,
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    calendar: Arc<MarketCalendar>,
    event_bus: Arc<EventBus>,
    executor: Arc<Executor>,
    runners: Vec<Runner>,
    position_monitor: Option<PositionMonitorLoop>,
    cancel: CancellationToken,
    cache: Arc<HistoricalCache>,
    warm_keys: Vec<(Symbol, Timeframe)>,
}

impl Application {
    pub async fn new(config: AppConfig) -> AppResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let holidays = HolidayTable::new(config.market.holidays.clone());
        let calendar = Arc::new(MarketCalendar::new(clock.clone(), holidays));

        let store: Arc<dyn Store> = Arc::new(SqliteStore::connect(&config.database.path).await?);
        let broker: Arc<dyn BrokerClient> = Arc::new(HttpBrokerClient::new(
            config.broker.base_url.clone(),
            config.broker.api_key.clone(),
            config.broker.api_secret.clone(),
        )?);

        let event_bus = Arc::new(EventBus::new());

        let timeframes = strategy_timeframes(&config);
        let warm_keys: Vec<(Symbol, Timeframe)> = ASSET_CLASSES
            .iter()
            .flat_map(|&asset_class| symbols_for(&config.symbols, asset_class))
            .flat_map(|symbol| timeframes.clone().into_iter().map(move |tf| (symbol.clone(), tf)))
            .collect();
        let aggregator = Arc::new(CandleAggregator::new(calendar.clone(), timeframes));
        let cache = Arc::new(HistoricalCache::with_refresh_ttl(
            store.clone(),
            broker.clone(),
            clock.clone(),
            chrono::Duration::seconds(config.cache.refresh_ttl_seconds),
        ));

        let assembler = Arc::new(DataAssembler::new(cache.clone(), aggregator.clone()));

        let registry = Arc::new(build_strategy_registry(&config));

        let signal_manager = Arc::new(SignalManager::new(store.clone(), event_bus.clone(), calendar.clone()));

        let executor_config = build_executor_config(&config);
        let executor = Arc::new(Executor::new(
            store.clone(),
            broker.clone(),
            event_bus.clone(),
            signal_manager.clone(),
            calendar.clone(),
            executor_config,
        ));

        let position_monitor_config = PositionMonitorConfig {
            poll_interval: Duration::from_secs(5),
            exit: ExitConfig {
                expiry_cutoff: chrono::Duration::minutes(config.options.expiry_cutoff_min),
                trail_trigger_pct: config.options.trail_trigger_pct,
            },
            order_poll_interval: Duration::from_millis(500),
            order_timeout: Duration::from_secs(10),
        };

        let cancel = CancellationToken::new();

        let position_monitor = PositionMonitorLoop::new(
            store.clone(),
            broker.clone(),
            event_bus.clone(),
            signal_manager.clone(),
            calendar.clone(),
            position_monitor_config,
            cancel.clone(),
        );

        let runners = build_runners(
            &config,
            calendar.clone(),
            store.clone(),
            broker.clone(),
            aggregator,
            assembler,
            registry,
            signal_manager,
            event_bus.clone(),
            cancel.clone(),
        );
        if runners.is_empty() {
            warn!("no asset class has a configured symbol universe; no Runner will be started");
        }

        Ok(Self {
            config,
            store,
            broker,
            calendar,
            event_bus,
            executor,
            runners,
            position_monitor: Some(position_monitor),
            cancel,
            cache,
            warm_keys,
        })
    }

    pub fn store(&self) -> Arc<dyn Store> {
        self.store.clone()
    }

    pub fn broker(&self) -> Arc<dyn BrokerClient> {
        self.broker.clone()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `spec.md` §4.12 startup steps 1-5: reset the intraday table,
    /// authenticate, warm `HistoricalCache` for every configured
    /// symbol/timeframe, then trigger each Runner's intraday backfill.
    /// Split out from `run` so the `auth`/`status` CLI subcommands can reuse
    /// the connect-and-authenticate half without starting any supervised loop.
    pub async fn run_preflight(&self) -> AppResult<()> {
        let now = self.calendar.now().with_timezone(&chrono::Utc);
        self.store.daily_intraday_reset(now).await?;

        self.broker.authenticate().await.map_err(|err| {
            AppError::AuthRequired(format!("broker authentication failed: {err}"))
        })?;

        info!(keys = self.warm_keys.len(), "warming historical cache");
        self.cache.warm(&self.warm_keys, HISTORICAL_CACHE_WARM_PERIODS).await;

        for runner in &self.runners {
            runner.backfill().await?;
        }
        Ok(())
    }

    /// Runs the full startup sequence, then blocks until shutdown is
    /// requested (Ctrl-C or an externally-triggered cancellation), then
    /// tears down in the reverse order: stop Runners, drain the
    /// EventBus, wait for in-flight handlers up to a grace period, close
    /// the Store, flush logs.
    pub async fn run(mut self) -> AppResult<()> {
        self.run_preflight().await?;

        let executor_subscription = self.event_bus.subscribe(
            EventType::SignalGenerated,
            "executor",
            (*self.executor).clone(),
            None,
        );

        let position_monitor_handle: PositionMonitorHandle = self
            .position_monitor
            .take()
            .expect("position monitor is only taken once, by run()")
            .spawn();

        let runner_handles: Vec<RunnerHandle> = self.runners.drain(..).map(Runner::spawn).collect();
        info!(runners = runner_handles.len(), "orchestrator started");

        let metrics_server = metrics_server::spawn(self.config.metrics.listen_addr.clone(), self.cancel.clone());

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
            }
            _ = self.cancel.cancelled() => {
                info!("cancellation requested, shutting down");
            }
        }
        self.cancel.cancel();

        for handle in runner_handles {
            handle.stop().await;
        }
        executor_subscription.cancel_and_drain(SHUTDOWN_GRACE_PERIOD).await;
        position_monitor_handle.stop().await;

        if tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, metrics_server).await.is_err() {
            warn!("metrics server did not shut down within the grace period");
        }

        info!("orchestrator shutdown complete");
        Ok(())
    }
}

fn strategy_timeframes(config: &AppConfig) -> Vec<Timeframe> {
    let mut set: Vec<Timeframe> = config
        .strategies
        .values()
        .filter(|s| s.enabled)
        .filter_map(|s| s.timeframe.parse::<Timeframe>().ok())
        .collect();
    if set.is_empty() {
        set.push(Timeframe::M15);
    }
    set.sort();
    set.dedup();
    set
}

fn build_strategy_registry(config: &AppConfig) -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    for (name, settings) in &config.strategies {
        if !settings.enabled {
            continue;
        }
        let Ok(timeframe) = settings.timeframe.parse::<Timeframe>() else {
            warn!(strategy = %name, timeframe = %settings.timeframe, "unknown timeframe, skipping strategy");
            continue;
        };
        let asset_class = settings.supported_asset_classes.first().copied().unwrap_or(AssetClass::Index);
        if settings.supported_asset_classes.len() > 1 {
            warn!(
                strategy = %name,
                "strategy registry binds one asset class per strategy; using the first of {:?}",
                settings.supported_asset_classes
            );
        }
        let strategy_config = StrategyConfig {
            name: name.clone(),
            asset_class,
            symbols: settings.symbols.iter().map(|s| Symbol::new(s.as_str())).collect(),
            timeframe,
            lookback_periods: settings.lookback_periods,
            min_periods: settings.min_periods,
        };
        let fast_period = settings.param_usize("fast_period", 3);
        let slow_period = settings.param_usize("slow_period", 8);
        registry.register(Arc::new(MovingAverageCrossStrategy::new(
            strategy_config,
            fast_period,
            slow_period,
        )));
    }
    registry
}

fn build_executor_config(config: &AppConfig) -> ExecutorConfig {
    let options_symbols: HashSet<Symbol> = config
        .symbols
        .options
        .iter()
        .map(|s| Symbol::new(s.as_str()))
        .collect();

    let risk = RiskConfig {
        options_tradeable_allow_list: options_symbols,
        max_signal_age: optrade_risk::DEFAULT_MAX_SIGNAL_AGE,
        trading_enabled: config.trading_enabled,
        max_concurrent_positions: config.options.max_concurrent_positions,
    };

    let sizing = optrade_executor::SizingConfig {
        capital: config.options.capital,
        risk_pct: config.options.risk_pct,
        max_position_pct: config.options.max_position_pct,
        max_lots_per_trade: config.options.max_lots_per_trade,
    };

    let strike_selector = StrikeSelectorConfig {
        min_oi: config.options.min_oi,
        min_volume: config.options.min_volume,
        max_spread_pct: config.options.max_spread_pct,
        min_premium: optrade_core::Price::new(config.options.min_premium),
        max_premium: optrade_core::Price::new(config.options.max_premium),
        strike_mode: config.options.strike_mode,
    };

    ExecutorConfig {
        mode: config.mode,
        risk,
        sizing,
        strike_selector,
        stop_loss_pct: config.options.stop_loss_pct,
        target_pct: config.options.target_pct,
        order_poll_interval: Duration::from_millis(500),
        order_timeout: Duration::from_secs(10),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_runners(
    config: &AppConfig,
    calendar: Arc<MarketCalendar>,
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    aggregator: Arc<CandleAggregator>,
    assembler: Arc<DataAssembler>,
    registry: Arc<StrategyRegistry>,
    signal_manager: Arc<SignalManager>,
    event_bus: Arc<EventBus>,
    cancel: CancellationToken,
) -> Vec<Runner> {
    ASSET_CLASSES
        .iter()
        .filter_map(|&asset_class| {
            let symbols = symbols_for(&config.symbols, asset_class);
            if symbols.is_empty() {
                return None;
            }
            let mut runner_config = RunnerConfig::new(asset_class, symbols);
            if let Some(interval) = config
                .runners
                .get(asset_class.to_string().as_str())
                .and_then(|r| r.interval_seconds)
            {
                runner_config.interval = Duration::from_secs(interval);
            }
            Some(Runner::new(
                runner_config,
                calendar.clone(),
                store.clone(),
                broker.clone(),
                aggregator.clone(),
                assembler.clone(),
                registry.clone(),
                signal_manager.clone(),
                event_bus.clone(),
                cancel.clone(),
            ))
        })
        .collect()
}

fn symbols_for(symbols: &crate::config::SymbolsConfig, asset_class: AssetClass) -> Vec<Symbol> {
    let raw: &[String] = match asset_class {
        AssetClass::Index => &symbols.indices,
        AssetClass::Equity => &symbols.equities,
        AssetClass::Option => &symbols.options,
        AssetClass::Future => &symbols.futures,
        AssetClass::Commodity => &symbols.commodities,
    };
    raw.iter().map(|s| Symbol::new(s.as_str())).collect()
}
