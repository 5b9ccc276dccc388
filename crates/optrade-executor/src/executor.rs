//! `Executor`: the single signal-to-position dispatcher, grounded in the
//! teacher's `hip3-executor::executor::Executor` three-stage
//! validate -> size -> dispatch shape, generalized to the three execution
//! modes (`LOG_ONLY`/`PAPER`/`LIVE`) this system supports instead of the
//! teacher's paper/live split.

use crate::error::{ExecutorError, Result};
use crate::sizing::{self, SizingConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optrade_broker::{BrokerClient, OrderRequest, OrderSide, OrderType};
use optrade_core::{
    MarketCalendar, Position, PositionMode, Signal, SignalAction, SignalStatus,
};
use optrade_eventbus::{Event, EventBus, EventHandler};
use optrade_options::{StrikeSelector, StrikeSelectorConfig};
use optrade_risk::{RiskConfig, RiskGate};
use optrade_signal::SignalManager;
use optrade_store::Store;
use optrade_telemetry::metrics::{AVAILABLE_MARGIN, GATE_BLOCKED_TOTAL, ORDERS_TOTAL, POSITIONS_OPEN};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub mode: PositionMode,
    pub risk: RiskConfig,
    pub sizing: SizingConfig,
    pub strike_selector: StrikeSelectorConfig,
    /// Fraction of the resolved contract's `last_price` used as the
    /// option-premium stop loss (distinct from the signal's underlying
    /// bracket, which the strike selector only consults for direction and
    /// expected-move magnitude).
    pub stop_loss_pct: Decimal,
    pub target_pct: Decimal,
    /// How often to poll `get_order_status` after a `LIVE` order placement.
    pub order_poll_interval: Duration,
    /// Total time to wait for a fill before giving up on a `LIVE` order.
    pub order_timeout: Duration,
}

/// Wires together validation, strike selection, sizing and dispatch for
/// every `SignalGenerated` event. One instance per running bot; stateless
/// beyond the `Arc`s it holds, so `Clone` is cheap and it is safe to
/// subscribe the same instance to the bus under its own `Arc`.
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    event_bus: Arc<EventBus>,
    signal_manager: Arc<SignalManager>,
    strike_selector: Arc<StrikeSelector>,
    risk_gate: Arc<RiskGate>,
    calendar: Arc<MarketCalendar>,
    config: ExecutorConfig,
}

impl Executor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        event_bus: Arc<EventBus>,
        signal_manager: Arc<SignalManager>,
        calendar: Arc<MarketCalendar>,
        config: ExecutorConfig,
    ) -> Self {
        let strike_selector = Arc::new(StrikeSelector::new(broker.clone(), config.strike_selector.clone()));
        let risk_gate = Arc::new(RiskGate::new(config.risk.clone()));
        Self {
            store,
            broker,
            event_bus,
            signal_manager,
            strike_selector,
            risk_gate,
            calendar,
            config,
        }
    }

    /// The full validate -> size -> dispatch pipeline for one signal.
    /// Idempotent: a signal that already has a position on file is a no-op
    /// (`ExecutorError::AlreadyExecuted`), never a second order.
    pub async fn execute(&self, signal: Signal) -> Result<Position> {
        if let Some(existing) = self.store.get_position_by_signal(signal.id).await? {
            return Err(ExecutorError::AlreadyExecuted(existing.signal_id));
        }

        let now = self.now();
        let open_positions = self.store.get_open_positions().await?;
        if let Err(err) = self.risk_gate.check_all(&signal, now, open_positions.len()) {
            GATE_BLOCKED_TOTAL.with_label_values(&[gate_name(&err)]).inc();
            self.signal_manager
                .update_status(signal.id, SignalStatus::Rejected, Some(&err.to_string()))
                .await?;
            self.event_bus.publish(Event::OrderRejected {
                signal_id: signal.id,
                reason: err.to_string(),
            });
            return Err(err.into());
        }

        self.signal_manager
            .update_status(signal.id, SignalStatus::Processing, None)
            .await?;

        let contract = self
            .strike_selector
            .select(
                &signal.symbol,
                signal.action,
                signal.reference_price,
                signal.expected_move_pct.unwrap_or(Decimal::ZERO),
                now,
            )
            .await?;

        let stop_loss_premium = contract.last_price * (Decimal::ONE - self.config.stop_loss_pct);
        let target_premium = contract.last_price * (Decimal::ONE + self.config.target_pct);
        let quantity = sizing::compute_quantity(
            &self.config.sizing,
            contract.last_price,
            stop_loss_premium,
            contract.lot_size,
        );

        let mut position = Position::open(
            signal.id,
            signal.strategy_name.clone(),
            signal.symbol.clone(),
            signal.asset_class,
            self.config.mode,
            contract.last_price,
            quantity,
            now,
        )
        .with_option_leg(
            contract.trading_symbol.clone(),
            contract.strike,
            contract.option_type,
            contract.expiry,
            contract.lot_size,
        );
        position.stop_loss = Some(stop_loss_premium);
        position.target = Some(target_premium);

        if self.config.mode == PositionMode::LogOnly {
            info!(
                signal_id = %signal.id,
                symbol = %contract.trading_symbol,
                quantity = %quantity,
                simulated_order_id = %format!("LOG_{}", Uuid::new_v4()),
                "LOG_ONLY: would open position"
            );
            ORDERS_TOTAL.with_label_values(&["log_only", "simulated"]).inc();
            self.signal_manager
                .update_status(signal.id, SignalStatus::Executed, None)
                .await?;
            return Ok(position);
        }

        let position = match self.config.mode {
            PositionMode::Paper => {
                info!(signal_id = %signal.id, symbol = %contract.trading_symbol, "PAPER: opening simulated position");
                ORDERS_TOTAL.with_label_values(&["paper", "simulated"]).inc();
                position
            }
            PositionMode::Live => match self.dispatch_live(signal.id, &contract, position).await {
                Ok(position) => position,
                Err(err) => {
                    self.signal_manager
                        .update_status(signal.id, SignalStatus::Failed, Some(&err.to_string()))
                        .await?;
                    self.event_bus.publish(Event::OrderRejected {
                        signal_id: signal.id,
                        reason: err.to_string(),
                    });
                    return Err(err);
                }
            },
            PositionMode::LogOnly => unreachable!("handled above"),
        };

        self.store.insert_position(&position).await?;
        POSITIONS_OPEN.inc();
        self.signal_manager
            .update_status(signal.id, SignalStatus::Executed, None)
            .await?;
        self.event_bus.publish(Event::PositionOpened(position.clone()));
        Ok(position)
    }

    async fn dispatch_live(
        &self,
        signal_id: Uuid,
        contract: &optrade_core::OptionContract,
        mut position: Position,
    ) -> Result<Position> {
        let required_margin = position.quantity.notional(contract.last_price);
        let available = self.broker.get_available_margin().await?;
        AVAILABLE_MARGIN.with_label_values(&["INR"]).set(available.inner().to_f64().unwrap_or(0.0));
        if available.inner() < required_margin {
            return Err(ExecutorError::InsufficientMargin {
                required: required_margin,
                available: available.inner(),
            });
        }

        let order = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol: position.option_symbol.clone().unwrap_or_else(|| position.symbol.clone()),
            side: OrderSide::Buy,
            order_type: OrderType::Limit,
            quantity: position.quantity,
            limit_price: Some(contract.last_price),
        };
        self.event_bus.publish(Event::OrderPlaced {
            signal_id,
            order: order.clone(),
        });

        let ack = self.broker.place_order(order).await?;
        let filled = self.poll_until_filled(&ack.broker_order_id, ack).await?;
        ORDERS_TOTAL
            .with_label_values(&["live", &format!("{:?}", filled.status).to_lowercase()])
            .inc();
        self.event_bus.publish(Event::OrderFilled {
            signal_id,
            ack: filled.clone(),
        });

        if let Some(avg_price) = filled.average_fill_price {
            position.entry_price = avg_price;
            position.high_water_mark = avg_price;
        }
        Ok(position)
    }

    async fn poll_until_filled(
        &self,
        broker_order_id: &str,
        mut latest: optrade_broker::OrderAck,
    ) -> Result<optrade_broker::OrderAck> {
        use optrade_broker::BrokerOrderStatus;

        let deadline = tokio::time::Instant::now() + self.config.order_timeout;
        loop {
            match latest.status {
                BrokerOrderStatus::Filled => return Ok(latest),
                BrokerOrderStatus::Rejected | BrokerOrderStatus::Cancelled => {
                    return Err(ExecutorError::OrderNotFilled {
                        order_id: broker_order_id.to_string(),
                        reason: format!("{:?}", latest.status),
                    });
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                warn!(order_id = broker_order_id, "LIVE order did not fill before timeout");
                return Err(ExecutorError::OrderNotFilled {
                    order_id: broker_order_id.to_string(),
                    reason: "timed out waiting for fill".to_string(),
                });
            }
            tokio::time::sleep(self.config.order_poll_interval).await;
            latest = self.broker.get_order_status(broker_order_id).await?;
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.calendar.now().with_timezone(&Utc)
    }
}

#[async_trait]
impl EventHandler for Executor {
    async fn handle(&self, event: Event) {
        let Event::SignalGenerated(signal) = event else {
            return;
        };
        let signal_id = signal.id;
        match self.execute(signal).await {
            Ok(position) => {
                info!(signal_id = %signal_id, position_id = %position.id, "position opened");
            }
            Err(ExecutorError::AlreadyExecuted(_)) => {
                // Expected on a re-delivered signal after a crash/restart.
            }
            Err(err) => {
                error!(signal_id = %signal_id, error = %err, "signal execution failed");
            }
        }
    }
}

fn gate_name(err: &optrade_risk::RiskError) -> &'static str {
    match err {
        optrade_risk::RiskError::GateBlocked { gate, .. } => match gate.as_str() {
            "allow_list" => "allow_list",
            "signal_age" => "signal_age",
            "trading_enabled" => "trading_enabled",
            "max_concurrent" => "max_concurrent",
            _ => "unknown",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_broker::MockBrokerClient;
    use optrade_core::{
        AssetClass, FixedClock, HolidayTable, OptionContract, OptionType, SignalStrength, Symbol, Timeframe,
    };
    use optrade_store::MockStore;
    use rust_decimal_macros::dec;
    use std::collections::HashSet;

    fn now() -> DateTime<Utc> {
        "2026-07-27T05:00:00Z".parse().unwrap()
    }

    fn calendar() -> Arc<MarketCalendar> {
        Arc::new(MarketCalendar::new(Arc::new(FixedClock::new(now())), HolidayTable::default()))
    }

    fn contract(expiry_offset_days: i64) -> OptionContract {
        OptionContract {
            underlying: Symbol::new("NIFTY"),
            trading_symbol: Symbol::new("NIFTY24JUL23500CE"),
            strike: optrade_core::Price::new(dec!(23500)),
            expiry: now().date_naive() + chrono::Duration::days(expiry_offset_days),
            option_type: OptionType::Ce,
            last_price: optrade_core::Price::new(dec!(100)),
            bid: optrade_core::Price::new(dec!(99)),
            ask: optrade_core::Price::new(dec!(101)),
            open_interest: optrade_core::Quantity::new(dec!(50_000)),
            volume: optrade_core::Quantity::new(dec!(20_000)),
            implied_volatility: Some(dec!(0.18)),
            delta: Some(dec!(0.5)),
            lot_size: optrade_core::Quantity::new(dec!(50)),
        }
    }

    fn signal() -> Signal {
        Signal::new(
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            optrade_core::Price::new(dec!(23500)),
            Timeframe::M15,
            now(),
        )
        .with_exit_levels(optrade_core::Price::new(dec!(23700)), optrade_core::Price::new(dec!(23400)))
    }

    fn config() -> ExecutorConfig {
        ExecutorConfig {
            mode: PositionMode::LogOnly,
            risk: RiskConfig {
                options_tradeable_allow_list: HashSet::from([Symbol::new("NIFTY")]),
                ..RiskConfig::default()
            },
            sizing: SizingConfig {
                capital: dec!(1_000_000),
                risk_pct: dec!(0.01),
                max_position_pct: dec!(0.5),
                max_lots_per_trade: 20,
            },
            strike_selector: StrikeSelectorConfig::default(),
            stop_loss_pct: dec!(0.3),
            target_pct: dec!(0.5),
            order_poll_interval: Duration::from_millis(1),
            order_timeout: Duration::from_millis(50),
        }
    }

    async fn build(
        mode: PositionMode,
    ) -> (Executor, Arc<MockStore>, Arc<MockBrokerClient>, Arc<SignalManager>) {
        let store = Arc::new(MockStore::new());
        let broker = Arc::new(MockBrokerClient::new());
        broker.authenticate().await.unwrap();
        broker.push_chain(Symbol::new("NIFTY"), contract(2).expiry, vec![contract(2)]);
        broker.set_available_margin(optrade_core::Price::new(dec!(1_000_000)));
        let bus = Arc::new(EventBus::new());
        let calendar = calendar();
        let signal_manager = Arc::new(SignalManager::new(store.clone(), bus.clone(), calendar.clone()));
        let mut cfg = config();
        cfg.mode = mode;
        let executor = Executor::new(
            store.clone(),
            broker.clone(),
            bus,
            signal_manager.clone(),
            calendar,
            cfg,
        );
        (executor, store, broker, signal_manager)
    }

    #[tokio::test]
    async fn test_log_only_opens_position_without_order() {
        let (executor, store, broker, signal_manager) = build(PositionMode::LogOnly).await;
        let submitted = signal_manager.submit(signal()).await.unwrap();
        let position = executor.execute(submitted).await.unwrap();
        assert_eq!(position.mode, PositionMode::LogOnly);
        assert!(broker.placed_orders().is_empty());
        // LOG_ONLY never persists a position row.
        assert!(store.get_position_by_signal(position.signal_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_paper_opens_position_without_order() {
        let (executor, _store, broker, signal_manager) = build(PositionMode::Paper).await;
        let submitted = signal_manager.submit(signal()).await.unwrap();
        let position = executor.execute(submitted).await.unwrap();
        assert_eq!(position.mode, PositionMode::Paper);
        assert!(broker.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_live_places_and_fills_order() {
        let (executor, _store, broker, signal_manager) = build(PositionMode::Live).await;
        let submitted = signal_manager.submit(signal()).await.unwrap();
        let position = executor.execute(submitted).await.unwrap();
        assert_eq!(position.mode, PositionMode::Live);
        assert_eq!(broker.placed_orders().len(), 1);
    }

    #[tokio::test]
    async fn test_live_dispatch_observes_available_margin_gauge() {
        let (executor, _store, _broker, signal_manager) = build(PositionMode::Live).await;
        let submitted = signal_manager.submit(signal()).await.unwrap();
        executor.execute(submitted).await.unwrap();
        assert!(AVAILABLE_MARGIN.with_label_values(&["INR"]).get() > 0.0);
    }

    #[tokio::test]
    async fn test_idempotent_rerun_is_rejected() {
        // LOG_ONLY never persists a position (by design), so idempotency
        // only applies to PAPER/LIVE, where a position row is the source
        // of truth a crash-restarted executor consults.
        let (executor, _store, _broker, signal_manager) = build(PositionMode::Paper).await;
        let submitted = signal_manager.submit(signal()).await.unwrap();
        executor.execute(submitted.clone()).await.unwrap();
        let err = executor.execute(submitted).await.unwrap_err();
        assert!(matches!(err, ExecutorError::AlreadyExecuted(_)));
    }

    #[tokio::test]
    async fn test_allow_list_gate_rejects_and_marks_signal_rejected() {
        let (executor, store, _broker, signal_manager) = build(PositionMode::LogOnly).await;
        let mut s = signal();
        s.symbol = Symbol::new("RELIANCE");
        let submitted = signal_manager.submit(s).await.unwrap();
        let err = executor.execute(submitted.clone()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Risk(_)));
        let stored = store.get_signal(submitted.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Rejected);
    }
}
