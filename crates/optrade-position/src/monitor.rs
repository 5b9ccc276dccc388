//! `PositionMonitorLoop`: polls premiums for every open position in one
//! broker round-trip, applies `ExitEvaluator`, and closes or ratchets each
//! position, per `spec.md` §4.11. Structured as a `tokio::task` consuming
//! `self` with a `CancellationToken`, the same shape `optrade-runners::Runner`
//! uses and grounded on the teacher's `TimeStopMonitor::run` periodic loop.

use crate::config::PositionMonitorConfig;
use crate::error::{PositionError, Result};
use crate::evaluator::ExitEvaluator;
use chrono::{DateTime, Utc};
use optrade_broker::{BrokerClient, BrokerOrderStatus, OrderRequest, OrderSide, OrderType};
use optrade_core::{ExitReason, MarketCalendar, Position, PositionMode, Price, WarningReason};
use optrade_eventbus::{Event, EventBus};
use optrade_signal::SignalManager;
use optrade_store::Store;
use optrade_telemetry::metrics::{POSITIONS_CLOSED_TOTAL, POSITIONS_OPEN, POSITIONS_WARNING};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use uuid::Uuid;

pub struct PositionMonitorLoop {
    store: Arc<dyn Store>,
    broker: Arc<dyn BrokerClient>,
    event_bus: Arc<EventBus>,
    signal_manager: Arc<SignalManager>,
    calendar: Arc<MarketCalendar>,
    evaluator: ExitEvaluator,
    config: PositionMonitorConfig,
    cancel: CancellationToken,
}

impl PositionMonitorLoop {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn BrokerClient>,
        event_bus: Arc<EventBus>,
        signal_manager: Arc<SignalManager>,
        calendar: Arc<MarketCalendar>,
        config: PositionMonitorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let evaluator = ExitEvaluator::new(config.exit.clone());
        Self {
            store,
            broker,
            event_bus,
            signal_manager,
            calendar,
            evaluator,
            config,
            cancel,
        }
    }

    /// Spawn the supervised loop, consuming `self`.
    pub fn spawn(self) -> PositionMonitorHandle {
        let cancel = self.cancel.clone();
        let join = tokio::spawn(self.run());
        PositionMonitorHandle { cancel, join }
    }

    async fn run(self) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!("position monitor cancelled");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        warn!(error = %err, "position monitor tick failed");
                    }
                }
            }
        }
    }

    async fn tick(&self) -> Result<()> {
        let positions = self.store.get_open_positions().await?;
        if positions.is_empty() {
            return Ok(());
        }

        let option_symbols: Vec<_> = positions
            .iter()
            .filter_map(|p| p.option_symbol.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let quotes = self.broker.get_quotes(&option_symbols).await?;
        let now = self.now();

        for mut position in positions {
            let Some(option_symbol) = position.option_symbol.clone() else {
                continue;
            };
            let Some(quote) = quotes.get(&option_symbol) else {
                continue;
            };
            let current = quote.last_price;

            position.update_high_water_mark(current);
            if let Some(new_stop) = self.evaluator.ratchet_stop_loss(&position, current) {
                position.stop_loss = Some(new_stop);
            }

            match self.evaluator.evaluate(&position, current, now, &self.calendar) {
                None => {
                    self.store.update_position(&position).await?;
                    self.event_bus.publish(Event::PositionUpdated(position));
                }
                Some(reason) => {
                    self.close_position(position, current, reason, now).await?;
                }
            }
        }

        Ok(())
    }

    async fn close_position(
        &self,
        mut position: Position,
        current: Price,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<()> {
        match position.mode {
            PositionMode::LogOnly | PositionMode::Paper => {
                self.finalize_close(&mut position, current, reason, now).await
            }
            PositionMode::Live => match self.close_live(&position, current).await {
                Ok(fill_price) => self.finalize_close(&mut position, fill_price, reason, now).await,
                Err(err) => {
                    error!(position_id = %position.id, error = %err, "LIVE exit order failed after retry, leaving position open");
                    position.set_warning(WarningReason::ExitOrderFailed);
                    self.store.update_position(&position).await?;
                    POSITIONS_WARNING.inc();
                    self.event_bus.publish(Event::PositionUpdated(position));
                    Ok(())
                }
            },
        }
    }

    async fn finalize_close(
        &self,
        position: &mut Position,
        exit_price: Price,
        reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<()> {
        position.close(exit_price, reason, now);
        self.store.update_position(position).await?;
        POSITIONS_OPEN.dec();
        POSITIONS_CLOSED_TOTAL
            .with_label_values(&[exit_reason_label(reason)])
            .inc();
        self.event_bus.publish(Event::PositionClosed(position.clone()));

        match reason {
            ExitReason::StopLoss => self.signal_manager.mark_stopped(position.signal_id).await?,
            _ => self.signal_manager.mark_completed(position.signal_id).await?,
        }
        Ok(())
    }

    /// Place a SELL LIMIT at `current` and wait for a fill, retrying once on
    /// failure. `spec.md` §7's `PartialExitFailure`: a second failure is
    /// surfaced to the caller as a warning rather than closing the position
    /// on a fill that never happened.
    async fn close_live(&self, position: &Position, current: Price) -> Result<Price> {
        for attempt in 0..2 {
            match self.place_and_poll(position, current).await {
                Ok(price) => return Ok(price),
                Err(err) => {
                    warn!(position_id = %position.id, attempt, error = %err, "LIVE exit attempt failed");
                }
            }
        }
        Err(PositionError::ExitOrderFailed {
            position_id: position.id,
            reason: "exit order did not fill after retry".to_string(),
        })
    }

    async fn place_and_poll(&self, position: &Position, current: Price) -> Result<Price> {
        let symbol = position
            .option_symbol
            .clone()
            .unwrap_or_else(|| position.symbol.clone());
        let order = OrderRequest {
            client_order_id: Uuid::new_v4(),
            symbol,
            side: OrderSide::Sell,
            order_type: OrderType::Limit,
            quantity: position.quantity,
            limit_price: Some(current),
        };
        let ack = self.broker.place_order(order).await?;
        let mut latest = ack;
        let deadline = tokio::time::Instant::now() + self.config.order_timeout;

        loop {
            match latest.status {
                BrokerOrderStatus::Filled => {
                    return Ok(latest.average_fill_price.unwrap_or(current));
                }
                BrokerOrderStatus::Rejected | BrokerOrderStatus::Cancelled => {
                    return Err(PositionError::ExitOrderFailed {
                        position_id: position.id,
                        reason: format!("{:?}", latest.status),
                    });
                }
                _ => {}
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(PositionError::ExitOrderFailed {
                    position_id: position.id,
                    reason: "timed out waiting for fill".to_string(),
                });
            }
            tokio::time::sleep(self.config.order_poll_interval).await;
            latest = self.broker.get_order_status(&latest.broker_order_id).await?;
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.calendar.now().with_timezone(&Utc)
    }
}

fn exit_reason_label(reason: ExitReason) -> &'static str {
    match reason {
        ExitReason::StopLoss => "stop_loss",
        ExitReason::Target => "target",
        ExitReason::TrailingStop => "trailing_stop",
        ExitReason::ExpiryApproaching => "expiry_approaching",
        ExitReason::ManualClose => "manual_close",
        ExitReason::StrategyExit => "strategy_exit",
    }
}

pub struct PositionMonitorHandle {
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl PositionMonitorHandle {
    /// Request cancellation and wait for the task to observe it.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.join.await {
            warn!(error = %err, "position monitor task panicked during shutdown");
        }
    }
}
