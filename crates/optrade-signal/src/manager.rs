//! `SignalManager`: the single `submit` entry point and the single place
//! that publishes `SignalGenerated`, unifying the two code paths `spec.md`
//! §9 flags as an inconsistency in the source to eliminate. Fingerprinting
//! and session-scoped dedup are grounded in the teacher's
//! `hip3-detector::cross_tracker` keyed-state-machine style, generalized
//! from a single per-market cross state to a per-fingerprint Store lookup.

use crate::error::{Result, SignalError};
use chrono_tz::Asia::Kolkata;
use optrade_core::{MarketCalendar, Signal, SignalStatus};
use optrade_eventbus::{Event, EventBus};
use optrade_store::Store;
use optrade_telemetry::metrics::{DUPLICATE_SIGNALS_TOTAL, SIGNALS_TOTAL};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct SignalManager {
    store: Arc<dyn Store>,
    event_bus: Arc<EventBus>,
    calendar: Arc<MarketCalendar>,
}

impl SignalManager {
    pub fn new(store: Arc<dyn Store>, event_bus: Arc<EventBus>, calendar: Arc<MarketCalendar>) -> Self {
        Self {
            store,
            event_bus,
            calendar,
        }
    }

    /// `spec.md` §4.8 `submit`. `signal.id` is always already populated (a
    /// stable uuid assigned at construction, per `Signal::new`); the
    /// remaining steps are invariant validation, fingerprinting, the
    /// session-scoped dedup check, the atomic insert, and the publish.
    pub async fn submit(&self, signal: Signal) -> Result<Signal> {
        if !signal.has_valid_bracket() {
            return Err(SignalError::InvalidSignal(format!(
                "signal {} has an inconsistent bracket for action {:?}",
                signal.id, signal.action
            )));
        }

        let ist_date = signal.generated_at.with_timezone(&Kolkata).date_naive();
        let bucket_start = self.calendar.align_to_bucket(signal.generated_at, signal.timeframe);
        let fingerprint = signal.fingerprint(ist_date, bucket_start);
        let (session_start, _) = self.calendar.session_bounds_for(ist_date);

        let recent = self
            .store
            .signals_since(&signal.strategy_name, &signal.symbol, session_start)
            .await?;
        // `spec.md` §4.8 step 3: a same-fingerprint signal blocks resubmission
        // unless it's EXPIRED or REJECTED — FAILED still blocks, unlike the
        // narrower "non-terminal or EXECUTED" phrasing elsewhere in the spec
        // (see the Open Question recorded in DESIGN.md).
        let duplicate = recent.iter().any(|existing| {
            existing.fingerprint(ist_date, bucket_start) == fingerprint
                && !matches!(existing.status, SignalStatus::Expired | SignalStatus::Rejected)
        });
        if duplicate {
            DUPLICATE_SIGNALS_TOTAL
                .with_label_values(&[&signal.strategy_name, signal.symbol.as_str()])
                .inc();
            debug!(signal_id = %signal.id, fingerprint, "duplicate signal suppressed");
            return Err(SignalError::DuplicateSignal);
        }

        let inserted = self.store.insert_signal(&signal, &fingerprint).await?;
        if !inserted {
            // Lost a race with a concurrent submit for the same fingerprint.
            DUPLICATE_SIGNALS_TOTAL
                .with_label_values(&[&signal.strategy_name, signal.symbol.as_str()])
                .inc();
            return Err(SignalError::DuplicateSignal);
        }

        SIGNALS_TOTAL
            .with_label_values(&[
                &signal.strategy_name,
                signal.symbol.as_str(),
                &format!("{:?}", signal.action),
            ])
            .inc();
        self.event_bus.publish(Event::SignalGenerated(signal.clone()));
        Ok(signal)
    }

    /// Monotonic `SignalStatus` transition (`spec.md` §4.8 `update`).
    /// Publishes `SignalActivated` on the `New -> Processing` transition;
    /// the other terminal transitions the executor drives
    /// (`Executed`/`Rejected`/`Failed`/`Expired`) have no bespoke lifecycle
    /// event of their own — the executor's own `PositionOpened`/
    /// `OrderRejected` publishes already carry that information.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: SignalStatus,
        reason: Option<&str>,
    ) -> Result<Signal> {
        let mut signal = self
            .store
            .get_signal(id)
            .await?
            .ok_or(SignalError::NotFound(id))?;

        if signal.status.is_terminal() {
            return Err(SignalError::IllegalTransition {
                id,
                from: signal.status,
                to: status,
            });
        }

        self.store.update_signal_status(id, status, reason).await?;
        signal.status = status;
        if let Some(reason) = reason {
            signal
                .metadata
                .insert("reason".to_string(), serde_json::json!(reason));
        }

        if status == SignalStatus::Processing {
            self.event_bus.publish(Event::SignalActivated(signal.clone()));
        }

        Ok(signal)
    }

    /// Called by `PositionMonitor` when a position closes on its `TARGET`
    /// exit reason. `Signal.status` stays `Executed` (already terminal,
    /// per the invariant set in `spec.md` §3) — this only emits the
    /// lifecycle event the position's outcome implies.
    pub async fn mark_completed(&self, signal_id: Uuid) -> Result<()> {
        self.publish_outcome(signal_id, Event::SignalCompleted).await
    }

    /// Called by `PositionMonitor` when a position closes on its
    /// `STOP_LOSS` exit reason.
    pub async fn mark_stopped(&self, signal_id: Uuid) -> Result<()> {
        self.publish_outcome(signal_id, Event::SignalStopped).await
    }

    async fn publish_outcome(
        &self,
        signal_id: Uuid,
        wrap: impl FnOnce(Signal) -> Event,
    ) -> Result<()> {
        match self.store.get_signal(signal_id).await? {
            Some(signal) => {
                self.event_bus.publish(wrap(signal));
                Ok(())
            }
            None => {
                warn!(signal_id = %signal_id, "signal not found while publishing outcome event");
                Err(SignalError::NotFound(signal_id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::{AssetClass, HolidayTable, Price, SignalAction, SignalStrength, SystemClock, Timeframe};
    use optrade_store::MockStore;
    use rust_decimal_macros::dec;

    fn calendar() -> Arc<MarketCalendar> {
        Arc::new(MarketCalendar::new(Arc::new(SystemClock), HolidayTable::default()))
    }

    fn signal() -> Signal {
        Signal::new(
            "moving_average_cross",
            optrade_core::Symbol::new("NIFTY"),
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            Price::new(dec!(23500)),
            Timeframe::M15,
            "2026-07-27T04:30:00Z".parse().unwrap(),
        )
        .with_exit_levels(Price::new(dec!(23700)), Price::new(dec!(23400)))
    }

    #[tokio::test]
    async fn test_submit_inserts_and_publishes() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store.clone(), bus, calendar());
        let submitted = manager.submit(signal()).await.unwrap();
        assert_eq!(submitted.status, SignalStatus::New);
        assert!(store.get_signal(submitted.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_bracket() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store, bus, calendar());
        let bad = signal().with_exit_levels(Price::new(dec!(23000)), Price::new(dec!(23400)));
        let err = manager.submit(bad).await.unwrap_err();
        assert!(matches!(err, SignalError::InvalidSignal(_)));
    }

    #[tokio::test]
    async fn test_submit_duplicate_same_fingerprint_rejected() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store, bus, calendar());
        manager.submit(signal()).await.unwrap();
        let err = manager.submit(signal()).await.unwrap_err();
        assert!(matches!(err, SignalError::DuplicateSignal));
    }

    #[tokio::test]
    async fn test_submit_duplicate_blocked_after_prior_failed() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store, bus, calendar());
        let submitted = manager.submit(signal()).await.unwrap();
        manager
            .update_status(submitted.id, SignalStatus::Failed, Some("order rejected by broker"))
            .await
            .unwrap();
        let err = manager.submit(signal()).await.unwrap_err();
        assert!(matches!(err, SignalError::DuplicateSignal));
    }

    #[tokio::test]
    async fn test_submit_allowed_after_prior_rejected() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store, bus, calendar());
        let submitted = manager.submit(signal()).await.unwrap();
        manager
            .update_status(submitted.id, SignalStatus::Rejected, Some("risk check failed"))
            .await
            .unwrap();
        manager.submit(signal()).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_status_new_to_processing_publishes_activated() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store, bus, calendar());
        let submitted = manager.submit(signal()).await.unwrap();
        let updated = manager
            .update_status(submitted.id, SignalStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(updated.status, SignalStatus::Processing);
    }

    #[tokio::test]
    async fn test_update_status_rejects_transition_from_terminal() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store, bus, calendar());
        let submitted = manager.submit(signal()).await.unwrap();
        manager
            .update_status(submitted.id, SignalStatus::Rejected, Some("stale"))
            .await
            .unwrap();
        let err = manager
            .update_status(submitted.id, SignalStatus::Processing, None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignalError::IllegalTransition { .. }));
    }

    #[tokio::test]
    async fn test_mark_completed_publishes_without_changing_status() {
        let store = Arc::new(MockStore::new());
        let bus = Arc::new(EventBus::new());
        let manager = SignalManager::new(store.clone(), bus, calendar());
        let submitted = manager.submit(signal()).await.unwrap();
        manager
            .update_status(submitted.id, SignalStatus::Processing, None)
            .await
            .unwrap();
        manager
            .update_status(submitted.id, SignalStatus::Executed, None)
            .await
            .unwrap();
        manager.mark_completed(submitted.id).await.unwrap();
        let stored = store.get_signal(submitted.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SignalStatus::Executed);
    }
}
