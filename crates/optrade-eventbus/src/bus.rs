//! The bus itself: per-`(subscriber_id, event_type)` bounded channels so
//! each subscription sees its own events strictly in publish order, while
//! distinct subscriptions fan out independently with no cross-ordering
//! promise. A single shared `tokio::sync::broadcast` channel cannot
//! express this tradeoff (`broadcast` is one global ordered log read by
//! every subscriber; a per-subscriber channel is the only way to give
//! each subscription its own order without forcing a global one).

use crate::event::{Event, EventType};
use async_trait::async_trait;
use optrade_telemetry::metrics::EVENTBUS_HANDLER_TOTAL;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(30);

/// A handler invoked once per delivered event. Implementors should be
/// cheap to clone (wrap any expensive state in an `Arc` internally) since
/// the bus holds one `Arc<dyn EventHandler>` per subscription for the life
/// of that subscription.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Event);
}

/// A predicate a subscription can use to narrow delivery within an event
/// type, e.g. "only candles for this symbol".
pub type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

struct Subscription {
    subscriber_id: String,
    event_type: EventType,
    filter: Option<Filter>,
    tx: mpsc::Sender<Event>,
}

/// A live subscription. Dropping this without calling [`cancel`](Self::cancel)
/// leaves the dispatch task running in the background; call `cancel` to
/// tear it down deterministically (e.g. during Orchestrator shutdown).
pub struct SubscriptionHandle {
    subscriber_id: String,
    cancel: CancellationToken,
    join: tokio::task::JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Immediate, forceful teardown: abort the dispatch task without
    /// waiting for in-flight work or queued events. Fine for tests and
    /// any caller that doesn't need the events already queued on this
    /// subscription to be delivered.
    pub fn cancel(self) {
        self.cancel.cancel();
        self.join.abort();
    }

    /// Graceful teardown for Orchestrator shutdown (`spec.md` §4.12):
    /// stop accepting new events, let the dispatch task drain whatever is
    /// already queued on this subscription's channel, and wait up to
    /// `grace_period` for it to finish before giving up. On timeout the
    /// task is left to finish on its own rather than aborted mid-handler.
    pub async fn cancel_and_drain(self, grace_period: Duration) {
        self.cancel.cancel();
        if tokio::time::timeout(grace_period, self.join).await.is_err() {
            warn!(
                subscriber_id = %self.subscriber_id,
                "dispatch task did not drain within the shutdown grace period"
            );
        }
    }
}

/// Typed multi-subscriber pub/sub. `publish` is non-blocking: it enqueues
/// onto each matching subscription's channel and returns immediately. A
/// full channel (a slow handler) drops the event for that subscription
/// with a warning rather than blocking the publisher.
pub struct EventBus {
    subscriptions: dashmap::DashMap<EventType, Vec<Subscription>>,
    channel_capacity: usize,
    handler_timeout: Duration,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscriptions: dashmap::DashMap::new(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    pub fn with_capacity_and_timeout(channel_capacity: usize, handler_timeout: Duration) -> Self {
        Self {
            subscriptions: dashmap::DashMap::new(),
            channel_capacity,
            handler_timeout,
        }
    }

    /// Subscribe `handler` to `event_type` under `subscriber_id`. Events
    /// for which `filter` (if given) returns `false` are never enqueued to
    /// this subscription. Returns a handle that owns the dispatch task.
    pub fn subscribe<H>(
        &self,
        event_type: EventType,
        subscriber_id: impl Into<String>,
        handler: H,
        filter: Option<Filter>,
    ) -> SubscriptionHandle
    where
        H: EventHandler,
    {
        let subscriber_id = subscriber_id.into();
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handler = Arc::new(handler);
        let timeout = self.handler_timeout;
        let dispatch_subscriber_id = subscriber_id.clone();
        let handle_subscriber_id = subscriber_id.clone();

        let join = tokio::spawn(dispatch_loop(
            rx,
            handler,
            task_cancel,
            timeout,
            dispatch_subscriber_id,
        ));

        self.subscriptions
            .entry(event_type)
            .or_default()
            .push(Subscription {
                subscriber_id,
                event_type,
                filter,
                tx,
            });

        SubscriptionHandle { subscriber_id: handle_subscriber_id, cancel, join }
    }

    /// Enqueue `event` to every subscription whose `event_type` matches
    /// and whose filter (if any) accepts it. Non-blocking.
    pub fn publish(&self, event: Event) {
        let event_type = event.event_type();
        let Some(subs) = self.subscriptions.get(&event_type) else {
            return;
        };
        for sub in subs.iter() {
            if let Some(filter) = &sub.filter {
                if !filter(&event) {
                    continue;
                }
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(
                        subscriber_id = %sub.subscriber_id,
                        event_type = ?event_type,
                        "subscription channel full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(
                        subscriber_id = %sub.subscriber_id,
                        event_type = ?event_type,
                        "subscription channel closed, dropping event"
                    );
                }
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_loop(
    mut rx: mpsc::Receiver<Event>,
    handler: Arc<dyn EventHandler>,
    cancel: CancellationToken,
    timeout: Duration,
    subscriber_id: String,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                // Stop accepting new sends (`publish`'s `try_send` starts
                // observing a closed channel) but keep recv-ing: anything
                // already buffered is drained below before this task exits.
                rx.close();
                break;
            }
            maybe_event = rx.recv() => match maybe_event {
                Some(event) => event,
                None => return,
            },
        };
        dispatch_one(&handler, event, timeout, &subscriber_id).await;
    }
    while let Some(event) = rx.recv().await {
        dispatch_one(&handler, event, timeout, &subscriber_id).await;
    }
}

async fn dispatch_one(handler: &Arc<dyn EventHandler>, event: Event, timeout: Duration, subscriber_id: &str) {
    let event_type = event.event_type();
    let h = handler.clone();
    // Each delivery runs in its own task so a handler panic is contained
    // to this one delivery, never the dispatch loop itself.
    let delivery = tokio::spawn(async move { h.handle(event).await });
    let outcome = match tokio::time::timeout(timeout, delivery).await {
        Ok(Ok(())) => "ok",
        Ok(Err(_panic)) => {
            warn!(subscriber_id = %subscriber_id, event_type = ?event_type, "handler task panicked");
            "panic"
        }
        Err(_elapsed) => {
            warn!(subscriber_id = %subscriber_id, event_type = ?event_type, "handler timed out");
            "timeout"
        }
    };
    EVENTBUS_HANDLER_TOTAL
        .with_label_values(&[&format!("{event_type:?}"), outcome])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::{AssetClass, Price, Signal, SignalAction, SignalStrength, Symbol, Timeframe};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct RecordingHandler {
        order: Arc<Mutex<Vec<u32>>>,
    }

    #[async_trait]
    impl EventHandler for RecordingHandler {
        async fn handle(&self, event: Event) {
            if let Event::SignalGenerated(signal) = event {
                let seq: u32 = signal
                    .metadata
                    .get("seq")
                    .and_then(|v| v.as_u64())
                    .unwrap_or_default() as u32;
                self.order.lock().await.push(seq);
            }
        }
    }

    fn signal_with_seq(seq: u32) -> Signal {
        let mut signal = Signal::new(
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            Price::new(dec!(23500)),
            Timeframe::M15,
            "2026-07-27T04:30:00Z".parse().unwrap(),
        );
        signal
            .metadata
            .insert("seq".to_string(), serde_json::json!(seq));
        signal
    }

    #[tokio::test]
    async fn test_single_subscription_preserves_publish_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler { order: order.clone() };
        let handle = bus.subscribe(EventType::SignalGenerated, "recorder", handler, None);

        for seq in 0..5 {
            bus.publish(Event::SignalGenerated(signal_with_seq(seq)));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_filter_excludes_non_matching_events() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_handle = seen.clone();
        struct CountingHandler(Arc<AtomicUsize>);
        #[async_trait]
        impl EventHandler for CountingHandler {
            async fn handle(&self, _event: Event) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
        let filter: Filter = Arc::new(|event| {
            matches!(event, Event::SignalGenerated(s) if s.symbol == Symbol::new("BANKNIFTY"))
        });
        let handle = bus.subscribe(
            EventType::SignalGenerated,
            "filtered",
            CountingHandler(seen_handle),
            Some(filter),
        );

        bus.publish(Event::SignalGenerated(signal_with_seq(0)));
        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.cancel();

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new();
        bus.publish(Event::SignalGenerated(signal_with_seq(0)));
    }

    #[tokio::test]
    async fn test_cancel_and_drain_delivers_already_queued_events() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let handler = RecordingHandler { order: order.clone() };
        let handle = bus.subscribe(EventType::SignalGenerated, "recorder", handler, None);

        for seq in 0..5 {
            bus.publish(Event::SignalGenerated(signal_with_seq(seq)));
        }
        // No sleep before tearing down: the events are still sitting in the
        // subscription's channel when shutdown begins, so this only passes
        // if cancel_and_drain actually drains the backlog rather than
        // cutting the dispatch task off at the moment it cancels.
        handle.cancel_and_drain(Duration::from_secs(1)).await;

        assert_eq!(*order.lock().await, vec![0, 1, 2, 3, 4]);
    }
}
