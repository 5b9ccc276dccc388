//! The event catalogue. Every variant carries a complete payload so a
//! subscriber never needs to query the Store to act on it.

use optrade_broker::{OrderAck, OrderRequest};
use optrade_core::{Candle, Position, Signal, Symbol, Timeframe};
use uuid::Uuid;

/// Discriminant used for subscription routing, independent of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    CandleClosed,
    SignalGenerated,
    SignalActivated,
    SignalCompleted,
    SignalStopped,
    PositionOpened,
    PositionUpdated,
    PositionClosed,
    OrderPlaced,
    OrderFilled,
    OrderRejected,
}

#[derive(Debug, Clone)]
pub enum Event {
    CandleClosed {
        symbol: Symbol,
        timeframe: Timeframe,
        candle: Candle,
    },
    SignalGenerated(Signal),
    SignalActivated(Signal),
    SignalCompleted(Signal),
    SignalStopped(Signal),
    PositionOpened(Position),
    PositionUpdated(Position),
    PositionClosed(Position),
    OrderPlaced {
        signal_id: Uuid,
        order: OrderRequest,
    },
    OrderFilled {
        signal_id: Uuid,
        ack: OrderAck,
    },
    OrderRejected {
        signal_id: Uuid,
        reason: String,
    },
}

impl Event {
    pub fn event_type(&self) -> EventType {
        match self {
            Self::CandleClosed { .. } => EventType::CandleClosed,
            Self::SignalGenerated(_) => EventType::SignalGenerated,
            Self::SignalActivated(_) => EventType::SignalActivated,
            Self::SignalCompleted(_) => EventType::SignalCompleted,
            Self::SignalStopped(_) => EventType::SignalStopped,
            Self::PositionOpened(_) => EventType::PositionOpened,
            Self::PositionUpdated(_) => EventType::PositionUpdated,
            Self::PositionClosed(_) => EventType::PositionClosed,
            Self::OrderPlaced { .. } => EventType::OrderPlaced,
            Self::OrderFilled { .. } => EventType::OrderFilled,
            Self::OrderRejected { .. } => EventType::OrderRejected,
        }
    }
}
