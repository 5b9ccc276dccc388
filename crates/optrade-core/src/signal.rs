//! Strategy output: a candidate trade idea, before risk/sizing/dispatch.

use crate::clock::Timeframe;
use crate::decimal::Price;
use crate::symbol::{AssetClass, Symbol};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Directional intent of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    EnterLong,
    EnterShort,
}

/// Qualitative confidence bucket a strategy assigns its own output. Used by
/// the strike selector and risk gates as a coarse filter ahead of any
/// strategy-specific score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
}

/// Lifecycle state of a signal after it leaves the strategy and enters the
/// signal manager / executor pipeline. Transitions monotonically:
/// `New -> Processing -> {Executed | Rejected | Failed | Expired}`.
/// A duplicate (same fingerprint, non-terminal or `Executed` match already on
/// file) is never persisted at all — it is not a status, it is a rejected
/// `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    New,
    Processing,
    Executed,
    Rejected,
    Failed,
    Expired,
}

impl SignalStatus {
    /// Terminal statuses no longer accept a transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Executed | Self::Rejected | Self::Failed | Self::Expired)
    }
}

/// A candidate trade idea produced by a `Strategy` implementation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub strategy_name: String,
    pub symbol: Symbol,
    pub asset_class: AssetClass,
    pub action: SignalAction,
    pub strength: SignalStrength,
    pub reference_price: Price,
    /// Strategy's planned exit levels on the underlying, not the eventual
    /// option premium (the strike selector/executor derive premium-level
    /// stop/target separately once a contract is resolved). Position exits
    /// are driven entirely by `PositionMonitor`, not by a strategy-emitted
    /// signal, so every `Signal` here is an entry.
    pub target_price: Option<Price>,
    pub stop_loss_price: Option<Price>,
    /// Strategy's expected magnitude of the coming move, as a percentage
    /// of `reference_price`. Feeds the strike selector's ATM/OTM mode
    /// decision (`spec.md` §4.9 step 4).
    pub expected_move_pct: Option<Decimal>,
    /// Timeframe the strategy analyzed to produce this signal. Part of the
    /// idempotency fingerprint alongside `strategy_name`/`symbol`/`action`/
    /// `bucket_start`, since the same strategy can run against more than
    /// one timeframe for the same symbol.
    pub timeframe: Timeframe,
    pub generated_at: DateTime<Utc>,
    pub status: SignalStatus,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Signal {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        strategy_name: impl Into<String>,
        symbol: Symbol,
        asset_class: AssetClass,
        action: SignalAction,
        strength: SignalStrength,
        reference_price: Price,
        timeframe: Timeframe,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy_name: strategy_name.into(),
            symbol,
            asset_class,
            action,
            strength,
            reference_price,
            target_price: None,
            stop_loss_price: None,
            expected_move_pct: None,
            timeframe,
            generated_at,
            status: SignalStatus::New,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_exit_levels(mut self, target_price: Price, stop_loss_price: Price) -> Self {
        self.target_price = Some(target_price);
        self.stop_loss_price = Some(stop_loss_price);
        self
    }

    pub fn with_expected_move_pct(mut self, pct: Decimal) -> Self {
        self.expected_move_pct = Some(pct);
        self
    }

    /// `true` for a signal whose bracket is internally consistent:
    /// `EnterLong` requires `target > reference > stop`, `EnterShort` the
    /// inverse. A signal with no bracket set (neither `target_price` nor
    /// `stop_loss_price`) passes trivially — this only rejects a
    /// self-contradictory bracket.
    pub fn has_valid_bracket(&self) -> bool {
        let (Some(target), Some(stop)) = (self.target_price, self.stop_loss_price) else {
            return true;
        };
        match self.action {
            SignalAction::EnterLong => target > self.reference_price && self.reference_price > stop,
            SignalAction::EnterShort => target < self.reference_price && self.reference_price < stop,
        }
    }

    /// Stable identity for deduplication: two signals from the same
    /// strategy, for the same symbol, action and timeframe, within the
    /// same `bucket_start` window of the same trading session, are the
    /// same idea even if generated by separate runner ticks. This is
    /// distinct from `id`, which is unique per struct instance.
    ///
    /// `bucket_start` should be the caller's dedup-window floor (e.g. the
    /// candle bucket the signal was derived from) so that fingerprints
    /// naturally roll over as new data arrives; `session_date` is the IST
    /// calendar date of the trading session, per `spec.md` §3's
    /// `IdempotencyKey`.
    pub fn fingerprint(&self, session_date: NaiveDate, bucket_start: DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.strategy_name.as_bytes());
        hasher.update(b"|");
        hasher.update(self.symbol.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(format!("{:?}", self.action).as_bytes());
        hasher.update(b"|");
        hasher.update(self.timeframe.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(session_date.to_string().as_bytes());
        hasher.update(b"|");
        hasher.update(bucket_start.timestamp().to_string().as_bytes());
        let digest = hasher.finalize();
        hex::encode(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn signal() -> Signal {
        Signal::new(
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            Price::new(dec!(23500)),
            Timeframe::M15,
            "2026-07-27T04:30:00Z".parse().unwrap(),
        )
    }

    fn session_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 27).unwrap()
    }

    #[test]
    fn test_fingerprint_stable_for_same_inputs() {
        let s1 = signal();
        let s2 = signal();
        let bucket: DateTime<Utc> = "2026-07-27T04:30:00Z".parse().unwrap();
        assert_eq!(
            s1.fingerprint(session_date(), bucket),
            s2.fingerprint(session_date(), bucket)
        );
    }

    #[test]
    fn test_fingerprint_differs_across_buckets() {
        let s = signal();
        let b1: DateTime<Utc> = "2026-07-27T04:30:00Z".parse().unwrap();
        let b2: DateTime<Utc> = "2026-07-27T04:45:00Z".parse().unwrap();
        assert_ne!(
            s.fingerprint(session_date(), b1),
            s.fingerprint(session_date(), b2)
        );
    }

    #[test]
    fn test_fingerprint_differs_across_actions() {
        let mut s1 = signal();
        let mut s2 = signal();
        s1.action = SignalAction::EnterLong;
        s2.action = SignalAction::EnterShort;
        let bucket: DateTime<Utc> = "2026-07-27T04:30:00Z".parse().unwrap();
        assert_ne!(
            s1.fingerprint(session_date(), bucket),
            s2.fingerprint(session_date(), bucket)
        );
    }

    #[test]
    fn test_fingerprint_differs_across_timeframes() {
        let mut s1 = signal();
        let mut s2 = signal();
        s1.timeframe = Timeframe::M15;
        s2.timeframe = Timeframe::M30;
        let bucket: DateTime<Utc> = "2026-07-27T04:30:00Z".parse().unwrap();
        assert_ne!(
            s1.fingerprint(session_date(), bucket),
            s2.fingerprint(session_date(), bucket)
        );
    }

    #[test]
    fn test_valid_bracket_enter_long() {
        let s = signal().with_exit_levels(Price::new(dec!(23700)), Price::new(dec!(23400)));
        assert!(s.has_valid_bracket());
    }

    #[test]
    fn test_invalid_bracket_enter_long_target_below_reference() {
        let s = signal().with_exit_levels(Price::new(dec!(23000)), Price::new(dec!(23400)));
        assert!(!s.has_valid_bracket());
    }

    #[test]
    fn test_no_bracket_passes_trivially() {
        assert!(signal().has_valid_bracket());
    }

    #[test]
    fn test_new_signal_starts_new() {
        let s = signal();
        assert_eq!(s.status, SignalStatus::New);
    }
}
