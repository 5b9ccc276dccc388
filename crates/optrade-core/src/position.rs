//! Open/closed trade state tracked after an order fills.

use crate::decimal::{Price, Quantity};
use crate::option_contract::OptionType;
use crate::symbol::{AssetClass, Symbol};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which pipeline dispatched the order that opened this position. Carried
/// on the position itself so a monitor restarted mid-session can tell a
/// paper position from a live one without consulting the executor's config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionMode {
    LogOnly,
    Paper,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Closed,
}

/// Why a position was closed. `None` while the position is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    Target,
    TrailingStop,
    ExpiryApproaching,
    ManualClose,
    StrategyExit,
}

/// Non-terminal condition raised by the position monitor that the
/// orchestrator should surface (dashboard, alert) without closing the
/// position outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningReason {
    ApproachingStopLoss,
    ApproachingExpiry,
    LowLiquidity,
    StaleData,
    /// A `LIVE` exit order did not fill after the monitor's one retry; the
    /// position stays open rather than being marked closed on a fill that
    /// never happened.
    ExitOrderFailed,
}

/// An open or closed trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: Uuid,
    pub signal_id: Uuid,
    pub strategy_name: String,
    pub symbol: Symbol,
    pub asset_class: AssetClass,
    /// The concrete tradable contract (e.g. `NIFTY24JUL23500CE`), distinct
    /// from `symbol` which is the underlying the signal was about.
    pub option_symbol: Option<Symbol>,
    pub strike: Option<Price>,
    pub option_type: Option<OptionType>,
    pub expiry: Option<NaiveDate>,
    /// Exchange lot size for `option_symbol`. `quantity % lot_size == 0`
    /// is a storage invariant; `Quantity::ZERO` for asset classes that
    /// never resolve to an options leg (kept `Quantity` rather than
    /// `Option` so the modulus check has a single code path).
    pub lot_size: Quantity,
    pub mode: PositionMode,
    pub status: PositionStatus,
    pub entry_price: Price,
    pub quantity: Quantity,
    pub stop_loss: Option<Price>,
    pub target: Option<Price>,
    pub trailing_stop_pct: Option<rust_decimal::Decimal>,
    /// High-water mark used by the trailing stop; updated on every mark as
    /// `max(high_water_mark, current_price)` for a long position.
    pub high_water_mark: Price,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Price>,
    pub exit_reason: Option<ExitReason>,
    pub warning_flag: bool,
    pub warning_reason: Option<WarningReason>,
}

impl Position {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        signal_id: Uuid,
        strategy_name: impl Into<String>,
        symbol: Symbol,
        asset_class: AssetClass,
        mode: PositionMode,
        entry_price: Price,
        quantity: Quantity,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            signal_id,
            strategy_name: strategy_name.into(),
            symbol,
            asset_class,
            option_symbol: None,
            strike: None,
            option_type: None,
            expiry: None,
            lot_size: Quantity::ZERO,
            mode,
            status: PositionStatus::Open,
            entry_price,
            quantity,
            stop_loss: None,
            target: None,
            trailing_stop_pct: None,
            high_water_mark: entry_price,
            opened_at,
            closed_at: None,
            exit_price: None,
            exit_reason: None,
            warning_flag: false,
            warning_reason: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Attach the resolved option contract this position trades. Called once
    /// by the executor right after `Position::open`, before the first
    /// persist.
    #[allow(clippy::too_many_arguments)]
    pub fn with_option_leg(
        mut self,
        option_symbol: Symbol,
        strike: Price,
        option_type: OptionType,
        expiry: NaiveDate,
        lot_size: Quantity,
    ) -> Self {
        self.option_symbol = Some(option_symbol);
        self.strike = Some(strike);
        self.option_type = Some(option_type);
        self.expiry = Some(expiry);
        self.lot_size = lot_size;
        self
    }

    /// `true` iff `quantity` is an exact multiple of `lot_size` (or
    /// `lot_size` is unset/zero, for asset classes with no lot concept).
    pub fn quantity_matches_lot_size(&self) -> bool {
        if self.lot_size.is_zero() {
            return true;
        }
        (self.quantity.inner() % self.lot_size.inner()).is_zero()
    }

    /// Update the high-water mark on a new mark price. Returns `true` if
    /// the mark advanced.
    pub fn update_high_water_mark(&mut self, mark: Price) -> bool {
        if mark > self.high_water_mark {
            self.high_water_mark = mark;
            true
        } else {
            false
        }
    }

    /// Unrealized P&L per unit at `mark`, signed: positive is profit for a
    /// long-style position (the only direction a long equity/options buy
    /// position can take; short exposure is represented via a `Pe`/`Ce`
    /// option_type choice rather than a negative quantity).
    pub fn unrealized_pnl_per_unit(&self, mark: Price) -> rust_decimal::Decimal {
        mark.inner() - self.entry_price.inner()
    }

    pub fn unrealized_pnl(&self, mark: Price) -> rust_decimal::Decimal {
        self.unrealized_pnl_per_unit(mark) * self.quantity.inner()
    }

    pub fn set_warning(&mut self, reason: WarningReason) {
        self.warning_flag = true;
        self.warning_reason = Some(reason);
    }

    pub fn clear_warning(&mut self) {
        self.warning_flag = false;
        self.warning_reason = None;
    }

    pub fn close(&mut self, exit_price: Price, reason: ExitReason, closed_at: DateTime<Utc>) {
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.exit_reason = Some(reason);
        self.closed_at = Some(closed_at);
    }

    pub fn realized_pnl(&self) -> Option<rust_decimal::Decimal> {
        self.exit_price
            .map(|exit| (exit.inner() - self.entry_price.inner()) * self.quantity.inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position() -> Position {
        Position::open(
            Uuid::new_v4(),
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            PositionMode::Paper,
            Price::new(dec!(23500)),
            Quantity::new(dec!(50)),
            "2026-07-27T04:30:00Z".parse().unwrap(),
        )
    }

    #[test]
    fn test_open_position_defaults() {
        let p = position();
        assert!(p.is_open());
        assert_eq!(p.high_water_mark, p.entry_price);
        assert!(!p.warning_flag);
    }

    #[test]
    fn test_high_water_mark_only_advances() {
        let mut p = position();
        assert!(p.update_high_water_mark(Price::new(dec!(23600))));
        assert!(!p.update_high_water_mark(Price::new(dec!(23550))));
        assert_eq!(p.high_water_mark, Price::new(dec!(23600)));
    }

    #[test]
    fn test_unrealized_pnl() {
        let p = position();
        assert_eq!(p.unrealized_pnl(Price::new(dec!(23600))), dec!(5000));
    }

    #[test]
    fn test_close_sets_realized_pnl() {
        let mut p = position();
        p.close(
            Price::new(dec!(23700)),
            ExitReason::Target,
            "2026-07-27T05:00:00Z".parse().unwrap(),
        );
        assert!(!p.is_open());
        assert_eq!(p.realized_pnl().unwrap(), dec!(10000));
        assert_eq!(p.exit_reason, Some(ExitReason::Target));
    }

    #[test]
    fn test_warning_flag_roundtrip() {
        let mut p = position();
        p.set_warning(WarningReason::ApproachingExpiry);
        assert!(p.warning_flag);
        p.clear_warning();
        assert!(!p.warning_flag);
        assert!(p.warning_reason.is_none());
    }
}
