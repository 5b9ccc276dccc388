//! Position sizing: risk-per-trade lot calculation, independent of the
//! dispatch path so it is unit-testable without a `Store`/`BrokerClient`
//! in the loop, following the same pure-predicate-function shape as
//! `optrade-risk::gates`.

use optrade_core::{Price, Quantity};
use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct SizingConfig {
    pub capital: Decimal,
    /// Fraction of `capital` risked per trade, e.g. `0.01` for 1%.
    pub risk_pct: Decimal,
    /// Fraction of `capital` a single position's notional may not exceed.
    pub max_position_pct: Decimal,
    pub max_lots_per_trade: u64,
}

/// `lots = max(1, floor(risk_per_trade / ((ltp - stop_loss_premium) *
/// lot_size)))`, capped by `max_lots_per_trade` and by
/// `capital * max_position_pct`.
pub fn compute_quantity(
    config: &SizingConfig,
    ltp: Price,
    stop_loss_premium: Price,
    lot_size: Quantity,
) -> Quantity {
    if lot_size.is_zero() {
        return Quantity::ZERO;
    }

    let risk_per_trade = config.capital * config.risk_pct;
    let risk_per_unit = ltp.inner() - stop_loss_premium.inner();

    let raw_lots = if risk_per_unit <= Decimal::ZERO {
        Decimal::ONE
    } else {
        (risk_per_trade / (risk_per_unit * lot_size.inner()))
            .floor()
            .max(Decimal::ONE)
    };

    let position_cap_lots = {
        let notional_per_lot = ltp.inner() * lot_size.inner();
        if notional_per_lot <= Decimal::ZERO {
            Decimal::from(config.max_lots_per_trade)
        } else {
            ((config.capital * config.max_position_pct) / notional_per_lot)
                .floor()
                .max(Decimal::ONE)
        }
    };

    let lots = raw_lots
        .min(Decimal::from(config.max_lots_per_trade))
        .min(position_cap_lots)
        .max(Decimal::ONE);

    Quantity::new(lots * lot_size.inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn config() -> SizingConfig {
        SizingConfig {
            capital: dec!(1_000_000),
            risk_pct: dec!(0.01),
            max_position_pct: dec!(0.5),
            max_lots_per_trade: 20,
        }
    }

    #[test]
    fn test_floor_division_under_caps() {
        // risk_per_trade = 10,000; risk_per_unit = 100-70 = 30; lot_size=50
        // raw = floor(10000 / (30*50)) = floor(6.67) = 6, and that's under
        // both max_lots_per_trade and the capital cap, so lots = 6.
        let qty = compute_quantity(
            &config(),
            Price::new(dec!(100)),
            Price::new(dec!(70)),
            Quantity::new(dec!(50)),
        );
        assert_eq!(qty, Quantity::new(dec!(300)));
    }

    #[test]
    fn test_floors_to_at_least_one_lot() {
        let cfg = SizingConfig {
            capital: dec!(1_000),
            risk_pct: dec!(0.01),
            ..config()
        };
        let qty = compute_quantity(
            &cfg,
            Price::new(dec!(100)),
            Price::new(dec!(70)),
            Quantity::new(dec!(50)),
        );
        assert_eq!(qty, Quantity::new(dec!(50)));
    }

    #[test]
    fn test_caps_by_max_lots_per_trade() {
        let cfg = SizingConfig {
            capital: dec!(100_000_000),
            max_lots_per_trade: 3,
            ..config()
        };
        let qty = compute_quantity(
            &cfg,
            Price::new(dec!(100)),
            Price::new(dec!(70)),
            Quantity::new(dec!(50)),
        );
        assert_eq!(qty, Quantity::new(dec!(150)));
    }

    #[test]
    fn test_caps_by_max_position_pct() {
        let cfg = SizingConfig {
            capital: dec!(10_000),
            max_position_pct: dec!(0.05),
            max_lots_per_trade: 100,
            risk_pct: dec!(1.0),
        };
        // notional_per_lot = 100*50 = 5000; position cap = floor(10000*0.05/5000) = 0 -> max(1) = 1
        let qty = compute_quantity(
            &cfg,
            Price::new(dec!(100)),
            Price::new(dec!(70)),
            Quantity::new(dec!(50)),
        );
        assert_eq!(qty, Quantity::new(dec!(50)));
    }

    #[test]
    fn test_zero_lot_size_returns_zero() {
        let qty = compute_quantity(
            &config(),
            Price::new(dec!(100)),
            Price::new(dec!(70)),
            Quantity::ZERO,
        );
        assert_eq!(qty, Quantity::ZERO);
    }
}
