//! Options-chain domain types consumed by the strike selector.

use crate::decimal::{Price, Quantity};
use crate::symbol::Symbol;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Ce,
    Pe,
}

impl std::fmt::Display for OptionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ce => "CE",
            Self::Pe => "PE",
        };
        write!(f, "{s}")
    }
}

/// A single strike/expiry leg in an underlying's options chain, as reported
/// by the broker's chain snapshot endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: Symbol,
    pub trading_symbol: Symbol,
    pub strike: Price,
    pub expiry: NaiveDate,
    pub option_type: OptionType,
    pub last_price: Price,
    pub bid: Price,
    pub ask: Price,
    pub open_interest: Quantity,
    pub volume: Quantity,
    pub implied_volatility: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub lot_size: Quantity,
}

impl OptionContract {
    /// Bid-ask spread, `None` if either side is not quoted.
    pub fn spread(&self) -> Option<Price> {
        if self.bid.is_zero() || self.ask.is_zero() {
            return None;
        }
        Some(self.ask - self.bid)
    }

    /// Spread as a fraction of mid price, `None` if unquoted or mid is zero.
    pub fn spread_pct(&self) -> Option<Decimal> {
        let spread = self.spread()?;
        let mid = (self.bid.inner() + self.ask.inner()) / Decimal::from(2);
        if mid.is_zero() {
            return None;
        }
        Some(spread.inner() / mid * Decimal::from(100))
    }

    /// Absolute distance between `strike` and `spot`.
    pub fn distance_from_spot(&self, spot: Price) -> Decimal {
        (self.strike.inner() - spot.inner()).abs()
    }

    /// `true` if strike is above spot for a call or below spot for a put
    /// (i.e. the contract still has extrinsic-only-dominated OTM pricing).
    pub fn is_otm(&self, spot: Price) -> bool {
        match self.option_type {
            OptionType::Ce => self.strike > spot,
            OptionType::Pe => self.strike < spot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn contract() -> OptionContract {
        OptionContract {
            underlying: Symbol::new("NIFTY"),
            trading_symbol: Symbol::new("NIFTY24JUL23500CE"),
            strike: Price::new(dec!(23500)),
            expiry: NaiveDate::from_ymd_opt(2026, 7, 30).unwrap(),
            option_type: OptionType::Ce,
            last_price: Price::new(dec!(120)),
            bid: Price::new(dec!(118)),
            ask: Price::new(dec!(122)),
            open_interest: Quantity::new(dec!(500000)),
            volume: Quantity::new(dec!(120000)),
            implied_volatility: Some(dec!(14.5)),
            delta: Some(dec!(0.45)),
            lot_size: Quantity::new(dec!(50)),
        }
    }

    #[test]
    fn test_spread() {
        let c = contract();
        assert_eq!(c.spread().unwrap(), Price::new(dec!(4)));
    }

    #[test]
    fn test_spread_none_when_unquoted() {
        let mut c = contract();
        c.bid = Price::ZERO;
        assert!(c.spread().is_none());
    }

    #[test]
    fn test_is_otm_call() {
        let c = contract();
        assert!(c.is_otm(Price::new(dec!(23000))));
        assert!(!c.is_otm(Price::new(dec!(24000))));
    }

    #[test]
    fn test_is_otm_put() {
        let mut c = contract();
        c.option_type = OptionType::Pe;
        c.strike = Price::new(dec!(23000));
        assert!(c.is_otm(Price::new(dec!(23500))));
        assert!(!c.is_otm(Price::new(dec!(22500))));
    }
}
