//! Resolves an equity/index signal to a concrete option contract.
//!
//! The filter-then-score shape is grounded in the teacher's
//! `hip3-mm::quote_engine::compute_quotes`: a handful of independent,
//! named sub-computations combined into one weighted result, each clamped
//! to a sane range before combination.

use crate::error::{OptionsError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use optrade_broker::BrokerClient;
use optrade_core::{OptionContract, OptionType, Price, SignalAction, SignalStrength, Symbol};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// `spec.md` §4.9 step 2: a usable expiry is never today's and is within
/// this window.
const MIN_DAYS_TO_EXPIRY: i64 = 2;
const MAX_DAYS_TO_EXPIRY: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrikeMode {
    Conservative,
    Balanced,
    Aggressive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrikeSelectorConfig {
    pub min_oi: Decimal,
    pub min_volume: Decimal,
    pub max_spread_pct: Decimal,
    pub min_premium: Price,
    pub max_premium: Price,
    pub strike_mode: StrikeMode,
}

impl Default for StrikeSelectorConfig {
    fn default() -> Self {
        Self {
            min_oi: dec!(10_000),
            min_volume: dec!(1_000),
            max_spread_pct: dec!(5),
            min_premium: Price::new(dec!(5)),
            max_premium: Price::new(dec!(500)),
            strike_mode: StrikeMode::Balanced,
        }
    }
}

pub struct StrikeSelector {
    broker: Arc<dyn BrokerClient>,
    config: StrikeSelectorConfig,
}

impl StrikeSelector {
    pub fn new(broker: Arc<dyn BrokerClient>, config: StrikeSelectorConfig) -> Self {
        Self { broker, config }
    }

    pub async fn select(
        &self,
        underlying: &Symbol,
        action: SignalAction,
        underlying_price: Price,
        expected_move_pct: Decimal,
        as_of: DateTime<Utc>,
    ) -> Result<OptionContract> {
        let option_type = match action {
            SignalAction::EnterLong => OptionType::Ce,
            _ => OptionType::Pe,
        };

        let chain = self.broker.get_option_chain(underlying).await?;
        let today = as_of.date_naive();

        let by_type: Vec<&OptionContract> = chain
            .iter()
            .filter(|c| c.option_type == option_type && within_expiry_window(c.expiry, today))
            .collect();
        if by_type.is_empty() {
            return Err(no_suitable(underlying, option_type, "no expiry in the tradeable window"));
        }

        let liquid: Vec<&OptionContract> = by_type
            .into_iter()
            .filter(|c| self.passes_liquidity(c))
            .collect();
        if liquid.is_empty() {
            return Err(no_suitable(underlying, option_type, "no contract passed the liquidity filter"));
        }

        let target_strike = self.target_strike(underlying_price, option_type, expected_move_pct);
        let window = underlying_price.inner() * dec!(0.10);
        let windowed: Vec<&OptionContract> = liquid
            .into_iter()
            .filter(|c| (c.strike.inner() - target_strike).abs() <= window)
            .collect();
        if windowed.is_empty() {
            return Err(no_suitable(underlying, option_type, "no contract within the strike window"));
        }

        let iv_values: Vec<Decimal> = windowed.iter().filter_map(|c| c.implied_volatility).collect();

        let best = windowed
            .iter()
            .map(|c| (score(c, target_strike, &iv_values), *c))
            .max_by(|(a_score, a), (b_score, b)| {
                a_score
                    .partial_cmp(b_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.expiry.cmp(&b.expiry).reverse())
                    .then_with(|| {
                        a.spread_pct()
                            .unwrap_or(Decimal::MAX)
                            .partial_cmp(&b.spread_pct().unwrap_or(Decimal::MAX))
                            .unwrap_or(std::cmp::Ordering::Equal)
                            .reverse()
                    })
            })
            .map(|(_, c)| c.clone());

        let best = best.ok_or_else(|| no_suitable(underlying, option_type, "scoring produced no candidate"))?;
        debug!(trading_symbol = %best.trading_symbol, strike = %best.strike, "selected strike");
        Ok(best)
    }

    fn passes_liquidity(&self, c: &OptionContract) -> bool {
        c.open_interest.inner() >= self.config.min_oi
            && c.volume.inner() >= self.config.min_volume
            && c.spread_pct().map(|p| p <= self.config.max_spread_pct).unwrap_or(false)
            && c.last_price >= self.config.min_premium
            && c.last_price <= self.config.max_premium
    }

    fn target_strike(&self, spot: Price, option_type: OptionType, expected_move_pct: Decimal) -> Decimal {
        let spot = spot.inner();
        let otm_pct = match self.config.strike_mode {
            StrikeMode::Conservative => Decimal::ZERO,
            StrikeMode::Balanced if expected_move_pct < dec!(1.5) => Decimal::ZERO,
            StrikeMode::Balanced => dec!(0.01),
            StrikeMode::Aggressive => dec!(0.02),
        };
        match option_type {
            OptionType::Ce => spot * (dec!(1) + otm_pct),
            OptionType::Pe => spot * (dec!(1) - otm_pct),
        }
    }

}

/// Whether `expiry` falls within `[MIN_DAYS_TO_EXPIRY, MAX_DAYS_TO_EXPIRY]`
/// of `today`, per `spec.md` §4.9 step 2. Every expiry satisfying the
/// window survives into liquidity filtering and scoring — the "nearest
/// weekly" preference `spec.md` names is only a default target, realized
/// by the expiry tie-break in `select`'s scoring step, not a hard
/// pre-filter that collapses the chain to one expiry up front.
fn within_expiry_window(expiry: NaiveDate, today: NaiveDate) -> bool {
    let days = (expiry - today).num_days();
    days >= MIN_DAYS_TO_EXPIRY && days <= MAX_DAYS_TO_EXPIRY
}

fn no_suitable(underlying: &Symbol, option_type: OptionType, reason: &str) -> OptionsError {
    OptionsError::NoSuitableStrike {
        underlying: underlying.as_str().to_string(),
        option_type: option_type.to_string(),
        reason: reason.to_string(),
    }
}

/// `spec.md` §4.9 step 6. Every sub-score is clamped into `[0, 1]` before
/// the weighted sum so a single blown-out input (e.g. zero OI elsewhere in
/// the chain) can't push the combined score outside its natural range.
fn score(c: &OptionContract, target_strike: Decimal, chain_ivs: &[Decimal]) -> Decimal {
    let liquidity = liquidity_score(c);
    let delta_proximity = delta_proximity_score(c);
    let iv_rank = iv_rank_score(c, chain_ivs);
    let distance_to_target = distance_score(c, target_strike);
    let spread_tightness = spread_tightness_score(c);

    dec!(0.30) * liquidity
        + dec!(0.20) * delta_proximity
        + dec!(0.15) * iv_rank
        + dec!(0.25) * distance_to_target
        + dec!(0.10) * spread_tightness
}

/// Open interest saturates the score at 1.0 once it reaches this level;
/// anything below scales down linearly.
const LIQUIDITY_SATURATION_OI: Decimal = dec!(250_000);

fn liquidity_score(c: &OptionContract) -> Decimal {
    clamp01(c.open_interest.inner() / LIQUIDITY_SATURATION_OI)
}

fn delta_proximity_score(c: &OptionContract) -> Decimal {
    match c.delta {
        Some(delta) => clamp01(dec!(1) - (delta.abs() - dec!(0.5)).abs() * dec!(2)),
        None => dec!(0.5),
    }
}

/// Percentile rank of `c`'s IV within the windowed chain's IV distribution,
/// inverted (lower IV rank scores higher per the spec's "lower IV rank
/// better").
fn iv_rank_score(c: &OptionContract, chain_ivs: &[Decimal]) -> Decimal {
    let Some(iv) = c.implied_volatility else {
        return dec!(0.5);
    };
    if chain_ivs.len() < 2 {
        return dec!(0.5);
    }
    let below = chain_ivs.iter().filter(|&&v| v < iv).count();
    let rank = Decimal::from(below) / Decimal::from(chain_ivs.len() - 1).max(Decimal::from(1));
    clamp01(dec!(1) - rank)
}

fn distance_score(c: &OptionContract, target_strike: Decimal) -> Decimal {
    if target_strike.is_zero() {
        return dec!(0.5);
    }
    let normalized = (c.strike.inner() - target_strike).abs() / target_strike;
    clamp01(dec!(1) - normalized * dec!(10))
}

fn spread_tightness_score(c: &OptionContract) -> Decimal {
    match c.spread_pct() {
        Some(pct) => clamp01(dec!(1) - pct / dec!(10)),
        None => Decimal::ZERO,
    }
}

fn clamp01(v: Decimal) -> Decimal {
    v.max(Decimal::ZERO).min(dec!(1))
}

/// Qualitative hook kept for callers that want to log the strength behind
/// a selection decision; the scoring itself is strength-independent.
pub fn describe_strength(strength: SignalStrength) -> &'static str {
    match strength {
        SignalStrength::Weak => "weak",
        SignalStrength::Moderate => "moderate",
        SignalStrength::Strong => "strong",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_broker::MockBrokerClient;
    use optrade_core::Quantity;

    fn contract(strike: Decimal, oi: Decimal, volume: Decimal, bid: Decimal, ask: Decimal) -> OptionContract {
        OptionContract {
            underlying: Symbol::new("NIFTY"),
            trading_symbol: Symbol::new(format!("NIFTY{strike}CE")),
            strike: Price::new(strike),
            expiry: NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            option_type: OptionType::Ce,
            last_price: Price::new((bid + ask) / dec!(2)),
            bid: Price::new(bid),
            ask: Price::new(ask),
            open_interest: Quantity::new(oi),
            volume: Quantity::new(volume),
            implied_volatility: Some(dec!(14)),
            delta: Some(dec!(0.5)),
            lot_size: Quantity::new(dec!(50)),
        }
    }

    fn contract_with_expiry(
        strike: Decimal,
        oi: Decimal,
        volume: Decimal,
        bid: Decimal,
        ask: Decimal,
        expiry: NaiveDate,
    ) -> OptionContract {
        OptionContract { expiry, ..contract(strike, oi, volume, bid, ask) }
    }

    #[tokio::test]
    async fn test_select_prefers_earlier_expiry_on_tied_score() {
        let broker = MockBrokerClient::new();
        let earlier = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let later = NaiveDate::from_ymd_opt(2026, 8, 13).unwrap();
        // Identical strike/liquidity/iv/delta/spread on both expiries, so
        // the weighted score ties and the expiry tie-break decides.
        broker.push_chain(
            Symbol::new("NIFTY"),
            later,
            vec![
                contract_with_expiry(dec!(23500), dec!(100_000), dec!(20_000), dec!(98), dec!(102), later),
                contract_with_expiry(dec!(23500), dec!(100_000), dec!(20_000), dec!(98), dec!(102), earlier),
            ],
        );
        let selector = StrikeSelector::new(Arc::new(broker), StrikeSelectorConfig::default());
        let result = selector
            .select(
                &Symbol::new("NIFTY"),
                SignalAction::EnterLong,
                Price::new(dec!(23500)),
                dec!(1.0),
                "2026-08-03T04:30:00Z".parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(result.expiry, earlier);
    }

    #[tokio::test]
    async fn test_select_returns_highest_scoring_in_window() {
        let broker = MockBrokerClient::new();
        broker.push_chain(
            Symbol::new("NIFTY"),
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            vec![
                contract(dec!(23500), dec!(100_000), dec!(20_000), dec!(98), dec!(102)),
                contract(dec!(24500), dec!(100_000), dec!(20_000), dec!(48), dec!(52)),
            ],
        );
        let selector = StrikeSelector::new(Arc::new(broker), StrikeSelectorConfig::default());
        let result = selector
            .select(
                &Symbol::new("NIFTY"),
                SignalAction::EnterLong,
                Price::new(dec!(23500)),
                dec!(1.0),
                "2026-08-03T04:30:00Z".parse().unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(result.strike, Price::new(dec!(23500)));
    }

    #[tokio::test]
    async fn test_select_no_suitable_strike_when_chain_empty() {
        let broker = MockBrokerClient::new();
        let selector = StrikeSelector::new(Arc::new(broker), StrikeSelectorConfig::default());
        let err = selector
            .select(
                &Symbol::new("NIFTY"),
                SignalAction::EnterLong,
                Price::new(dec!(23500)),
                dec!(1.0),
                "2026-08-03T04:30:00Z".parse().unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OptionsError::NoSuitableStrike { .. }));
    }

    #[tokio::test]
    async fn test_select_excludes_illiquid_contracts() {
        let broker = MockBrokerClient::new();
        broker.push_chain(
            Symbol::new("NIFTY"),
            NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            vec![contract(dec!(23500), dec!(10), dec!(5), dec!(98), dec!(102))],
        );
        let selector = StrikeSelector::new(Arc::new(broker), StrikeSelectorConfig::default());
        let err = selector
            .select(
                &Symbol::new("NIFTY"),
                SignalAction::EnterLong,
                Price::new(dec!(23500)),
                dec!(1.0),
                "2026-08-03T04:30:00Z".parse().unwrap(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OptionsError::NoSuitableStrike { .. }));
    }

    #[test]
    fn test_target_strike_conservative_is_atm() {
        let config = StrikeSelectorConfig {
            strike_mode: StrikeMode::Conservative,
            ..Default::default()
        };
        let broker = MockBrokerClient::new();
        let selector = StrikeSelector::new(Arc::new(broker), config);
        let target = selector.target_strike(Price::new(dec!(23500)), OptionType::Ce, dec!(2.0));
        assert_eq!(target, dec!(23500));
    }

    #[test]
    fn test_target_strike_aggressive_is_2pct_otm_for_call() {
        let config = StrikeSelectorConfig {
            strike_mode: StrikeMode::Aggressive,
            ..Default::default()
        };
        let broker = MockBrokerClient::new();
        let selector = StrikeSelector::new(Arc::new(broker), config);
        let target = selector.target_strike(Price::new(dec!(23500)), OptionType::Ce, dec!(2.0));
        assert_eq!(target, dec!(23970));
    }
}
