//! `AppConfig`: every key `spec.md` §6 lists the core as recognizing,
//! loaded from TOML the way the teacher's `hip3-bot::config::AppConfig`
//! loads — CLI `--config` flag, then the `OPTRADE_CONFIG` env var, then
//! `config/default.toml`, generalizing the teacher's `HIP3_CONFIG`
//! env-var-then-default-path rule.

use crate::error::{AppError, AppResult};
use chrono::NaiveDate;
use optrade_core::position::PositionMode;
use optrade_options::StrikeMode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

fn default_config_path() -> String {
    std::env::var("OPTRADE_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlite DSN, e.g. `data/optrade.db` or `sqlite::memory:`.
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/optrade.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub base_url: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.broker.invalid".to_string(),
            api_key: String::new(),
            api_secret: String::new(),
        }
    }
}

/// Per-asset-class symbol universe, `spec.md` §6
/// `symbols.{indices,equities,options,futures,commodities}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolsConfig {
    pub indices: Vec<String>,
    pub equities: Vec<String>,
    pub options: Vec<String>,
    pub futures: Vec<String>,
    pub commodities: Vec<String>,
}

/// `runners.<asset>.interval_seconds`, keyed by the asset-class name
/// (`index`, `equity`, `option`, `future`, `commodity`). A missing entry
/// falls back to `RunnerConfig::new`'s per-asset-class default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub interval_seconds: Option<u64>,
}

/// `strategies.<name>.{enabled, symbols, timeframe, lookback_periods,
/// min_periods, parameters{…}, supported_asset_classes}`. `parameters` is
/// untyped at this layer since strategy numerics are out of scope
/// (`spec.md` §1) — the one shipped strategy reads `fast_period`/
/// `slow_period` out of it itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategySettings {
    pub enabled: bool,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub lookback_periods: usize,
    pub min_periods: usize,
    pub parameters: HashMap<String, toml::Value>,
    pub supported_asset_classes: Vec<optrade_core::AssetClass>,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            symbols: Vec::new(),
            timeframe: "15m".to_string(),
            lookback_periods: 100,
            min_periods: 20,
            parameters: HashMap::new(),
            supported_asset_classes: vec![optrade_core::AssetClass::Index],
        }
    }
}

impl StrategySettings {
    pub fn param_usize(&self, key: &str, default: usize) -> usize {
        self.parameters
            .get(key)
            .and_then(|v| v.as_integer())
            .map(|n| n as usize)
            .unwrap_or(default)
    }
}

/// `options.{…}`, `spec.md` §6. Covers sizing, strike selection, and exit
/// parameters the Executor and StrikeSelector need. `capital` is an
/// addition `spec.md` itself does not name a key for (its sizing formula
/// is entirely percentage-of-capital, but never says where the capital
/// figure comes from); it is read from here, defaulting to a conservative
/// placeholder, and should be the first thing an operator overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionsSettings {
    pub capital: rust_decimal::Decimal,
    pub max_concurrent_positions: usize,
    pub risk_pct: rust_decimal::Decimal,
    pub max_position_pct: rust_decimal::Decimal,
    pub stop_loss_pct: rust_decimal::Decimal,
    pub target_pct: rust_decimal::Decimal,
    pub max_lots_per_trade: u64,
    pub min_oi: rust_decimal::Decimal,
    pub min_volume: rust_decimal::Decimal,
    pub max_spread_pct: rust_decimal::Decimal,
    pub min_premium: rust_decimal::Decimal,
    pub max_premium: rust_decimal::Decimal,
    pub strike_mode: StrikeMode,
    pub expiry_cutoff_min: i64,
    pub trail_trigger_pct: Option<rust_decimal::Decimal>,
}

impl Default for OptionsSettings {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            capital: dec!(1_000_000),
            max_concurrent_positions: 10,
            risk_pct: dec!(0.01),
            max_position_pct: dec!(0.2),
            stop_loss_pct: dec!(0.3),
            target_pct: dec!(0.6),
            max_lots_per_trade: 10,
            min_oi: dec!(10_000),
            min_volume: dec!(1_000),
            max_spread_pct: dec!(5),
            min_premium: dec!(5),
            max_premium: dec!(500),
            strike_mode: StrikeMode::Balanced,
            expiry_cutoff_min: 60,
            trail_trigger_pct: None,
        }
    }
}

/// `market.{open, close, timezone, weekdays, holidays}`. `open`/`close`/
/// `timezone`/`weekdays` are accepted and validated against the
/// hard-coded NSE session (09:15-15:30 IST, Mon-Fri) that
/// `optrade_core::MarketCalendar` implements; a mismatch is a config
/// error rather than a silently-ignored override, since the calendar has
/// no mechanism to actually honor a different session. `holidays` is the
/// one field that does feed the calendar, via `HolidayTable`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketSettings {
    pub open: String,
    pub close: String,
    pub timezone: String,
    pub weekdays: Vec<String>,
    pub holidays: Vec<NaiveDate>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            open: "09:15".to_string(),
            close: "15:30".to_string(),
            timezone: "Asia/Kolkata".to_string(),
            weekdays: vec![
                "Mon".to_string(),
                "Tue".to_string(),
                "Wed".to_string(),
                "Thu".to_string(),
                "Fri".to_string(),
            ],
            holidays: Vec::new(),
        }
    }
}

impl MarketSettings {
    fn validate(&self) -> AppResult<()> {
        if self.open != "09:15" || self.close != "15:30" {
            return Err(AppError::Config(format!(
                "market.open/close must be 09:15/15:30 (the only session optrade_core::MarketCalendar implements), got {}/{}",
                self.open, self.close
            )));
        }
        if self.timezone != "Asia/Kolkata" {
            return Err(AppError::Config(format!(
                "market.timezone must be Asia/Kolkata, got {}",
                self.timezone
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub refresh_ttl_seconds: i64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            refresh_ttl_seconds: 300,
        }
    }
}

/// Where the ambient `/metrics` scrape endpoint listens (`spec.md` §9).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub listen_addr: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mode: PositionMode,
    /// Master trading gate `spec.md` §7's `ValidationFailure` cites as
    /// "trading enabled in config". `false` lets the Orchestrator run every
    /// supervised loop (signals still get generated and logged) while the
    /// Executor's `RiskGate` refuses every dispatch — a kill switch short of
    /// stopping the process.
    pub trading_enabled: bool,
    pub database: DatabaseConfig,
    pub broker: BrokerConfig,
    pub symbols: SymbolsConfig,
    pub runners: HashMap<String, RunnerSettings>,
    pub strategies: HashMap<String, StrategySettings>,
    pub options: OptionsSettings,
    pub market: MarketSettings,
    pub cache: CacheSettings,
    pub metrics: MetricsSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: PositionMode::LogOnly,
            trading_enabled: true,
            database: DatabaseConfig::default(),
            broker: BrokerConfig::default(),
            symbols: SymbolsConfig::default(),
            runners: HashMap::new(),
            strategies: HashMap::new(),
            options: OptionsSettings::default(),
            market: MarketSettings::default(),
            cache: CacheSettings::default(),
            metrics: MetricsSettings::default(),
        }
    }
}

impl AppConfig {
    /// CLI flag > `OPTRADE_CONFIG` env var > `config/default.toml`.
    pub fn load(cli_path: Option<&str>) -> AppResult<Self> {
        let path = cli_path
            .map(str::to_string)
            .unwrap_or_else(default_config_path);
        if Path::new(&path).exists() {
            Self::from_file(&path)
        } else {
            tracing::warn!(path = %path, "config file not found, using defaults");
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("failed to read config at {path}: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("failed to parse config at {path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        self.market.validate()?;
        if self.broker.base_url.is_empty() {
            return Err(AppError::Config("broker.base_url must not be empty".to_string()));
        }
        Ok(())
    }
}
