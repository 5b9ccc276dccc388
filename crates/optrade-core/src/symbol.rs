//! Identifiers for instruments and asset classes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-level instrument classification. Drives which runner polls an
/// asset and which fields on `OptionContract`/`Position` apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Index,
    Equity,
    Option,
    Future,
    Commodity,
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Index => "index",
            Self::Equity => "equity",
            Self::Option => "option",
            Self::Future => "future",
            Self::Commodity => "commodity",
        };
        write!(f, "{s}")
    }
}

/// A tradable instrument's exchange symbol, e.g. `NIFTY`, `RELIANCE`, or a
/// broker-normalized option symbol such as `NIFTY24JUL23500CE`.
///
/// Kept as a thin wrapper rather than a bare `String` so call sites can't
/// accidentally pass a raw display string where a validated symbol is
/// expected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}
