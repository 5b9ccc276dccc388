//! Error types for optrade-data.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("store error: {0}")]
    Store(#[from] optrade_store::StoreError),

    #[error("broker error: {0}")]
    Broker(#[from] optrade_broker::BrokerError),

    #[error("assembler error: {0}")]
    Assembler(#[from] AssemblerError),
}

pub type Result<T> = std::result::Result<T, DataError>;

/// Reasons a `DataAssembler` refuses to hand a strategy a dataset. Carried
/// as a typed error rather than an empty `Vec` so a caller can't mistake
/// "not enough data" for "flat/empty data".
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblerError {
    #[error("merged dataset has {actual} candles, fewer than the {required} minimum for {symbol}")]
    InsufficientPeriods {
        symbol: String,
        actual: usize,
        required: usize,
    },

    #[error(
        "median inter-bucket gap {actual_secs}s for {symbol} is not within 10% of the {timeframe} timeframe ({expected_secs}s)"
    )]
    GapMismatch {
        symbol: String,
        timeframe: String,
        actual_secs: i64,
        expected_secs: i64,
    },

    #[error("no candles available for {symbol}")]
    DataUnavailable { symbol: String },
}
