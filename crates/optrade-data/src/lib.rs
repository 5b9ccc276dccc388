//! Historical candle caching and historical/live data assembly: the layer
//! a `Strategy` invocation reads through instead of touching `Store` or
//! `BrokerClient` directly.

mod assembler;
mod cache;
mod error;

pub use assembler::{AssemblerConfig, DataAssembler, Dataset};
pub use cache::{HistoricalCache, DEFAULT_REFRESH_TTL};
pub use error::{AssemblerError, DataError, Result};
