//! The `Store` contract: the only way any other crate touches durable state.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use optrade_core::{Candle, OptionContract, Position, Price, Quantity, Signal, Symbol, Timeframe};
use uuid::Uuid;

/// Durable storage for candles, signals, positions and option chain
/// snapshots. Implementations must make `insert_signal` atomic with
/// respect to the `fingerprint` uniqueness check — two concurrent callers
/// racing to insert the same fingerprint must see exactly one `true` and
/// one `false`, never two `true`s.
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or overwrite a candle at its `(symbol, timeframe, bucket_start)`
    /// key. Used both for the first write and for in-place updates to a
    /// still-forming bucket.
    async fn upsert_candle(&self, candle: &Candle) -> Result<()>;

    /// Upsert every candle in `candles`. Idempotent: calling this twice
    /// with the same slice is equivalent to calling it once, since each
    /// candle upserts by its own `(symbol, timeframe, bucket_start)` key.
    /// Default implementation loops `upsert_candle`; a real backend may
    /// override with a single batched statement.
    async fn bulk_upsert_candles(&self, candles: &[Candle]) -> Result<()> {
        for candle in candles {
            self.upsert_candle(candle).await?;
        }
        Ok(())
    }

    /// Candles for `symbol`/`timeframe` with `bucket_start` in
    /// `[from, to)`, ordered ascending by `bucket_start`.
    async fn get_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// Most recent candle at or before `at` for the given timeframe, if any.
    async fn get_latest_candle(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    ) -> Result<Option<Candle>>;

    /// The last `n` finalized candles for `symbol`/`timeframe`, ascending
    /// by `bucket_start` (oldest first), as of `at`.
    async fn get_last_n_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        n: usize,
        at: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    /// Insert a signal under its idempotency fingerprint. Returns `true`
    /// if this call performed the insert, `false` if a signal with the
    /// same fingerprint already existed (the caller should treat the
    /// signal as a duplicate and not act on it again).
    async fn insert_signal(&self, signal: &Signal, fingerprint: &str) -> Result<bool>;

    async fn get_signal_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Signal>>;

    /// Lookup by primary key, used by `SignalManager::update` to read the
    /// current status before enforcing a monotonic transition and to build
    /// the full payload for the lifecycle event it publishes.
    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>>;

    /// Signals for `strategy`/`symbol` generated at or after `since`,
    /// newest first. Used for session-scoped dedup lookups.
    async fn signals_since(
        &self,
        strategy: &str,
        symbol: &Symbol,
        since: DateTime<Utc>,
    ) -> Result<Vec<Signal>>;

    async fn update_signal_status(
        &self,
        id: Uuid,
        status: optrade_core::SignalStatus,
        reason: Option<&str>,
    ) -> Result<()>;

    async fn insert_position(&self, position: &Position) -> Result<()>;

    async fn update_position(&self, position: &Position) -> Result<()>;

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>>;

    /// The at-most-one position for `signal_id`, if the executor has
    /// already opened one. Used for crash-safe idempotency: a restarted
    /// executor consults this before dispatching a `PROCESSING` signal
    /// again.
    async fn get_position_by_signal(&self, signal_id: Uuid) -> Result<Option<Position>>;

    async fn get_open_positions(&self) -> Result<Vec<Position>>;

    /// Replace the stored snapshot for `captured_at`; option snapshots are
    /// append-only per capture timestamp, never updated in place.
    async fn upsert_option_snapshot(
        &self,
        contract: &OptionContract,
        captured_at: DateTime<Utc>,
    ) -> Result<()>;

    /// The full chain for `underlying`, every expiry, as of the snapshot
    /// closest to (but not after) `as_of`. No `expiry` argument: a caller
    /// filters the returned chain down to the expiries it wants, the same
    /// shape as `BrokerClient::get_option_chain`.
    async fn get_option_chain(&self, underlying: &Symbol, as_of: DateTime<Utc>) -> Result<Vec<OptionContract>>;

    async fn insert_intraday_quote(
        &self,
        symbol: &Symbol,
        price: Price,
        volume: Quantity,
        ts: DateTime<Utc>,
    ) -> Result<()>;

    /// Atomically delete every row in the real-time/intraday quote table
    /// older than `today_start`. Historical candle/signal/position tables
    /// are untouched. Called once at orchestrator startup.
    async fn daily_intraday_reset(&self, today_start: DateTime<Utc>) -> Result<()>;
}
