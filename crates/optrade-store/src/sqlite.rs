//! SQLite-backed `Store` implementation.

use crate::error::{Result, StoreError};
use crate::store::Store;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use optrade_core::option_contract::OptionType;
use optrade_core::position::{ExitReason, PositionMode, PositionStatus, WarningReason};
use optrade_core::{
    AssetClass, Candle, OptionContract, Position, Price, Quantity, Signal, SignalAction,
    SignalStatus, SignalStrength, Symbol, Timeframe,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

/// A `Store` backed by an embedded SQLite database, reachable from
/// multiple tokio tasks through a pooled connection.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if absent) the database at `path` and run pending
    /// migrations.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(StoreError::Database)?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(8)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory database, for tests.
    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn enum_str<T: std::fmt::Debug>(t: &T) -> String {
    format!("{t:?}")
}

fn parse_timeframe(s: &str) -> Result<Timeframe> {
    s.parse()
        .map_err(|e: String| StoreError::Decode(format!("bad timeframe {s}: {e}")))
}

fn candle_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Candle> {
    Ok(Candle {
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        timeframe: parse_timeframe(&row.try_get::<String, _>("timeframe")?)?,
        bucket_start: row.try_get::<DateTime<Utc>, _>("bucket_start")?,
        open: Price::new(Decimal::from_str(&row.try_get::<String, _>("open")?)?),
        high: Price::new(Decimal::from_str(&row.try_get::<String, _>("high")?)?),
        low: Price::new(Decimal::from_str(&row.try_get::<String, _>("low")?)?),
        close: Price::new(Decimal::from_str(&row.try_get::<String, _>("close")?)?),
        volume: Quantity::new(Decimal::from_str(&row.try_get::<String, _>("volume")?)?),
        tick_count: row.try_get::<i64, _>("tick_count")? as u32,
        finalized: row.try_get::<i64, _>("finalized")? != 0,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn upsert_candle(&self, candle: &Candle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO candles (symbol, timeframe, bucket_start, open, high, low, close, volume, tick_count, finalized)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (symbol, timeframe, bucket_start) DO UPDATE SET
                open = excluded.open,
                high = excluded.high,
                low = excluded.low,
                close = excluded.close,
                volume = excluded.volume,
                tick_count = excluded.tick_count,
                finalized = excluded.finalized
            "#,
        )
        .bind(candle.symbol.as_str())
        .bind(candle.timeframe.as_str())
        .bind(candle.bucket_start)
        .bind(candle.open.inner().to_string())
        .bind(candle.high.inner().to_string())
        .bind(candle.low.inner().to_string())
        .bind(candle.close.inner().to_string())
        .bind(candle.volume.inner().to_string())
        .bind(candle.tick_count as i64)
        .bind(candle.finalized as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn bulk_upsert_candles(&self, candles: &[Candle]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for candle in candles {
            sqlx::query(
                r#"
                INSERT INTO candles (symbol, timeframe, bucket_start, open, high, low, close, volume, tick_count, finalized)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (symbol, timeframe, bucket_start) DO UPDATE SET
                    open = excluded.open,
                    high = excluded.high,
                    low = excluded.low,
                    close = excluded.close,
                    volume = excluded.volume,
                    tick_count = excluded.tick_count,
                    finalized = excluded.finalized
                "#,
            )
            .bind(candle.symbol.as_str())
            .bind(candle.timeframe.as_str())
            .bind(candle.bucket_start)
            .bind(candle.open.inner().to_string())
            .bind(candle.high.inner().to_string())
            .bind(candle.low.inner().to_string())
            .bind(candle.close.inner().to_string())
            .bind(candle.volume.inner().to_string())
            .bind(candle.tick_count as i64)
            .bind(candle.finalized as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM candles
            WHERE symbol = ? AND timeframe = ? AND bucket_start >= ? AND bucket_start < ?
            ORDER BY bucket_start ASC
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.as_str())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(candle_from_row).collect()
    }

    async fn get_latest_candle(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        at: DateTime<Utc>,
    ) -> Result<Option<Candle>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM candles
            WHERE symbol = ? AND timeframe = ? AND bucket_start <= ?
            ORDER BY bucket_start DESC
            LIMIT 1
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.as_str())
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(candle_from_row).transpose()
    }

    async fn get_last_n_candles(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        n: usize,
        at: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM candles
            WHERE symbol = ? AND timeframe = ? AND bucket_start <= ? AND finalized = 1
            ORDER BY bucket_start DESC
            LIMIT ?
            "#,
        )
        .bind(symbol.as_str())
        .bind(timeframe.as_str())
        .bind(at)
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;
        let mut candles: Vec<Candle> = rows.iter().map(candle_from_row).collect::<Result<_>>()?;
        candles.reverse();
        Ok(candles)
    }

    async fn insert_signal(&self, signal: &Signal, fingerprint: &str) -> Result<bool> {
        let metadata = serde_json::to_string(&signal.metadata)?;
        let result = sqlx::query(
            r#"
            INSERT INTO signals
                (id, fingerprint, strategy_name, symbol, asset_class, action, strength,
                 reference_price, timeframe, target_price, stop_loss_price, expected_move_pct,
                 generated_at, status, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
        )
        .bind(signal.id.to_string())
        .bind(fingerprint)
        .bind(&signal.strategy_name)
        .bind(signal.symbol.as_str())
        .bind(enum_str(&signal.asset_class))
        .bind(enum_str(&signal.action))
        .bind(enum_str(&signal.strength))
        .bind(signal.reference_price.inner().to_string())
        .bind(signal.timeframe.as_str())
        .bind(signal.target_price.map(|p| p.inner().to_string()))
        .bind(signal.stop_loss_price.map(|p| p.inner().to_string()))
        .bind(signal.expected_move_pct.map(|p| p.to_string()))
        .bind(signal.generated_at)
        .bind(enum_str(&signal.status))
        .bind(metadata)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn get_signal_by_fingerprint(&self, fingerprint: &str) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT * FROM signals WHERE fingerprint = ?")
            .bind(fingerprint)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(signal_from_row).transpose()
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        let row = sqlx::query("SELECT * FROM signals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(signal_from_row).transpose()
    }

    async fn signals_since(
        &self,
        strategy: &str,
        symbol: &Symbol,
        since: DateTime<Utc>,
    ) -> Result<Vec<Signal>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM signals
            WHERE strategy_name = ? AND symbol = ? AND generated_at >= ?
            ORDER BY generated_at DESC
            "#,
        )
        .bind(strategy)
        .bind(symbol.as_str())
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(signal_from_row).collect()
    }

    async fn update_signal_status(
        &self,
        id: Uuid,
        status: SignalStatus,
        reason: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE signals SET status = ?, status_reason = ? WHERE id = ?")
            .bind(enum_str(&status))
            .bind(reason)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO positions
                (id, signal_id, strategy_name, symbol, asset_class, option_symbol, strike,
                 option_type, expiry, lot_size, mode, status, entry_price, quantity, stop_loss,
                 target, trailing_stop_pct, high_water_mark, opened_at, closed_at, exit_price,
                 exit_reason, warning_flag, warning_reason)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.id.to_string())
        .bind(position.signal_id.to_string())
        .bind(&position.strategy_name)
        .bind(position.symbol.as_str())
        .bind(enum_str(&position.asset_class))
        .bind(position.option_symbol.as_ref().map(|s| s.as_str()))
        .bind(position.strike.map(|p| p.inner().to_string()))
        .bind(position.option_type.as_ref().map(enum_str))
        .bind(position.expiry.map(|d| d.to_string()))
        .bind(position.lot_size.inner().to_string())
        .bind(enum_str(&position.mode))
        .bind(enum_str(&position.status))
        .bind(position.entry_price.inner().to_string())
        .bind(position.quantity.inner().to_string())
        .bind(position.stop_loss.map(|p| p.inner().to_string()))
        .bind(position.target.map(|p| p.inner().to_string()))
        .bind(position.trailing_stop_pct.map(|d| d.to_string()))
        .bind(position.high_water_mark.inner().to_string())
        .bind(position.opened_at)
        .bind(position.closed_at)
        .bind(position.exit_price.map(|p| p.inner().to_string()))
        .bind(position.exit_reason.as_ref().map(enum_str))
        .bind(position.warning_flag as i64)
        .bind(position.warning_reason.as_ref().map(enum_str))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_position(&self, position: &Position) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE positions SET
                status = ?, stop_loss = ?, target = ?, trailing_stop_pct = ?,
                high_water_mark = ?, closed_at = ?, exit_price = ?, exit_reason = ?,
                warning_flag = ?, warning_reason = ?
            WHERE id = ?
            "#,
        )
        .bind(enum_str(&position.status))
        .bind(position.stop_loss.map(|p| p.inner().to_string()))
        .bind(position.target.map(|p| p.inner().to_string()))
        .bind(position.trailing_stop_pct.map(|d| d.to_string()))
        .bind(position.high_water_mark.inner().to_string())
        .bind(position.closed_at)
        .bind(position.exit_price.map(|p| p.inner().to_string()))
        .bind(position.exit_reason.as_ref().map(enum_str))
        .bind(position.warning_flag as i64)
        .bind(position.warning_reason.as_ref().map(enum_str))
        .bind(position.id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_position(&self, id: Uuid) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn get_position_by_signal(&self, signal_id: Uuid) -> Result<Option<Position>> {
        let row = sqlx::query("SELECT * FROM positions WHERE signal_id = ?")
            .bind(signal_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(position_from_row).transpose()
    }

    async fn get_open_positions(&self) -> Result<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions WHERE status = 'Open'")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(position_from_row).collect()
    }

    async fn upsert_option_snapshot(
        &self,
        contract: &OptionContract,
        captured_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO option_snapshots
                (underlying, trading_symbol, strike, expiry, option_type, last_price, bid, ask,
                 open_interest, volume, implied_volatility, delta, lot_size, captured_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (trading_symbol, captured_at) DO UPDATE SET
                last_price = excluded.last_price,
                bid = excluded.bid,
                ask = excluded.ask,
                open_interest = excluded.open_interest,
                volume = excluded.volume,
                implied_volatility = excluded.implied_volatility,
                delta = excluded.delta
            "#,
        )
        .bind(contract.underlying.as_str())
        .bind(contract.trading_symbol.as_str())
        .bind(contract.strike.inner().to_string())
        .bind(contract.expiry.to_string())
        .bind(enum_str(&contract.option_type))
        .bind(contract.last_price.inner().to_string())
        .bind(contract.bid.inner().to_string())
        .bind(contract.ask.inner().to_string())
        .bind(contract.open_interest.inner().to_string())
        .bind(contract.volume.inner().to_string())
        .bind(contract.implied_volatility.map(|d| d.to_string()))
        .bind(contract.delta.map(|d| d.to_string()))
        .bind(contract.lot_size.inner().to_string())
        .bind(captured_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The full listed chain (every expiry) as of the snapshot closest to
    /// (but not after) `as_of` — mirrors `BrokerClient::get_option_chain`'s
    /// no-expiry-argument shape, since a caller filters expiries out of the
    /// returned chain rather than asking the store for one up front.
    async fn get_option_chain(&self, underlying: &Symbol, as_of: DateTime<Utc>) -> Result<Vec<OptionContract>> {
        let latest_capture: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            SELECT captured_at FROM option_snapshots
            WHERE underlying = ? AND captured_at <= ?
            ORDER BY captured_at DESC
            LIMIT 1
            "#,
        )
        .bind(underlying.as_str())
        .bind(as_of)
        .fetch_optional(&self.pool)
        .await?;
        let Some((captured_at,)) = latest_capture else {
            return Ok(vec![]);
        };
        let rows = sqlx::query("SELECT * FROM option_snapshots WHERE underlying = ? AND captured_at = ?")
            .bind(underlying.as_str())
            .bind(captured_at)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(option_contract_from_row).collect()
    }

    async fn insert_intraday_quote(
        &self,
        symbol: &Symbol,
        price: Price,
        volume: Quantity,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO intraday_quotes (symbol, ts, price, volume) VALUES (?, ?, ?, ?) \
             ON CONFLICT (symbol, ts) DO UPDATE SET price = excluded.price, volume = excluded.volume",
        )
        .bind(symbol.as_str())
        .bind(ts)
        .bind(price.inner().to_string())
        .bind(volume.inner().to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn daily_intraday_reset(&self, today_start: DateTime<Utc>) -> Result<()> {
        sqlx::query("DELETE FROM intraday_quotes WHERE ts < ?")
            .bind(today_start)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn signal_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Signal> {
    let metadata: BTreeMap<String, serde_json::Value> =
        serde_json::from_str(&row.try_get::<String, _>("metadata")?)?;
    Ok(Signal {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        strategy_name: row.try_get("strategy_name")?,
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        asset_class: parse_asset_class(&row.try_get::<String, _>("asset_class")?)?,
        action: parse_signal_action(&row.try_get::<String, _>("action")?)?,
        strength: parse_signal_strength(&row.try_get::<String, _>("strength")?)?,
        reference_price: Price::new(Decimal::from_str(
            &row.try_get::<String, _>("reference_price")?,
        )?),
        target_price: opt_decimal(row, "target_price")?.map(Price::new),
        stop_loss_price: opt_decimal(row, "stop_loss_price")?.map(Price::new),
        expected_move_pct: opt_decimal(row, "expected_move_pct")?,
        timeframe: parse_timeframe(&row.try_get::<String, _>("timeframe")?)?,
        generated_at: row.try_get("generated_at")?,
        status: parse_signal_status(&row.try_get::<String, _>("status")?)?,
        metadata,
    })
}

fn position_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Position> {
    Ok(Position {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        signal_id: Uuid::parse_str(&row.try_get::<String, _>("signal_id")?)
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        strategy_name: row.try_get("strategy_name")?,
        symbol: Symbol::new(row.try_get::<String, _>("symbol")?),
        asset_class: parse_asset_class(&row.try_get::<String, _>("asset_class")?)?,
        option_symbol: row
            .try_get::<Option<String>, _>("option_symbol")?
            .map(Symbol::new),
        strike: opt_decimal(row, "strike")?.map(Price::new),
        option_type: row
            .try_get::<Option<String>, _>("option_type")?
            .map(|s| parse_option_type(&s))
            .transpose()?,
        expiry: row
            .try_get::<Option<String>, _>("expiry")?
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        lot_size: Quantity::new(Decimal::from_str(&row.try_get::<String, _>("lot_size")?)?),
        mode: parse_position_mode(&row.try_get::<String, _>("mode")?)?,
        status: parse_position_status(&row.try_get::<String, _>("status")?)?,
        entry_price: Price::new(Decimal::from_str(&row.try_get::<String, _>("entry_price")?)?),
        quantity: Quantity::new(Decimal::from_str(&row.try_get::<String, _>("quantity")?)?),
        stop_loss: opt_decimal(row, "stop_loss")?.map(Price::new),
        target: opt_decimal(row, "target")?.map(Price::new),
        trailing_stop_pct: opt_decimal(row, "trailing_stop_pct")?,
        high_water_mark: Price::new(Decimal::from_str(
            &row.try_get::<String, _>("high_water_mark")?,
        )?),
        opened_at: row.try_get("opened_at")?,
        closed_at: row.try_get("closed_at")?,
        exit_price: opt_decimal(row, "exit_price")?.map(Price::new),
        exit_reason: row
            .try_get::<Option<String>, _>("exit_reason")?
            .map(|s| parse_exit_reason(&s))
            .transpose()?,
        warning_flag: row.try_get::<i64, _>("warning_flag")? != 0,
        warning_reason: row
            .try_get::<Option<String>, _>("warning_reason")?
            .map(|s| parse_warning_reason(&s))
            .transpose()?,
    })
}

fn opt_decimal(row: &sqlx::sqlite::SqliteRow, col: &str) -> Result<Option<Decimal>> {
    row.try_get::<Option<String>, _>(col)?
        .map(|s| Decimal::from_str(&s))
        .transpose()
        .map_err(StoreError::from)
}

fn option_contract_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OptionContract> {
    Ok(OptionContract {
        underlying: Symbol::new(row.try_get::<String, _>("underlying")?),
        trading_symbol: Symbol::new(row.try_get::<String, _>("trading_symbol")?),
        strike: Price::new(Decimal::from_str(&row.try_get::<String, _>("strike")?)?),
        expiry: NaiveDate::parse_from_str(&row.try_get::<String, _>("expiry")?, "%Y-%m-%d")
            .map_err(|e| StoreError::Decode(e.to_string()))?,
        option_type: parse_option_type(&row.try_get::<String, _>("option_type")?)?,
        last_price: Price::new(Decimal::from_str(&row.try_get::<String, _>("last_price")?)?),
        bid: Price::new(Decimal::from_str(&row.try_get::<String, _>("bid")?)?),
        ask: Price::new(Decimal::from_str(&row.try_get::<String, _>("ask")?)?),
        open_interest: Quantity::new(Decimal::from_str(
            &row.try_get::<String, _>("open_interest")?,
        )?),
        volume: Quantity::new(Decimal::from_str(&row.try_get::<String, _>("volume")?)?),
        implied_volatility: opt_decimal(row, "implied_volatility")?,
        delta: opt_decimal(row, "delta")?,
        lot_size: Quantity::new(Decimal::from_str(&row.try_get::<String, _>("lot_size")?)?),
    })
}

fn parse_asset_class(s: &str) -> Result<AssetClass> {
    match s {
        "Index" => Ok(AssetClass::Index),
        "Equity" => Ok(AssetClass::Equity),
        "Option" => Ok(AssetClass::Option),
        "Future" => Ok(AssetClass::Future),
        other => Err(StoreError::Decode(format!("unknown asset class {other}"))),
    }
}

fn parse_signal_action(s: &str) -> Result<SignalAction> {
    match s {
        "EnterLong" => Ok(SignalAction::EnterLong),
        "EnterShort" => Ok(SignalAction::EnterShort),
        other => Err(StoreError::Decode(format!("unknown signal action {other}"))),
    }
}

fn parse_signal_strength(s: &str) -> Result<SignalStrength> {
    match s {
        "Weak" => Ok(SignalStrength::Weak),
        "Moderate" => Ok(SignalStrength::Moderate),
        "Strong" => Ok(SignalStrength::Strong),
        other => Err(StoreError::Decode(format!("unknown signal strength {other}"))),
    }
}

fn parse_signal_status(s: &str) -> Result<SignalStatus> {
    match s {
        "New" => Ok(SignalStatus::New),
        "Processing" => Ok(SignalStatus::Processing),
        "Executed" => Ok(SignalStatus::Executed),
        "Rejected" => Ok(SignalStatus::Rejected),
        "Failed" => Ok(SignalStatus::Failed),
        "Expired" => Ok(SignalStatus::Expired),
        other => Err(StoreError::Decode(format!("unknown signal status {other}"))),
    }
}

fn parse_option_type(s: &str) -> Result<OptionType> {
    match s {
        "Ce" => Ok(OptionType::Ce),
        "Pe" => Ok(OptionType::Pe),
        other => Err(StoreError::Decode(format!("unknown option type {other}"))),
    }
}

fn parse_position_mode(s: &str) -> Result<PositionMode> {
    match s {
        "LogOnly" => Ok(PositionMode::LogOnly),
        "Paper" => Ok(PositionMode::Paper),
        "Live" => Ok(PositionMode::Live),
        other => Err(StoreError::Decode(format!("unknown position mode {other}"))),
    }
}

fn parse_position_status(s: &str) -> Result<PositionStatus> {
    match s {
        "Open" => Ok(PositionStatus::Open),
        "Closed" => Ok(PositionStatus::Closed),
        other => Err(StoreError::Decode(format!("unknown position status {other}"))),
    }
}

fn parse_exit_reason(s: &str) -> Result<ExitReason> {
    match s {
        "StopLoss" => Ok(ExitReason::StopLoss),
        "Target" => Ok(ExitReason::Target),
        "TrailingStop" => Ok(ExitReason::TrailingStop),
        "ExpiryApproaching" => Ok(ExitReason::ExpiryApproaching),
        "ManualClose" => Ok(ExitReason::ManualClose),
        "StrategyExit" => Ok(ExitReason::StrategyExit),
        other => Err(StoreError::Decode(format!("unknown exit reason {other}"))),
    }
}

fn parse_warning_reason(s: &str) -> Result<WarningReason> {
    match s {
        "ApproachingStopLoss" => Ok(WarningReason::ApproachingStopLoss),
        "ApproachingExpiry" => Ok(WarningReason::ApproachingExpiry),
        "LowLiquidity" => Ok(WarningReason::LowLiquidity),
        "StaleData" => Ok(WarningReason::StaleData),
        other => Err(StoreError::Decode(format!("unknown warning reason {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optrade_core::Candle;
    use rust_decimal_macros::dec;

    async fn store() -> SqliteStore {
        SqliteStore::in_memory().await.unwrap()
    }

    fn ts(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_and_get_candles() {
        let store = store().await;
        let candle = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M5,
            ts("2026-07-27T04:00:00Z"),
            Price::new(dec!(100)),
            Quantity::new(dec!(10)),
        );
        store.upsert_candle(&candle).await.unwrap();
        let got = store
            .get_candles(
                &Symbol::new("NIFTY"),
                Timeframe::M5,
                ts("2026-07-27T03:00:00Z"),
                ts("2026-07-27T05:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].close, Price::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_candle_upsert_overwrites_same_bucket() {
        let store = store().await;
        let mut candle = Candle::from_tick(
            Symbol::new("NIFTY"),
            Timeframe::M5,
            ts("2026-07-27T04:00:00Z"),
            Price::new(dec!(100)),
            Quantity::new(dec!(10)),
        );
        store.upsert_candle(&candle).await.unwrap();
        candle.absorb_tick(Price::new(dec!(110)), Quantity::new(dec!(5)));
        store.upsert_candle(&candle).await.unwrap();
        let got = store
            .get_candles(
                &Symbol::new("NIFTY"),
                Timeframe::M5,
                ts("2026-07-27T03:00:00Z"),
                ts("2026-07-27T05:00:00Z"),
            )
            .await
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].close, Price::new(dec!(110)));
        assert_eq!(got[0].tick_count, 2);
    }

    #[tokio::test]
    async fn test_insert_signal_idempotent_on_fingerprint() {
        let store = store().await;
        let signal = Signal::new(
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            SignalAction::EnterLong,
            SignalStrength::Strong,
            Price::new(dec!(23500)),
            Timeframe::M15,
            ts("2026-07-27T04:30:00Z"),
        );
        let first = store.insert_signal(&signal, "fp-1").await.unwrap();
        let second = store.insert_signal(&signal, "fp-1").await.unwrap();
        assert!(first);
        assert!(!second);
    }

    #[tokio::test]
    async fn test_position_insert_update_and_open_query() {
        let store = store().await;
        let position = Position::open(
            Uuid::new_v4(),
            "moving_average_cross",
            Symbol::new("NIFTY"),
            AssetClass::Index,
            optrade_core::PositionMode::Paper,
            Price::new(dec!(23500)),
            Quantity::new(dec!(50)),
            ts("2026-07-27T04:30:00Z"),
        );
        store.insert_position(&position).await.unwrap();
        let open = store.get_open_positions().await.unwrap();
        assert_eq!(open.len(), 1);

        let mut closed = position.clone();
        closed.close(
            Price::new(dec!(23700)),
            optrade_core::ExitReason::Target,
            ts("2026-07-27T05:00:00Z"),
        );
        store.update_position(&closed).await.unwrap();
        let open = store.get_open_positions().await.unwrap();
        assert!(open.is_empty());
        let fetched = store.get_position(position.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, optrade_core::PositionStatus::Closed);
    }

    #[tokio::test]
    async fn test_option_chain_returns_latest_snapshot_only() {
        let store = store().await;
        let mut contract = OptionContract {
            underlying: Symbol::new("NIFTY"),
            trading_symbol: Symbol::new("NIFTY24JUL23500CE"),
            strike: Price::new(dec!(23500)),
            expiry: NaiveDate::from_ymd_opt(2026, 7, 30).unwrap(),
            option_type: OptionType::Ce,
            last_price: Price::new(dec!(100)),
            bid: Price::new(dec!(98)),
            ask: Price::new(dec!(102)),
            open_interest: Quantity::new(dec!(1000)),
            volume: Quantity::new(dec!(500)),
            implied_volatility: None,
            delta: None,
            lot_size: Quantity::new(dec!(50)),
        };
        store
            .upsert_option_snapshot(&contract, ts("2026-07-27T04:00:00Z"))
            .await
            .unwrap();
        contract.last_price = Price::new(dec!(105));
        store
            .upsert_option_snapshot(&contract, ts("2026-07-27T04:15:00Z"))
            .await
            .unwrap();

        let chain = store
            .get_option_chain(&Symbol::new("NIFTY"), ts("2026-07-27T05:00:00Z"))
            .await
            .unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].last_price, Price::new(dec!(105)));
    }
}
