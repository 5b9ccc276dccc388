//! Durable storage for candles, signals, positions and option chain
//! snapshots, behind a `Store` trait so the rest of the workspace never
//! depends on SQLite directly.

pub mod error;
pub mod mock;
pub mod sqlite;
pub mod store;

pub use error::{Result, StoreError};
pub use mock::MockStore;
pub use sqlite::SqliteStore;
pub use store::Store;
