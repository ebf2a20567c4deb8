//! Persistent canonical store of blocks, transactions, logs, cached-range
//! metadata, and contract-read results, behind one [`EventStore`] trait with
//! a Postgres and a SQLite backend. See [`store::EventStore`] for the
//! operations this crate provides; numeric fields wider than 64 bits are
//! stored as fixed-width big-endian [`byte_array::ByteArray`] so their byte
//! ordering matches their numeric ordering in both backends' indexes.

pub mod byte_array;
pub mod error;
pub mod model;
pub mod postgres;
mod query;
pub mod sqlite;
pub mod store;

pub use error::EventStoreError;
pub use postgres::PostgresEventStore;
pub use sqlite::SqliteEventStore;
pub use store::{EventStore, HistoricalBlockCache};
