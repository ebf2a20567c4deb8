//! Transactional user-facing entity store, versioned for reorg rollback
//! (§4.5, §3 "Derived entity row"). Two backends behind one [`DerivedStore`]
//! trait object, mirroring [`event_store::EventStore`].

pub mod error;
pub mod model;
pub mod postgres;
pub mod sqlite;
pub mod store;

pub use {
    error::DerivedStoreError,
    model::EntityRow,
    postgres::PostgresDerivedStore,
    sqlite::SqliteDerivedStore,
    store::{DerivedStore, DerivedStoreTransaction},
};
