use crate::{error::DerivedStoreError, model::EntityRow};

/// Capability set `{migrate, rollback, reset, transaction}` implemented by
/// both concrete backends (§9 "Polymorphic stores").
#[async_trait::async_trait]
pub trait DerivedStore: Send + Sync {
    async fn migrate(&self) -> Result<(), DerivedStoreError>;

    /// Opens a transaction the handler pipeline drives for one event page:
    /// reads see only rows live as of `at_timestamp`; writes are staged
    /// until [`DerivedStoreTransaction::commit`].
    async fn transaction(
        &self,
        at_timestamp: i64,
    ) -> Result<Box<dyn DerivedStoreTransaction>, DerivedStoreError>;

    /// Reorg rollback (§3, §4.5 step 2): deletes rows with `validFrom > t`
    /// and reopens (`validTo = ∞`) rows whose `validTo > t`.
    async fn rollback_to(&self, timestamp: i64) -> Result<(), DerivedStoreError>;

    /// Hot-reload reset (§4.5 `reset`): clears every row.
    async fn reset(&self) -> Result<(), DerivedStoreError>;

    /// Read-only access for a `contracts`-style view or inspection outside
    /// a transaction (e.g. tests, the HTTP server this spec doesn't own).
    async fn get_live(&self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, DerivedStoreError>;
}

#[async_trait::async_trait]
pub trait DerivedStoreTransaction: Send {
    async fn get(&mut self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, DerivedStoreError>;

    /// Closes the current live row (if any) at `valid_from` and inserts a
    /// new live row. A handler calling this twice for the same id within
    /// one transaction simply supersedes its own prior write.
    async fn upsert(
        &mut self,
        entity_name: &str,
        id: &[u8],
        data: serde_json::Value,
        valid_from: i64,
    ) -> Result<(), DerivedStoreError>;

    async fn delete(&mut self, entity_name: &str, id: &[u8], valid_from: i64) -> Result<(), DerivedStoreError>;

    async fn commit(self: Box<Self>) -> Result<(), DerivedStoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), DerivedStoreError>;
}
