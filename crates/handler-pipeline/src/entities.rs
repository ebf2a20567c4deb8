//! The per-event transactional `entities` view handed to a handler (§4.5):
//! a narrowed [`derived_store::DerivedStoreTransaction`] that pins
//! `valid_from` to the event's timestamp so handler code never has to thread
//! it through every call.

use {crate::error::HandlerPipelineError, derived_store::DerivedStoreTransaction, derived_store::EntityRow};

#[async_trait::async_trait]
pub trait EntitiesView: Send {
    async fn get(&mut self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, HandlerPipelineError>;

    async fn upsert(
        &mut self,
        entity_name: &str,
        id: &[u8],
        data: serde_json::Value,
    ) -> Result<(), HandlerPipelineError>;

    async fn delete(&mut self, entity_name: &str, id: &[u8]) -> Result<(), HandlerPipelineError>;
}

pub struct TransactionalEntitiesView<'a> {
    tx: &'a mut dyn DerivedStoreTransaction,
    valid_from: i64,
}

impl<'a> TransactionalEntitiesView<'a> {
    pub fn new(tx: &'a mut dyn DerivedStoreTransaction, valid_from: i64) -> Self {
        Self { tx, valid_from }
    }
}

#[async_trait::async_trait]
impl EntitiesView for TransactionalEntitiesView<'_> {
    async fn get(&mut self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, HandlerPipelineError> {
        Ok(self.tx.get(entity_name, id).await?)
    }

    async fn upsert(
        &mut self,
        entity_name: &str,
        id: &[u8],
        data: serde_json::Value,
    ) -> Result<(), HandlerPipelineError> {
        Ok(self.tx.upsert(entity_name, id, data, self.valid_from).await?)
    }

    async fn delete(&mut self, entity_name: &str, id: &[u8]) -> Result<(), HandlerPipelineError> {
        Ok(self.tx.delete(entity_name, id, self.valid_from).await?)
    }
}
