//! `DerivedStore` backed by Postgres, mirroring [`crate::sqlite`].

use {
    crate::{
        error::DerivedStoreError,
        model::EntityRow,
        store::{DerivedStore, DerivedStoreTransaction},
    },
    sqlx::{Executor, PgPool, Postgres, Row},
};

#[derive(Clone)]
pub struct PostgresDerivedStore {
    pool: PgPool,
}

impl PostgresDerivedStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DerivedStore for PostgresDerivedStore {
    async fn migrate(&self) -> Result<(), DerivedStoreError> {
        sqlx::migrate!("./migrations/postgres").run(&self.pool).await?;
        Ok(())
    }

    async fn transaction(
        &self,
        at_timestamp: i64,
    ) -> Result<Box<dyn DerivedStoreTransaction>, DerivedStoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresDerivedStoreTransaction {
            tx: Some(tx),
            at_timestamp,
        }))
    }

    async fn rollback_to(&self, timestamp: i64) -> Result<(), DerivedStoreError> {
        let mut tx = self.pool.begin().await?;
        tx.execute(sqlx::query("DELETE FROM entities WHERE valid_from > $1").bind(timestamp))
            .await?;
        tx.execute(
            sqlx::query("UPDATE entities SET valid_to = NULL WHERE valid_to > $1").bind(timestamp),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), DerivedStoreError> {
        self.pool.execute("DELETE FROM entities").await?;
        Ok(())
    }

    async fn get_live(&self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, DerivedStoreError> {
        let row = sqlx::query(
            "SELECT entity_name, id, data, valid_from, valid_to FROM entities WHERE entity_name \
             = $1 AND id = $2 AND valid_to IS NULL",
        )
        .bind(entity_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_entity))
    }
}

fn row_to_entity(row: sqlx::postgres::PgRow) -> EntityRow {
    EntityRow {
        entity_name: row.get("entity_name"),
        id: row.get("id"),
        data: row.get("data"),
        valid_from: row.get("valid_from"),
        valid_to: row.get("valid_to"),
    }
}

struct PostgresDerivedStoreTransaction {
    tx: Option<sqlx::Transaction<'static, Postgres>>,
    at_timestamp: i64,
}

impl PostgresDerivedStoreTransaction {
    fn tx(&mut self) -> Result<&mut sqlx::Transaction<'static, Postgres>, DerivedStoreError> {
        self.tx.as_mut().ok_or(DerivedStoreError::TransactionClosed)
    }

    async fn close_live_row(
        tx: &mut sqlx::Transaction<'static, Postgres>,
        entity_name: &str,
        id: &[u8],
        valid_from: i64,
    ) -> Result<(), DerivedStoreError> {
        tx.execute(
            sqlx::query(
                "UPDATE entities SET valid_to = $1 WHERE entity_name = $2 AND id = $3 AND \
                 valid_to IS NULL",
            )
            .bind(valid_from)
            .bind(entity_name)
            .bind(id),
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DerivedStoreTransaction for PostgresDerivedStoreTransaction {
    async fn get(&mut self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, DerivedStoreError> {
        let at_timestamp = self.at_timestamp;
        let tx = self.tx()?;
        let row = sqlx::query(
            "SELECT entity_name, id, data, valid_from, valid_to FROM entities WHERE entity_name \
             = $1 AND id = $2 AND valid_from <= $3 AND (valid_to IS NULL OR valid_to > $3) ORDER \
             BY valid_from DESC LIMIT 1",
        )
        .bind(entity_name)
        .bind(id)
        .bind(at_timestamp)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(row_to_entity))
    }

    async fn upsert(
        &mut self,
        entity_name: &str,
        id: &[u8],
        data: serde_json::Value,
        valid_from: i64,
    ) -> Result<(), DerivedStoreError> {
        {
            let tx = self.tx()?;
            Self::close_live_row(tx, entity_name, id, valid_from).await?;
        }
        let tx = self.tx()?;
        tx.execute(
            sqlx::query(
                "INSERT INTO entities (entity_name, id, data, valid_from, valid_to) VALUES ($1, \
                 $2, $3, $4, NULL)",
            )
            .bind(entity_name)
            .bind(id)
            .bind(data)
            .bind(valid_from),
        )
        .await?;
        Ok(())
    }

    async fn delete(&mut self, entity_name: &str, id: &[u8], valid_from: i64) -> Result<(), DerivedStoreError> {
        let tx = self.tx()?;
        Self::close_live_row(tx, entity_name, id, valid_from).await
    }

    async fn commit(mut self: Box<Self>) -> Result<(), DerivedStoreError> {
        let tx = self.tx.take().ok_or(DerivedStoreError::TransactionClosed)?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), DerivedStoreError> {
        let tx = self.tx.take().ok_or(DerivedStoreError::TransactionClosed)?;
        tx.rollback().await?;
        Ok(())
    }
}
