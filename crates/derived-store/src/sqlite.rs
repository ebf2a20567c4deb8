//! `DerivedStore` backed by SQLite, mirroring [`crate::postgres`].

use {
    crate::{
        error::DerivedStoreError,
        model::EntityRow,
        store::{DerivedStore, DerivedStoreTransaction},
    },
    sqlx::{Executor, Row, Sqlite, SqlitePool},
};

#[derive(Clone)]
pub struct SqliteDerivedStore {
    pool: SqlitePool,
}

impl SqliteDerivedStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DerivedStore for SqliteDerivedStore {
    async fn migrate(&self) -> Result<(), DerivedStoreError> {
        sqlx::migrate!("./migrations/sqlite").run(&self.pool).await?;
        Ok(())
    }

    async fn transaction(
        &self,
        at_timestamp: i64,
    ) -> Result<Box<dyn DerivedStoreTransaction>, DerivedStoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteDerivedStoreTransaction {
            tx: Some(tx),
            at_timestamp,
        }))
    }

    async fn rollback_to(&self, timestamp: i64) -> Result<(), DerivedStoreError> {
        let mut tx = self.pool.begin().await?;
        rollback_to(&mut tx, timestamp).await?;
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
             = ? AND id = ? AND valid_to IS NULL",
        )
        .bind(entity_name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(row_to_entity))
    }
}

async fn rollback_to(
    tx: &mut sqlx::Transaction<'_, Sqlite>,
    timestamp: i64,
) -> Result<(), DerivedStoreError> {
    tx.execute(sqlx::query("DELETE FROM entities WHERE valid_from > ?").bind(timestamp))
        .await?;
    tx.execute(
        sqlx::query("UPDATE entities SET valid_to = NULL WHERE valid_to > ?").bind(timestamp),
    )
    .await?;
    Ok(())
}

fn row_to_entity(row: sqlx::sqlite::SqliteRow) -> EntityRow {
    let data_text: String = row.get("data");
    EntityRow {
        entity_name: row.get("entity_name"),
        id: row.get("id"),
        data: serde_json::from_str(&data_text).unwrap_or(serde_json::Value::Null),
        valid_from: row.get("valid_from"),
        valid_to: row.get("valid_to"),
    }
}

struct SqliteDerivedStoreTransaction {
    tx: Option<sqlx::Transaction<'static, Sqlite>>,
    at_timestamp: i64,
}

impl SqliteDerivedStoreTransaction {
    fn tx(&mut self) -> Result<&mut sqlx::Transaction<'static, Sqlite>, DerivedStoreError> {
        self.tx.as_mut().ok_or(DerivedStoreError::TransactionClosed)
    }

    async fn close_live_row(
        tx: &mut sqlx::Transaction<'static, Sqlite>,
        entity_name: &str,
        id: &[u8],
        valid_from: i64,
    ) -> Result<(), DerivedStoreError> {
        tx.execute(
            sqlx::query(
                "UPDATE entities SET valid_to = ? WHERE entity_name = ? AND id = ? AND valid_to \
                 IS NULL",
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
impl DerivedStoreTransaction for SqliteDerivedStoreTransaction {
    async fn get(&mut self, entity_name: &str, id: &[u8]) -> Result<Option<EntityRow>, DerivedStoreError> {
        let at_timestamp = self.at_timestamp;
        let tx = self.tx()?;
        let row = sqlx::query(
            "SELECT entity_name, id, data, valid_from, valid_to FROM entities WHERE entity_name \
             = ? AND id = ? AND valid_from <= ? AND (valid_to IS NULL OR valid_to > ?) ORDER BY \
             valid_from DESC LIMIT 1",
        )
        .bind(entity_name)
        .bind(id)
        .bind(at_timestamp)
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
                "INSERT INTO entities (entity_name, id, data, valid_from, valid_to) VALUES (?, \
                 ?, ?, ?, NULL)",
            )
            .bind(entity_name)
            .bind(id)
            .bind(data.to_string())
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

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteDerivedStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteDerivedStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn upsert_then_rollback_restores_prior_version() {
        let store = setup().await;

        let mut tx = store.transaction(500).await.unwrap();
        tx.upsert("Account", b"0xA", serde_json::json!({"balance": 100}), 500)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.transaction(700).await.unwrap();
        tx.upsert("Account", b"0xA", serde_json::json!({"balance": 150}), 700)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        store.rollback_to(600).await.unwrap();

        let live = store.get_live("Account", b"0xA").await.unwrap().unwrap();
        assert_eq!(live.data, serde_json::json!({"balance": 100}));
        assert!(live.valid_to.is_none());
    }

    #[tokio::test]
    async fn failed_handler_rolls_back_the_whole_page() {
        let store = setup().await;
        let mut tx = store.transaction(100).await.unwrap();
        tx.upsert("Account", b"0xA", serde_json::json!({"balance": 1}), 100)
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert!(store.get_live("Account", b"0xA").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reset_clears_every_row() {
        let store = setup().await;
        let mut tx = store.transaction(100).await.unwrap();
        tx.upsert("Account", b"0xA", serde_json::json!({"balance": 1}), 100)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        store.reset().await.unwrap();
        assert!(store.get_live("Account", b"0xA").await.unwrap().is_none());
    }
}
