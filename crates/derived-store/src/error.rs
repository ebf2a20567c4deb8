#[derive(Debug, thiserror::Error)]
pub enum DerivedStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("derived store transaction already committed or rolled back")]
    TransactionClosed,
}
