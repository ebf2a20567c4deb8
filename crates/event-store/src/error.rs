#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    /// A log's block or transaction was missing from the store during a
    /// join. Per the event iteration contract this is a fatal invariant
    /// violation, never a retryable condition.
    #[error("log {log_id:?} is missing its {what} (fatal invariant violation)")]
    JoinMiss {
        log_id: crate::model::LogId,
        what: &'static str,
    },
}
