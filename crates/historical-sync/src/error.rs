#[derive(Debug, thiserror::Error)]
pub enum HistoricalSyncError {
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
    #[error("rpc error: {0}")]
    Rpc(#[from] ethrpc::RpcError),
    #[error("failed to convert a fetched block or log: {0}")]
    Conversion(#[from] chain_sync::ConversionError),
}
