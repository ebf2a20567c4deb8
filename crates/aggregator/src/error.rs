#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
    #[error("remote indexer request failed: {0}")]
    Rpc(#[from] ethrpc::RpcError),
    #[error("failed to convert a remote indexer event: {0}")]
    Conversion(#[from] chain_sync::ConversionError),
}
