#[derive(Debug, thiserror::Error)]
pub enum HandlerPipelineError {
    #[error("derived store error: {0}")]
    DerivedStore(#[from] derived_store::DerivedStoreError),
    #[error("aggregator error: {0}")]
    Aggregator(#[from] aggregator::AggregatorError),
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
    #[error("rpc error: {0}")]
    Rpc(#[from] ethrpc::RpcError),
    #[error("failed to decode an eth_call result: {0}")]
    Conversion(#[from] chain_sync::ConversionError),
}
