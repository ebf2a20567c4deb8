#[derive(Debug, thiserror::Error)]
pub enum RealtimeSyncError {
    #[error("event store error: {0}")]
    EventStore(#[from] event_store::EventStoreError),
    #[error("rpc error: {0}")]
    Rpc(#[from] ethrpc::RpcError),
    #[error("failed to convert a fetched block or log: {0}")]
    Conversion(#[from] chain_sync::ConversionError),
    /// The incoming chain forked further back than any block still held in
    /// `unfinalizedBlocks` — beyond `finalityBlockCount`. Per §4.3 this is a
    /// fatal invariant violation, never a retryable condition.
    #[error("reorg at block {block_number} has no common ancestor within the unfinalized window")]
    DeepReorg { block_number: i64 },
}
