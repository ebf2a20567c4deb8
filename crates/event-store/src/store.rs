use crate::{
    error::EventStoreError,
    model::{
        Address, Block, CachedRange, ContractReadResult, EventPage, FilterKey,
        GetLogEventsQuery, Log, Transaction,
    },
};

/// Bookkeeping passed alongside a historical block insert so the store can
/// also record the `CachedRange` this block's range contributes to.
#[derive(Clone, Copy, Debug)]
pub struct HistoricalBlockCache {
    pub filter_key: FilterKey,
    pub block_number_to_cache_from: i64,
}

/// Capability set `{migrate, the operations of the event store}` implemented
/// by both concrete backends. Callers hold an `Arc<dyn EventStore>` and never
/// see which backend they're talking to.
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn migrate(&self) -> Result<(), EventStoreError>;

    /// Idempotent insert keyed on log `id`; conflicts silently ignored.
    async fn insert_historical_logs(
        &self,
        chain_id: i64,
        logs: &[Log],
    ) -> Result<(), EventStoreError>;

    /// Atomic: inserts block+transactions (idempotent), then inserts the
    /// `CachedRange` this block completes.
    async fn insert_historical_block(
        &self,
        chain_id: i64,
        block: &Block,
        transactions: &[Transaction],
        cache: HistoricalBlockCache,
    ) -> Result<(), EventStoreError>;

    /// Atomic upsert. Logs inserted here are not backed by a `CachedRange`.
    async fn insert_realtime_block(
        &self,
        chain_id: i64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<(), EventStoreError>;

    /// Deletes blocks, transactions, and logs at `blockNumber >=
    /// fromBlockNumber` for `chainId`. Does not touch cached ranges.
    async fn delete_realtime_data(
        &self,
        chain_id: i64,
        from_block_number: i64,
    ) -> Result<(), EventStoreError>;

    /// Coalesces all `CachedRange` rows for `filterKey` whose combined
    /// interval starts at or before `logFilterStartBlockNumber` into one
    /// row. Returns the `endBlockTimestamp` of that coalesced leading range,
    /// or 0 if none.
    async fn merge_log_filter_cached_ranges(
        &self,
        filter_key: FilterKey,
        log_filter_start_block_number: i64,
    ) -> Result<i64, EventStoreError>;

    /// All non-merged ranges for `filterKey`, ordered by `startBlock`.
    async fn get_log_filter_cached_ranges(
        &self,
        filter_key: FilterKey,
    ) -> Result<Vec<CachedRange>, EventStoreError>;

    async fn insert_contract_read_result(
        &self,
        result: &ContractReadResult,
    ) -> Result<(), EventStoreError>;

    async fn get_contract_read_result(
        &self,
        chain_id: i64,
        address: Address,
        block_number: i64,
        calldata: &[u8],
    ) -> Result<Option<Vec<u8>>, EventStoreError>;

    /// One page of the keyset-paginated ordered event iterator. See the
    /// event iteration contract on [`crate::model::GetLogEventsQuery`].
    async fn get_log_events(
        &self,
        query: GetLogEventsQuery<'_>,
    ) -> Result<EventPage, EventStoreError>;
}
