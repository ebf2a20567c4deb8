//! Per-network realtime sync engine: polls for new heads, maintains the
//! `unfinalizedBlocks` chain, detects and recovers from shallow reorgs, and
//! advances the per-network finality checkpoint (§4.3).

use {
    crate::error::RealtimeSyncError,
    aggregator::EventAggregating,
    chain::ChainId,
    chain_sync::conversion,
    ethrpc::{
        types::{GetLogsFilter, RawBlock},
        EthRpc, RpcTransport,
    },
    event_store::{
        model::{Block, ResolvedFilter},
        EventStore,
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::Mutex,
    tokio_util::sync::CancellationToken,
};

/// Upper bound on how many blocks a single poll tick will catch up on. A
/// network that falls behind by more than this backfills the remainder on
/// the next tick rather than blocking the poll loop indefinitely.
const MAX_BLOCKS_PER_TICK: u64 = 1_000;

/// Returned by [`RealtimeSync::setup`] to seed Historical Sync's required
/// range (§4.2 "Setup takes the latest finalized block number from the
/// Realtime Sync service").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SetupResult {
    pub latest_block_number: u64,
    pub finalized_block_number: u64,
}

pub struct RealtimeSync {
    chain_id: ChainId,
    store: Arc<dyn EventStore>,
    transport: Arc<dyn RpcTransport>,
    aggregator: Arc<dyn EventAggregating>,
    filters: Vec<ResolvedFilter>,
    finality_block_count: u64,
    poll_interval: Duration,
    unfinalized_blocks: Mutex<Vec<Block>>,
}

impl RealtimeSync {
    pub fn new(
        chain_id: ChainId,
        store: Arc<dyn EventStore>,
        transport: Arc<dyn RpcTransport>,
        aggregator: Arc<dyn EventAggregating>,
        filters: Vec<ResolvedFilter>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            chain_id,
            store,
            transport,
            aggregator,
            filters,
            finality_block_count: chain_id.finality_block_count(),
            poll_interval,
            unfinalized_blocks: Mutex::new(Vec::new()),
        }
    }

    /// Fetches the current head, seeds `unfinalizedBlocks = [latestBlock]`,
    /// and returns the range Historical Sync should cover.
    pub async fn setup(&self) -> Result<SetupResult, RealtimeSyncError> {
        let raw = self.fetch_tagged_block("latest").await?;
        let chain_id = conversion::chain_id_to_i64(self.chain_id)?;
        let block = conversion::convert_block(chain_id, &raw)?;
        let latest_block_number = u64::try_from(block.number).unwrap_or_default();
        *self.unfinalized_blocks.lock().await = vec![block];
        Ok(SetupResult {
            latest_block_number,
            finalized_block_number: latest_block_number.saturating_sub(self.finality_block_count),
        })
    }

    /// Polls at `poll_interval` until `token` is cancelled. Cancellation is
    /// cooperative: the in-flight tick finishes before the loop exits, so a
    /// shutdown never leaves a half-applied reorg.
    pub async fn start(&self, token: CancellationToken) -> Result<(), RealtimeSyncError> {
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                _ = interval.tick() => self.poll_once().await?,
            }
        }
    }

    async fn poll_once(&self) -> Result<(), RealtimeSyncError> {
        let new_head = self.transport.block_number().await?;
        let chain_id = conversion::chain_id_to_i64(self.chain_id)?;
        let tail_number =
            u64::try_from(self.unfinalized_blocks.lock().await.last().expect("seeded by setup").number).unwrap_or_default();
        if new_head <= tail_number {
            return Ok(());
        }

        let cap = new_head.min(tail_number + MAX_BLOCKS_PER_TICK);
        for number in (tail_number + 1)..=cap {
            let number_i64 = conversion::to_i64("block_number", number)?;
            let raw = self
                .transport
                .get_block_by_number(number, true)
                .await?
                .ok_or(RealtimeSyncError::DeepReorg {
                    block_number: number_i64,
                })?;
            let block = conversion::convert_block(chain_id, &raw)?;
            let transactions = convert_transactions(self.chain_id, &raw)?;

            let tail_hash = self.unfinalized_blocks.lock().await.last().expect("seeded by setup").hash;
            if block.parent_hash == tail_hash {
                self.append_block(block, transactions).await?;
            } else {
                self.handle_reorg(block, transactions).await?;
            }
        }

        self.advance_finality(new_head).await;
        Ok(())
    }

    /// Walks `unfinalizedBlocks` back from the tail to find the block whose
    /// `parentHash` matches the incoming block, following the incoming
    /// chain further back with additional fetches if the divergence point
    /// isn't already held locally. A divergence deeper than the held window
    /// is a deep reorg: fatal, per §4.3.
    async fn handle_reorg(&self, diverging_block: Block, diverging_txs: Vec<event_store::model::Transaction>) -> Result<(), RealtimeSyncError> {
        let chain_id = conversion::chain_id_to_i64(self.chain_id)?;
        let unfinalized = self.unfinalized_blocks.lock().await.clone();
        let mut chain = vec![(diverging_block, diverging_txs)];
        let ancestor_index = loop {
            let parent_hash = chain.last().expect("non-empty").0.parent_hash;
            if let Some(index) = unfinalized.iter().position(|b| b.hash == parent_hash) {
                break index;
            }
            if chain.len() > unfinalized.len() {
                let block_number = chain.last().expect("non-empty").0.number;
                tracing::error!(
                    chain_id = %self.chain_id,
                    block_number,
                    "reorg diverges beyond the finalized window, no common ancestor held locally"
                );
                return Err(RealtimeSyncError::DeepReorg { block_number });
            }
            let hash_hex = format!("0x{}", hex::encode(parent_hash.0));
            let raw = self
                .transport
                .get_block_by_hash(&hash_hex, true)
                .await?
                .ok_or(RealtimeSyncError::DeepReorg {
                    block_number: chain.last().expect("non-empty").0.number - 1,
                })?;
            let block = conversion::convert_block(chain_id, &raw)?;
            let transactions = convert_transactions(self.chain_id, &raw)?;
            chain.push((block, transactions));
        };
        chain.reverse();

        let ancestor = unfinalized[ancestor_index].clone();
        {
            let mut guard = self.unfinalized_blocks.lock().await;
            guard.truncate(ancestor_index + 1);
        }
        self.store
            .delete_realtime_data(chain_id, ancestor.number + 1)
            .await?;
        self.aggregator.handle_reorg(self.chain_id, ancestor.timestamp).await;

        for (block, transactions) in chain {
            self.append_block(block, transactions).await?;
        }
        Ok(())
    }

    /// Inserts one already-canonical block (and its transactions) plus the
    /// logs it contains for this network's filters, advances
    /// `unfinalizedBlocks`, and emits the realtime checkpoint.
    async fn append_block(&self, block: Block, transactions: Vec<event_store::model::Transaction>) -> Result<(), RealtimeSyncError> {
        let chain_id = conversion::chain_id_to_i64(self.chain_id)?;
        let hash_hex = format!("0x{}", hex::encode(block.hash.0));
        let raw_logs = self.transport.get_logs(&self.block_log_filter(&hash_hex)).await?;
        let logs = raw_logs
            .iter()
            .map(|raw| conversion::convert_log(chain_id, raw))
            .collect::<Result<Vec<_>, _>>()?;

        self.store
            .insert_realtime_block(chain_id, &block, &transactions, &logs)
            .await?;

        self.unfinalized_blocks.lock().await.push(block.clone());
        self.aggregator
            .handle_new_realtime_checkpoint(self.chain_id, block.timestamp)
            .await;
        Ok(())
    }

    /// Builds the `eth_getLogs` filter for one block's worth of logs,
    /// restricted to addresses any configured filter cares about. Topic
    /// slots are deliberately left unrestricted at the RPC layer: a
    /// per-slot conjunction that's correct for one filter can wrongly
    /// exclude a log another filter wants, since the union we need here is
    /// an OR *across* filters, not a single filter's AND-of-slots. Logs this
    /// over-fetches are matched against each filter downstream by the
    /// aggregator, same as any other ingested log.
    fn block_log_filter(&self, block_hash_hex: &str) -> GetLogsFilter {
        let address = if self.filters.iter().any(|f| f.address.is_none()) {
            None
        } else {
            let mut addrs: Vec<String> = self
                .filters
                .iter()
                .flat_map(|f| f.address.iter().flatten())
                .map(|a| format!("0x{}", hex::encode(a.0)))
                .collect();
            addrs.sort();
            addrs.dedup();
            Some(addrs)
        };
        GetLogsFilter {
            from_block: None,
            to_block: None,
            address,
            block_hash: Some(block_hash_hex.to_string()),
            topics: vec![],
        }
    }

    /// Emits a (monotone) finality checkpoint for the greatest unfinalized
    /// block at or below `new_head - finalityBlockCount`, then drops
    /// finalized entries from the in-memory window — they remain in the
    /// store permanently.
    async fn advance_finality(&self, new_head: u64) {
        let threshold = i64::try_from(new_head.saturating_sub(self.finality_block_count)).unwrap_or(i64::MAX);
        let mut guard = self.unfinalized_blocks.lock().await;
        let Some(split_at) = guard.iter().rposition(|b| b.number <= threshold) else {
            return;
        };
        let finalized_timestamp = guard[split_at].timestamp;
        guard.drain(..split_at);
        drop(guard);
        self.aggregator
            .handle_new_finality_checkpoint(self.chain_id, finalized_timestamp)
            .await;
    }

    async fn fetch_tagged_block(&self, tag: &str) -> Result<RawBlock, RealtimeSyncError> {
        let params = serde_json::json!([tag, true]);
        let value = self.transport.request("eth_getBlockByNumber", params).await?;
        serde_json::from_value(value).map_err(|err| {
            RealtimeSyncError::Rpc(ethrpc::RpcError::Rpc {
                code: 0,
                message: err.to_string(),
            })
        })
    }
}

fn convert_transactions(
    chain_id: ChainId,
    raw: &RawBlock,
) -> Result<Vec<event_store::model::Transaction>, RealtimeSyncError> {
    let chain_id = conversion::chain_id_to_i64(chain_id)?;
    raw.transactions
        .iter()
        .map(|tx| conversion::convert_transaction(chain_id, tx))
        .collect::<Result<Vec<_>, _>>()
        .map_err(RealtimeSyncError::from)
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        ethrpc::MockRpcTransport,
        event_store::SqliteEventStore,
    };

    async fn new_store() -> Arc<dyn EventStore> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteEventStore::new(pool);
        store.migrate().await.unwrap();
        Arc::new(store)
    }

    fn raw_block(number: u64, timestamp: u64, hash_byte: u8, parent_byte: u8) -> serde_json::Value {
        serde_json::json!({
            "hash": format!("0x{}", hex::encode([hash_byte; 32])),
            "parentHash": format!("0x{}", hex::encode([parent_byte; 32])),
            "number": format!("0x{number:x}"),
            "timestamp": format!("0x{timestamp:x}"),
            "miner": format!("0x{}", hex::encode([0u8; 20])),
            "gasLimit": "0x1",
            "gasUsed": "0x1",
            "difficulty": "0x1",
            "extraData": "0x",
            "logsBloom": "0x",
            "mixHash": format!("0x{}", hex::encode([0u8; 32])),
            "nonce": format!("0x{}", hex::encode([0u8; 8])),
            "receiptsRoot": format!("0x{}", hex::encode([0u8; 32])),
            "sha3Uncles": format!("0x{}", hex::encode([0u8; 32])),
            "size": "0x1",
            "stateRoot": format!("0x{}", hex::encode([0u8; 32])),
            "transactionsRoot": format!("0x{}", hex::encode([0u8; 32])),
            "transactions": [],
        })
    }

    #[tokio::test]
    async fn setup_seeds_unfinalized_blocks_from_latest() {
        let store = new_store().await;
        let (aggregator, _rx) = aggregator::Aggregator::new(Arc::clone(&store));
        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .withf(|method, params| method == "eth_getBlockByNumber" && params[0] == "latest")
            .returning(|_, _| Box::pin(async { Ok(raw_block(100, 1_000, 0xaa, 0x00)) }));

        let sync = RealtimeSync::new(
            ChainId(1),
            store,
            Arc::new(transport),
            Arc::new(aggregator),
            vec![],
            Duration::from_millis(1),
        );
        let result = sync.setup().await.unwrap();
        assert_eq!(result.latest_block_number, 100);
        assert_eq!(result.finalized_block_number, 100 - ChainId(1).finality_block_count());
    }

    #[tokio::test]
    async fn shallow_reorg_rolls_back_and_reinserts_the_canonical_chain() {
        let store = new_store().await;
        let (aggregator, mut rx) = aggregator::Aggregator::new(Arc::clone(&store));
        let aggregator: Arc<dyn EventAggregating> = Arc::new(aggregator);

        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .withf(|method, params| method == "eth_getBlockByNumber" && params[0] == "latest")
            .returning(|_, _| Box::pin(async { Ok(raw_block(10, 10_000, 0x10, 0x09)) }));
        transport
            .expect_request()
            .withf(|method, _| method == "eth_blockNumber")
            .returning(|_, _| Box::pin(async { Ok(serde_json::Value::String("0xb".to_string())) }));
        transport
            .expect_request()
            .withf(|method, params| {
                method == "eth_getBlockByNumber" && params[0] != "latest"
            })
            // Block 11 forks: its parent is 0x99, not the seeded tail (0x10).
            .returning(|_, _| Box::pin(async { Ok(raw_block(11, 11_000, 0x11, 0x99)) }));
        transport
            .expect_request()
            .withf(|method, _| method == "eth_getBlockByHash")
            // Walking back from the forked block's declared parent (0x99)
            // lands back on the seeded tail's hash (0x10).
            .returning(|_, _| Box::pin(async { Ok(raw_block(10, 10_000, 0x99, 0x10)) }));
        transport
            .expect_request()
            .withf(|method, _| method == "eth_getLogs")
            .returning(|_, _| Box::pin(async { Ok(serde_json::json!([])) }));

        let sync = RealtimeSync::new(
            ChainId(1),
            Arc::clone(&store),
            Arc::new(transport),
            Arc::clone(&aggregator),
            vec![],
            Duration::from_millis(1),
        );
        sync.setup().await.unwrap();
        sync.poll_once().await.unwrap();

        let mut saw_reorg = false;
        while let Ok(signal) = rx.try_recv() {
            if matches!(signal, aggregator::AggregatorSignal::Reorg { .. }) {
                saw_reorg = true;
            }
        }
        assert!(saw_reorg);
    }
}
