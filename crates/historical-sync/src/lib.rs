//! Historical Sync (§4.2): backfills an event store with all logs matching
//! each network's log filters over `[startBlock, min(endBlock, latestFinalized)]`,
//! using the event store's cached-range index to skip work already done.

pub mod engine;
pub mod error;
pub mod task;

pub use {
    engine::{FilterSpec, HistoricalSync},
    error::HistoricalSyncError,
};

#[cfg(test)]
mod tests {
    use {
        super::*,
        chain::ChainId,
        ethrpc::MockRpcTransport,
        event_store::{model::ResolvedFilter, EventStore, SqliteEventStore},
        std::sync::Arc,
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

    fn sample_log(block_number: u64, log_index: u64) -> serde_json::Value {
        serde_json::json!({
            "address": format!("0x{}", "11".repeat(20)),
            "blockHash": format!("0x{}", "22".repeat(32)),
            "blockNumber": format!("0x{:x}", block_number),
            "transactionHash": format!("0x{}", "33".repeat(32)),
            "transactionIndex": "0x0",
            "logIndex": format!("0x{:x}", log_index),
            "data": "0x",
            "topics": [format!("0x{}", "44".repeat(32))],
        })
    }

    fn sample_block(number: u64, timestamp: u64) -> serde_json::Value {
        serde_json::json!({
            "hash": format!("0x{}", "22".repeat(32)),
            "parentHash": format!("0x{}", "00".repeat(32)),
            "number": format!("0x{:x}", number),
            "timestamp": format!("0x{:x}", timestamp),
            "miner": format!("0x{}", "55".repeat(20)),
            "gasLimit": "0x1",
            "gasUsed": "0x1",
            "difficulty": "0x1",
            "extraData": "0x",
            "logsBloom": "0x",
            "mixHash": format!("0x{}", "00".repeat(32)),
            "nonce": format!("0x{}", "00".repeat(8)),
            "receiptsRoot": format!("0x{}", "00".repeat(32)),
            "sha3Uncles": format!("0x{}", "00".repeat(32)),
            "size": "0x1",
            "stateRoot": format!("0x{}", "00".repeat(32)),
            "transactionsRoot": format!("0x{}", "00".repeat(32)),
            "transactions": [],
        })
    }

    #[tokio::test]
    async fn single_filter_backfill_populates_the_store_and_emits_a_checkpoint() {
        let store = new_store().await;
        let (aggregator, mut signals) = aggregator::Aggregator::new(Arc::clone(&store));
        let aggregator = Arc::new(aggregator);

        let mut transport = MockRpcTransport::new();
        transport
            .expect_request()
            .withf(|method, _| method == "eth_getLogs")
            .returning(|_, _| Box::pin(async { Ok(serde_json::json!([sample_log(100, 0)])) }));
        transport
            .expect_request()
            .withf(|method, _| method == "eth_getBlockByHash")
            .returning(|_, _| Box::pin(async { Ok(sample_block(100, 1000)) }));

        let filter = ResolvedFilter {
            name: "transfers".to_string(),
            chain_id: 1,
            address: None,
            topics: vec![],
        };
        let sync = HistoricalSync::new(ChainId(1), Arc::clone(&store), Arc::new(transport), aggregator, 4);
        sync.run(
            vec![FilterSpec {
                filter,
                start_block: 100,
                end_block: Some(100),
                max_block_range: 10,
            }],
            100,
        )
        .await
        .unwrap();

        let mut saw_checkpoint = false;
        while let Ok(signal) = signals.try_recv() {
            if matches!(signal, aggregator::AggregatorSignal::NewCheckpoint { timestamp: 1000 }) {
                saw_checkpoint = true;
            }
        }
        assert!(saw_checkpoint);
    }

    #[tokio::test]
    async fn empty_required_range_is_a_no_op() {
        let store = new_store().await;
        let (aggregator, _signals) = aggregator::Aggregator::new(Arc::clone(&store));
        let aggregator = Arc::new(aggregator);
        let transport = MockRpcTransport::new();

        let filter = ResolvedFilter {
            name: "transfers".to_string(),
            chain_id: 1,
            address: None,
            topics: vec![],
        };
        let sync = HistoricalSync::new(ChainId(1), store, Arc::new(transport), aggregator, 4);
        // start_block > latest_finalized_block_number: nothing to do, and the
        // mock transport has no expectations set, so any RPC call would panic.
        sync.run(
            vec![FilterSpec {
                filter,
                start_block: 1_000,
                end_block: None,
                max_block_range: 10,
            }],
            5,
        )
        .await
        .unwrap();
    }
}
