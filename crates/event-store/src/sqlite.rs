//! `EventStore` backed by SQLite, mirroring [`crate::postgres`] for the
//! `{kind: "sqlite"}` config variant — single-file local deployments and
//! integration tests that don't need a running Postgres.

use {
    crate::{
        error::EventStoreError,
        model::{
            Address, Block, CachedRange, ContractReadResult, EventPage, FilterKey,
            GetLogEventsQuery, Log, Transaction, TransactionType,
        },
        query,
        store::{EventStore, HistoricalBlockCache},
    },
    sqlx::{Executor, Sqlite, SqlitePool, QueryBuilder},
};

pub type SqliteTransaction<'a> = sqlx::Transaction<'a, Sqlite>;

#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventStore for SqliteEventStore {
    async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_historical_logs(
        &self,
        chain_id: i64,
        logs: &[Log],
    ) -> Result<(), EventStoreError> {
        let mut tx = self.pool.begin().await?;
        insert_logs(&mut tx, chain_id, logs).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_historical_block(
        &self,
        chain_id: i64,
        block: &Block,
        transactions: &[Transaction],
        cache: HistoricalBlockCache,
    ) -> Result<(), EventStoreError> {
        debug_assert_eq!(block.chain_id, chain_id, "block belongs to a different chain");
        let mut tx = self.pool.begin().await?;
        insert_block(&mut tx, block, false).await?;
        insert_transactions(&mut tx, transactions, false).await?;
        insert_cached_range(
            &mut tx,
            CachedRange {
                filter_key: cache.filter_key,
                start_block: cache.block_number_to_cache_from,
                end_block: block.number,
                end_block_timestamp: block.timestamp,
            },
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert_realtime_block(
        &self,
        chain_id: i64,
        block: &Block,
        transactions: &[Transaction],
        logs: &[Log],
    ) -> Result<(), EventStoreError> {
        let mut tx = self.pool.begin().await?;
        insert_block(&mut tx, block, true).await?;
        insert_transactions(&mut tx, transactions, true).await?;
        insert_logs(&mut tx, chain_id, logs).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn delete_realtime_data(
        &self,
        chain_id: i64,
        from_block_number: i64,
    ) -> Result<(), EventStoreError> {
        let mut tx = self.pool.begin().await?;
        tx.execute(
            sqlx::query("DELETE FROM logs WHERE chain_id = ? AND block_number >= ?")
                .bind(chain_id)
                .bind(from_block_number),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM transactions WHERE chain_id = ? AND block_number >= ?")
                .bind(chain_id)
                .bind(from_block_number),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM blocks WHERE chain_id = ? AND number >= ?")
                .bind(chain_id)
                .bind(from_block_number),
        )
        .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn merge_log_filter_cached_ranges(
        &self,
        filter_key: FilterKey,
        log_filter_start_block_number: i64,
    ) -> Result<i64, EventStoreError> {
        let mut tx = self.pool.begin().await?;
        let rows: Vec<CachedRange> = sqlx::query_as::<_, CachedRangeRow>(
            "SELECT filter_key, start_block, end_block, end_block_timestamp FROM cached_ranges \
             WHERE filter_key = ? ORDER BY start_block ASC",
        )
        .bind(filter_key.as_i64())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        let groups = query::coalesce_ranges(&rows);
        let leading_end_timestamp =
            query::leading_range_end_timestamp(&groups, log_filter_start_block_number);

        tx.execute(
            sqlx::query("DELETE FROM cached_ranges WHERE filter_key = ?").bind(filter_key.as_i64()),
        )
        .await?;
        for group in &groups {
            sqlx::query(
                "INSERT INTO cached_ranges (filter_key, start_block, end_block, \
                 end_block_timestamp) VALUES (?, ?, ?, ?)",
            )
            .bind(group.filter_key.as_i64())
            .bind(group.start_block)
            .bind(group.end_block)
            .bind(group.end_block_timestamp)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(leading_end_timestamp)
    }

    async fn get_log_filter_cached_ranges(
        &self,
        filter_key: FilterKey,
    ) -> Result<Vec<CachedRange>, EventStoreError> {
        let rows: Vec<CachedRangeRow> = sqlx::query_as(
            "SELECT filter_key, start_block, end_block, end_block_timestamp FROM cached_ranges \
             WHERE filter_key = ? ORDER BY start_block ASC",
        )
        .bind(filter_key.as_i64())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn insert_contract_read_result(
        &self,
        result: &ContractReadResult,
    ) -> Result<(), EventStoreError> {
        let hash = query::calldata_hash(&result.calldata);
        sqlx::query(
            "INSERT INTO contract_read_results (chain_id, address, block_number, \
             calldata_hash, calldata, result) VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT DO NOTHING",
        )
        .bind(result.chain_id)
        .bind(result.address)
        .bind(result.block_number)
        .bind(hash)
        .bind(&result.calldata)
        .bind(&result.result)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_contract_read_result(
        &self,
        chain_id: i64,
        address: Address,
        block_number: i64,
        calldata: &[u8],
    ) -> Result<Option<Vec<u8>>, EventStoreError> {
        let hash = query::calldata_hash(calldata);
        let result: Option<(Vec<u8>,)> = sqlx::query_as(
            "SELECT result FROM contract_read_results WHERE chain_id = ? AND address = ? AND \
             block_number = ? AND calldata_hash = ?",
        )
        .bind(chain_id)
        .bind(address)
        .bind(block_number)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.map(|(r,)| r))
    }

    async fn get_log_events(
        &self,
        query: GetLogEventsQuery<'_>,
    ) -> Result<EventPage, EventStoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(query::SELECT_JOINED_LOG_EVENT);
        builder
            .push(" WHERE b.timestamp >= ")
            .push_bind(query.from_timestamp);
        builder
            .push(" AND b.timestamp <= ")
            .push_bind(query.to_timestamp);
        builder.push(" AND (");
        query::push_filters_predicate(&mut builder, query.filters);
        builder.push(")");
        if let Some(cursor) = query.cursor {
            builder.push(" AND ");
            query::push_cursor_predicate(&mut builder, cursor);
        }
        builder.push(
            " ORDER BY b.timestamp ASC, l.chain_id ASC, l.block_number ASC, l.log_index ASC",
        );
        builder.push(" LIMIT ").push_bind(query.page_size as i64 + 1);

        let rows = builder
            .build_query_as::<query::RawEventRow>()
            .fetch_all(&self.pool)
            .await?;
        let events = rows
            .into_iter()
            .map(query::build_joined_event)
            .collect::<Result<Vec<_>, _>>()?;
        query::assemble_page(events, &query)
    }
}

#[derive(sqlx::FromRow)]
struct CachedRangeRow {
    filter_key: i64,
    start_block: i64,
    end_block: i64,
    end_block_timestamp: i64,
}

impl From<CachedRangeRow> for CachedRange {
    fn from(row: CachedRangeRow) -> Self {
        CachedRange {
            filter_key: FilterKey::from_i64(row.filter_key),
            start_block: row.start_block,
            end_block: row.end_block,
            end_block_timestamp: row.end_block_timestamp,
        }
    }
}

async fn insert_logs(
    tx: &mut SqliteTransaction<'_>,
    chain_id: i64,
    logs: &[Log],
) -> Result<(), EventStoreError> {
    for log in logs {
        sqlx::query(
            "INSERT INTO logs (chain_id, id, address, block_hash, block_number, \
             transaction_hash, transaction_index, log_index, data, topic0, topic1, topic2, \
             topic3) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT DO NOTHING",
        )
        .bind(chain_id)
        .bind(log.id)
        .bind(log.address)
        .bind(log.block_hash)
        .bind(log.block_number)
        .bind(log.transaction_hash)
        .bind(log.transaction_index)
        .bind(log.log_index)
        .bind(&log.data)
        .bind(log.topic0)
        .bind(log.topic1)
        .bind(log.topic2)
        .bind(log.topic3)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

async fn insert_block(
    tx: &mut SqliteTransaction<'_>,
    block: &Block,
    upsert: bool,
) -> Result<(), EventStoreError> {
    let conflict_clause = if upsert {
        "ON CONFLICT (chain_id, hash) DO UPDATE SET \
         parent_hash = excluded.parent_hash, number = excluded.number, \
         timestamp = excluded.timestamp, miner = excluded.miner, \
         gas_limit = excluded.gas_limit, gas_used = excluded.gas_used, \
         base_fee_per_gas = excluded.base_fee_per_gas, difficulty = excluded.difficulty, \
         total_difficulty = excluded.total_difficulty, extra_data = excluded.extra_data, \
         logs_bloom = excluded.logs_bloom, mix_hash = excluded.mix_hash, \
         nonce = excluded.nonce, receipts_root = excluded.receipts_root, \
         sha3_uncles = excluded.sha3_uncles, size = excluded.size, \
         state_root = excluded.state_root, transactions_root = excluded.transactions_root"
    } else {
        "ON CONFLICT DO NOTHING"
    };
    let query = format!(
        "INSERT INTO blocks (chain_id, hash, parent_hash, number, timestamp, miner, gas_limit, \
         gas_used, base_fee_per_gas, difficulty, total_difficulty, extra_data, logs_bloom, \
         mix_hash, nonce, receipts_root, sha3_uncles, size, state_root, transactions_root) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) {conflict_clause}"
    );
    sqlx::query(&query)
        .bind(block.chain_id)
        .bind(block.hash)
        .bind(block.parent_hash)
        .bind(block.number)
        .bind(block.timestamp)
        .bind(block.miner)
        .bind(block.gas_limit)
        .bind(block.gas_used)
        .bind(block.base_fee_per_gas)
        .bind(block.difficulty)
        .bind(block.total_difficulty)
        .bind(&block.extra_data)
        .bind(&block.logs_bloom)
        .bind(block.mix_hash)
        .bind(block.nonce)
        .bind(block.receipts_root)
        .bind(block.sha3_uncles)
        .bind(block.size)
        .bind(block.state_root)
        .bind(block.transactions_root)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn insert_transactions(
    tx: &mut SqliteTransaction<'_>,
    transactions: &[Transaction],
    upsert: bool,
) -> Result<(), EventStoreError> {
    let conflict_clause = if upsert {
        "ON CONFLICT (chain_id, hash) DO UPDATE SET \
         block_hash = excluded.block_hash, block_number = excluded.block_number, \
         transaction_index = excluded.transaction_index, from_address = excluded.from_address, \
         to_address = excluded.to_address, input = excluded.input, nonce = excluded.nonce, \
         value = excluded.value, gas = excluded.gas, v = excluded.v, r = excluded.r, \
         s = excluded.s, transaction_type = excluded.transaction_type, \
         gas_price = excluded.gas_price, max_fee_per_gas = excluded.max_fee_per_gas, \
         max_priority_fee_per_gas = excluded.max_priority_fee_per_gas, \
         access_list = excluded.access_list"
    } else {
        "ON CONFLICT DO NOTHING"
    };
    for transaction in transactions {
        let query = format!(
            "INSERT INTO transactions (chain_id, hash, block_hash, block_number, \
             transaction_index, from_address, to_address, input, nonce, value, gas, v, r, s, \
             transaction_type, gas_price, max_fee_per_gas, max_priority_fee_per_gas, \
             access_list) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             {conflict_clause}"
        );
        sqlx::query(&query)
            .bind(transaction.chain_id)
            .bind(transaction.hash)
            .bind(transaction.block_hash)
            .bind(transaction.block_number)
            .bind(transaction.transaction_index)
            .bind(transaction.from)
            .bind(transaction.to)
            .bind(&transaction.input)
            .bind(transaction.nonce)
            .bind(transaction.value)
            .bind(transaction.gas)
            .bind(transaction.v)
            .bind(transaction.r)
            .bind(transaction.s)
            .bind(transaction.transaction_type.to_string())
            .bind(transaction.gas_price)
            .bind(transaction.max_fee_per_gas)
            .bind(transaction.max_priority_fee_per_gas)
            .bind(transaction.access_list.as_ref().map(|v| v.to_string()))
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

async fn insert_cached_range(
    tx: &mut SqliteTransaction<'_>,
    range: CachedRange,
) -> Result<(), EventStoreError> {
    sqlx::query(
        "INSERT INTO cached_ranges (filter_key, start_block, end_block, end_block_timestamp) \
         VALUES (?, ?, ?, ?)",
    )
    .bind(range.filter_key.as_i64())
    .bind(range.start_block)
    .bind(range.end_block)
    .bind(range.end_block_timestamp)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::model::TransactionType as Tt,
        sqlx::sqlite::SqlitePoolOptions,
    };

    async fn in_memory_store() -> SqliteEventStore {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteEventStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn sample_block(chain_id: i64, number: i64, timestamp: i64) -> Block {
        Block {
            chain_id,
            hash: crate::byte_array::ByteArray([number as u8; 32]),
            parent_hash: crate::byte_array::ByteArray([0; 32]),
            number,
            timestamp,
            miner: Default::default(),
            gas_limit: Default::default(),
            gas_used: Default::default(),
            base_fee_per_gas: None,
            difficulty: Default::default(),
            total_difficulty: Default::default(),
            extra_data: vec![],
            logs_bloom: vec![],
            mix_hash: Default::default(),
            nonce: Default::default(),
            receipts_root: Default::default(),
            sha3_uncles: Default::default(),
            size: 0,
            state_root: Default::default(),
            transactions_root: Default::default(),
        }
    }

    fn sample_transaction(chain_id: i64, block: &Block) -> Transaction {
        Transaction {
            chain_id,
            hash: crate::byte_array::ByteArray([1; 32]),
            block_hash: block.hash,
            block_number: block.number,
            transaction_index: 0,
            from: Default::default(),
            to: None,
            input: vec![],
            nonce: 0,
            value: Default::default(),
            gas: Default::default(),
            v: 0,
            r: Default::default(),
            s: Default::default(),
            transaction_type: Tt::Eip1559,
            gas_price: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            access_list: None,
        }
    }

    #[tokio::test]
    async fn insert_and_delete_realtime_data_round_trips() {
        let store = in_memory_store().await;
        let block = sample_block(1, 10, 1_000);
        let tx = sample_transaction(1, &block);
        let log = Log {
            chain_id: 1,
            id: Log::id_of(block.hash, 0),
            address: Default::default(),
            block_hash: block.hash,
            block_number: block.number,
            transaction_hash: tx.hash,
            transaction_index: 0,
            log_index: 0,
            data: vec![],
            topic0: Some(crate::byte_array::ByteArray([9; 32])),
            topic1: None,
            topic2: None,
            topic3: None,
        };

        store
            .insert_realtime_block(1, &block, &[tx], &[log])
            .await
            .unwrap();

        let page = store
            .get_log_events(GetLogEventsQuery {
                from_timestamp: 0,
                to_timestamp: 2_000,
                filters: &[],
                page_size: 10,
                cursor: None,
                include_event_selectors: &[],
            })
            .await
            .unwrap();
        // no filters => predicate is FALSE => nothing matches, by design.
        assert!(page.events.is_empty());

        store.delete_realtime_data(1, 5).await.unwrap();
        let ranges = store.get_log_filter_cached_ranges(FilterKey(1)).await.unwrap();
        assert!(ranges.is_empty());
    }

    #[tokio::test]
    async fn merge_cached_ranges_returns_leading_timestamp() {
        let store = in_memory_store().await;
        let filter_key = FilterKey(42);
        store
            .insert_historical_block(
                1,
                &sample_block(1, 100, 1_000),
                &[],
                HistoricalBlockCache {
                    filter_key,
                    block_number_to_cache_from: 0,
                },
            )
            .await
            .unwrap();
        store
            .insert_historical_block(
                1,
                &sample_block(1, 200, 2_000),
                &[],
                HistoricalBlockCache {
                    filter_key,
                    block_number_to_cache_from: 101,
                },
            )
            .await
            .unwrap();

        let end_timestamp = store
            .merge_log_filter_cached_ranges(filter_key, 0)
            .await
            .unwrap();
        assert_eq!(end_timestamp, 2_000);

        let ranges = store.get_log_filter_cached_ranges(filter_key).await.unwrap();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start_block, 0);
        assert_eq!(ranges[0].end_block, 200);
    }

    #[tokio::test]
    async fn contract_read_result_round_trips() {
        let store = in_memory_store().await;
        let result = ContractReadResult {
            chain_id: 1,
            address: Default::default(),
            block_number: 10,
            calldata: vec![1, 2, 3],
            result: vec![4, 5, 6],
        };
        store.insert_contract_read_result(&result).await.unwrap();
        let fetched = store
            .get_contract_read_result(1, Default::default(), 10, &[1, 2, 3])
            .await
            .unwrap();
        assert_eq!(fetched, Some(vec![4, 5, 6]));

        let missing = store
            .get_contract_read_result(1, Default::default(), 10, &[9, 9, 9])
            .await
            .unwrap();
        assert_eq!(missing, None);
    }
}
