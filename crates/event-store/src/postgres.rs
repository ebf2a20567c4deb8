//! `EventStore` backed by Postgres, grounded on the teacher's `database`
//! crate conventions: functions take `&mut PgTransaction` when they must
//! commit as one unit, `&mut PgConnection`/pool otherwise, `ON CONFLICT DO
//! NOTHING` for idempotent inserts.

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
    sqlx::{Executor, PgPool, Postgres, QueryBuilder},
};

pub type PgTransaction<'a> = sqlx::Transaction<'a, Postgres>;

#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EventStore for PostgresEventStore {
    async fn migrate(&self) -> Result<(), EventStoreError> {
        sqlx::migrate!("./migrations/postgres")
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
            sqlx::query("DELETE FROM logs WHERE chain_id = $1 AND block_number >= $2")
                .bind(chain_id)
                .bind(from_block_number),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM transactions WHERE chain_id = $1 AND block_number >= $2")
                .bind(chain_id)
                .bind(from_block_number),
        )
        .await?;
        tx.execute(
            sqlx::query("DELETE FROM blocks WHERE chain_id = $1 AND number >= $2")
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
             WHERE filter_key = $1 ORDER BY start_block ASC",
        )
        .bind(filter_key.as_i64())
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();

        let groups = query::coalesce_ranges(&rows);
        let leading_end_timestamp = query::leading_range_end_timestamp(
            &groups,
            log_filter_start_block_number,
        );

        tx.execute(sqlx::query("DELETE FROM cached_ranges WHERE filter_key = $1").bind(filter_key.as_i64()))
            .await?;
        for group in &groups {
            sqlx::query(
                "INSERT INTO cached_ranges (filter_key, start_block, end_block, \
                 end_block_timestamp) VALUES ($1, $2, $3, $4)",
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
             WHERE filter_key = $1 ORDER BY start_block ASC",
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
             calldata_hash, calldata, result) VALUES ($1, $2, $3, $4, $5, $6) \
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
            "SELECT result FROM contract_read_results WHERE chain_id = $1 AND address = $2 AND \
             block_number = $3 AND calldata_hash = $4",
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
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(query::SELECT_JOINED_LOG_EVENT);
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
    tx: &mut PgTransaction<'_>,
    chain_id: i64,
    logs: &[Log],
) -> Result<(), EventStoreError> {
    for log in logs {
        sqlx::query(
            "INSERT INTO logs (chain_id, id, address, block_hash, block_number, \
             transaction_hash, transaction_index, log_index, data, topic0, topic1, topic2, \
             topic3) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
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
    tx: &mut PgTransaction<'_>,
    block: &Block,
    upsert: bool,
) -> Result<(), EventStoreError> {
    let conflict_clause = if upsert {
        "ON CONFLICT (chain_id, hash) DO UPDATE SET \
         parent_hash = EXCLUDED.parent_hash, number = EXCLUDED.number, \
         timestamp = EXCLUDED.timestamp, miner = EXCLUDED.miner, \
         gas_limit = EXCLUDED.gas_limit, gas_used = EXCLUDED.gas_used, \
         base_fee_per_gas = EXCLUDED.base_fee_per_gas, difficulty = EXCLUDED.difficulty, \
         total_difficulty = EXCLUDED.total_difficulty, extra_data = EXCLUDED.extra_data, \
         logs_bloom = EXCLUDED.logs_bloom, mix_hash = EXCLUDED.mix_hash, \
         nonce = EXCLUDED.nonce, receipts_root = EXCLUDED.receipts_root, \
         sha3_uncles = EXCLUDED.sha3_uncles, size = EXCLUDED.size, \
         state_root = EXCLUDED.state_root, transactions_root = EXCLUDED.transactions_root"
    } else {
        "ON CONFLICT DO NOTHING"
    };
    let query = format!(
        "INSERT INTO blocks (chain_id, hash, parent_hash, number, timestamp, miner, gas_limit, \
         gas_used, base_fee_per_gas, difficulty, total_difficulty, extra_data, logs_bloom, \
         mix_hash, nonce, receipts_root, sha3_uncles, size, state_root, transactions_root) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
         $18, $19, $20) {conflict_clause}"
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
    tx: &mut PgTransaction<'_>,
    transactions: &[Transaction],
    upsert: bool,
) -> Result<(), EventStoreError> {
    let conflict_clause = if upsert {
        "ON CONFLICT (chain_id, hash) DO UPDATE SET \
         block_hash = EXCLUDED.block_hash, block_number = EXCLUDED.block_number, \
         transaction_index = EXCLUDED.transaction_index, from_address = EXCLUDED.from_address, \
         to_address = EXCLUDED.to_address, input = EXCLUDED.input, nonce = EXCLUDED.nonce, \
         value = EXCLUDED.value, gas = EXCLUDED.gas, v = EXCLUDED.v, r = EXCLUDED.r, \
         s = EXCLUDED.s, transaction_type = EXCLUDED.transaction_type, \
         gas_price = EXCLUDED.gas_price, max_fee_per_gas = EXCLUDED.max_fee_per_gas, \
         max_priority_fee_per_gas = EXCLUDED.max_priority_fee_per_gas, \
         access_list = EXCLUDED.access_list"
    } else {
        "ON CONFLICT DO NOTHING"
    };
    for transaction in transactions {
        let query = format!(
            "INSERT INTO transactions (chain_id, hash, block_hash, block_number, \
             transaction_index, from_address, to_address, input, nonce, value, gas, v, r, s, \
             transaction_type, gas_price, max_fee_per_gas, max_priority_fee_per_gas, \
             access_list) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
             $15, $16, $17, $18, $19) {conflict_clause}"
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
    tx: &mut PgTransaction<'_>,
    range: CachedRange,
) -> Result<(), EventStoreError> {
    sqlx::query(
        "INSERT INTO cached_ranges (filter_key, start_block, end_block, end_block_timestamp) \
         VALUES ($1, $2, $3, $4)",
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
    use super::*;

    #[test]
    fn transaction_type_round_trips_through_display() {
        assert_eq!(TransactionType::Eip1559.to_string(), "eip1559");
    }
}
