//! Shared, backend-agnostic pieces of the event store: cached-range
//! coalescing, the content-address hash, the joined-log-event SQL shape, and
//! dynamic predicate construction via `sqlx::QueryBuilder` (which already
//! emits the right placeholder syntax per backend, so this much can be
//! written once).

use crate::{
    byte_array::ByteArray,
    error::EventStoreError,
    model::{
        Address, Block, CachedRange, Cursor, EventPage, EventPageMetadata, GetLogEventsQuery,
        Hash, JoinedLogEvent, Log, ResolvedFilter, TopicSlot, Transaction, TransactionType,
    },
};

pub const SELECT_JOINED_LOG_EVENT: &str = "
SELECT
  l.chain_id AS ev_chain_id, l.id AS ev_log_id, l.address AS ev_address,
  l.block_hash AS ev_block_hash, l.block_number AS ev_block_number,
  l.transaction_hash AS ev_tx_hash, l.transaction_index AS ev_tx_index,
  l.log_index AS ev_log_index, l.data AS ev_data, l.topic0 AS ev_topic0,
  l.topic1 AS ev_topic1, l.topic2 AS ev_topic2, l.topic3 AS ev_topic3,
  b.hash AS blk_hash, b.parent_hash AS blk_parent_hash, b.number AS blk_number,
  b.timestamp AS blk_timestamp, b.miner AS blk_miner, b.gas_limit AS blk_gas_limit,
  b.gas_used AS blk_gas_used, b.base_fee_per_gas AS blk_base_fee_per_gas,
  b.difficulty AS blk_difficulty, b.total_difficulty AS blk_total_difficulty,
  b.extra_data AS blk_extra_data, b.logs_bloom AS blk_logs_bloom, b.mix_hash AS blk_mix_hash,
  b.nonce AS blk_nonce, b.receipts_root AS blk_receipts_root, b.sha3_uncles AS blk_sha3_uncles,
  b.size AS blk_size, b.state_root AS blk_state_root,
  b.transactions_root AS blk_transactions_root,
  t.hash AS tx_hash, t.block_hash AS tx_block_hash, t.block_number AS tx_block_number,
  t.transaction_index AS tx_index, t.from_address AS tx_from, t.to_address AS tx_to,
  t.input AS tx_input, t.nonce AS tx_nonce, t.value AS tx_value, t.gas AS tx_gas,
  t.v AS tx_v, t.r AS tx_r, t.s AS tx_s, t.transaction_type AS tx_type,
  t.gas_price AS tx_gas_price, t.max_fee_per_gas AS tx_max_fee_per_gas,
  t.max_priority_fee_per_gas AS tx_max_priority_fee_per_gas, t.access_list AS tx_access_list
FROM logs l
LEFT JOIN blocks b ON b.chain_id = l.chain_id AND b.hash = l.block_hash
LEFT JOIN transactions t ON t.chain_id = l.chain_id AND t.hash = l.transaction_hash
";

#[derive(sqlx::FromRow)]
pub struct RawEventRow {
    pub ev_chain_id: i64,
    pub ev_log_id: ByteArray<40>,
    pub ev_address: Address,
    pub ev_block_hash: Hash,
    pub ev_block_number: i64,
    pub ev_tx_hash: Hash,
    pub ev_tx_index: i64,
    pub ev_log_index: i64,
    pub ev_data: Vec<u8>,
    pub ev_topic0: Option<Hash>,
    pub ev_topic1: Option<Hash>,
    pub ev_topic2: Option<Hash>,
    pub ev_topic3: Option<Hash>,
    pub blk_hash: Option<Hash>,
    pub blk_parent_hash: Option<Hash>,
    pub blk_number: Option<i64>,
    pub blk_timestamp: Option<i64>,
    pub blk_miner: Option<Address>,
    pub blk_gas_limit: Option<ByteArray<32>>,
    pub blk_gas_used: Option<ByteArray<32>>,
    pub blk_base_fee_per_gas: Option<ByteArray<32>>,
    pub blk_difficulty: Option<ByteArray<32>>,
    pub blk_total_difficulty: Option<ByteArray<32>>,
    pub blk_extra_data: Option<Vec<u8>>,
    pub blk_logs_bloom: Option<Vec<u8>>,
    pub blk_mix_hash: Option<Hash>,
    pub blk_nonce: Option<ByteArray<8>>,
    pub blk_receipts_root: Option<Hash>,
    pub blk_sha3_uncles: Option<Hash>,
    pub blk_size: Option<i64>,
    pub blk_state_root: Option<Hash>,
    pub blk_transactions_root: Option<Hash>,
    pub tx_hash: Option<Hash>,
    pub tx_block_hash: Option<Hash>,
    pub tx_block_number: Option<i64>,
    pub tx_index: Option<i64>,
    pub tx_from: Option<Address>,
    pub tx_to: Option<Address>,
    pub tx_input: Option<Vec<u8>>,
    pub tx_nonce: Option<i64>,
    pub tx_value: Option<ByteArray<32>>,
    pub tx_gas: Option<ByteArray<32>>,
    pub tx_v: Option<i64>,
    pub tx_r: Option<ByteArray<32>>,
    pub tx_s: Option<ByteArray<32>>,
    pub tx_type: Option<String>,
    pub tx_gas_price: Option<ByteArray<32>>,
    pub tx_max_fee_per_gas: Option<ByteArray<32>>,
    pub tx_max_priority_fee_per_gas: Option<ByteArray<32>>,
    pub tx_access_list: Option<String>,
}

/// Turns a raw joined row into a [`JoinedLogEvent`], failing with
/// [`EventStoreError::JoinMiss`] if the block or transaction side of the
/// join came back `NULL` — both must exist per the store's invariants.
pub fn build_joined_event(row: RawEventRow) -> Result<JoinedLogEvent, EventStoreError> {
    let log = Log {
        chain_id: row.ev_chain_id,
        id: row.ev_log_id,
        address: row.ev_address,
        block_hash: row.ev_block_hash,
        block_number: row.ev_block_number,
        transaction_hash: row.ev_tx_hash,
        transaction_index: row.ev_tx_index,
        log_index: row.ev_log_index,
        data: row.ev_data,
        topic0: row.ev_topic0,
        topic1: row.ev_topic1,
        topic2: row.ev_topic2,
        topic3: row.ev_topic3,
    };

    let block = Block {
        chain_id: row.ev_chain_id,
        hash: row.blk_hash.ok_or(EventStoreError::JoinMiss {
            log_id: log.id,
            what: "block",
        })?,
        parent_hash: row.blk_parent_hash.unwrap_or_default(),
        number: row.blk_number.unwrap_or_default(),
        timestamp: row.blk_timestamp.unwrap_or_default(),
        miner: row.blk_miner.unwrap_or_default(),
        gas_limit: row.blk_gas_limit.unwrap_or_default(),
        gas_used: row.blk_gas_used.unwrap_or_default(),
        base_fee_per_gas: row.blk_base_fee_per_gas,
        difficulty: row.blk_difficulty.unwrap_or_default(),
        total_difficulty: row.blk_total_difficulty.unwrap_or_default(),
        extra_data: row.blk_extra_data.unwrap_or_default(),
        logs_bloom: row.blk_logs_bloom.unwrap_or_default(),
        mix_hash: row.blk_mix_hash.unwrap_or_default(),
        nonce: row.blk_nonce.unwrap_or_default(),
        receipts_root: row.blk_receipts_root.unwrap_or_default(),
        sha3_uncles: row.blk_sha3_uncles.unwrap_or_default(),
        size: row.blk_size.unwrap_or_default(),
        state_root: row.blk_state_root.unwrap_or_default(),
        transactions_root: row.blk_transactions_root.unwrap_or_default(),
    };

    let transaction_type = row
        .tx_type
        .as_deref()
        .and_then(|s| s.parse::<TransactionType>().ok())
        .unwrap_or(TransactionType::Legacy);
    let transaction = Transaction {
        chain_id: row.ev_chain_id,
        hash: row.tx_hash.ok_or(EventStoreError::JoinMiss {
            log_id: log.id,
            what: "transaction",
        })?,
        block_hash: row.tx_block_hash.unwrap_or_default(),
        block_number: row.tx_block_number.unwrap_or_default(),
        transaction_index: row.tx_index.unwrap_or_default(),
        from: row.tx_from.unwrap_or_default(),
        to: row.tx_to,
        input: row.tx_input.unwrap_or_default(),
        nonce: row.tx_nonce.unwrap_or_default(),
        value: row.tx_value.unwrap_or_default(),
        gas: row.tx_gas.unwrap_or_default(),
        v: row.tx_v.unwrap_or_default(),
        r: row.tx_r.unwrap_or_default(),
        s: row.tx_s.unwrap_or_default(),
        transaction_type,
        gas_price: row.tx_gas_price,
        max_fee_per_gas: row.tx_max_fee_per_gas,
        max_priority_fee_per_gas: row.tx_max_priority_fee_per_gas,
        access_list: row
            .tx_access_list
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
    };

    Ok(JoinedLogEvent {
        log,
        block,
        transaction,
    })
}

pub fn push_filters_predicate<'a, DB>(
    builder: &mut sqlx::QueryBuilder<'a, DB>,
    filters: &'a [ResolvedFilter],
) where
    DB: sqlx::Database,
    i64: sqlx::Encode<'a, DB> + sqlx::Type<DB>,
    Address: sqlx::Encode<'a, DB> + sqlx::Type<DB>,
    Hash: sqlx::Encode<'a, DB> + sqlx::Type<DB>,
{
    if filters.is_empty() {
        builder.push("FALSE");
        return;
    }
    for (index, filter) in filters.iter().enumerate() {
        if index > 0 {
            builder.push(" OR ");
        }
        builder.push("(l.chain_id = ");
        builder.push_bind(filter.chain_id);
        builder.push(")");

        if let Some(addresses) = &filter.address {
            builder.push(" AND l.address IN (");
            {
                let mut separated = builder.separated(", ");
                for address in addresses {
                    separated.push_bind(*address);
                }
            }
            builder.push(")");
        }

        for (slot_index, slot) in filter.topics.iter().enumerate() {
            let column = match slot_index {
                0 => "l.topic0",
                1 => "l.topic1",
                2 => "l.topic2",
                _ => "l.topic3",
            };
            match slot {
                TopicSlot::Any => {}
                TopicSlot::One(value) => {
                    builder.push(" AND ");
                    builder.push(column);
                    builder.push(" = ");
                    builder.push_bind(*value);
                }
                TopicSlot::Set(values) => {
                    builder.push(" AND ");
                    builder.push(column);
                    builder.push(" IN (");
                    {
                        let mut separated = builder.separated(", ");
                        for value in values {
                            separated.push_bind(*value);
                        }
                    }
                    builder.push(")");
                }
            }
        }
    }
}

pub fn push_cursor_predicate<'a, DB>(builder: &mut sqlx::QueryBuilder<'a, DB>, cursor: Cursor)
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'a, DB> + sqlx::Type<DB>,
{
    builder.push("((b.timestamp > ");
    builder.push_bind(cursor.timestamp);
    builder.push(") OR (b.timestamp = ");
    builder.push_bind(cursor.timestamp);
    builder.push(" AND l.chain_id > ");
    builder.push_bind(cursor.chain_id);
    builder.push(") OR (b.timestamp = ");
    builder.push_bind(cursor.timestamp);
    builder.push(" AND l.chain_id = ");
    builder.push_bind(cursor.chain_id);
    builder.push(" AND l.block_number > ");
    builder.push_bind(cursor.block_number);
    builder.push(") OR (b.timestamp = ");
    builder.push_bind(cursor.timestamp);
    builder.push(" AND l.chain_id = ");
    builder.push_bind(cursor.chain_id);
    builder.push(" AND l.block_number = ");
    builder.push_bind(cursor.block_number);
    builder.push(" AND l.log_index > ");
    builder.push_bind(cursor.log_index);
    builder.push("))");
}

/// Merges pairwise-adjacent/overlapping ranges (`rows` sorted ascending by
/// `start_block`) into the disjoint set the store's invariant requires.
pub fn coalesce_ranges(rows: &[CachedRange]) -> Vec<CachedRange> {
    let mut groups: Vec<CachedRange> = Vec::new();
    for row in rows {
        if let Some(last) = groups.last_mut() {
            if row.start_block <= last.end_block + 1 {
                if row.end_block > last.end_block {
                    last.end_block = row.end_block;
                    last.end_block_timestamp = row.end_block_timestamp;
                }
                continue;
            }
        }
        groups.push(*row);
    }
    groups
}

/// The leading coalesced range is the lowest-`start_block` group, provided
/// it starts at or before `log_filter_start_block_number`; otherwise nothing
/// has been cached from the filter's start yet.
pub fn leading_range_end_timestamp(
    groups: &[CachedRange],
    log_filter_start_block_number: i64,
) -> i64 {
    match groups.first() {
        Some(group) if group.start_block <= log_filter_start_block_number => {
            group.end_block_timestamp
        }
        _ => 0,
    }
}

pub fn calldata_hash(calldata: &[u8]) -> ByteArray<32> {
    use sha2::{Digest, Sha256};
    ByteArray(Sha256::digest(calldata).into())
}

pub fn assemble_page(
    mut events: Vec<JoinedLogEvent>,
    query: &GetLogEventsQuery<'_>,
) -> Result<EventPage, EventStoreError> {
    let truncated = events.len() > query.page_size as usize;
    if truncated {
        events.truncate(query.page_size as usize);
    }

    let cursor = truncated
        .then(|| events.last())
        .flatten()
        .map(|event| Cursor {
            timestamp: event.block.timestamp,
            chain_id: event.log.chain_id,
            block_number: event.log.block_number,
            log_index: event.log.log_index,
        });

    let page_ends_at_timestamp = if truncated {
        events
            .last()
            .map(|event| event.block.timestamp)
            .unwrap_or(query.to_timestamp)
    } else {
        query.to_timestamp
    };

    let mut counts = std::collections::BTreeMap::new();
    for event in &events {
        if !query.include_event_selectors.is_empty() {
            let selected = event
                .log
                .topic0
                .is_some_and(|topic0| query.include_event_selectors.contains(&topic0));
            if !selected {
                continue;
            }
        }
        let filter_name = query
            .filters
            .iter()
            .find(|filter| filter.matches_log(&event.log))
            .map(|filter| filter.name.clone())
            .unwrap_or_default();
        *counts.entry((filter_name, event.log.topic0)).or_insert(0u64) += 1;
    }

    Ok(EventPage {
        events,
        metadata: EventPageMetadata {
            page_ends_at_timestamp,
            counts,
            cursor,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(filter: u64, start: i64, end: i64, ts: i64) -> CachedRange {
        CachedRange {
            filter_key: crate::model::FilterKey(filter),
            start_block: start,
            end_block: end,
            end_block_timestamp: ts,
        }
    }

    #[test]
    fn coalesces_adjacent_ranges() {
        let rows = vec![range(1, 0, 100, 1_000), range(1, 101, 200, 2_000)];
        let merged = coalesce_ranges(&rows);
        assert_eq!(merged, vec![range(1, 0, 200, 2_000)]);
    }

    #[test]
    fn leaves_gap_separated_ranges_distinct() {
        let rows = vec![range(1, 0, 100, 1_000), range(1, 500, 600, 5_000)];
        let merged = coalesce_ranges(&rows);
        assert_eq!(merged, rows);
    }

    #[test]
    fn leading_range_requires_start_at_or_before_target() {
        let groups = vec![range(1, 10, 100, 1_000)];
        assert_eq!(leading_range_end_timestamp(&groups, 10), 1_000);
        assert_eq!(leading_range_end_timestamp(&groups, 9), 0);
    }

    #[test]
    fn calldata_hash_is_deterministic() {
        assert_eq!(calldata_hash(b"abc"), calldata_hash(b"abc"));
        assert_ne!(calldata_hash(b"abc"), calldata_hash(b"abd"));
    }
}
