//! Converts `ethrpc`'s raw JSON-RPC wire types into the event store's
//! fixed-width domain model. This is the one place in the workspace that
//! understands both vocabularies, which is why it lives in its own crate
//! rather than in `ethrpc` (which must stay free of a dependency on the
//! event store) or `event-store` (which must stay free of a dependency on
//! the RPC wire format).

use {
    crate::{error::ConversionError, hex_codec},
    ethrpc::types::{RawBlock, RawLog, RawTransaction},
    event_store::model::{Block, Log, Transaction, TransactionType},
};

/// Fallibly narrows a wire-format `u64` quantity (block number, timestamp,
/// index, ...) into the `i64` the event store's columns use. Block-level
/// quantities never approach `i64::MAX` in practice, but the lint the
/// workspace carries over from the teacher (`cast_possible_wrap`) is right
/// that an `as i64` cast can't express that — so this goes through
/// `try_from` and a real error instead.
pub fn to_i64(field: &'static str, value: u64) -> Result<i64, ConversionError> {
    i64::try_from(value).map_err(|_| ConversionError::FieldOverflow { field, value })
}

/// Same conversion for a chain ID, used by every caller that needs to pass
/// one of `event-store`'s `chain_id: i64` parameters.
pub fn chain_id_to_i64(chain_id: chain::ChainId) -> Result<i64, ConversionError> {
    to_i64("chain_id", chain_id.id())
}

pub fn convert_block(chain_id: i64, raw: &RawBlock) -> Result<Block, ConversionError> {
    Ok(Block {
        chain_id,
        hash: hex_codec::parse_exact(&raw.hash)?,
        parent_hash: hex_codec::parse_exact(&raw.parent_hash)?,
        number: to_i64("block.number", raw.number)?,
        timestamp: to_i64("block.timestamp", raw.timestamp)?,
        miner: hex_codec::parse_exact(&raw.miner)?,
        gas_limit: hex_codec::parse_padded(&raw.gas_limit)?,
        gas_used: hex_codec::parse_padded(&raw.gas_used)?,
        base_fee_per_gas: raw
            .base_fee_per_gas
            .as_deref()
            .map(hex_codec::parse_padded)
            .transpose()?,
        difficulty: hex_codec::parse_padded(&raw.difficulty)?,
        total_difficulty: raw
            .total_difficulty
            .as_deref()
            .map(hex_codec::parse_padded)
            .transpose()?
            .unwrap_or_default(),
        extra_data: hex_codec::parse_bytes(&raw.extra_data)?,
        logs_bloom: hex_codec::parse_bytes(&raw.logs_bloom)?,
        mix_hash: hex_codec::parse_exact(&raw.mix_hash)?,
        nonce: hex_codec::parse_exact(&raw.nonce)?,
        receipts_root: hex_codec::parse_exact(&raw.receipts_root)?,
        sha3_uncles: hex_codec::parse_exact(&raw.sha3_uncles)?,
        size: to_i64("block.size", raw.size)?,
        state_root: hex_codec::parse_exact(&raw.state_root)?,
        transactions_root: hex_codec::parse_exact(&raw.transactions_root)?,
    })
}

pub fn convert_transaction(chain_id: i64, raw: &RawTransaction) -> Result<Transaction, ConversionError> {
    let transaction_type = match raw.transaction_type.as_deref() {
        None | Some("0x0") => TransactionType::Legacy,
        Some("0x1") => TransactionType::Eip2930,
        Some("0x2") => TransactionType::Eip1559,
        Some(other) => {
            return Err(ConversionError::UnknownTransactionType(other.to_string()));
        }
    };
    Ok(Transaction {
        chain_id,
        hash: hex_codec::parse_exact(&raw.hash)?,
        block_hash: raw
            .block_hash
            .as_deref()
            .map(hex_codec::parse_exact)
            .transpose()?
            .unwrap_or_default(),
        block_number: to_i64("transaction.block_number", raw.block_number.unwrap_or_default())?,
        transaction_index: to_i64(
            "transaction.transaction_index",
            raw.transaction_index.unwrap_or_default(),
        )?,
        from: hex_codec::parse_exact(&raw.from)?,
        to: raw.to.as_deref().map(hex_codec::parse_exact).transpose()?,
        input: hex_codec::parse_bytes(&raw.input)?,
        nonce: to_i64("transaction.nonce", raw.nonce)?,
        value: hex_codec::parse_padded(&raw.value)?,
        gas: hex_codec::parse_padded(&raw.gas)?,
        v: raw.v.as_deref().map(hex_codec::parse_i64).transpose()?.unwrap_or_default(),
        r: raw
            .r
            .as_deref()
            .map(hex_codec::parse_padded)
            .transpose()?
            .unwrap_or_default(),
        s: raw
            .s
            .as_deref()
            .map(hex_codec::parse_padded)
            .transpose()?
            .unwrap_or_default(),
        transaction_type,
        gas_price: raw.gas_price.as_deref().map(hex_codec::parse_padded).transpose()?,
        max_fee_per_gas: raw
            .max_fee_per_gas
            .as_deref()
            .map(hex_codec::parse_padded)
            .transpose()?,
        max_priority_fee_per_gas: raw
            .max_priority_fee_per_gas
            .as_deref()
            .map(hex_codec::parse_padded)
            .transpose()?,
        access_list: raw.access_list.clone(),
    })
}

pub fn convert_log(chain_id: i64, raw: &RawLog) -> Result<Log, ConversionError> {
    let block_hash = hex_codec::parse_exact(&raw.block_hash)?;
    let log_index = to_i64("log.log_index", raw.log_index)?;
    let topic_at = |index: usize| -> Result<Option<_>, ConversionError> {
        raw.topics.get(index).map(|t| hex_codec::parse_exact(t)).transpose()
    };
    Ok(Log {
        chain_id,
        id: Log::id_of(block_hash, log_index),
        address: hex_codec::parse_exact(&raw.address)?,
        block_hash,
        block_number: to_i64("log.block_number", raw.block_number)?,
        transaction_hash: hex_codec::parse_exact(&raw.transaction_hash)?,
        transaction_index: to_i64("log.transaction_index", raw.transaction_index)?,
        log_index,
        data: hex_codec::parse_bytes(&raw.data)?,
        topic0: topic_at(0)?,
        topic1: topic_at(1)?,
        topic2: topic_at(2)?,
        topic3: topic_at(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_log() -> RawLog {
        RawLog {
            address: format!("0x{}", "11".repeat(20)),
            block_hash: format!("0x{}", "22".repeat(32)),
            block_number: 100,
            transaction_hash: format!("0x{}", "33".repeat(32)),
            transaction_index: 0,
            log_index: 3,
            data: "0x".to_string(),
            topics: vec![format!("0x{}", "44".repeat(32))],
            removed: false,
        }
    }

    #[test]
    fn log_id_is_block_hash_concat_log_index() {
        let log = convert_log(1, &sample_log()).unwrap();
        assert_eq!(&log.id.0[..32], &log.block_hash.0[..]);
        assert_eq!(&log.id.0[32..], &3i64.to_be_bytes());
    }

    #[test]
    fn missing_topic_slots_are_none() {
        let log = convert_log(1, &sample_log()).unwrap();
        assert!(log.topic0.is_some());
        assert!(log.topic1.is_none());
    }
}
