//! Builds the `eth_getLogs` filter object for a `(ResolvedFilter, BlockRange)`
//! pair. This is RPC wire construction, not filter *resolution* (that's
//! `chain_sync::filter`), so it lives here rather than in `chain-sync`.

use {
    chain_sync::ranges::BlockRange,
    ethrpc::types::{to_quantity, GetLogsFilter},
    event_store::model::{ResolvedFilter, TopicSlot},
};

pub fn build_log_filter(filter: &ResolvedFilter, range: BlockRange) -> GetLogsFilter {
    GetLogsFilter {
        from_block: Some(to_quantity(range.start)),
        to_block: Some(to_quantity(range.end)),
        address: filter
            .address
            .as_ref()
            .map(|addrs| addrs.iter().map(|a| format!("0x{}", hex::encode(a.0))).collect()),
        block_hash: None,
        topics: filter.topics.iter().map(topic_slot_to_json).collect(),
    }
}

fn topic_slot_to_json(slot: &TopicSlot) -> serde_json::Value {
    match slot {
        TopicSlot::Any => serde_json::Value::Null,
        TopicSlot::One(hash) => serde_json::Value::String(format!("0x{}", hex::encode(hash.0))),
        TopicSlot::Set(hashes) => serde_json::Value::Array(
            hashes.iter().map(|h| serde_json::Value::String(format!("0x{}", hex::encode(h.0)))).collect(),
        ),
    }
}
