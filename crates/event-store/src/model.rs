//! Plain data representations of the event store's domain. These are shared
//! between the Postgres and SQLite backends and deliberately hold no
//! backend-specific types beyond [`ByteArray`].

use crate::byte_array::ByteArray;

pub type Hash = ByteArray<32>;
pub type Address = ByteArray<20>;
/// A 256-bit integer stored big-endian so its byte ordering matches its
/// numeric ordering (`alloy_primitives::U256::to_be_bytes`/`from_be_bytes` at
/// the RPC decode boundary).
pub type U256Bytes = ByteArray<32>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::EnumString, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum TransactionType {
    Legacy,
    Eip2930,
    Eip1559,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub chain_id: i64,
    pub hash: Hash,
    pub parent_hash: Hash,
    pub number: i64,
    pub timestamp: i64,
    pub miner: Address,
    pub gas_limit: U256Bytes,
    pub gas_used: U256Bytes,
    pub base_fee_per_gas: Option<U256Bytes>,
    pub difficulty: U256Bytes,
    pub total_difficulty: U256Bytes,
    pub extra_data: Vec<u8>,
    pub logs_bloom: Vec<u8>,
    pub mix_hash: Hash,
    pub nonce: ByteArray<8>,
    pub receipts_root: Hash,
    pub sha3_uncles: Hash,
    pub size: i64,
    pub state_root: Hash,
    pub transactions_root: Hash,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub chain_id: i64,
    pub hash: Hash,
    pub block_hash: Hash,
    pub block_number: i64,
    pub transaction_index: i64,
    pub from: Address,
    pub to: Option<Address>,
    pub input: Vec<u8>,
    pub nonce: i64,
    pub value: U256Bytes,
    pub gas: U256Bytes,
    pub v: i64,
    pub r: U256Bytes,
    pub s: U256Bytes,
    pub transaction_type: TransactionType,
    pub gas_price: Option<U256Bytes>,
    pub max_fee_per_gas: Option<U256Bytes>,
    pub max_priority_fee_per_gas: Option<U256Bytes>,
    pub access_list: Option<serde_json::Value>,
}

/// `id = blockHash‖logIndex`, 40 bytes, globally unique within a chain.
pub type LogId = ByteArray<40>;

#[derive(Clone, Debug, PartialEq)]
pub struct Log {
    pub chain_id: i64,
    pub id: LogId,
    pub address: Address,
    pub block_hash: Hash,
    pub block_number: i64,
    pub transaction_hash: Hash,
    pub transaction_index: i64,
    pub log_index: i64,
    pub data: Vec<u8>,
    pub topic0: Option<Hash>,
    pub topic1: Option<Hash>,
    pub topic2: Option<Hash>,
    pub topic3: Option<Hash>,
}

impl Log {
    pub fn id_of(block_hash: Hash, log_index: i64) -> LogId {
        let mut bytes = [0u8; 40];
        bytes[..32].copy_from_slice(&block_hash.0);
        bytes[32..].copy_from_slice(&log_index.to_be_bytes());
        ByteArray(bytes)
    }
}

/// A single per-filter-per-topic-slot predicate: absent (matches anything),
/// a single value, or a set of alternatives.
#[derive(Clone, Debug, PartialEq)]
pub enum TopicSlot {
    Any,
    One(Hash),
    Set(Vec<Hash>),
}

/// A fully resolved log filter used to build query predicates. Distinct from
/// `configs::filter::LogFilterConfig`, which carries TOML-facing types
/// (paths, JSON ABI literals); this is the narrow shape the event store
/// cares about.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedFilter {
    pub name: String,
    pub chain_id: i64,
    pub address: Option<Vec<Address>>,
    pub topics: Vec<TopicSlot>,
}

impl ResolvedFilter {
    /// Stable identity hash used as the `cached_ranges.filter_key`. Two
    /// filters with the same chain/address/topics share cached-range
    /// bookkeeping even if differently named; in practice filter names are
    /// unique per process so this rarely matters, but the key is derived
    /// from identity, not name, to match the spec's definition.
    pub fn key(&self) -> FilterKey {
        use std::hash::{Hash as _, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.chain_id.hash(&mut hasher);
        match &self.address {
            Some(addrs) => {
                for a in addrs {
                    a.0.hash(&mut hasher);
                }
            }
            None => 0u8.hash(&mut hasher),
        }
        for slot in &self.topics {
            match slot {
                TopicSlot::Any => 0u8.hash(&mut hasher),
                TopicSlot::One(h) => h.0.hash(&mut hasher),
                TopicSlot::Set(hs) => {
                    for h in hs {
                        h.0.hash(&mut hasher)
                    }
                }
            }
        }
        FilterKey(hasher.finish())
    }

    pub fn matches_log(&self, log: &Log) -> bool {
        if log.chain_id != self.chain_id {
            return false;
        }
        if let Some(addrs) = &self.address {
            if !addrs.contains(&log.address) {
                return false;
            }
        }
        let log_topics = [log.topic0, log.topic1, log.topic2, log.topic3];
        for (slot, topic) in self.topics.iter().zip(log_topics.iter()) {
            let matched = match (slot, topic) {
                (TopicSlot::Any, _) => true,
                (TopicSlot::One(expected), Some(actual)) => expected == actual,
                (TopicSlot::Set(expected), Some(actual)) => expected.contains(actual),
                (TopicSlot::One(_) | TopicSlot::Set(_), None) => false,
            };
            if !matched {
                return false;
            }
        }
        true
    }
}

/// Stable identity hash of a `ResolvedFilter`, used to key cached ranges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterKey(pub u64);

impl FilterKey {
    /// Bit-reinterpretation into the signed column type backends store this
    /// hash in. A lossless round-trip, not a magnitude-preserving
    /// conversion — the hash's bit pattern is all that matters, never its
    /// signed value — so this stays a `to_be_bytes`/`from_be_bytes` pair
    /// rather than a wrapping `as i64` cast.
    pub fn as_i64(&self) -> i64 {
        i64::from_be_bytes(self.0.to_be_bytes())
    }

    pub fn from_i64(value: i64) -> Self {
        Self(u64::from_be_bytes(value.to_be_bytes()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CachedRange {
    pub filter_key: FilterKey,
    pub start_block: i64,
    pub end_block: i64,
    pub end_block_timestamp: i64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ContractReadResult {
    pub chain_id: i64,
    pub address: Address,
    pub block_number: i64,
    pub calldata: Vec<u8>,
    pub result: Vec<u8>,
}

/// Iterator position: `{timestamp, chainId, blockNumber, logIndex}`, strictly
/// ordered lexicographically in that precedence (derived `Ord` gives us this
/// for free from field declaration order).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor {
    pub timestamp: i64,
    pub chain_id: i64,
    pub block_number: i64,
    pub log_index: i64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint {
    pub historical_checkpoint: i64,
    pub realtime_checkpoint: i64,
    pub finality_checkpoint: i64,
    pub is_historical_sync_complete: bool,
}

/// A resolved log together with its (mandatory) block and transaction, as
/// returned by the event iteration contract. Missing either join target is a
/// fatal invariant violation, never represented here.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinedLogEvent {
    pub log: Log,
    pub block: Block,
    pub transaction: Transaction,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventPageMetadata {
    pub page_ends_at_timestamp: i64,
    /// Per `(filterName, topic0)` counts within the page.
    pub counts: std::collections::BTreeMap<(String, Option<Hash>), u64>,
    /// Present when the page was truncated; the next `fromTimestamp`-style
    /// exclusive lower bound to resume from.
    pub cursor: Option<Cursor>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventPage {
    pub events: Vec<JoinedLogEvent>,
    pub metadata: EventPageMetadata,
}

#[derive(Clone, Debug, Default)]
pub struct GetLogEventsQuery<'a> {
    pub from_timestamp: i64,
    pub to_timestamp: i64,
    pub filters: &'a [ResolvedFilter],
    pub page_size: u32,
    pub cursor: Option<Cursor>,
    /// Restrict `counts` to these `topic0` values when non-empty; empty
    /// means "all selectors".
    pub include_event_selectors: &'a [Hash],
}
