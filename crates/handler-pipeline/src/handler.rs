//! User handler registration, keyed on `(filterName, eventName)` (§4.5).
//! Handler *code* is user-supplied and out of this crate's scope (§1); this
//! only defines the trait a handler implements and the registry the engine
//! dispatches through.

use {
    crate::{contracts::ContractsView, entities::EntitiesView},
    aggregator::DecodedEvent,
    std::{collections::HashMap, sync::Arc},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerKey {
    pub filter_name: String,
    pub event_name: String,
}

impl HandlerKey {
    pub fn new(filter_name: impl Into<String>, event_name: impl Into<String>) -> Self {
        Self {
            filter_name: filter_name.into(),
            event_name: event_name.into(),
        }
    }

    /// Derives the key a decoded event dispatches under: its filter name
    /// plus its ABI item's `name` field. A decoded event whose ABI item
    /// carries no `name` has no handler key and is dropped (treated the
    /// same as an unregistered handler — logged, not fatal).
    fn for_event(event: &DecodedEvent) -> Option<Self> {
        let event_name = event.abi_item.get("name")?.as_str()?;
        Some(Self::new(event.filter_name.clone(), event_name))
    }
}

#[async_trait::async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        event: &DecodedEvent,
        entities: &mut dyn EntitiesView,
        contracts: &dyn ContractsView,
    ) -> anyhow::Result<()>;
}

/// The full `(filterName, eventName) -> Handler` mapping rebuilt on every hot
/// reload (§4.5 `reset`).
#[derive(Clone, Default)]
pub struct HandlerRegistry(HashMap<HandlerKey, Arc<dyn Handler>>);

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: HandlerKey, handler: Arc<dyn Handler>) {
        self.0.insert(key, handler);
    }

    /// Looks up the handler for a decoded event. `None` covers both "no ABI
    /// name" and "no handler registered for this (filter, event) pair" —
    /// neither is an error, the event is simply skipped.
    pub fn lookup(&self, event: &DecodedEvent) -> Option<&Arc<dyn Handler>> {
        self.0.get(&HandlerKey::for_event(event)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_without_a_named_abi_item_has_no_key() {
        let event = sample_event(serde_json::json!({}));
        assert!(HandlerKey::for_event(&event).is_none());
    }

    #[test]
    fn event_name_comes_from_the_abi_items_name_field() {
        let event = sample_event(serde_json::json!({"name": "Transfer"}));
        let key = HandlerKey::for_event(&event).unwrap();
        assert_eq!(key.event_name, "Transfer");
        assert_eq!(key.filter_name, "transfers");
    }

    fn sample_event(abi_item: serde_json::Value) -> DecodedEvent {
        DecodedEvent {
            event: sample_joined_event(),
            filter_name: "transfers".to_string(),
            abi_item,
        }
    }

    fn sample_joined_event() -> event_store::model::JoinedLogEvent {
        let hash = event_store::byte_array::ByteArray([0u8; 32]);
        let addr = event_store::byte_array::ByteArray([0u8; 20]);
        event_store::model::JoinedLogEvent {
            log: event_store::model::Log {
                chain_id: 1,
                id: event_store::byte_array::ByteArray([0u8; 40]),
                address: addr,
                block_hash: hash,
                block_number: 1,
                transaction_hash: hash,
                transaction_index: 0,
                log_index: 0,
                data: vec![],
                topic0: None,
                topic1: None,
                topic2: None,
                topic3: None,
            },
            block: event_store::model::Block {
                chain_id: 1,
                hash,
                parent_hash: hash,
                number: 1,
                timestamp: 1,
                miner: addr,
                gas_limit: event_store::byte_array::ByteArray([0u8; 32]),
                gas_used: event_store::byte_array::ByteArray([0u8; 32]),
                base_fee_per_gas: None,
                difficulty: event_store::byte_array::ByteArray([0u8; 32]),
                total_difficulty: event_store::byte_array::ByteArray([0u8; 32]),
                extra_data: vec![],
                logs_bloom: vec![],
                mix_hash: hash,
                nonce: event_store::byte_array::ByteArray([0u8; 8]),
                receipts_root: hash,
                sha3_uncles: hash,
                size: 0,
                state_root: hash,
                transactions_root: hash,
            },
            transaction: event_store::model::Transaction {
                chain_id: 1,
                hash,
                block_hash: hash,
                block_number: 1,
                transaction_index: 0,
                from: addr,
                to: None,
                input: vec![],
                nonce: 0,
                value: event_store::byte_array::ByteArray([0u8; 32]),
                gas: event_store::byte_array::ByteArray([0u8; 32]),
                v: 0,
                r: event_store::byte_array::ByteArray([0u8; 32]),
                s: event_store::byte_array::ByteArray([0u8; 32]),
                transaction_type: event_store::model::TransactionType::Legacy,
                gas_price: None,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
                access_list: None,
            },
        }
    }
}
