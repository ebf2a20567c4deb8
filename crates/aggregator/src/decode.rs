//! Per-filter `topic0 → ABI event item` lookup used by [`crate::local`]'s
//! `getEvents` to resolve which ABI item a log matches (§4.4: "decodes logs
//! by looking up `topic0` in `includeLogFilterEvents[filterName].bySelector`
//! → ABI event item; undecodable logs are logged and skipped"). ABI parsing
//! itself stays out of scope (§1) — the ABI item is an opaque JSON value
//! handed back to the caller, who owns turning it into typed handler
//! arguments.

use {event_store::model::Hash, std::collections::HashMap};

/// `bySelector` for a single named filter.
#[derive(Clone, Debug, Default)]
pub struct EventSelectorIndex {
    by_selector: HashMap<Hash, serde_json::Value>,
}

impl EventSelectorIndex {
    pub fn new(by_selector: HashMap<Hash, serde_json::Value>) -> Self {
        Self { by_selector }
    }
}

/// `includeLogFilterEvents`, keyed by filter name.
#[derive(Clone, Debug, Default)]
pub struct IncludeLogFilterEvents(HashMap<String, EventSelectorIndex>);

impl IncludeLogFilterEvents {
    pub fn new(filters: HashMap<String, EventSelectorIndex>) -> Self {
        Self(filters)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Looks up the ABI event item for `topic0` under `filter_name`. Returns
    /// `None` on any miss (unknown filter, no topic0, or unknown selector) —
    /// the caller logs and skips per the "undecodable logs" policy rather
    /// than treating this as an error.
    pub fn lookup(&self, filter_name: &str, topic0: Option<Hash>) -> Option<&serde_json::Value> {
        let topic0 = topic0?;
        self.0.get(filter_name)?.by_selector.get(&topic0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(byte: u8) -> Hash {
        event_store::byte_array::ByteArray([byte; 32])
    }

    #[test]
    fn missing_filter_name_is_a_miss_not_an_error() {
        let index = IncludeLogFilterEvents::default();
        assert!(index.lookup("transfers", Some(hash(1))).is_none());
    }

    #[test]
    fn missing_topic0_is_a_miss() {
        let mut by_selector = HashMap::new();
        by_selector.insert(hash(1), serde_json::json!({"name": "Transfer"}));
        let mut filters = HashMap::new();
        filters.insert("transfers".to_string(), EventSelectorIndex::new(by_selector));
        let index = IncludeLogFilterEvents::new(filters);
        assert!(index.lookup("transfers", None).is_none());
    }

    #[test]
    fn known_selector_resolves_to_its_abi_item() {
        let mut by_selector = HashMap::new();
        by_selector.insert(hash(1), serde_json::json!({"name": "Transfer"}));
        let mut filters = HashMap::new();
        filters.insert("transfers".to_string(), EventSelectorIndex::new(by_selector));
        let index = IncludeLogFilterEvents::new(filters);
        let item = index.lookup("transfers", Some(hash(1))).unwrap();
        assert_eq!(item["name"], "Transfer");
    }
}
