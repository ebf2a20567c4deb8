use chain::ChainId;

/// Either a single value or a set of values matched in a log filter slot
/// (§3: "address? (single or set)", "topics? … per-slot single/set/null").
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T: PartialEq> OneOrMany<T> {
    pub fn contains(&self, value: &T) -> bool {
        match self {
            Self::One(v) => v == value,
            Self::Many(vs) => vs.contains(value),
        }
    }
}

/// A single topic slot: absent (matches anything), a single value, or a set.
pub type TopicSlot = Option<OneOrMany<String>>;

/// A source ABI reference: either an inline JSON literal or a filesystem path
/// to one. ABI *parsing* is out of scope (§1); this only carries the
/// reference through to whatever component decodes logs.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(untagged)]
pub enum AbiSource {
    Path(std::path::PathBuf),
    Literal(serde_json::Value),
}

/// `filters[]` / `contracts[]` (§6, §3 `LogFilter`).
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct LogFilterConfig {
    /// Unique (within the process) filter name.
    pub name: String,
    pub network: String,
    pub chain_id: ChainId,
    pub abi: AbiSource,
    pub address: Option<OneOrMany<String>>,
    pub topics: Option<Vec<TopicSlot>>,
    #[serde(default)]
    pub start_block: u64,
    /// Absent means realtime: tail forever.
    pub end_block: Option<u64>,
    pub max_block_range: Option<u64>,
}

impl LogFilterConfig {
    pub fn is_realtime(&self) -> bool {
        self.end_block.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_topic_slot_matches_everything() {
        let slot: TopicSlot = None;
        assert!(slot.is_none());
    }

    #[test]
    fn address_set_contains_matches_any_member() {
        let set = OneOrMany::Many(vec!["0xA".to_string(), "0xB".to_string()]);
        assert!(set.contains(&"0xB".to_string()));
        assert!(!set.contains(&"0xC".to_string()));
    }

    #[test]
    fn deserializes_minimal_filter() {
        let cfg: LogFilterConfig = toml::from_str(
            r#"
            name = "transfers"
            network = "mainnet"
            chain-id = 1
            abi = "abi/erc20.json"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.start_block, 0);
        assert!(cfg.is_realtime());
    }
}
