//! Per-chain constants derived purely from a chain ID (and, for the default
//! block-range heuristic, the configured RPC URL). These are the numbers the
//! historical and realtime sync engines fall back to when a network or log
//! filter does not override them explicitly.

use serde::{
    de::{self, Deserialize, Deserializer},
    Serialize,
};

/// A chain ID. The indexing core has to accept any EVM chain a user points a
/// network config at, so this is a thin newtype rather than a closed enum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub fn id(&self) -> u64 {
        self.0
    }

    /// `finalityBlockCount` (§6): the number of blocks below the current head
    /// after which a block is assumed final and reorgs are assumed
    /// impossible.
    pub fn finality_block_count(&self) -> u64 {
        match self.family() {
            ChainFamily::EthereumMainnet => 32,
            ChainFamily::Polygon => 100,
            ChainFamily::Arbitrum => 40,
            ChainFamily::OptimismOrZora => 5,
            ChainFamily::Other => 5,
        }
    }

    /// `defaultMaxBlockRange` (§6): the default width of a single
    /// `eth_getLogs` task when a log filter does not override it.
    pub fn default_max_block_range(&self, rpc_url: Option<&str>) -> u64 {
        if matches!(self.family(), ChainFamily::EthereumMainnet) {
            return 2_000;
        }
        if rpc_url.is_some_and(|url| url.contains("quiknode.pro")) {
            return 10_000;
        }
        50_000
    }

    fn family(&self) -> ChainFamily {
        match self.0 {
            1 | 3 | 4 | 5 | 42 | 11_155_111 => ChainFamily::EthereumMainnet,
            137 | 80_001 | 80_002 => ChainFamily::Polygon,
            42_161 | 42_170 | 421_613 | 421_614 => ChainFamily::Arbitrum,
            10 | 420 | 11_155_420 | 7_777_777 => ChainFamily::OptimismOrZora,
            _ => ChainFamily::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChainFamily {
    EthereumMainnet,
    Polygon,
    Arbitrum,
    OptimismOrZora,
    Other,
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl<'de> Deserialize<'de> for ChainId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ChainIdVisitor;

        impl<'de> de::Visitor<'de> for ChainIdVisitor {
            type Value = ChainId;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a u64 or a string containing one")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ChainId(value))
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<u64>().map(ChainId).map_err(de::Error::custom)
            }
        }

        deserializer.deserialize_any(ChainIdVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finality_block_count_by_family() {
        assert_eq!(ChainId(1).finality_block_count(), 32);
        assert_eq!(ChainId(11_155_111).finality_block_count(), 32);
        assert_eq!(ChainId(10).finality_block_count(), 5);
        assert_eq!(ChainId(7_777_777).finality_block_count(), 5);
        assert_eq!(ChainId(137).finality_block_count(), 100);
        assert_eq!(ChainId(42_161).finality_block_count(), 40);
        assert_eq!(ChainId(999_999).finality_block_count(), 5);
    }

    #[test]
    fn default_max_block_range_prefers_mainnet_family_over_rpc_hint() {
        assert_eq!(ChainId(1).default_max_block_range(Some("https://x.quiknode.pro/foo")), 2_000);
    }

    #[test]
    fn default_max_block_range_quiknode_hint() {
        assert_eq!(
            ChainId(137).default_max_block_range(Some("https://example.quiknode.pro/abc")),
            10_000
        );
    }

    #[test]
    fn default_max_block_range_fallback() {
        assert_eq!(ChainId(137).default_max_block_range(Some("https://rpc.ankr.com")), 50_000);
        assert_eq!(ChainId(137).default_max_block_range(None), 50_000);
    }

    #[test]
    fn deserialize_from_u64_or_string() {
        let from_u64: ChainId = serde_json::from_str("1").unwrap();
        assert_eq!(from_u64, ChainId(1));
        let from_str: ChainId = serde_json::from_str("\"100\"").unwrap();
        assert_eq!(from_str, ChainId(100));
    }
}
