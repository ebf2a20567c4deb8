use {chain::ChainId, std::num::NonZeroUsize, url::Url};

fn default_polling_interval() -> std::time::Duration {
    std::time::Duration::from_millis(1_000)
}

const fn default_max_rpc_request_concurrency() -> NonZeroUsize {
    NonZeroUsize::new(10).expect("value should be greater than 0")
}

/// `networks[]` (§6). One entry per chain the indexer tails. Exactly one of
/// `rpc_url`/`indexer_url` must be set: a direct network talks to an RPC
/// endpoint, a network in `Watcher` mode talks to a remote indexer instead.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct NetworkConfig {
    /// Unique (within the process) network name log filters reference.
    pub name: String,
    pub chain_id: ChainId,
    pub rpc_url: Option<Url>,
    pub indexer_url: Option<Url>,
    #[serde(default = "default_polling_interval", with = "humantime_serde")]
    pub polling_interval: std::time::Duration,
    #[serde(default = "default_max_rpc_request_concurrency")]
    pub max_rpc_request_concurrency: NonZeroUsize,
    pub payments: Option<PaymentsConfig>,
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rpc_url.is_none() && self.indexer_url.is_none() {
            return Err(ConfigError::MissingEndpoint(self.name.clone()));
        }
        Ok(())
    }
}

/// Method-gated payment hook for the paid RPC transport (§4.6). The actual
/// voucher negotiation is out of scope; this only carries the set of methods
/// that require a voucher and how to reach the payments collaborator.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PaymentsConfig {
    pub endpoint: Url,
    #[serde(default = "default_paid_methods")]
    pub paid_methods: Vec<String>,
}

fn default_paid_methods() -> Vec<String> {
    vec![
        "eth_getLogs".to_string(),
        "eth_getBlockByNumber".to_string(),
        "eth_getBlockByHash".to_string(),
    ]
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("network {0:?} must set either rpc-url or indexer-url")]
    MissingEndpoint(String),
    #[error("duplicate network name {0:?}")]
    DuplicateNetwork(String),
    #[error("duplicate filter name {0:?}")]
    DuplicateFilter(String),
    #[error("filter {0:?} references unknown network {1:?}")]
    UnknownNetwork(String, String),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}
