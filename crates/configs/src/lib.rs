pub mod database;
pub(crate) mod deserialize_env;
pub mod filter;
pub mod network;
pub mod options;

pub use {
    database::DatabaseConfig,
    filter::LogFilterConfig,
    network::{ConfigError, NetworkConfig, PaymentsConfig},
    options::{Mode, Options},
};

use std::{collections::HashSet, path::Path};

/// The top-level config file (§6): `{database, networks[], filters[],
/// options}`.
#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub filters: Vec<LogFilterConfig>,
    #[serde(default)]
    pub options: Options,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_networks = HashSet::new();
        for network in &self.networks {
            network.validate()?;
            if !seen_networks.insert(network.name.as_str()) {
                return Err(ConfigError::DuplicateNetwork(network.name.clone()));
            }
        }

        let mut seen_filters = HashSet::new();
        for filter in &self.filters {
            if !seen_filters.insert(filter.name.as_str()) {
                return Err(ConfigError::DuplicateFilter(filter.name.clone()));
            }
            if !seen_networks.contains(filter.network.as_str()) {
                return Err(ConfigError::UnknownNetwork(
                    filter.name.clone(),
                    filter.network.clone(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
        [database]
        kind = "sqlite"
        directory = "/tmp/indexer"

        [[networks]]
        name = "mainnet"
        chain-id = 1
        rpc-url = "https://rpc.example.com"

        [[filters]]
        name = "transfers"
        network = "mainnet"
        chain-id = 1
        abi = "abi/erc20.json"

        [options]
        mode = "Standalone"
    "#;

    #[test]
    fn loads_minimal_config() {
        let file = write_config(MINIMAL);
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.filters.len(), 1);
        assert_eq!(config.options.mode, Mode::Standalone);
        assert_eq!(config.options.max_healthcheck_duration, 240);
    }

    #[test]
    fn rejects_filter_referencing_unknown_network() {
        let contents = MINIMAL.replace(r#"network = "mainnet""#, r#"network = "gnosis""#);
        let file = write_config(&contents);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownNetwork(_, _)));
    }

    #[test]
    fn rejects_duplicate_network_names() {
        let contents = format!(
            "{MINIMAL}\n[[networks]]\nname = \"mainnet\"\nchain-id = 5\nrpc-url = \
             \"https://rpc2.example.com\"\n"
        );
        let file = write_config(&contents);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateNetwork(_)));
    }

    #[test]
    fn rejects_network_missing_endpoint() {
        let contents = MINIMAL.replace(r#"rpc-url = "https://rpc.example.com""#, "");
        let file = write_config(&contents);
        let err = Config::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEndpoint(_)));
    }
}
