/// `options.mode` (§6): selects which components the binary hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "PascalCase")]
pub enum Mode {
    /// All components in-process.
    Standalone,
    /// Hosts sync + event store + GraphQL subscriptions; no handler
    /// pipeline.
    Indexer,
    /// Hosts handler pipeline + derived store + user API; pulls events from
    /// a remote Indexer.
    Watcher,
}

const fn default_max_healthcheck_duration() -> u64 {
    240
}

#[derive(Debug, Clone, serde::Deserialize)]
#[cfg_attr(feature = "test-util", derive(serde::Serialize))]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Options {
    #[serde(default = "default_max_healthcheck_duration")]
    pub max_healthcheck_duration: u64,
    pub mode: Mode,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_healthcheck_duration: default_max_healthcheck_duration(),
            mode: Mode::Standalone,
        }
    }
}
