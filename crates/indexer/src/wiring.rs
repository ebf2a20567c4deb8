//! Builds the component graph described by a [`configs::Config`] and runs it
//! according to `options.mode` (§6): which stores, transports, sync engines,
//! aggregator variant, and handler pipeline a process hosts varies by mode,
//! but every mode is assembled from the same handful of constructors.

use {
    crate::arguments::Arguments,
    aggregator::{Aggregator, EventAggregating, RemoteAggregator},
    anyhow::Context,
    chain::ChainId,
    configs::{Config, DatabaseConfig, Mode, NetworkConfig},
    derived_store::{DerivedStore, PostgresDerivedStore, SqliteDerivedStore},
    ethrpc::{DirectTransport, PaidTransport, PaymentVoucherProvider, RpcTransport},
    event_store::{EventStore, PostgresEventStore, SqliteEventStore},
    handler_pipeline::{HandlerRegistry, Pipeline},
    historical_sync::{FilterSpec, HistoricalSync},
    observe::LivenessChecking,
    realtime_sync::RealtimeSync,
    std::{
        collections::HashMap,
        path::Path,
        sync::Arc,
        time::{Duration, Instant},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    url::Url,
};

#[derive(prometheus_metric_storage::MetricStorage)]
struct Metrics {
    /// Number of seconds the process has been running for.
    seconds_alive: prometheus::IntGauge,
}

/// Negotiates a payment voucher over HTTP (§9 "Paid-RPC side-effect"):
/// POSTs `{method}`, expects `{voucher}` back. The negotiation protocol past
/// this single request/response is out of scope; this is the minimal
/// concrete collaborator the paid transport needs to exist at all.
struct HttpPaymentVoucherProvider {
    client: reqwest::Client,
    endpoint: url::Url,
}

#[derive(serde::Deserialize)]
struct VoucherResponse {
    voucher: String,
}

#[async_trait::async_trait]
impl PaymentVoucherProvider for HttpPaymentVoucherProvider {
    async fn acquire_voucher(&self, method: &str) -> Result<String, String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&serde_json::json!({ "method": method }))
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let parsed: VoucherResponse = response.json().await.map_err(|err| err.to_string())?;
        Ok(parsed.voucher)
    }
}

/// Per-network runtime handles: the pieces wiring needs to start the sync
/// engines and, in a handler-pipeline-hosting mode, reach this network's
/// transport for `contracts` reads.
struct NetworkRuntime {
    chain_id: ChainId,
    transport: Option<Arc<dyn RpcTransport>>,
    realtime: Option<Arc<RealtimeSync>>,
    historical: Option<Arc<HistoricalSync>>,
    filter_specs: Vec<FilterSpec>,
}

pub struct Indexer {
    metrics_address: std::net::SocketAddr,
    event_store: Arc<dyn EventStore>,
    networks: Vec<NetworkRuntime>,
    aggregator: Arc<dyn EventAggregating>,
    signals: Option<aggregator::events::SignalReceiver>,
    pipeline: Option<Arc<Pipeline>>,
}

async fn sqlite_pool(directory: &Path, file_name: &str) -> anyhow::Result<sqlx::SqlitePool> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("creating database directory {}", directory.display()))?;
    let path = directory.join(file_name);
    let url = format!("sqlite://{}?mode=rwc", path.display());
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .with_context(|| format!("connecting to sqlite database at {}", path.display()))
}

async fn postgres_pool(connection_string: &url::Url) -> anyhow::Result<sqlx::PgPool> {
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(connection_string.as_str())
        .await
        .context("connecting to postgres database")
}

async fn build_event_store(database: &DatabaseConfig) -> anyhow::Result<Arc<dyn EventStore>> {
    let store: Arc<dyn EventStore> = match database {
        DatabaseConfig::Sqlite { directory } => {
            let pool = sqlite_pool(directory, "event_store.sqlite").await?;
            Arc::new(SqliteEventStore::new(pool))
        }
        DatabaseConfig::Postgres { connection_string } => {
            let pool = postgres_pool(connection_string).await?;
            Arc::new(PostgresEventStore::new(pool))
        }
    };
    store.migrate().await.context("running event store migrations")?;
    Ok(store)
}

async fn build_derived_store(database: &DatabaseConfig) -> anyhow::Result<Arc<dyn DerivedStore>> {
    let store: Arc<dyn DerivedStore> = match database {
        DatabaseConfig::Sqlite { directory } => {
            let pool = sqlite_pool(directory, "derived_store.sqlite").await?;
            Arc::new(SqliteDerivedStore::new(pool))
        }
        DatabaseConfig::Postgres { connection_string } => {
            let pool = postgres_pool(connection_string).await?;
            Arc::new(PostgresDerivedStore::new(pool))
        }
    };
    store.migrate().await.context("running derived store migrations")?;
    Ok(store)
}

/// Builds a network's direct RPC transport: plain `DirectTransport`,
/// optionally wrapped in a `PaidTransport` when the network configures
/// payments (§4.6, §9).
fn build_direct_transport(client: reqwest::Client, network: &NetworkConfig) -> anyhow::Result<Arc<dyn RpcTransport>> {
    let rpc_url = network
        .rpc_url
        .clone()
        .context("network has no rpc-url to build a direct transport from")?;
    let direct: Arc<dyn RpcTransport> = Arc::new(DirectTransport::new(client.clone(), rpc_url));
    match &network.payments {
        Some(payments) => {
            let provider = HttpPaymentVoucherProvider {
                client,
                endpoint: payments.endpoint.clone(),
            };
            Ok(Arc::new(PaidTransport::new(
                direct,
                Arc::new(provider),
                payments.paid_methods.clone(),
            )))
        }
        None => Ok(direct),
    }
}

impl Indexer {
    pub async fn build(config: &Config, args: &Arguments) -> anyhow::Result<Self> {
        let http_client = http_client::HttpClientFactory::new(&args.http).create();
        let event_store = build_event_store(&config.database).await?;

        let (aggregator, signals): (Arc<dyn EventAggregating>, Option<aggregator::events::SignalReceiver>) =
            match config.options.mode {
                Mode::Watcher => {
                    let indexer_url = config
                        .networks
                        .iter()
                        .find_map(|network| network.indexer_url.clone())
                        .context("watcher mode requires at least one network with an indexer-url")?;
                    (Arc::new(RemoteAggregator::new(http_client.clone(), indexer_url)), None)
                }
                Mode::Standalone | Mode::Indexer => {
                    let (aggregator, signals) = Aggregator::new(Arc::clone(&event_store));
                    (Arc::new(aggregator), Some(signals))
                }
            };

        let mut networks = Vec::new();
        for network in &config.networks {
            let transport = network
                .rpc_url
                .as_ref()
                .map(|_| build_direct_transport(http_client.clone(), network))
                .transpose()?;

            let (realtime, historical, filter_specs) = match (config.options.mode, transport.clone()) {
                (Mode::Watcher, _) => (None, None, Vec::new()),
                (Mode::Standalone | Mode::Indexer, None) => {
                    tracing::warn!(network = %network.name, "no rpc-url configured, skipping sync engines");
                    (None, None, Vec::new())
                }
                (Mode::Standalone | Mode::Indexer, Some(transport)) => {
                    let filter_specs = resolve_network_filters(config, network)?;
                    let realtime = Arc::new(RealtimeSync::new(
                        network.chain_id,
                        Arc::clone(&event_store),
                        Arc::clone(&transport),
                        Arc::clone(&aggregator),
                        filter_specs.iter().map(|spec| spec.filter.clone()).collect(),
                        network.polling_interval,
                    ));
                    let historical = Arc::new(HistoricalSync::new(
                        network.chain_id,
                        Arc::clone(&event_store),
                        transport,
                        Arc::clone(&aggregator),
                        network.max_rpc_request_concurrency.get(),
                    ));
                    (Some(realtime), Some(historical), filter_specs)
                }
            };

            networks.push(NetworkRuntime {
                chain_id: network.chain_id,
                transport,
                realtime,
                historical,
                filter_specs,
            });
        }

        let pipeline = match config.options.mode {
            Mode::Indexer => None,
            Mode::Standalone | Mode::Watcher => {
                let derived_store = build_derived_store(&config.database).await?;
                let transports: HashMap<i64, Arc<dyn RpcTransport>> = networks
                    .iter()
                    .filter_map(|network| {
                        let chain_id = i64::try_from(network.chain_id.id()).ok()?;
                        Some((chain_id, network.transport.clone()?))
                    })
                    .collect();
                let filters: Vec<event_store::model::ResolvedFilter> = config
                    .filters
                    .iter()
                    .map(chain_sync::filter::resolve)
                    .collect::<Result<_, _>>()
                    .context("resolving configured log filters")?;
                Some(Arc::new(Pipeline::new(
                    derived_store,
                    Arc::clone(&aggregator),
                    Arc::clone(&event_store),
                    transports,
                    filters,
                    // ABI parsing (and thus topic0 -> ABI item decoding) is
                    // out of scope; handlers that need a named event still
                    // register under a (filter, event) key, but this binary
                    // does not attempt to populate that index from the
                    // configured ABI sources.
                    aggregator::decode::IncludeLogFilterEvents::default(),
                    HandlerRegistry::new(),
                )))
            }
        };

        Ok(Self {
            metrics_address: args.metrics_address,
            event_store,
            networks,
            aggregator,
            signals,
            pipeline,
        })
    }

    /// Runs every hosted component until ctrl-c, then shuts down in the
    /// order §5 specifies: stop feeding new signals, let the handler
    /// pipeline finish its current page, stop realtime polling, and let
    /// in-flight historical tasks wind down.
    pub async fn run(self) -> anyhow::Result<()> {
        let token = CancellationToken::new();
        // Tasks with a natural end: joined during graceful shutdown so the
        // process only exits once they've drained.
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();
        // Tasks that run for the lifetime of the process (metrics server,
        // metrics updater): aborted rather than joined, since they never
        // return on their own.
        let mut background: Vec<JoinHandle<()>> = Vec::new();

        let liveness: Arc<dyn LivenessChecking> = match &self.pipeline {
            Some(pipeline) => Arc::clone(pipeline) as Arc<dyn LivenessChecking>,
            None => Arc::new(AlwaysAlive),
        };
        let metrics_address = self.metrics_address;
        background.push(tokio::spawn(async move {
            if let Err(err) = observe::serve_metrics(liveness, metrics_address).await {
                tracing::error!(error = %err, "metrics server exited");
            }
        }));
        background.push(tokio::spawn(async {
            let start = Instant::now();
            let metrics = Metrics::instance(global_metrics::get_metric_storage_registry())
                .expect("metrics registration is infallible at startup");
            loop {
                metrics
                    .seconds_alive
                    .set(i64::try_from(start.elapsed().as_secs()).unwrap_or(i64::MAX));
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }));

        for network in self.networks {
            if let (Some(realtime), Some(historical)) = (network.realtime.clone(), network.historical.clone()) {
                let setup = realtime
                    .setup()
                    .await
                    .with_context(|| format!("realtime sync setup for chain {}", network.chain_id))?;

                if let Some(pipeline) = &self.pipeline {
                    pipeline.set_historical_sync_completed_at(0);
                }

                let filter_specs = network.filter_specs.clone();
                let chain_id = network.chain_id;
                tasks.push(tokio::spawn(async move {
                    if let Err(err) = historical.run(filter_specs, setup.finalized_block_number).await {
                        tracing::error!(chain = %chain_id, error = %err, "historical sync failed");
                    }
                }));

                let realtime_token = token.clone();
                tasks.push(tokio::spawn(async move {
                    if let Err(err) = realtime.start(realtime_token).await {
                        tracing::error!(chain = %chain_id, error = %err, "realtime sync failed");
                    }
                }));
            }
        }

        if let (Some(pipeline), Some(signals)) = (self.pipeline.clone(), self.signals) {
            let pipeline_token = token.clone();
            tasks.push(tokio::spawn(async move {
                if let Err(err) = pipeline.run(signals, pipeline_token).await {
                    tracing::error!(error = %err, "handler pipeline failed");
                }
            }));
        }

        tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
        tracing::info!("shutdown signal received, stopping");
        token.cancel();

        for task in tasks {
            let _ = task.await;
        }
        for task in background {
            task.abort();
        }

        drop(self.event_store);
        drop(self.aggregator);
        Ok(())
    }
}

struct AlwaysAlive;

#[async_trait::async_trait]
impl LivenessChecking for AlwaysAlive {
    async fn is_alive(&self) -> bool {
        true
    }
}

fn resolve_network_filters(config: &Config, network: &NetworkConfig) -> anyhow::Result<Vec<FilterSpec>> {
    config
        .filters
        .iter()
        .filter(|filter| filter.network == network.name)
        .map(|filter| {
            let resolved = chain_sync::filter::resolve(filter)?;
            Ok(FilterSpec {
                max_block_range: filter
                    .max_block_range
                    .unwrap_or_else(|| network.chain_id.default_max_block_range(network.rpc_url.as_ref().map(Url::as_str))),
                filter: resolved,
                start_block: filter.start_block,
                end_block: filter.end_block,
            })
        })
        .collect::<Result<Vec<_>, chain_sync::ConversionError>>()
        .with_context(|| format!("resolving log filters for network {}", network.name))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        configs::{LogFilterConfig, Options},
        std::num::NonZeroUsize,
    };

    fn args() -> Arguments {
        Arguments {
            config: std::path::PathBuf::new(),
            log_filter: "info".to_string(),
            log_json: false,
            metrics_address: "127.0.0.1:0".parse().unwrap(),
            http: http_client::Arguments::default(),
        }
    }

    fn sqlite_database(directory: &std::path::Path) -> DatabaseConfig {
        DatabaseConfig::Sqlite {
            directory: directory.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn standalone_mode_has_no_networks_builds_pipeline_and_local_aggregator() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: sqlite_database(dir.path()),
            networks: Vec::new(),
            filters: Vec::new(),
            options: Options {
                max_healthcheck_duration: 240,
                mode: Mode::Standalone,
            },
        };

        let indexer = Indexer::build(&config, &args()).await.unwrap();
        assert!(indexer.networks.is_empty());
        assert!(indexer.pipeline.is_some());
        assert!(indexer.signals.is_some());
    }

    #[tokio::test]
    async fn indexer_mode_hosts_sync_but_no_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: sqlite_database(dir.path()),
            networks: vec![NetworkConfig {
                name: "mainnet".to_string(),
                chain_id: ChainId(1),
                rpc_url: Some("https://rpc.example.com".parse().unwrap()),
                indexer_url: None,
                polling_interval: Duration::from_secs(1),
                max_rpc_request_concurrency: NonZeroUsize::new(10).unwrap(),
                payments: None,
            }],
            filters: vec![LogFilterConfig {
                name: "transfers".to_string(),
                network: "mainnet".to_string(),
                chain_id: ChainId(1),
                abi: configs::filter::AbiSource::Path("abi/erc20.json".into()),
                address: None,
                topics: None,
                start_block: 0,
                end_block: None,
                max_block_range: None,
            }],
            options: Options {
                max_healthcheck_duration: 240,
                mode: Mode::Indexer,
            },
        };

        let indexer = Indexer::build(&config, &args()).await.unwrap();
        assert_eq!(indexer.networks.len(), 1);
        assert!(indexer.networks[0].realtime.is_some());
        assert!(indexer.networks[0].historical.is_some());
        assert!(indexer.pipeline.is_none());
    }

    #[tokio::test]
    async fn watcher_mode_requires_an_indexer_url_and_skips_sync_engines() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: sqlite_database(dir.path()),
            networks: vec![NetworkConfig {
                name: "mainnet".to_string(),
                chain_id: ChainId(1),
                rpc_url: None,
                indexer_url: Some("https://indexer.example.com".parse().unwrap()),
                polling_interval: Duration::from_secs(1),
                max_rpc_request_concurrency: NonZeroUsize::new(10).unwrap(),
                payments: None,
            }],
            filters: Vec::new(),
            options: Options {
                max_healthcheck_duration: 240,
                mode: Mode::Watcher,
            },
        };

        let indexer = Indexer::build(&config, &args()).await.unwrap();
        assert!(indexer.networks[0].realtime.is_none());
        assert!(indexer.networks[0].historical.is_none());
        assert!(indexer.pipeline.is_some());
    }

    #[tokio::test]
    async fn watcher_mode_without_indexer_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: sqlite_database(dir.path()),
            networks: Vec::new(),
            filters: Vec::new(),
            options: Options {
                max_healthcheck_duration: 240,
                mode: Mode::Watcher,
            },
        };

        let err = Indexer::build(&config, &args()).await.unwrap_err();
        assert!(err.to_string().contains("indexer-url"));
    }
}
