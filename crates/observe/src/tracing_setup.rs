//! Initializes the global `tracing` subscriber. Call once at binary startup,
//! before any other component logs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// `filter` follows `tracing_subscriber::EnvFilter` syntax, e.g.
/// `"indexer=debug,historical_sync=info,warn"`. `json` selects structured
/// log output for production deployments; plain text is easier to read in a
/// terminal during development.
pub fn initialize(filter: &str, json: bool) {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
