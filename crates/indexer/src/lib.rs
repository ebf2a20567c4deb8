//! Thin composition root (§6): reads a `configs::Config`, builds the stores,
//! transports, sync engines, aggregator, and handler pipeline it calls for,
//! and runs them until shutdown.

pub mod arguments;
mod wiring;

use {arguments::Arguments, wiring::Indexer};

#[derive(Debug, thiserror::Error)]
pub enum IndexerStartError {
    #[error("failed to load config: {0}")]
    Config(#[from] configs::ConfigError),
    #[error(transparent)]
    Wiring(#[from] anyhow::Error),
}

pub async fn run(args: Arguments) -> Result<(), IndexerStartError> {
    let config = configs::Config::load(&args.config)?;
    tracing::info!(mode = ?config.options.mode, networks = config.networks.len(), "starting");
    let indexer = Indexer::build(&config, &args).await?;
    indexer.run().await?;
    Ok(())
}
