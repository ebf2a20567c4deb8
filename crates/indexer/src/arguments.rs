//! CLI surface (§6): `--config` picks the TOML file that drives everything
//! else, the remaining flags tune the ambient stack. Mirrors
//! `http_client::Arguments`'s `clap::Parser` + `env` pattern.

use std::{net::SocketAddr, path::PathBuf};

#[derive(Debug, Clone, clap::Parser)]
pub struct Arguments {
    /// Path to the indexer's TOML config file (`configs::Config`).
    #[clap(long, env)]
    pub config: PathBuf,

    /// `tracing_subscriber::EnvFilter` syntax.
    #[clap(long, env, default_value = "info")]
    pub log_filter: String,

    /// Emit structured JSON logs instead of plain text.
    #[clap(long, env)]
    pub log_json: bool,

    /// Address the `/metrics` and `/healthz` endpoints bind to.
    #[clap(long, env, default_value = "0.0.0.0:9000")]
    pub metrics_address: SocketAddr,

    #[clap(flatten)]
    pub http: http_client::Arguments,
}
