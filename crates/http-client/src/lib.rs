//! A shared `reqwest::Client` factory. All outbound HTTP (direct RPC
//! transport, paid transport, remote-indexer GraphQL transport) goes through
//! clients built here so timeout and user-agent configuration lives in one
//! place.

use std::time::Duration;

#[derive(Debug, Clone, clap::Parser)]
pub struct Arguments {
    /// Timeout applied to every outbound HTTP request.
    #[clap(long, env, default_value = "10s")]
    pub http_timeout: humantime::Duration,
}

impl Default for Arguments {
    fn default() -> Self {
        Self {
            http_timeout: Duration::from_secs(10).into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(args: &Arguments) -> Self {
        Self {
            timeout: args.http_timeout.into(),
        }
    }

    pub fn create(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent("indexing-core/0.1")
            .build()
            .expect("reqwest client configuration is always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_client_from_defaults() {
        let factory = HttpClientFactory::new(&Arguments::default());
        let _client = factory.create();
    }
}
