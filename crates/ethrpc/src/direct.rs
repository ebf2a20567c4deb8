//! Direct JSON-RPC HTTP transport: POSTs `{jsonrpc, id, method, params}` and
//! surfaces `HttpRequestError` / `RpcRequestError` / `TimeoutError` (§4.6).

use {
    crate::{
        error::RpcError,
        retry::{with_backoff, BackoffConfig},
        transport::RpcTransport,
        types::{JsonRpcRequest, JsonRpcResponse},
    },
    std::sync::atomic::{AtomicU64, Ordering},
    url::Url,
};

pub struct DirectTransport {
    client: reqwest::Client,
    url: Url,
    backoff: BackoffConfig,
    next_id: AtomicU64,
}

impl DirectTransport {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            backoff: BackoffConfig::default(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    async fn send_once(
        &self,
        method: &str,
        params: serde_json::Value,
        headers: &[(String, String)],
    ) -> Result<serde_json::Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = JsonRpcRequest::new(id, method, params);
        let mut request = self.client.post(self.url.clone()).json(&body);
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                RpcError::Timeout
            } else {
                RpcError::Http(err)
            }
        })?;
        let parsed: JsonRpcResponse = response.json().await.map_err(RpcError::Http)?;
        if let Some(error) = parsed.error {
            if RpcError::classify_message(&error.message) {
                return Err(RpcError::RangeTooLarge);
            }
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        parsed.result.ok_or_else(|| RpcError::Rpc {
            code: 0,
            message: "response carried neither a result nor an error".to_string(),
        })
    }
}

#[async_trait::async_trait]
impl RpcTransport for DirectTransport {
    async fn request(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, RpcError> {
        with_backoff(self.backoff, || self.send_once(method, params.clone(), &[])).await
    }

    async fn request_with_headers(
        &self,
        method: &str,
        params: serde_json::Value,
        headers: Vec<(String, String)>,
    ) -> Result<serde_json::Value, RpcError> {
        with_backoff(self.backoff, || self.send_once(method, params.clone(), &headers)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_too_large_is_classified_from_error_message() {
        let err = RpcError::classify_message("query returned more than 10000 results");
        assert!(err);
    }

    #[tokio::test]
    async fn assigns_monotonically_increasing_request_ids() {
        let transport = DirectTransport::new(
            reqwest::Client::new(),
            Url::parse("http://localhost:1").unwrap(),
        );
        let first = transport.next_id.fetch_add(1, Ordering::Relaxed);
        let second = transport.next_id.fetch_add(1, Ordering::Relaxed);
        assert!(second > first);
    }
}
