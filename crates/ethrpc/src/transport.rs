//! `request({method, params}) -> result` (§4.6): the single interface every
//! sync engine talks to, regardless of whether the concrete implementation
//! is a direct JSON-RPC HTTP call, a paid call, or a translated GraphQL
//! query against a peer indexer.

use {
    crate::{
        error::RpcError,
        types::{to_quantity, GetLogsFilter, RawBlock, RawLog},
    },
    serde_json::Value,
};

#[async_trait::async_trait]
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait RpcTransport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Same as [`Self::request`], but lets a wrapping transport (the paid
    /// transport, §4.6) forward extra HTTP headers down to whichever
    /// transport actually owns the outbound connection. Transports that
    /// don't speak HTTP directly (a GraphQL-translating peer transport, a
    /// mock) just ignore the headers and fall back to a plain request.
    async fn request_with_headers(
        &self,
        method: &str,
        params: Value,
        headers: Vec<(String, String)>,
    ) -> Result<Value, RpcError> {
        let _ = headers;
        self.request(method, params).await
    }
}

/// Ergonomic, strongly-typed helpers built on top of the one-method
/// [`RpcTransport`] trait. Blanket-implemented so every transport gets them
/// for free.
#[async_trait::async_trait]
pub trait EthRpc: RpcTransport {
    async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.request("eth_blockNumber", Value::Array(vec![])).await?;
        parse_quantity(&result)
    }

    async fn get_block_by_hash(
        &self,
        hash: &str,
        full_transactions: bool,
    ) -> Result<Option<RawBlock>, RpcError> {
        let params = serde_json::json!([hash, full_transactions]);
        let result = self.request("eth_getBlockByHash", params).await?;
        parse_optional(result)
    }

    async fn get_block_by_number(
        &self,
        number: u64,
        full_transactions: bool,
    ) -> Result<Option<RawBlock>, RpcError> {
        let params = serde_json::json!([to_quantity(number), full_transactions]);
        let result = self.request("eth_getBlockByNumber", params).await?;
        parse_optional(result)
    }

    async fn get_logs(&self, filter: &GetLogsFilter) -> Result<Vec<RawLog>, RpcError> {
        let params = serde_json::json!([filter]);
        let result = self.request("eth_getLogs", params).await?;
        serde_json::from_value(result).map_err(|err| RpcError::Rpc {
            code: 0,
            message: err.to_string(),
        })
    }
}

impl<T: RpcTransport + ?Sized> EthRpc for T {}

fn parse_quantity(value: &Value) -> Result<u64, RpcError> {
    let raw = value.as_str().ok_or_else(|| RpcError::Rpc {
        code: 0,
        message: "expected a hex string quantity".to_string(),
    })?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(|err| RpcError::Rpc {
        code: 0,
        message: err.to_string(),
    })
}

fn parse_optional<T: serde::de::DeserializeOwned>(value: Value) -> Result<Option<T>, RpcError> {
    if value.is_null() {
        return Ok(None);
    }
    serde_json::from_value(value)
        .map(Some)
        .map_err(|err| RpcError::Rpc {
            code: 0,
            message: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn block_number_parses_hex_quantity() {
        let mut mock = MockRpcTransport::new();
        mock.expect_request()
            .withf(|method, _| method == "eth_blockNumber")
            .returning(|_, _| Box::pin(async { Ok(Value::String("0x10".to_string())) }));
        assert_eq!(mock.block_number().await.unwrap(), 16);
    }

    #[tokio::test]
    async fn get_block_by_hash_returns_none_on_null() {
        let mut mock = MockRpcTransport::new();
        mock.expect_request()
            .returning(|_, _| Box::pin(async { Ok(Value::Null) }));
        assert!(mock.get_block_by_hash("0xabc", true).await.unwrap().is_none());
    }
}
