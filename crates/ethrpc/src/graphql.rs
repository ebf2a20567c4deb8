//! A minimal hand-rolled GraphQL POST client: `{query, variables}` in,
//! `{data, errors}` out. No GraphQL client crate sits in the teacher's or
//! pack's dependency graph; plain `reqwest` + `serde_json` is the idiom this
//! codebase reaches for whenever it calls a peer HTTP JSON API (see
//! `http-client`). Shared between the remote-indexer RPC transport (§4.6)
//! and the remote aggregator transport (§4.4) so both speak the identical
//! wire shape.

use {crate::error::RpcError, serde::de::DeserializeOwned, serde_json::Value};

#[derive(serde::Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(serde::Deserialize)]
struct GraphQlResponse<T> {
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, serde::Deserialize)]
struct GraphQlError {
    message: String,
}

pub async fn execute<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &url::Url,
    query: &str,
    variables: Value,
) -> Result<T, RpcError> {
    let response: GraphQlResponse<T> = client
        .post(url.clone())
        .json(&GraphQlRequest { query, variables })
        .send()
        .await
        .map_err(RpcError::Http)?
        .json()
        .await
        .map_err(RpcError::Http)?;

    if !response.errors.is_empty() {
        let message = response
            .errors
            .into_iter()
            .map(|error| error.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RpcError::GraphQl(message));
    }

    response
        .data
        .ok_or_else(|| RpcError::GraphQl("response carried no data".to_string()))
}
