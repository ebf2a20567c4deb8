//! Wire-format JSON-RPC types. These mirror the `eth_getLogs` /
//! `eth_getBlockByHash` / `eth_getBlockByNumber` / `eth_blockNumber`
//! response shapes exactly as providers emit them (quantities as `0x`-hex
//! strings); conversion into the event store's fixed-width domain types
//! happens in `chain-sync`, one layer up, so this crate stays free of any
//! dependency on the event store.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: serde_json::Value,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn new(id: u64, method: &'a str, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcErrorBody {
    pub code: i64,
    pub message: String,
}

fn hex_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    u64::from_str_radix(raw.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

fn opt_hex_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16))
        .transpose()
        .map_err(serde::de::Error::custom)
}

/// Raw `eth_getBlockByHash` / `eth_getBlockByNumber` response shape (with
/// `fullTransactions = true`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBlock {
    pub hash: String,
    pub parent_hash: String,
    #[serde(deserialize_with = "hex_u64")]
    pub number: u64,
    #[serde(deserialize_with = "hex_u64")]
    pub timestamp: u64,
    pub miner: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub base_fee_per_gas: Option<String>,
    pub difficulty: String,
    #[serde(default)]
    pub total_difficulty: Option<String>,
    pub extra_data: String,
    pub logs_bloom: String,
    pub mix_hash: String,
    pub nonce: String,
    pub receipts_root: String,
    pub sha3_uncles: String,
    #[serde(deserialize_with = "hex_u64")]
    pub size: u64,
    pub state_root: String,
    pub transactions_root: String,
    #[serde(default)]
    pub transactions: Vec<RawTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawTransaction {
    pub hash: String,
    pub block_hash: Option<String>,
    #[serde(default, deserialize_with = "opt_hex_u64")]
    pub block_number: Option<u64>,
    #[serde(default, deserialize_with = "opt_hex_u64")]
    pub transaction_index: Option<u64>,
    pub from: String,
    pub to: Option<String>,
    pub input: String,
    #[serde(deserialize_with = "hex_u64")]
    pub nonce: u64,
    pub value: String,
    pub gas: String,
    #[serde(default)]
    pub v: Option<String>,
    #[serde(default)]
    pub r: Option<String>,
    #[serde(default)]
    pub s: Option<String>,
    #[serde(rename = "type", default)]
    pub transaction_type: Option<String>,
    pub gas_price: Option<String>,
    pub max_fee_per_gas: Option<String>,
    pub max_priority_fee_per_gas: Option<String>,
    #[serde(default)]
    pub access_list: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    pub address: String,
    pub block_hash: String,
    #[serde(deserialize_with = "hex_u64")]
    pub block_number: u64,
    pub transaction_hash: String,
    #[serde(deserialize_with = "hex_u64")]
    pub transaction_index: u64,
    #[serde(deserialize_with = "hex_u64")]
    pub log_index: u64,
    pub data: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub removed: bool,
}

/// An `eth_getLogs` filter object, built from a `ResolvedFilter` by
/// `chain-sync`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetLogsFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<serde_json::Value>,
}

pub fn to_quantity(n: u64) -> String {
    format!("0x{n:x}")
}
