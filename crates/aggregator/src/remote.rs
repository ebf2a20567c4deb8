//! Remote-indexer transport variant of the aggregator (§4.4, wire protocol
//! §6): an external indexer's checkpoint state machine is mirrored locally
//! (the subscription listener that feeds `handle_*` is out of this crate's
//! scope — `Watcher` mode wires a GraphQL subscription client to these same
//! methods) and `getEvents` delegates to a remote `getLogEvents` query using
//! the identical cursor semantics as [`crate::local::Aggregator`].

use {
    crate::{
        decode::IncludeLogFilterEvents,
        error::AggregatorError,
        state::CheckpointState,
        store::{DecodedEvent, DecodedEventPage, EventAggregating, GetEventsQuery},
    },
    chain::ChainId,
    chain_sync::conversion,
    ethrpc::{
        graphql,
        types::{RawBlock, RawLog, RawTransaction},
    },
    event_store::model::{
        Cursor, EventPageMetadata, JoinedLogEvent, ResolvedFilter, TopicSlot,
    },
    tokio::sync::Mutex,
    url::Url,
};

const GET_LOG_EVENTS_QUERY: &str = "query GetLogEvents($fromTimestamp: String!, $toTimestamp: \
     String!, $filters: [LogFilterInput!]!, $pageSize: Int!, $cursor: CursorInput) { \
     getLogEvents(fromTimestamp: $fromTimestamp, toTimestamp: $toTimestamp, filters: $filters, \
     pageSize: $pageSize, cursor: $cursor) { events { log block transaction filterName } \
     metadata { pageEndsAtTimestamp isLastPage cursor } } }";

pub struct RemoteAggregator {
    client: reqwest::Client,
    indexer_url: Url,
    state: Mutex<CheckpointState>,
}

impl RemoteAggregator {
    pub fn new(client: reqwest::Client, indexer_url: Url) -> Self {
        Self {
            client,
            indexer_url,
            state: Mutex::new(CheckpointState::default()),
        }
    }
}

#[async_trait::async_trait]
impl EventAggregating for RemoteAggregator {
    fn checkpoint(&self) -> i64 {
        self.state.try_lock().map(|s| s.checkpoint).unwrap_or(0)
    }

    fn finality_checkpoint(&self) -> i64 {
        self.state.try_lock().map(|s| s.finality_checkpoint).unwrap_or(0)
    }

    async fn handle_new_historical_checkpoint(&self, chain_id: ChainId, timestamp: i64) {
        self.state.lock().await.handle_new_historical_checkpoint(chain_id, timestamp);
    }

    async fn handle_historical_sync_complete(&self, chain_id: ChainId) {
        self.state.lock().await.handle_historical_sync_complete(chain_id);
    }

    async fn handle_new_realtime_checkpoint(&self, chain_id: ChainId, timestamp: i64) {
        self.state.lock().await.handle_new_realtime_checkpoint(chain_id, timestamp);
    }

    async fn handle_new_finality_checkpoint(&self, chain_id: ChainId, timestamp: i64) {
        self.state.lock().await.handle_new_finality_checkpoint(chain_id, timestamp);
    }

    async fn handle_reorg(&self, chain_id: ChainId, common_ancestor_timestamp: i64) {
        let mut state = self.state.lock().await;
        if let Some(network) = state.networks.get_mut(&chain_id) {
            network.historical = network.historical.min(common_ancestor_timestamp);
            network.realtime = network.realtime.min(common_ancestor_timestamp);
        }
        state.checkpoint = state.checkpoint.min(common_ancestor_timestamp);
    }

    async fn get_events(&self, query: GetEventsQuery<'_>) -> Result<DecodedEventPage, AggregatorError> {
        let variables = serde_json::json!({
            "fromTimestamp": query.from_timestamp.to_string(),
            "toTimestamp": query.to_timestamp.to_string(),
            "filters": query.filters.iter().map(filter_to_json).collect::<Vec<_>>(),
            "pageSize": query.page_size,
            "cursor": query.cursor.map(cursor_to_json),
        });

        let wire: WireEventPage =
            graphql::execute(&self.client, &self.indexer_url, GET_LOG_EVENTS_QUERY, variables).await?;

        let mut events = Vec::with_capacity(wire.events.len());
        for event in wire.events {
            let chain_id = event.log.chain_id_hint;
            let log = conversion::convert_log(chain_id, &event.log.log)?;
            let block = conversion::convert_block(chain_id, &event.block)?;
            let transaction = conversion::convert_transaction(chain_id, &event.transaction)?;
            let joined = JoinedLogEvent { log, block, transaction };
            match query.include_log_filter_events.lookup(&event.filter_name, joined.log.topic0) {
                Some(abi_item) => events.push(DecodedEvent {
                    abi_item: abi_item.clone(),
                    filter_name: event.filter_name.clone(),
                    event: joined,
                }),
                None => {
                    tracing::warn!(
                        filter = %event.filter_name,
                        log_id = ?joined.log.id,
                        "remote log did not decode against any known event selector, skipping"
                    );
                }
            }
        }

        Ok(DecodedEventPage {
            events,
            metadata: EventPageMetadata {
                page_ends_at_timestamp: wire.metadata.page_ends_at_timestamp,
                counts: Default::default(),
                cursor: wire.metadata.cursor.map(|c| Cursor {
                    timestamp: c.timestamp,
                    chain_id: c.chain_id,
                    block_number: c.block_number,
                    log_index: c.log_index,
                }),
            },
        })
    }
}

fn filter_to_json(filter: &ResolvedFilter) -> serde_json::Value {
    serde_json::json!({
        "name": filter.name,
        "chainId": filter.chain_id,
        "address": filter
            .address
            .as_ref()
            .map(|addrs| addrs.iter().map(|a| format!("0x{}", hex::encode(a.0))).collect::<Vec<_>>()),
        "topics": filter.topics.iter().map(topic_slot_to_json).collect::<Vec<_>>(),
    })
}

fn topic_slot_to_json(slot: &TopicSlot) -> serde_json::Value {
    match slot {
        TopicSlot::Any => serde_json::Value::Null,
        TopicSlot::One(hash) => serde_json::Value::String(format!("0x{}", hex::encode(hash.0))),
        TopicSlot::Set(hashes) => serde_json::Value::Array(
            hashes.iter().map(|h| serde_json::Value::String(format!("0x{}", hex::encode(h.0)))).collect(),
        ),
    }
}

fn cursor_to_json(cursor: Cursor) -> serde_json::Value {
    serde_json::json!({
        "timestamp": cursor.timestamp,
        "chainId": cursor.chain_id,
        "blockNumber": cursor.block_number,
        "logIndex": cursor.log_index,
    })
}

/// A `RawLog` carries no chain ID of its own on the wire (it's implicit in
/// the connection/query); the remote aggregator response repeats it per
/// event so joined events spanning multiple chains can still be converted.
#[derive(serde::Deserialize)]
struct WireLog {
    #[serde(flatten)]
    log: RawLog,
    #[serde(rename = "chainId")]
    chain_id_hint: i64,
}

#[derive(serde::Deserialize)]
struct WireJoinedEvent {
    log: WireLog,
    block: RawBlock,
    transaction: RawTransaction,
    #[serde(rename = "filterName")]
    filter_name: String,
}

#[derive(serde::Deserialize)]
struct WireCursor {
    timestamp: i64,
    #[serde(rename = "chainId")]
    chain_id: i64,
    #[serde(rename = "blockNumber")]
    block_number: i64,
    #[serde(rename = "logIndex")]
    log_index: i64,
}

#[derive(serde::Deserialize)]
struct WireMetadata {
    #[serde(rename = "pageEndsAtTimestamp")]
    page_ends_at_timestamp: i64,
    #[serde(rename = "isLastPage")]
    #[allow(dead_code)]
    is_last_page: bool,
    cursor: Option<WireCursor>,
}

#[derive(serde::Deserialize)]
struct WireEventPage {
    events: Vec<WireJoinedEvent>,
    metadata: WireMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_with_no_address_restriction_serializes_address_as_null() {
        let filter = ResolvedFilter {
            name: "transfers".to_string(),
            chain_id: 1,
            address: None,
            topics: vec![],
        };
        let json = filter_to_json(&filter);
        assert!(json["address"].is_null());
    }

    #[test]
    fn topic_set_serializes_as_hex_array() {
        let hash = event_store::byte_array::ByteArray([0xab; 32]);
        let json = topic_slot_to_json(&TopicSlot::Set(vec![hash]));
        assert_eq!(json[0], format!("0x{}", "ab".repeat(32)));
    }
}
