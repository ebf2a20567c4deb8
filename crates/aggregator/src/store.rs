//! The capability set both aggregator variants satisfy (§9 REDESIGN FLAGS,
//! "Transport polymorphism for the aggregator"): `{getEvents, checkpoint
//! accessors, inbound checkpoint/reorg handlers}`. The Handler Pipeline
//! depends only on this trait, never on [`crate::local::Aggregator`] or
//! [`crate::remote::RemoteAggregator`] directly.

use {
    crate::{decode::IncludeLogFilterEvents, error::AggregatorError},
    chain::ChainId,
    event_store::model::{Cursor, EventPageMetadata, JoinedLogEvent, ResolvedFilter},
};

#[derive(Clone, Debug)]
pub struct GetEventsQuery<'a> {
    pub from_timestamp: i64,
    pub to_timestamp: i64,
    pub filters: &'a [ResolvedFilter],
    pub page_size: u32,
    pub cursor: Option<Cursor>,
    pub include_log_filter_events: &'a IncludeLogFilterEvents,
}

/// A log paired with the ABI event item its `topic0` resolved to and the
/// name of the filter it matched. The Handler Pipeline routes on
/// `(filter_name, event_name)` (§4.5), where `event_name` is `abi_item["name"]`.
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedEvent {
    pub event: JoinedLogEvent,
    pub filter_name: String,
    pub abi_item: serde_json::Value,
}

#[derive(Clone, Debug, Default)]
pub struct DecodedEventPage {
    pub events: Vec<DecodedEvent>,
    pub metadata: EventPageMetadata,
}

#[async_trait::async_trait]
#[cfg_attr(any(test, feature = "test-util"), mockall::automock)]
pub trait EventAggregating: Send + Sync {
    fn checkpoint(&self) -> i64;

    fn finality_checkpoint(&self) -> i64;

    async fn handle_new_historical_checkpoint(&self, chain_id: ChainId, timestamp: i64);

    async fn handle_historical_sync_complete(&self, chain_id: ChainId);

    async fn handle_new_realtime_checkpoint(&self, chain_id: ChainId, timestamp: i64);

    async fn handle_new_finality_checkpoint(&self, chain_id: ChainId, timestamp: i64);

    async fn handle_reorg(&self, chain_id: ChainId, common_ancestor_timestamp: i64);

    /// One page of the decoded, ordered event stream (§4.4 `getEvents`).
    /// Callers loop, feeding `metadata.cursor` back in as
    /// `query.cursor`, until a page comes back with no cursor.
    async fn get_events(&self, query: GetEventsQuery<'_>) -> Result<DecodedEventPage, AggregatorError>;
}
