//! Cross-network event aggregator (§4.4): tracks per-network historical,
//! realtime, and finality checkpoints, computes the global monotone
//! checkpoint, and serves the decoded, ordered event stream the Handler
//! Pipeline drains. Two transports satisfy the identical [`EventAggregating`]
//! contract — [`local::Aggregator`] over a local [`event_store::EventStore`],
//! and [`remote::RemoteAggregator`] over a peer indexer's GraphQL API.

pub mod decode;
pub mod error;
pub mod events;
pub mod local;
pub mod remote;
pub mod state;
pub mod store;

pub use {
    error::AggregatorError,
    events::AggregatorSignal,
    local::Aggregator,
    remote::RemoteAggregator,
    store::{DecodedEvent, DecodedEventPage, EventAggregating, GetEventsQuery},
};

#[cfg(any(test, feature = "test-util"))]
pub use store::MockEventAggregating;
