//! Handler Pipeline (§4.5): applies a user-supplied handler, keyed on
//! `(filterName, eventName)`, over the Event Aggregator's ordered stream
//! against a transactional Derived Store. Owns the single watermark
//! (`toTimestamp`) the spec requires to advance strictly in lockstep with
//! the aggregator's checkpoint, and performs reorg rollback and hot-reload
//! reset.

pub mod contracts;
pub mod entities;
pub mod error;
pub mod handler;
pub mod engine;

pub use {
    contracts::{CachedContractsView, ContractsView},
    entities::{EntitiesView, TransactionalEntitiesView},
    engine::{Pipeline, PipelineState},
    error::HandlerPipelineError,
    handler::{Handler, HandlerKey, HandlerRegistry},
};
