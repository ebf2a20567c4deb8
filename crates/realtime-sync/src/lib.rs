//! Realtime Sync (§4.3): tails the chain head for one network, maintaining
//! an in-memory ordered list of unfinalized blocks from the last finalized
//! block up to the current head. Detects reorgs against that window,
//! rewrites the event store on the canonical chain, and advances finality.

pub mod engine;
pub mod error;

pub use {
    engine::{RealtimeSync, SetupResult},
    error::RealtimeSyncError,
};
