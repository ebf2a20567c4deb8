//! The ordered signal stream a handler pipeline subscribes to. §5 requires
//! that a `reorg` delivered to the pipeline is totally ordered with respect
//! to `newCheckpoint` signals for the same network, so both are variants of
//! one enum carried over one `tokio::sync::mpsc` channel rather than two
//! independent channels a subscriber would have to interleave itself.

use chain::ChainId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregatorSignal {
    /// The global checkpoint (minimum over per-network checkpoints) advanced.
    NewCheckpoint { timestamp: i64 },
    /// The global finality checkpoint advanced.
    NewFinalityCheckpoint { timestamp: i64 },
    /// `chain_id` rolled back to `common_ancestor_timestamp`; any previously
    /// emitted checkpoint at or above that timestamp is void.
    Reorg {
        chain_id: ChainId,
        common_ancestor_timestamp: i64,
    },
}

pub type SignalSender = tokio::sync::mpsc::UnboundedSender<AggregatorSignal>;
pub type SignalReceiver = tokio::sync::mpsc::UnboundedReceiver<AggregatorSignal>;

pub fn channel() -> (SignalSender, SignalReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
