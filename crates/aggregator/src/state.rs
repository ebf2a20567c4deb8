//! Per-network checkpoint bookkeeping and the global recompute rule (§4.4):
//!
//! ```text
//! per_net = isHistoricalSyncComplete ? max(historical, realtime) : historical
//! new_global = min(per_net across all networks)
//! if new_global > checkpoint: checkpoint ← new_global; emit newCheckpoint
//! ```

use std::collections::HashMap;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NetworkCheckpoints {
    pub historical: i64,
    pub realtime: i64,
    pub finality: i64,
    pub is_historical_sync_complete: bool,
}

impl NetworkCheckpoints {
    fn per_net(&self) -> i64 {
        if self.is_historical_sync_complete {
            self.historical.max(self.realtime)
        } else {
            self.historical
        }
    }
}

/// The full set of per-network state plus the two global, monotone
/// checkpoints derived from it. Not `Send`/`Sync`-constrained on its own —
/// the owning [`crate::local::Aggregator`] serializes access with a mutex
/// per §5 ("single-logical-threaded with respect to mutable state").
#[derive(Clone, Debug, Default)]
pub struct CheckpointState {
    pub networks: HashMap<chain::ChainId, NetworkCheckpoints>,
    pub checkpoint: i64,
    pub finality_checkpoint: i64,
}

impl CheckpointState {
    fn network_mut(&mut self, chain_id: chain::ChainId) -> &mut NetworkCheckpoints {
        self.networks.entry(chain_id).or_default()
    }

    /// Returns `Some(new_checkpoint)` if the recompute advanced the global
    /// checkpoint (i.e. a `newCheckpoint` event must be emitted).
    pub fn recompute_checkpoint(&mut self) -> Option<i64> {
        if self.networks.is_empty() {
            return None;
        }
        let new_global = self.networks.values().map(NetworkCheckpoints::per_net).min()?;
        if new_global > self.checkpoint {
            self.checkpoint = new_global;
            Some(new_global)
        } else {
            None
        }
    }

    pub fn recompute_finality(&mut self) -> Option<i64> {
        if self.networks.is_empty() {
            return None;
        }
        let new_global = self.networks.values().map(|n| n.finality).min()?;
        if new_global > self.finality_checkpoint {
            self.finality_checkpoint = new_global;
            Some(new_global)
        } else {
            None
        }
    }

    /// Per-network checkpoints only ever move forward: historical tasks and
    /// realtime blocks can commit out of order under concurrency, and a
    /// stale, lower report must not regress the watermark.
    pub fn handle_new_historical_checkpoint(&mut self, chain_id: chain::ChainId, t: i64) -> Option<i64> {
        let network = self.network_mut(chain_id);
        network.historical = network.historical.max(t);
        self.recompute_checkpoint()
    }

    pub fn handle_historical_sync_complete(&mut self, chain_id: chain::ChainId) -> Option<i64> {
        self.network_mut(chain_id).is_historical_sync_complete = true;
        self.recompute_checkpoint()
    }

    pub fn handle_new_realtime_checkpoint(&mut self, chain_id: chain::ChainId, t: i64) -> Option<i64> {
        let network = self.network_mut(chain_id);
        network.realtime = network.realtime.max(t);
        self.recompute_checkpoint()
    }

    pub fn handle_new_finality_checkpoint(&mut self, chain_id: chain::ChainId, t: i64) -> Option<i64> {
        let network = self.network_mut(chain_id);
        network.finality = network.finality.max(t);
        self.recompute_finality()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(id: u64) -> chain::ChainId {
        chain::ChainId(id)
    }

    /// §8 scenario 3 ("Cross-network checkpoint").
    #[test]
    fn cross_network_checkpoint_scenario() {
        let mut state = CheckpointState::default();

        assert_eq!(state.handle_new_historical_checkpoint(chain(1), 50), None);
        assert_eq!(state.handle_new_realtime_checkpoint(chain(1), 80), None);
        assert_eq!(state.handle_historical_sync_complete(chain(1)), None);
        assert_eq!(state.handle_new_historical_checkpoint(chain(2), 60), Some(60));

        assert_eq!(state.handle_new_historical_checkpoint(chain(2), 75), Some(75));

        assert_eq!(state.handle_historical_sync_complete(chain(2)), None);
        assert_eq!(state.handle_new_realtime_checkpoint(chain(2), 90), Some(80));

        assert_eq!(state.checkpoint, 80);
    }

    #[test]
    fn checkpoint_is_monotone_non_decreasing() {
        let mut state = CheckpointState::default();
        state.handle_new_historical_checkpoint(chain(1), 100);
        assert_eq!(state.checkpoint, 100);
        // A stale, lower update must never move the checkpoint backwards.
        assert_eq!(state.handle_new_historical_checkpoint(chain(1), 50), None);
        assert_eq!(state.checkpoint, 100);
    }

    #[test]
    fn finality_checkpoint_is_min_across_networks() {
        let mut state = CheckpointState::default();
        state.handle_new_finality_checkpoint(chain(1), 500);
        state.handle_new_finality_checkpoint(chain(2), 300);
        assert_eq!(state.finality_checkpoint, 300);
        state.handle_new_finality_checkpoint(chain(2), 700);
        assert_eq!(state.finality_checkpoint, 500);
    }
}
