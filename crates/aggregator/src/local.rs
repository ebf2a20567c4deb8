//! In-process `Aggregator`: drives [`crate::state::CheckpointState`] off a
//! local [`event_store::EventStore`] and fans out [`AggregatorSignal`]s to
//! subscribers over one ordered channel (§4.4, §5 ordering guarantee).

use {
    crate::{
        decode::IncludeLogFilterEvents,
        error::AggregatorError,
        events::{AggregatorSignal, SignalReceiver, SignalSender},
        state::CheckpointState,
        store::{DecodedEvent, DecodedEventPage, EventAggregating, GetEventsQuery},
    },
    chain::ChainId,
    event_store::{model::GetLogEventsQuery, EventStore},
    std::sync::Arc,
    tokio::sync::Mutex,
};

pub struct Aggregator {
    store: Arc<dyn EventStore>,
    state: Mutex<CheckpointState>,
    signals: SignalSender,
}

impl Aggregator {
    /// Returns the aggregator plus the receiving end of its signal channel;
    /// exactly one subscriber is expected per §5 (a single consumer
    /// preserves the reorg/checkpoint ordering guarantee).
    pub fn new(store: Arc<dyn EventStore>) -> (Self, SignalReceiver) {
        let (signals, receiver) = crate::events::channel();
        (
            Self {
                store,
                state: Mutex::new(CheckpointState::default()),
                signals,
            },
            receiver,
        )
    }

    fn emit(&self, signal: AggregatorSignal) {
        // The receiver may have been dropped during shutdown; a send failure
        // here is not actionable.
        let _ = self.signals.send(signal);
    }
}

#[async_trait::async_trait]
impl EventAggregating for Aggregator {
    fn checkpoint(&self) -> i64 {
        // `try_lock` never contends in practice: recompute holds the lock
        // only across synchronous arithmetic, never across an await point.
        self.state.try_lock().map(|s| s.checkpoint).unwrap_or(0)
    }

    fn finality_checkpoint(&self) -> i64 {
        self.state.try_lock().map(|s| s.finality_checkpoint).unwrap_or(0)
    }

    async fn handle_new_historical_checkpoint(&self, chain_id: ChainId, timestamp: i64) {
        let mut state = self.state.lock().await;
        if let Some(t) = state.handle_new_historical_checkpoint(chain_id, timestamp) {
            drop(state);
            self.emit(AggregatorSignal::NewCheckpoint { timestamp: t });
        }
    }

    async fn handle_historical_sync_complete(&self, chain_id: ChainId) {
        let mut state = self.state.lock().await;
        if let Some(t) = state.handle_historical_sync_complete(chain_id) {
            drop(state);
            self.emit(AggregatorSignal::NewCheckpoint { timestamp: t });
        }
    }

    async fn handle_new_realtime_checkpoint(&self, chain_id: ChainId, timestamp: i64) {
        let mut state = self.state.lock().await;
        if let Some(t) = state.handle_new_realtime_checkpoint(chain_id, timestamp) {
            drop(state);
            self.emit(AggregatorSignal::NewCheckpoint { timestamp: t });
        }
    }

    async fn handle_new_finality_checkpoint(&self, chain_id: ChainId, timestamp: i64) {
        let mut state = self.state.lock().await;
        if let Some(t) = state.handle_new_finality_checkpoint(chain_id, timestamp) {
            drop(state);
            self.emit(AggregatorSignal::NewFinalityCheckpoint { timestamp: t });
        }
    }

    /// Rolls the affected network's per-network state back to
    /// `common_ancestor_timestamp` and emits the reorg signal *before*
    /// recomputing, so a subscriber observes it ahead of any later
    /// `newCheckpoint` for events past the rollback point (§5).
    async fn handle_reorg(&self, chain_id: ChainId, common_ancestor_timestamp: i64) {
        self.emit(AggregatorSignal::Reorg {
            chain_id,
            common_ancestor_timestamp,
        });
        let mut state = self.state.lock().await;
        if let Some(network) = state.networks.get_mut(&chain_id) {
            network.historical = network.historical.min(common_ancestor_timestamp);
            network.realtime = network.realtime.min(common_ancestor_timestamp);
        }
        state.checkpoint = state.checkpoint.min(common_ancestor_timestamp);
    }

    async fn get_events(&self, query: GetEventsQuery<'_>) -> Result<DecodedEventPage, AggregatorError> {
        let page = self
            .store
            .get_log_events(GetLogEventsQuery {
                from_timestamp: query.from_timestamp,
                to_timestamp: query.to_timestamp,
                filters: query.filters,
                page_size: query.page_size,
                cursor: query.cursor,
                include_event_selectors: &[],
            })
            .await?;

        Ok(DecodedEventPage {
            events: decode_events(page.events, query.filters, query.include_log_filter_events),
            metadata: page.metadata,
        })
    }
}

fn decode_events(
    events: Vec<event_store::model::JoinedLogEvent>,
    filters: &[event_store::model::ResolvedFilter],
    include_log_filter_events: &IncludeLogFilterEvents,
) -> Vec<DecodedEvent> {
    events
        .into_iter()
        .filter_map(|event| {
            let filter_name = filters.iter().find(|filter| filter.matches_log(&event.log))?.name.clone();
            match include_log_filter_events.lookup(&filter_name, event.log.topic0) {
                Some(abi_item) => Some(DecodedEvent {
                    abi_item: abi_item.clone(),
                    filter_name,
                    event,
                }),
                None => {
                    tracing::warn!(
                        filter = %filter_name,
                        log_id = ?event.log.id,
                        "log did not decode against any known event selector, skipping"
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        event_store::{model::ResolvedFilter, SqliteEventStore},
    };

    async fn new_store() -> Arc<dyn EventStore> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteEventStore::new(pool);
        store.migrate().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn historical_checkpoint_only_advances_once_every_network_reports() {
        let (aggregator, _rx) = Aggregator::new(new_store().await);
        aggregator.handle_new_historical_checkpoint(ChainId(1), 50).await;
        assert_eq!(aggregator.checkpoint(), 0);
        aggregator.handle_new_historical_checkpoint(ChainId(2), 30).await;
        assert_eq!(aggregator.checkpoint(), 30);
    }

    #[tokio::test]
    async fn reorg_caps_the_checkpoint_and_is_observed_before_recompute() {
        let (aggregator, mut rx) = Aggregator::new(new_store().await);
        aggregator.handle_new_historical_checkpoint(ChainId(1), 100).await;
        assert_eq!(aggregator.checkpoint(), 100);

        aggregator.handle_reorg(ChainId(1), 40).await;
        assert_eq!(aggregator.checkpoint(), 40);

        let signal = rx.recv().await.unwrap();
        assert!(matches!(
            signal,
            AggregatorSignal::Reorg {
                common_ancestor_timestamp: 40,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn get_events_skips_logs_with_no_matching_selector() {
        let store = new_store().await;
        let filter = ResolvedFilter {
            name: "transfers".to_string(),
            chain_id: 1,
            address: None,
            topics: vec![],
        };
        let (aggregator, _rx) = Aggregator::new(Arc::clone(&store));

        let page = aggregator
            .get_events(GetEventsQuery {
                from_timestamp: 0,
                to_timestamp: i64::MAX,
                filters: std::slice::from_ref(&filter),
                page_size: 10,
                cursor: None,
                include_log_filter_events: &IncludeLogFilterEvents::default(),
            })
            .await
            .unwrap();

        assert!(page.events.is_empty());
    }
}
