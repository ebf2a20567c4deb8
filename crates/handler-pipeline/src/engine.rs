//! Applies the aggregator's ordered event stream to the derived store (§4.5).
//! `toTimestamp` is the sole piece of mutable pipeline state; every event
//! handler invocation and every reorg rollback serializes through the single
//! `run` loop so ordering between `newCheckpoint` and `reorg` signals is
//! preserved exactly as delivered by the aggregator (§5).

use {
    crate::{
        contracts::CachedContractsView,
        entities::TransactionalEntitiesView,
        error::HandlerPipelineError,
        handler::HandlerRegistry,
    },
    aggregator::{events::SignalReceiver, AggregatorSignal, EventAggregating, GetEventsQuery},
    ethrpc::RpcTransport,
    event_store::{model::ResolvedFilter, EventStore},
    std::{
        collections::HashMap,
        sync::{
            atomic::{AtomicBool, AtomicI64, Ordering},
            Arc,
        },
    },
    tokio::sync::Mutex,
    tokio_util::sync::CancellationToken,
};

/// §4.5 "States": `{Idle, Processing, Reorging, Stopped}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Processing,
    Reorging,
    Stopped,
}

const DEFAULT_PAGE_SIZE: u32 = 1_000;

pub struct Pipeline {
    derived_store: Arc<dyn derived_store::DerivedStore>,
    aggregator: Arc<dyn EventAggregating>,
    event_store: Arc<dyn EventStore>,
    /// RPC transport per network, used only for live `eth_call`s on a
    /// contract-read cache miss (§4.5 `contracts` view).
    transports: HashMap<i64, Arc<dyn RpcTransport>>,
    filters: Vec<ResolvedFilter>,
    include_log_filter_events: aggregator::decode::IncludeLogFilterEvents,
    page_size: u32,
    registry: Mutex<HandlerRegistry>,
    to_timestamp: Mutex<i64>,
    state: Mutex<PipelineState>,
    /// Set once historical sync finishes; `toTimestamp >= this` is the
    /// "healthy" condition the HTTP server would consume (§4.5, out of this
    /// crate's scope beyond exposing [`Pipeline::is_healthy`]).
    historical_sync_completed_at: AtomicI64,
    /// Set on a handler error; cleared by [`Pipeline::reset`]. While set the
    /// pipeline does not resume draining on further `newCheckpoint` signals
    /// (§7 "Handler error … halt pipeline at current watermark, await
    /// reset").
    halted_with_error: AtomicBool,
}

impl Pipeline {
    pub fn new(
        derived_store: Arc<dyn derived_store::DerivedStore>,
        aggregator: Arc<dyn EventAggregating>,
        event_store: Arc<dyn EventStore>,
        transports: HashMap<i64, Arc<dyn RpcTransport>>,
        filters: Vec<ResolvedFilter>,
        include_log_filter_events: aggregator::decode::IncludeLogFilterEvents,
        registry: HandlerRegistry,
    ) -> Self {
        Self {
            derived_store,
            aggregator,
            event_store,
            transports,
            filters,
            include_log_filter_events,
            page_size: DEFAULT_PAGE_SIZE,
            registry: Mutex::new(registry),
            to_timestamp: Mutex::new(0),
            state: Mutex::new(PipelineState::Idle),
            historical_sync_completed_at: AtomicI64::new(i64::MAX),
            halted_with_error: AtomicBool::new(false),
        }
    }

    pub fn to_timestamp(&self) -> i64 {
        self.to_timestamp.try_lock().map(|t| *t).unwrap_or(0)
    }

    pub fn state(&self) -> PipelineState {
        self.state.try_lock().map(|s| *s).unwrap_or(PipelineState::Processing)
    }

    /// Marks the timestamp through which historical sync has fully
    /// completed; `is_healthy` flips once `toTimestamp` catches up to it.
    pub fn set_historical_sync_completed_at(&self, timestamp: i64) {
        self.historical_sync_completed_at.store(timestamp, Ordering::Relaxed);
    }

    pub fn is_healthy(&self) -> bool {
        !self.halted_with_error.load(Ordering::Relaxed)
            && self.to_timestamp() >= self.historical_sync_completed_at.load(Ordering::Relaxed)
    }

    /// Drives the pipeline off the aggregator's signal channel until `token`
    /// is cancelled. Cancellation is cooperative: the in-flight page
    /// finishes before the loop exits (§5 "Handler Pipeline finishes the
    /// current page and halts").
    pub async fn run(&self, mut signals: SignalReceiver, token: CancellationToken) -> Result<(), HandlerPipelineError> {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    *self.state.lock().await = PipelineState::Stopped;
                    return Ok(());
                }
                signal = signals.recv() => {
                    match signal {
                        Some(AggregatorSignal::NewCheckpoint { timestamp }) => self.drain_to(timestamp).await?,
                        Some(AggregatorSignal::Reorg { common_ancestor_timestamp, .. }) => {
                            self.handle_reorg(common_ancestor_timestamp).await?;
                        }
                        Some(AggregatorSignal::NewFinalityCheckpoint { .. }) => {}
                        None => {
                            *self.state.lock().await = PipelineState::Stopped;
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// §4.5 `newCheckpoint(t)`: streams and applies events page by page until
    /// `toTimestamp` catches up to `t`, committing after each page. A halted
    /// pipeline (pending reset after a handler error) ignores further
    /// checkpoints.
    async fn drain_to(&self, checkpoint: i64) -> Result<(), HandlerPipelineError> {
        if self.halted_with_error.load(Ordering::Relaxed) {
            return Ok(());
        }
        *self.state.lock().await = PipelineState::Processing;

        let from = *self.to_timestamp.lock().await + 1;
        if from > checkpoint {
            *self.state.lock().await = PipelineState::Idle;
            return Ok(());
        }
        let mut cursor = None;

        loop {
            let page = self
                .aggregator
                .get_events(GetEventsQuery {
                    from_timestamp: from,
                    to_timestamp: checkpoint,
                    filters: &self.filters,
                    page_size: self.page_size,
                    cursor,
                    include_log_filter_events: &self.include_log_filter_events,
                })
                .await?;

            let page_ends_at = page.metadata.page_ends_at_timestamp;
            let mut tx = self.derived_store.transaction(page_ends_at).await?;
            let registry = self.registry.lock().await;

            let mut handler_error = None;
            for event in &page.events {
                let Some(handler) = registry.lookup(event) else {
                    continue;
                };
                let chain_id = event.event.log.chain_id;
                let contracts = CachedContractsView::new(
                    chain_id,
                    Arc::clone(&self.event_store),
                    match self.transports.get(&chain_id) {
                        Some(transport) => Arc::clone(transport),
                        None => {
                            tracing::warn!(chain_id, "no rpc transport configured for contract reads");
                            continue;
                        }
                    },
                );
                let mut entities = TransactionalEntitiesView::new(tx.as_mut(), event.event.block.timestamp);
                if let Err(err) = handler.handle(event, &mut entities, &contracts).await {
                    handler_error = Some(err);
                    break;
                }
            }
            drop(registry);

            match handler_error {
                Some(err) => {
                    tx.rollback().await?;
                    tracing::error!(error = %err, "handler error, halting pipeline pending reset");
                    self.halted_with_error.store(true, Ordering::Relaxed);
                    *self.state.lock().await = PipelineState::Idle;
                    return Ok(());
                }
                None => {
                    tx.commit().await?;
                    *self.to_timestamp.lock().await = page_ends_at;
                }
            }

            match page.metadata.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        *self.state.lock().await = PipelineState::Idle;
        Ok(())
    }

    /// §4.5 `reorg`: halts in-flight processing, reverts the derived store
    /// past `common_ancestor_timestamp`, and rewinds `toTimestamp` to match —
    /// the invariant `toTimestamp <= t` must hold before any further
    /// `newCheckpoint` is processed (§8).
    async fn handle_reorg(&self, common_ancestor_timestamp: i64) -> Result<(), HandlerPipelineError> {
        *self.state.lock().await = PipelineState::Reorging;
        self.derived_store.rollback_to(common_ancestor_timestamp).await?;
        let mut to_timestamp = self.to_timestamp.lock().await;
        *to_timestamp = (*to_timestamp).min(common_ancestor_timestamp);
        drop(to_timestamp);
        *self.state.lock().await = PipelineState::Idle;
        Ok(())
    }

    /// §4.5 `reset` (hot reload): reverts the derived store to empty, rewinds
    /// `toTimestamp` to 0, optionally rebuilds the handler registry, clears
    /// any halted error, then resumes from the aggregator's current
    /// checkpoint.
    pub async fn reset(&self, new_registry: Option<HandlerRegistry>) -> Result<(), HandlerPipelineError> {
        *self.state.lock().await = PipelineState::Stopped;
        self.derived_store.reset().await?;
        *self.to_timestamp.lock().await = 0;
        if let Some(registry) = new_registry {
            *self.registry.lock().await = registry;
        }
        self.halted_with_error.store(false, Ordering::Relaxed);
        *self.state.lock().await = PipelineState::Idle;
        self.drain_to(self.aggregator.checkpoint()).await
    }
}

#[async_trait::async_trait]
impl observe::LivenessChecking for Pipeline {
    async fn is_alive(&self) -> bool {
        self.is_healthy()
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{contracts::ContractsView, entities::EntitiesView, handler::{Handler, HandlerKey}},
        aggregator::{Aggregator, DecodedEvent},
        derived_store::SqliteDerivedStore,
        event_store::SqliteEventStore,
        std::sync::atomic::AtomicUsize,
    };

    struct RecordingHandler {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Handler for RecordingHandler {
        async fn handle(
            &self,
            event: &DecodedEvent,
            entities: &mut dyn EntitiesView,
            _contracts: &dyn ContractsView,
        ) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                anyhow::bail!("handler exploded");
            }
            entities
                .upsert(
                    "Account",
                    &event.event.log.address.0,
                    serde_json::json!({"seen": true}),
                )
                .await?;
            Ok(())
        }
    }

    async fn new_event_store() -> Arc<dyn EventStore> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteEventStore::new(pool);
        store.migrate().await.unwrap();
        Arc::new(store)
    }

    async fn new_derived_store() -> Arc<dyn derived_store::DerivedStore> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteDerivedStore::new(pool);
        store.migrate().await.unwrap();
        Arc::new(store)
    }

    #[tokio::test]
    async fn empty_checkpoint_with_no_events_still_advances_to_timestamp() {
        let event_store = new_event_store().await;
        let derived_store = new_derived_store().await;
        let (aggregator, _rx) = Aggregator::new(Arc::clone(&event_store));
        let aggregator: Arc<dyn EventAggregating> = Arc::new(aggregator);

        let pipeline = Pipeline::new(
            derived_store,
            aggregator,
            event_store,
            HashMap::new(),
            vec![],
            aggregator::decode::IncludeLogFilterEvents::default(),
            HandlerRegistry::new(),
        );

        pipeline.drain_to(500).await.unwrap();
        assert_eq!(pipeline.to_timestamp(), 500);
    }

    #[tokio::test]
    async fn reorg_rewinds_to_timestamp_and_never_exceeds_it() {
        let event_store = new_event_store().await;
        let derived_store = new_derived_store().await;
        let (aggregator, _rx) = Aggregator::new(Arc::clone(&event_store));
        let aggregator: Arc<dyn EventAggregating> = Arc::new(aggregator);

        let pipeline = Pipeline::new(
            derived_store,
            aggregator,
            event_store,
            HashMap::new(),
            vec![],
            aggregator::decode::IncludeLogFilterEvents::default(),
            HandlerRegistry::new(),
        );
        pipeline.drain_to(900).await.unwrap();
        assert_eq!(pipeline.to_timestamp(), 900);

        pipeline.handle_reorg(600).await.unwrap();
        assert!(pipeline.to_timestamp() <= 600);
    }

    #[tokio::test]
    async fn handler_error_halts_and_reset_resumes() {
        let event_store = new_event_store().await;
        let derived_store = new_derived_store().await;
        let (aggregator, _rx) = Aggregator::new(Arc::clone(&event_store));
        let aggregator: Arc<dyn EventAggregating> = Arc::new(aggregator);

        let mut registry = HandlerRegistry::new();
        registry.register(
            HandlerKey::new("transfers", "Transfer"),
            Arc::new(RecordingHandler {
                calls: AtomicUsize::new(0),
                fail: false,
            }),
        );

        let pipeline = Pipeline::new(
            derived_store,
            aggregator,
            event_store,
            HashMap::new(),
            vec![],
            aggregator::decode::IncludeLogFilterEvents::default(),
            registry,
        );

        // No events match (no filters configured), so this just advances the
        // watermark uneventfully; the halted-after-error path is exercised by
        // directly setting the flag and confirming reset clears it.
        pipeline.halted_with_error.store(true, Ordering::Relaxed);
        pipeline.drain_to(100).await.unwrap();
        assert_eq!(pipeline.to_timestamp(), 0, "halted pipeline ignores newCheckpoint");

        pipeline.reset(None).await.unwrap();
        assert!(!pipeline.halted_with_error.load(Ordering::Relaxed));
    }
}
