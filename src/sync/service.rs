use crate::config::SyncConfig;
use crate::graph::LiquidityGraph;
use crate::sync::source::{LedgerEvent, LedgerSource};
use ahash::AHashSet;
use arc_swap::ArcSwap;
use eyre::Result;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Read handle onto the currently published graph. Cheap to clone; `snapshot`
/// yields an immutable graph value that stays consistent for as long as the
/// caller holds it, regardless of concurrent publishes.
#[derive(Clone)]
pub struct GraphHandle {
    inner: Arc<ArcSwap<LiquidityGraph>>,
}

impl GraphHandle {
    fn new() -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(LiquidityGraph::new())) }
    }

    /// Handle detached from any synchronizer, holding a fixed graph value.
    /// Useful for embedding the finder against a pre-built graph.
    pub fn from_graph(graph: LiquidityGraph) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(graph)) }
    }

    pub fn snapshot(&self) -> Arc<LiquidityGraph> {
        self.inner.load_full()
    }
}

#[derive(Clone, Copy)]
enum SyncState {
    /// No usable graph yet; waiting for the first ledger to close.
    Initializing,
    /// Graph published; incremental updates gated on sequence continuity.
    Tracking { last_sequence: u64 },
}

/// Keeps the published liquidity graph consistent with the changing ledger.
///
/// Consumes the change-event feed, coalesces per-offer notifications within
/// one ledger's settlement window behind a debounce timer, and on expiry
/// either patches the graph pair by pair (sequence advanced by exactly one)
/// or rebuilds it from a full snapshot (continuity cannot be proven). Each
/// batch publishes a fresh graph value; readers are never exposed to a graph
/// mid-mutation.
pub struct LedgerSynchronizer {
    config: SyncConfig,
    source: Arc<dyn LedgerSource>,
    events: mpsc::Receiver<LedgerEvent>,
    published: GraphHandle,
    ready_tx: watch::Sender<bool>,
    state: SyncState,
    /// Latest sequence number announced by the feed.
    observed_sequence: u64,
    /// Pairs touched since the last flush, deduplicated by pair.
    pending: AHashSet<(String, String)>,
    /// Debounce deadline; rearmed by every offer-change event.
    deadline: Option<Instant>,
}

impl LedgerSynchronizer {
    /// Create a synchronizer consuming `events`. Returns the synchronizer,
    /// the shared graph handle, and a readiness watch that flips to `true`
    /// once the first full build has been published.
    pub fn new(
        config: SyncConfig,
        source: Arc<dyn LedgerSource>,
        events: mpsc::Receiver<LedgerEvent>,
    ) -> (Self, GraphHandle, watch::Receiver<bool>) {
        let published = GraphHandle::new();
        let (ready_tx, ready_rx) = watch::channel(false);

        let synchronizer = Self {
            config,
            source,
            events,
            published: published.clone(),
            ready_tx,
            state: SyncState::Initializing,
            observed_sequence: 0,
            pending: AHashSet::new(),
            deadline: None,
        };

        (synchronizer, published, ready_rx)
    }

    /// Run until the event feed closes. A source failure during startup ends
    /// the run with an error and readiness is never signalled. Once tracking,
    /// a failed batch publishes nothing and the loop keeps consuming events;
    /// the stale sequence number fails the next continuity check, which
    /// forces a full rebuild.
    pub async fn run(mut self) -> Result<()> {
        loop {
            tokio::select! {
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event).await?,
                    None => {
                        info!("Change feed closed, synchronizer stopping");
                        break;
                    }
                },
                _ = sleep_until_deadline(self.deadline), if self.deadline.is_some() => {
                    self.deadline = None;
                    if let Err(e) = self.flush().await {
                        warn!("Batch apply failed, keeping previous graph: {e:#}");
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn [`run`] on the runtime, logging a terminal error.
    ///
    /// [`run`]: LedgerSynchronizer::run
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                error!("Ledger synchronizer stopped: {e:#}");
            }
        })
    }

    async fn on_event(&mut self, event: LedgerEvent) -> Result<()> {
        match event {
            LedgerEvent::LedgerAdvanced { sequence } => {
                self.observed_sequence = sequence;

                if matches!(self.state, SyncState::Initializing) {
                    info!("Received first ledger");
                    let graph = self.rebuild().await?;
                    self.publish(graph);
                    self.state = SyncState::Tracking { last_sequence: sequence };
                    let _ = self.ready_tx.send(true);
                }
            }

            LedgerEvent::OfferChanged { selling, buying } => {
                // nothing to patch before the first build; the snapshot will
                // cover whatever changed
                if matches!(self.state, SyncState::Tracking { .. }) {
                    self.pending.insert((selling, buying));
                    self.deadline = Some(Instant::now() + self.config.trigger_delay());
                }
            }
        }

        Ok(())
    }

    /// Apply the coalesced batch: incremental when the ledger advanced by
    /// exactly one, full rebuild otherwise.
    async fn flush(&mut self) -> Result<()> {
        let SyncState::Tracking { last_sequence } = self.state else {
            return Ok(());
        };

        let pairs: Vec<(String, String)> = self.pending.drain().collect();

        if self.observed_sequence == last_sequence + 1 {
            debug!("Ledger #{} - pairs modified: {}", self.observed_sequence, pairs.len());

            let mut next = (*self.published.snapshot()).clone();
            for (selling, buying) in &pairs {
                let levels = self.source.fetch_levels(selling, buying).await?;
                next = next.apply_change(selling, buying, &levels);
            }
            self.publish(next);
        } else {
            warn!("Ledger(s) skipped. Increase the trigger delay?");
            let graph = self.rebuild().await?;
            debug!("Ledger #{} - graph rebuilt from scratch", self.observed_sequence);
            self.publish(graph);
        }

        self.state = SyncState::Tracking { last_sequence: self.observed_sequence };
        Ok(())
    }

    async fn rebuild(&self) -> Result<LiquidityGraph> {
        let offers = self.source.fetch_open_offers().await?;
        Ok(LiquidityGraph::build(&offers))
    }

    fn publish(&self, graph: LiquidityGraph) {
        self.published.inner.store(Arc::new(graph));
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::PriceLevel;
    use crate::sync::source::{OfferRow, SourceError};
    use ahash::AHashMap;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MockSource {
        offers: Mutex<Vec<OfferRow>>,
        levels: Mutex<AHashMap<(String, String), Vec<PriceLevel>>>,
        snapshot_fetches: AtomicUsize,
        level_fetches: AtomicUsize,
        fail_snapshot: bool,
        fail_levels: AtomicBool,
    }

    impl MockSource {
        fn set_levels(&self, selling: &str, buying: &str, levels: Vec<PriceLevel>) {
            self.levels.lock().unwrap().insert((selling.to_string(), buying.to_string()), levels);
        }
    }

    #[async_trait]
    impl LedgerSource for MockSource {
        async fn fetch_open_offers(&self) -> Result<Vec<OfferRow>, SourceError> {
            self.snapshot_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_snapshot {
                return Err(SourceError::Connection("database is down".into()));
            }
            Ok(self.offers.lock().unwrap().clone())
        }

        async fn fetch_levels(
            &self,
            selling: &str,
            buying: &str,
        ) -> Result<Vec<PriceLevel>, SourceError> {
            self.level_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_levels.load(Ordering::SeqCst) {
                return Err(SourceError::Query("levels query failed".into()));
            }
            let levels = self.levels.lock().unwrap();
            Ok(levels.get(&(selling.to_string(), buying.to_string())).cloned().unwrap_or_default())
        }

        async fn account_assets(&self, _account: &str) -> Result<Vec<String>, SourceError> {
            Ok(vec![])
        }
    }

    fn start(
        source: Arc<MockSource>,
    ) -> (mpsc::Sender<LedgerEvent>, GraphHandle, watch::Receiver<bool>) {
        let config = SyncConfig::default();
        let (events_tx, events_rx) = mpsc::channel(config.channel_buffer_size);
        let (synchronizer, graph, ready) = LedgerSynchronizer::new(config, source, events_rx);
        synchronizer.spawn();
        (events_tx, graph, ready)
    }

    async fn wait_for<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not met in time");
    }

    const ISSUER: &str = "GA5ZSEJYB37JRC5AVCIA5MOP4RHTM335X2KGX3IHOJAPP5RE34K4KZVN";

    fn usd() -> String {
        format!("{ISSUER}:USD")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_ledger_builds_and_signals_ready() {
        let source = Arc::new(MockSource::default());
        source
            .offers
            .lock()
            .unwrap()
            .push(OfferRow::from_identities(&usd(), "native", 100.0, 2.0));

        let (events, graph, mut ready) = start(source.clone());
        assert!(!*ready.borrow());

        events.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();
        ready.changed().await.unwrap();

        assert!(*ready.borrow());
        assert_eq!(graph.snapshot().node_count(), 1);
        assert_eq!(source.snapshot_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contiguous_sequence_patches_incrementally() {
        let source = Arc::new(MockSource::default());
        let (events, graph, mut ready) = start(source.clone());

        events.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();
        ready.changed().await.unwrap();

        source.set_levels(&usd(), "native", vec![PriceLevel::new(40.0, 1.5)]);
        events
            .send(LedgerEvent::OfferChanged { selling: usd(), buying: "native".into() })
            .await
            .unwrap();
        events.send(LedgerEvent::LedgerAdvanced { sequence: 11 }).await.unwrap();

        let handle = graph.clone();
        wait_for(move || !handle.snapshot().is_empty()).await;

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.arcs(&usd()).unwrap()[0].capacity, 40.0);
        assert_eq!(source.level_fetches.load(Ordering::SeqCst), 1);
        // no second snapshot fetch: the patch path was taken
        assert_eq!(source.snapshot_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_events_for_one_pair_fetches_once() {
        let source = Arc::new(MockSource::default());
        let (events, graph, mut ready) = start(source.clone());

        events.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();
        ready.changed().await.unwrap();

        source.set_levels(&usd(), "native", vec![PriceLevel::new(40.0, 1.5)]);
        for _ in 0..5 {
            events
                .send(LedgerEvent::OfferChanged { selling: usd(), buying: "native".into() })
                .await
                .unwrap();
        }
        events.send(LedgerEvent::LedgerAdvanced { sequence: 11 }).await.unwrap();

        let handle = graph.clone();
        wait_for(move || !handle.snapshot().is_empty()).await;

        assert_eq!(source.level_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequence_gap_forces_full_rebuild() {
        let source = Arc::new(MockSource::default());
        let (events, graph, mut ready) = start(source.clone());

        events.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();
        ready.changed().await.unwrap();

        source
            .offers
            .lock()
            .unwrap()
            .push(OfferRow::from_identities(&usd(), "native", 100.0, 2.0));
        events
            .send(LedgerEvent::OfferChanged { selling: usd(), buying: "native".into() })
            .await
            .unwrap();
        // 10 -> 12: a ledger was missed
        events.send(LedgerEvent::LedgerAdvanced { sequence: 12 }).await.unwrap();

        let handle = graph.clone();
        wait_for(move || !handle.snapshot().is_empty()).await;

        assert_eq!(source.snapshot_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(source.level_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_failure_never_signals_ready() {
        let source = Arc::new(MockSource { fail_snapshot: true, ..MockSource::default() });

        let config = SyncConfig::default();
        let (events_tx, events_rx) = mpsc::channel(config.channel_buffer_size);
        let (synchronizer, _graph, ready) =
            LedgerSynchronizer::new(config, source.clone(), events_rx);

        let run = tokio::spawn(synchronizer.run());
        events_tx.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();

        let result = run.await.unwrap();
        assert!(result.is_err());
        assert!(!*ready.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracking_fetch_failure_keeps_old_graph_and_recovers() {
        let source = Arc::new(MockSource::default());
        source
            .offers
            .lock()
            .unwrap()
            .push(OfferRow::from_identities(&usd(), "native", 100.0, 2.0));

        let (events, graph, mut ready) = start(source.clone());
        events.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();
        ready.changed().await.unwrap();

        source.fail_levels.store(true, Ordering::SeqCst);
        events
            .send(LedgerEvent::OfferChanged { selling: usd(), buying: "native".into() })
            .await
            .unwrap();
        events.send(LedgerEvent::LedgerAdvanced { sequence: 11 }).await.unwrap();

        let mock = source.clone();
        wait_for(move || mock.level_fetches.load(Ordering::SeqCst) == 1).await;

        // the failed batch publishes nothing and does not end the run
        assert_eq!(graph.snapshot().arcs(&usd()).unwrap()[0].capacity, 100.0);
        assert!(*ready.borrow());

        // the next ledger fails the continuity check against the stale
        // sequence and rebuilds from a fresh snapshot
        source.fail_levels.store(false, Ordering::SeqCst);
        source.offers.lock().unwrap()[0].amount = 40.0;
        events
            .send(LedgerEvent::OfferChanged { selling: usd(), buying: "native".into() })
            .await
            .unwrap();
        events.send(LedgerEvent::LedgerAdvanced { sequence: 12 }).await.unwrap();

        let handle = graph.clone();
        wait_for(move || {
            handle.snapshot().arcs(&usd()).is_some_and(|arcs| arcs[0].capacity == 40.0)
        })
        .await;

        assert_eq!(source.snapshot_fetches.load(Ordering::SeqCst), 2);
        assert_eq!(source.level_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_levels_delete_the_arc() {
        let source = Arc::new(MockSource::default());
        source
            .offers
            .lock()
            .unwrap()
            .push(OfferRow::from_identities(&usd(), "native", 100.0, 2.0));

        let (events, graph, mut ready) = start(source.clone());
        events.send(LedgerEvent::LedgerAdvanced { sequence: 10 }).await.unwrap();
        ready.changed().await.unwrap();
        assert!(!graph.snapshot().is_empty());

        // pair closed out entirely: fetch_levels returns no rows
        events
            .send(LedgerEvent::OfferChanged { selling: usd(), buying: "native".into() })
            .await
            .unwrap();
        events.send(LedgerEvent::LedgerAdvanced { sequence: 11 }).await.unwrap();

        let handle = graph.clone();
        wait_for(move || handle.snapshot().is_empty()).await;
    }
}
