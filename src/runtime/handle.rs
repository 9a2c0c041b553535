use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{Mutex, broadcast, mpsc, oneshot},
    time::{Duration, Instant},
};

use crate::{
    core::store::{Change, SeedOutcome, SightingStore, StoreError, StoreSnapshotV1},
    op::{Op, StoredOp},
    persist::{OpSink, PersistenceError},
    sighting::{Sighting, SightingDraft},
    types::{CancelFlag, OpSeq, SightingId},
};

use super::{
    events::SightingEvent,
    feed::{Feed, FeedView, SightingWatch, SubscriptionHandle},
};

/// Failure of a request sent through [`SightingLogHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Rejected by the store; nothing changed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The journal refused or could not queue the op; nothing changed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// The writer task is gone.
    #[error("sighting log runtime has shut down")]
    ChannelClosed,
    /// Seeding failed after some defaults were already committed. Those
    /// records stay, so a retried seed is a no-op.
    #[error("seeding stopped after {} inserts: {source}", .outcome.inserted.len())]
    SeedInterrupted {
        /// Records committed before the failure.
        outcome: SeedOutcome,
        /// What stopped the seed.
        source: Box<RuntimeError>,
    },
}

/// When a mutation counts as complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Committed once the op is queued for the journal.
    #[default]
    InMemory,
    /// Committed only after the journal write succeeded.
    Durable,
}

/// Runtime tuning knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// When a mutation is acknowledged.
    pub ack_mode: AckMode,
    /// Flush the journal batch as soon as an upsert arrives.
    pub flush_on_upsert: bool,
    /// Flush once this many ops are buffered.
    pub batch_max_ops: usize,
    /// Flush a non-empty batch after this long.
    pub batch_max_latency_ms: u64,
    /// Capacity of the writer-to-journal queue.
    pub persist_queue_bound: usize,
    /// Write a snapshot every N committed ops; 0 disables.
    pub snapshot_every_ops: usize,
    /// Drop journaled ops covered by a new snapshot.
    pub compact_after_snapshot: bool,
    /// Capacity of the handle-to-writer queue.
    pub command_queue_bound: usize,
    /// Buffer size of the [`SightingEvent`] broadcast.
    pub event_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ack_mode: AckMode::InMemory,
            flush_on_upsert: true,
            batch_max_ops: 32,
            batch_max_latency_ms: 75,
            persist_queue_bound: 64,
            snapshot_every_ops: 2000,
            compact_after_snapshot: false,
            command_queue_bound: 256,
            event_capacity: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON config; missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Cloneable front door to the sighting log.
///
/// Mutations are serialized through one writer task. Reads of the ordered
/// view are served from the last published [`FeedView`] and never wait on
/// the writer.
#[derive(Clone)]
pub struct SightingLogHandle {
    cmd_tx: mpsc::Sender<Command>,
    events_tx: broadcast::Sender<SightingEvent>,
    feed: Arc<Feed>,
}

enum Command {
    Upsert {
        draft: SightingDraft,
        resp: oneshot::Sender<Result<SightingId, RuntimeError>>,
    },
    Replace {
        id: SightingId,
        draft: SightingDraft,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    DeleteById {
        id: SightingId,
        resp: oneshot::Sender<Result<bool, RuntimeError>>,
    },
    DeleteByTail {
        tail: String,
        resp: oneshot::Sender<Result<usize, RuntimeError>>,
    },
    ClearAll {
        resp: oneshot::Sender<Result<usize, RuntimeError>>,
    },
    SeedIfEmpty {
        defaults: Vec<SightingDraft>,
        cancel: CancelFlag,
        resp: oneshot::Sender<Result<SeedOutcome, RuntimeError>>,
    },
    Get {
        id: SightingId,
        resp: oneshot::Sender<Option<Sighting>>,
    },
    ByTail {
        tail: String,
        resp: oneshot::Sender<Vec<Sighting>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, RuntimeError>>,
    },
    Checkpoint {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
}

enum PersistMsg {
    Op(StoredOp),
    Durable {
        stored: StoredOp,
        resp: oneshot::Sender<Result<OpSeq, PersistenceError>>,
    },
    Flush {
        resp: oneshot::Sender<Result<OpSeq, PersistenceError>>,
    },
    Checkpoint {
        snapshot: StoreSnapshotV1,
        last_seq: OpSeq,
        compact: bool,
        resp: oneshot::Sender<Result<(), PersistenceError>>,
    },
    Shutdown {
        resp: oneshot::Sender<Result<(), PersistenceError>>,
    },
}

/// Starts the writer task (and the journal worker when `sink` is given).
///
/// Must be called from within a tokio runtime.
pub fn spawn_spotlog(
    store: SightingStore,
    sink: Option<Box<dyn OpSink>>,
    config: RuntimeConfig,
) -> SightingLogHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (events_tx, _) = broadcast::channel::<SightingEvent>(config.event_capacity.max(1));
    let feed = Arc::new(Feed::new(
        FeedView::new(store.latest_op_seq(), store.all_cloned()),
        tokio::runtime::Handle::current(),
    ));

    let (persist_tx, mut durable_rx) = if let Some(sink) = sink {
        let (persist_tx, persist_rx) = mpsc::channel::<PersistMsg>(config.persist_queue_bound.max(1));
        let (durable_tx, durable_rx) = mpsc::unbounded_channel::<SightingEvent>();
        spawn_persistence_worker(sink, persist_rx, durable_tx, config.clone());
        (Some(persist_tx), Some(durable_rx))
    } else {
        (None, None)
    };

    log::debug!(
        "sighting log runtime started with {} records (journal: {})",
        store.len(),
        persist_tx.is_some()
    );

    let mut writer = Writer {
        store,
        events_tx: events_tx.clone(),
        feed: Arc::clone(&feed),
        persist_tx,
        config,
        ops_since_snapshot: 0,
    };

    tokio::spawn(async move {
        let mut journal_open = true;
        loop {
            if let Some(rx) = durable_rx.as_mut() {
                tokio::select! {
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { break; };
                        if writer.handle_command(cmd).await {
                            break;
                        }
                    }
                    progress = rx.recv(), if journal_open => {
                        let Some(event) = progress else {
                            journal_open = false;
                            continue;
                        };
                        if let SightingEvent::JournalFailed { from_seq, through_seq, error } = &event {
                            log::warn!("journal write of ops {from_seq}..={through_seq} failed: {error}");
                        }
                        let _ = writer.events_tx.send(event);
                    }
                }
            } else {
                let Some(cmd) = cmd_rx.recv().await else { break; };
                if writer.handle_command(cmd).await {
                    break;
                }
            }
        }
        writer.feed.close();
        log::debug!("sighting log runtime stopped");
    });

    SightingLogHandle {
        cmd_tx,
        events_tx,
        feed,
    }
}

impl SightingLogHandle {
    /// Fine-grained mutation events.
    pub fn events(&self) -> broadcast::Receiver<SightingEvent> {
        self.events_tx.subscribe()
    }

    /// Push subscription delivering the ordered view after every change.
    ///
    /// The callback runs on the runtime's blocking pool, so it may block
    /// without holding up mutations or other subscribers. May be called from
    /// outside the runtime.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(FeedView) + Send + 'static,
    {
        self.feed.subscribe(callback)
    }

    /// Cancels a subscription created by [`SightingLogHandle::subscribe`].
    pub fn cancel(&self, subscription: &SubscriptionHandle) -> bool {
        subscription.cancel();
        self.feed.cancel(subscription.id())
    }

    /// Number of live callback subscriptions.
    pub fn active_subscribers(&self) -> usize {
        self.feed.active_subscribers()
    }

    /// Change receiver for async consumers.
    pub fn watch(&self) -> SightingWatch {
        self.feed.watch()
    }

    /// Snapshot of every sighting, newest first.
    pub fn all(&self) -> FeedView {
        self.feed.current()
    }

    /// Op sequence reflected by [`SightingLogHandle::all`].
    pub fn version(&self) -> OpSeq {
        self.feed.current().version
    }

    /// Inserts, or replaces in full when `draft.id` names a live record.
    /// Returns the record's id.
    pub async fn upsert(&self, draft: SightingDraft) -> Result<SightingId, RuntimeError> {
        self.request(|resp| Command::Upsert { draft, resp }).await?
    }

    /// Replaces live record `id`; fails with `NotFound` otherwise.
    pub async fn replace(&self, id: SightingId, draft: SightingDraft) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Replace { id, draft, resp }).await?
    }

    /// Returns true if a record was removed.
    pub async fn delete_by_id(&self, id: SightingId) -> Result<bool, RuntimeError> {
        self.request(|resp| Command::DeleteById { id, resp }).await?
    }

    /// Returns the number of records removed.
    pub async fn delete_by_tail(&self, tail: impl Into<String>) -> Result<usize, RuntimeError> {
        let tail = tail.into();
        self.request(|resp| Command::DeleteByTail { tail, resp }).await?
    }

    /// Returns the number of records removed.
    pub async fn clear_all(&self) -> Result<usize, RuntimeError> {
        self.request(|resp| Command::ClearAll { resp }).await?
    }

    /// Returns the number of records inserted.
    pub async fn seed_if_empty(&self, defaults: Vec<SightingDraft>) -> Result<usize, RuntimeError> {
        let outcome = self
            .seed_if_empty_with(defaults, CancelFlag::new())
            .await?;
        Ok(outcome.inserted.len())
    }

    /// Like [`SightingLogHandle::seed_if_empty`], stopping between records
    /// once `cancel` fires.
    ///
    /// A persistence failure after the first insert returns
    /// [`RuntimeError::SeedInterrupted`] carrying the ids already committed.
    pub async fn seed_if_empty_with(
        &self,
        defaults: Vec<SightingDraft>,
        cancel: CancelFlag,
    ) -> Result<SeedOutcome, RuntimeError> {
        self.request(|resp| Command::SeedIfEmpty {
            defaults,
            cancel,
            resp,
        })
        .await?
    }

    /// Point lookup by id.
    pub async fn get(&self, id: SightingId) -> Result<Option<Sighting>, RuntimeError> {
        self.request(|resp| Command::Get { id, resp }).await
    }

    /// Records whose tail matches ignoring case, newest first.
    pub async fn by_tail(&self, tail: impl Into<String>) -> Result<Vec<Sighting>, RuntimeError> {
        let tail = tail.into();
        self.request(|resp| Command::ByTail { tail, resp }).await
    }

    /// Forces buffered journal ops to disk; returns the durable sequence.
    ///
    /// Ops from an earlier failed write are retried first, and the call fails
    /// while the journal keeps refusing them.
    pub async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        self.request(|resp| Command::Flush { resp }).await?
    }

    /// Writes a snapshot of the current state to the journal.
    pub async fn checkpoint(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Checkpoint { resp }).await?
    }

    /// Cancels subscriptions, drains the journal and stops the writer.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await?
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

struct Writer {
    store: SightingStore,
    events_tx: broadcast::Sender<SightingEvent>,
    feed: Arc<Feed>,
    persist_tx: Option<mpsc::Sender<PersistMsg>>,
    config: RuntimeConfig,
    ops_since_snapshot: usize,
}

impl Writer {
    async fn handle_command(&mut self, cmd: Command) -> bool {
        let before = self.store.latest_op_seq();

        match cmd {
            Command::Upsert { draft, resp } => {
                let res = self.upsert(draft).await;
                self.after_mutation(before).await;
                let _ = resp.send(res);
            }
            Command::Replace { id, draft, resp } => {
                let res = self.replace(id, draft).await;
                self.after_mutation(before).await;
                let _ = resp.send(res);
            }
            Command::DeleteById { id, resp } => {
                let res = self.delete_by_id(id).await;
                self.after_mutation(before).await;
                let _ = resp.send(res);
            }
            Command::DeleteByTail { tail, resp } => {
                let res = self.delete_by_tail(&tail).await;
                self.after_mutation(before).await;
                let _ = resp.send(res);
            }
            Command::ClearAll { resp } => {
                let res = self.clear_all().await;
                self.after_mutation(before).await;
                let _ = resp.send(res);
            }
            Command::SeedIfEmpty {
                defaults,
                cancel,
                resp,
            } => {
                let res = self.seed_if_empty(defaults, &cancel).await;
                self.after_mutation(before).await;
                let _ = resp.send(res);
            }
            Command::Get { id, resp } => {
                let _ = resp.send(self.store.get_cloned(id));
            }
            Command::ByTail { tail, resp } => {
                let _ = resp.send(self.store.by_tail_cloned(&tail));
            }
            Command::Flush { resp } => {
                let _ = resp.send(self.flush().await);
            }
            Command::Checkpoint { resp } => {
                let _ = resp.send(self.checkpoint().await);
            }
            Command::Shutdown { resp } => {
                self.feed.close();
                let _ = resp.send(self.shutdown().await);
                return true;
            }
        }

        false
    }

    async fn upsert(&mut self, draft: SightingDraft) -> Result<SightingId, RuntimeError> {
        let (id, stored) = self.store.plan_upsert(draft)?;
        self.apply(stored).await?;
        Ok(id)
    }

    async fn replace(&mut self, id: SightingId, draft: SightingDraft) -> Result<(), RuntimeError> {
        let stored = self.store.prepare_replace(id, draft)?;
        self.apply(stored).await?;
        Ok(())
    }

    async fn delete_by_id(&mut self, id: SightingId) -> Result<bool, RuntimeError> {
        let Some(stored) = self.store.prepare_delete(id) else {
            return Ok(false);
        };
        self.apply(stored).await?;
        Ok(true)
    }

    async fn delete_by_tail(&mut self, tail: &str) -> Result<usize, RuntimeError> {
        let mut removed = 0;
        for id in self.store.ids_by_tail(tail) {
            if self.delete_by_id(id).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn clear_all(&mut self) -> Result<usize, RuntimeError> {
        let Some(stored) = self.store.prepare_clear() else {
            return Ok(0);
        };
        match self.apply(stored).await? {
            Change::Cleared { removed } => Ok(removed),
            _ => Ok(0),
        }
    }

    async fn seed_if_empty(
        &mut self,
        defaults: Vec<SightingDraft>,
        cancel: &CancelFlag,
    ) -> Result<SeedOutcome, RuntimeError> {
        let plan = self.store.prepare_seed(defaults)?;
        let mut outcome = SeedOutcome::default();
        let mut failure = None;
        for draft in plan {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            if let Err(err) = self.seed_one(draft, &mut outcome).await {
                failure = Some(err);
                break;
            }
            tokio::task::yield_now().await;
        }

        if !outcome.inserted.is_empty() {
            log::debug!(
                "seeded {} sightings (cancelled: {}, failed: {})",
                outcome.inserted.len(),
                outcome.cancelled,
                failure.is_some()
            );
            let _ = self.events_tx.send(SightingEvent::Seeded {
                inserted: outcome.inserted.len(),
            });
        }

        match failure {
            None => Ok(outcome),
            Some(err) if outcome.inserted.is_empty() => Err(err),
            Some(err) => Err(RuntimeError::SeedInterrupted {
                outcome,
                source: Box::new(err),
            }),
        }
    }

    async fn seed_one(&mut self, draft: SightingDraft, outcome: &mut SeedOutcome) -> Result<(), RuntimeError> {
        let (id, stored) = self.store.plan_upsert(draft)?;
        self.apply(stored).await?;
        outcome.inserted.push(id);
        Ok(())
    }

    /// Hands `stored` to persistence, then commits it. A persistence failure
    /// leaves the store untouched.
    async fn apply(&mut self, stored: StoredOp) -> Result<Change, RuntimeError> {
        self.persist(&stored).await?;
        let change = self.store.commit(stored);
        self.ops_since_snapshot += 1;

        let event = match change {
            Change::Created(id) => Some(SightingEvent::Created { id }),
            Change::Replaced(id) => Some(SightingEvent::Replaced { id }),
            Change::Deleted(id) => Some(SightingEvent::Deleted { id }),
            Change::Cleared { removed } => Some(SightingEvent::Cleared { removed }),
            Change::Unchanged => None,
        };
        if let Some(event) = event {
            let _ = self.events_tx.send(event);
        }
        Ok(change)
    }

    async fn persist(&self, stored: &StoredOp) -> Result<(), RuntimeError> {
        let Some(tx) = self.persist_tx.as_ref() else {
            let _ = self
                .events_tx
                .send(SightingEvent::DurableUpTo { op_seq: stored.seq });
            return Ok(());
        };

        match self.config.ack_mode {
            AckMode::InMemory => tx.try_send(PersistMsg::Op(stored.clone())).map_err(|err| {
                RuntimeError::Persistence(PersistenceError::Message(format!(
                    "persist queue error: {err}"
                )))
            }),
            AckMode::Durable => {
                let (resp, rx) = oneshot::channel();
                tx.send(PersistMsg::Durable {
                    stored: stored.clone(),
                    resp,
                })
                .await
                .map_err(|_| RuntimeError::ChannelClosed)?;
                rx.await.map_err(|_| RuntimeError::ChannelClosed)??;
                Ok(())
            }
        }
    }

    async fn after_mutation(&mut self, before: OpSeq) {
        if self.store.latest_op_seq() == before {
            return;
        }
        self.feed.publish(FeedView::new(
            self.store.latest_op_seq(),
            self.store.all_cloned(),
        ));
        self.maybe_auto_checkpoint().await;
    }

    async fn flush(&self) -> Result<OpSeq, RuntimeError> {
        let Some(tx) = self.persist_tx.as_ref() else {
            return Ok(self.store.latest_op_seq());
        };
        let (resp, rx) = oneshot::channel();
        tx.send(PersistMsg::Flush { resp })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        Ok(rx.await.map_err(|_| RuntimeError::ChannelClosed)??)
    }

    async fn checkpoint(&mut self) -> Result<(), RuntimeError> {
        let Some(tx) = self.persist_tx.as_ref() else {
            return Ok(());
        };
        let (resp, rx) = oneshot::channel();
        tx.send(PersistMsg::Checkpoint {
            snapshot: self.store.export_snapshot(),
            last_seq: self.store.latest_op_seq(),
            compact: self.config.compact_after_snapshot,
            resp,
        })
        .await
        .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)??;
        self.ops_since_snapshot = 0;
        Ok(())
    }

    async fn maybe_auto_checkpoint(&mut self) {
        if self.config.snapshot_every_ops == 0
            || self.ops_since_snapshot < self.config.snapshot_every_ops
            || self.persist_tx.is_none()
        {
            return;
        }
        match self.checkpoint().await {
            Ok(()) => log::debug!("checkpoint written at op {}", self.store.latest_op_seq()),
            Err(err) => log::warn!("automatic checkpoint failed: {err}"),
        }
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        let Some(tx) = self.persist_tx.as_ref() else {
            return Ok(());
        };
        let (resp, rx) = oneshot::channel();
        tx.send(PersistMsg::Shutdown { resp })
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)??;
        Ok(())
    }
}

fn spawn_persistence_worker(
    sink: Box<dyn OpSink>,
    mut rx: mpsc::Receiver<PersistMsg>,
    durable_tx: mpsc::UnboundedSender<SightingEvent>,
    config: RuntimeConfig,
) {
    let sink = Arc::new(Mutex::new(sink));
    let latency = Duration::from_millis(config.batch_max_latency_ms);
    tokio::spawn(async move {
        let mut buf = Vec::<StoredOp>::new();
        let mut deadline = Instant::now() + latency;
        let mut last_durable: OpSeq = 0;
        let mut failed_retries: u32 = 0;

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    let Some(msg) = msg else {
                        let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                        break;
                    };

                    match msg {
                        PersistMsg::Op(stored) => {
                            let is_upsert = matches!(stored.op, Op::Upsert { .. });
                            buf.push(stored);

                            if buf.len() >= config.batch_max_ops || (config.flush_on_upsert && is_upsert) {
                                let _ = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                                deadline = Instant::now() + latency;
                            }
                        }
                        PersistMsg::Durable { stored, resp } => {
                            let queued = buf.len();
                            buf.push(stored);
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            if result.is_err() {
                                // The writer will not commit this op, so it must not be retried.
                                buf.truncate(queued);
                            }
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + latency;
                        }
                        PersistMsg::Flush { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            let _ = resp.send(result.map(|_| last_durable));
                            deadline = Instant::now() + latency;
                        }
                        PersistMsg::Checkpoint { snapshot, last_seq, compact, resp } => {
                            let result = match flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await {
                                Err(err) => Err(err),
                                Ok(()) => {
                                    let sink_ref = Arc::clone(&sink);
                                    tokio::task::spawn_blocking(move || {
                                        let mut sink = sink_ref.blocking_lock();
                                        sink.write_snapshot(&snapshot, last_seq)?;
                                        if compact {
                                            sink.compact_through(last_seq)?;
                                        }
                                        Result::<(), PersistenceError>::Ok(())
                                    })
                                    .await
                                    .unwrap_or_else(|e| Err(PersistenceError::Message(format!("join error: {e}"))))
                                }
                            };
                            let _ = resp.send(result);
                            deadline = Instant::now() + latency;
                        }
                        PersistMsg::Shutdown { resp } => {
                            let result = flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, true).await;
                            if !buf.is_empty() {
                                log::warn!("journal closed with {} unwritten ops", buf.len());
                            }
                            let _ = resp.send(result);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if !buf.is_empty() => {
                    match flush_buf(&sink, &mut buf, &mut last_durable, &durable_tx, false).await {
                        Ok(()) => failed_retries = 0,
                        Err(_) => failed_retries = failed_retries.saturating_add(1),
                    }
                    deadline = Instant::now() + retry_delay(latency, failed_retries);
                }
            }
        }
    });
}

/// Grows the timer interval while the sink keeps failing, capped at 64x.
fn retry_delay(latency: Duration, failed_retries: u32) -> Duration {
    latency.max(Duration::from_millis(1)) * 2u32.pow(failed_retries.min(6))
}

/// Appends the buffered batch. On failure the batch is put back so the next
/// flush retries it ahead of newer ops.
async fn flush_buf(
    sink: &Arc<Mutex<Box<dyn OpSink>>>,
    buf: &mut Vec<StoredOp>,
    last_durable: &mut OpSeq,
    progress_tx: &mpsc::UnboundedSender<SightingEvent>,
    call_flush: bool,
) -> Result<(), PersistenceError> {
    if buf.is_empty() {
        if call_flush {
            let sink_ref = Arc::clone(sink);
            tokio::task::spawn_blocking(move || sink_ref.blocking_lock().flush())
                .await
                .map_err(|e| PersistenceError::Message(format!("join error: {e}")))??;
        }
        return Ok(());
    }

    let ops = std::mem::take(buf);
    let sink_ref = Arc::clone(sink);
    let (ops, appended) = tokio::task::spawn_blocking(move || {
        let mut guard = sink_ref.blocking_lock();
        let appended = append_batch(&mut guard, &ops, call_flush);
        (ops, appended)
    })
    .await
    .map_err(|e| PersistenceError::Message(format!("join error: {e}")))?;

    match appended {
        Ok(seq) => {
            *last_durable = (*last_durable).max(seq);
            let _ = progress_tx.send(SightingEvent::DurableUpTo {
                op_seq: *last_durable,
            });
            Ok(())
        }
        Err(err) => {
            let from_seq = ops.first().map_or(0, |o| o.seq);
            let through_seq = ops.last().map_or(0, |o| o.seq);
            let _ = progress_tx.send(SightingEvent::JournalFailed {
                from_seq,
                through_seq,
                error: err.to_string(),
            });
            *buf = ops;
            Err(err)
        }
    }
}

fn append_batch(sink: &mut Box<dyn OpSink>, ops: &[StoredOp], call_flush: bool) -> Result<OpSeq, PersistenceError> {
    let seq = sink.append_ops(ops)?;
    if call_flush {
        sink.flush()?;
    }
    Ok(seq)
}
