//! Push delivery of the ordered sighting view.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

use hashbrown::HashMap;
use tokio::{
    runtime::Handle,
    sync::{Notify, watch},
};

use crate::{
    sighting::Sighting,
    types::{OpSeq, SubscriptionId},
};

/// Newest-first sightings as of one op sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedView {
    /// Op sequence of the last mutation reflected in this view.
    pub version: OpSeq,
    /// Records ordered by datetime descending.
    pub sightings: Arc<Vec<Sighting>>,
}

impl FeedView {
    /// Wraps an already ordered list.
    pub fn new(version: OpSeq, sightings: Vec<Sighting>) -> Self {
        Self {
            version,
            sightings: Arc::new(sightings),
        }
    }

    /// Number of sightings in the view.
    pub fn len(&self) -> usize {
        self.sightings.len()
    }

    /// True when the view holds no sightings.
    pub fn is_empty(&self) -> bool {
        self.sightings.is_empty()
    }

    /// Ids in view order.
    pub fn ids(&self) -> Vec<crate::types::SightingId> {
        self.sightings.iter().map(|s| s.id).collect()
    }
}

#[derive(Debug, Default)]
struct Slot {
    cancelled: AtomicBool,
    wake: Notify,
}

impl Slot {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle to a callback subscription created by [`Feed::subscribe`].
///
/// Dropping the handle does not cancel the subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    slot: Arc<Slot>,
}

impl SubscriptionHandle {
    /// Registry id of this subscription.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Stops deliveries. A callback already running may finish; none starts
    /// after this returns.
    pub fn cancel(&self) {
        self.slot.cancel();
    }

    /// True once cancelled through the handle, the feed, or shutdown.
    pub fn is_cancelled(&self) -> bool {
        self.slot.is_cancelled()
    }
}

/// Receiver side for async consumers that prefer polling for changes.
#[derive(Debug, Clone)]
pub struct SightingWatch {
    rx: watch::Receiver<FeedView>,
}

impl SightingWatch {
    /// Latest published view.
    pub fn current(&self) -> FeedView {
        self.rx.borrow().clone()
    }

    /// Waits for a view newer than the last one returned.
    ///
    /// Returns `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<FeedView> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// Latest-view publisher plus the registry of callback subscribers.
#[derive(Debug)]
pub struct Feed {
    view_tx: watch::Sender<FeedView>,
    subscribers: Mutex<HashMap<SubscriptionId, Arc<Slot>>>,
    next_id: AtomicU64,
    runtime: Handle,
}

impl Feed {
    /// Creates a feed whose first view is `initial`. Subscriber tasks are
    /// spawned on `runtime`.
    pub fn new(initial: FeedView, runtime: Handle) -> Self {
        let (view_tx, _) = watch::channel(initial);
        Self {
            view_tx,
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            runtime,
        }
    }

    /// Latest published view. Never waits on the writer.
    pub fn current(&self) -> FeedView {
        self.view_tx.borrow().clone()
    }

    /// Replaces the latest view. Never blocks on subscribers.
    pub fn publish(&self, view: FeedView) {
        self.view_tx.send_replace(view);
    }

    /// Returns a receiver positioned at the current view.
    pub fn watch(&self) -> SightingWatch {
        SightingWatch {
            rx: self.view_tx.subscribe(),
        }
    }

    /// Calls `callback` with the current view, then with every newer view
    /// until cancelled. Bursts of changes may coalesce into one delivery.
    ///
    /// Callbacks run on the blocking pool, one delivery at a time per
    /// subscription, so a slow callback delays only its own deliveries.
    /// Callable from any thread.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: FnMut(FeedView) + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(Slot::default());
        self.registry().insert(id, Arc::clone(&slot));

        let mut rx = self.view_tx.subscribe();
        let task_slot = Arc::clone(&slot);
        self.runtime.spawn(async move {
            let mut callback = callback;
            loop {
                // Borrow before the flag check so a view published after
                // cancellation is never handed out.
                let view = rx.borrow_and_update().clone();
                if task_slot.is_cancelled() {
                    break;
                }
                let delivery = tokio::task::spawn_blocking(move || {
                    let mut callback = callback;
                    callback(view);
                    callback
                });
                callback = match delivery.await {
                    Ok(callback) => callback,
                    Err(err) => {
                        log::warn!("subscription {id} callback failed: {err}");
                        break;
                    }
                };

                tokio::select! {
                    biased;
                    _ = task_slot.wake.notified() => {}
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            log::debug!("subscription {id} stopped");
        });

        SubscriptionHandle { id, slot }
    }

    /// Cancels and forgets subscription `id`. Returns false if unknown.
    pub fn cancel(&self, id: SubscriptionId) -> bool {
        match self.registry().remove(&id) {
            Some(slot) => {
                slot.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of subscriptions not yet cancelled.
    pub fn active_subscribers(&self) -> usize {
        let mut registry = self.registry();
        registry.retain(|_, slot| !slot.is_cancelled());
        registry.len()
    }

    /// Cancels every subscription.
    pub fn close(&self) {
        for (_, slot) in self.registry().drain() {
            slot.cancel();
        }
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriptionId, Arc<Slot>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
