//! Long-polling engine.
//!
//! A fetch that finds no data is parked here instead of occupying a worker.
//! Each parked fetch ends in exactly one of:
//!
//! - **success**: a data notification for its topic led to a non-empty pull,
//! - **expire**: its deadline elapsed,
//! - **exception**: a pull failed,
//! - **cancelled**: its connection closed (no callback runs).
//!
//! The winner of the state compare-and-swap on the fetch removes it from the
//! watch index and aborts its timer before running the callback, so late
//! notifications and timers find nothing to do.
//!
//! Registration immediately re-checks storage once. Data that landed after
//! the handler's empty pull but before the watch existed would otherwise wait
//! for the next append or the deadline.

mod callback;
mod pending;

pub use callback::LongPollingCallback;
pub use pending::PendingState;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::error::{Error, ResponseCode, Result};
use crate::metrics;
use crate::storage::{DataListener, MessageStore, PullRequest, PullResult};

use pending::PendingFetch;

/// Identifier of a parked fetch.
pub type PendingFetchId = u64;

enum Outcome {
    Success(PullResult),
    Expire,
    Exception(Error),
}

impl Outcome {
    fn state(&self) -> PendingState {
        match self {
            Outcome::Success(_) => PendingState::Succeeded,
            Outcome::Expire => PendingState::Expired,
            Outcome::Exception(_) => PendingState::Failed,
        }
    }
}

struct Inner {
    store: Arc<dyn MessageStore>,
    runtime: Handle,
    max_pending: usize,
    pending_count: AtomicUsize,
    next_id: AtomicU64,
    fetches: DashMap<PendingFetchId, Arc<PendingFetch>>,
    /// topic -> parked fetch ids
    watches: DashMap<String, HashSet<PendingFetchId>>,
    /// transport id -> parked fetch ids
    by_transport: DashMap<String, HashSet<PendingFetchId>>,
}

/// Parks fetches and resolves each of them exactly once.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct LongPollingManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for LongPollingManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LongPollingManager")
            .field("pending", &self.pending_count())
            .field("max_pending", &self.inner.max_pending)
            .finish()
    }
}

struct WatchListener(Weak<Inner>);

impl DataListener for WatchListener {
    fn on_data(&self, topic: &str, partition: i32) {
        if let Some(inner) = self.0.upgrade() {
            Inner::notify(&inner, topic, partition);
        }
    }
}

impl LongPollingManager {
    /// Create the engine and install it as `store`'s data listener.
    ///
    /// Timers and pull attempts are spawned onto `runtime`.
    pub fn new(store: Arc<dyn MessageStore>, max_pending: usize, runtime: Handle) -> Self {
        let inner = Arc::new(Inner {
            store: store.clone(),
            runtime,
            max_pending,
            pending_count: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            fetches: DashMap::new(),
            watches: DashMap::new(),
            by_transport: DashMap::new(),
        });
        store.set_listener(Arc::new(WatchListener(Arc::downgrade(&inner))));
        Self { inner }
    }

    /// Park a fetch until data arrives or `timeout` elapses.
    ///
    /// Fails with `CnServiceNotAvailable` when `max_pending` fetches are
    /// already parked; the callback is dropped unused in that case.
    pub fn register(
        &self,
        request: PullRequest,
        transport_id: &str,
        timeout: Duration,
        callback: Box<dyn LongPollingCallback>,
    ) -> Result<PendingFetchId> {
        let inner = &self.inner;
        let reserved = inner
            .pending_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| {
                (count < inner.max_pending).then_some(count + 1)
            });
        if reserved.is_err() {
            metrics::record_long_poll_rejection();
            warn!(
                transport = transport_id,
                topic = %request.topic,
                max_pending = inner.max_pending,
                "Long-poll capacity reached, answering immediately"
            );
            return Err(Error::broker(
                ResponseCode::CnServiceNotAvailable,
                "long-poll capacity reached",
            ));
        }

        let id = inner.next_id.fetch_add(1, Ordering::Relaxed);
        let deadline = tokio::time::Instant::now() + timeout;
        let topic = request.topic.clone();
        let fetch = Arc::new(PendingFetch::new(
            id,
            request,
            transport_id.to_string(),
            deadline,
            callback,
        ));

        inner.fetches.insert(id, fetch.clone());
        inner.watches.entry(topic.clone()).or_default().insert(id);
        inner
            .by_transport
            .entry(transport_id.to_string())
            .or_default()
            .insert(id);
        metrics::set_pending_fetches(inner.pending_count.load(Ordering::SeqCst));

        let timer = {
            let inner = self.inner.clone();
            let fetch = fetch.clone();
            let runtime = inner.runtime.clone();
            runtime.spawn(async move {
                tokio::time::sleep_until(fetch.deadline).await;
                fetch.forget_timer();
                inner.resolve(&fetch, Outcome::Expire);
            })
        };
        fetch.arm_timer(timer.abort_handle());

        debug!(
            fetch_id = id,
            transport = transport_id,
            topic = %topic,
            timeout_ms = timeout.as_millis() as u64,
            "Fetch parked"
        );

        Inner::schedule_fill(&self.inner, fetch);
        Ok(id)
    }

    /// Cancel every fetch parked by a transport. No callback runs.
    ///
    /// Returns the number of fetches cancelled.
    pub fn cancel_connection(&self, transport_id: &str) -> usize {
        let Some((_, ids)) = self.inner.by_transport.remove(transport_id) else {
            return 0;
        };
        let mut cancelled = 0;
        for id in ids {
            let Some(fetch) = self.inner.fetches.get(&id).map(|f| f.clone()) else {
                continue;
            };
            if fetch.transition(PendingState::Cancelled) {
                self.inner.detach(&fetch);
                drop(fetch.take_callback());
                metrics::record_long_poll_outcome(
                    PendingState::Cancelled.as_str(),
                    fetch.registered_at.elapsed().as_secs_f64(),
                );
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(transport = transport_id, cancelled, "Cancelled parked fetches");
        }
        cancelled
    }

    /// Expire every parked fetch now. Used on shutdown so clients get an
    /// empty answer instead of a dropped request.
    pub fn expire_all(&self) -> usize {
        let fetches: Vec<Arc<PendingFetch>> =
            self.inner.fetches.iter().map(|f| f.clone()).collect();
        fetches
            .into_iter()
            .filter(|fetch| self.inner.resolve(fetch, Outcome::Expire))
            .count()
    }

    /// Number of fetches currently parked.
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::SeqCst)
    }

    pub fn is_pending(&self, id: PendingFetchId) -> bool {
        self.inner
            .fetches
            .get(&id)
            .is_some_and(|fetch| fetch.is_pending())
    }

    /// Parked fetches belonging to a transport.
    pub fn pending_for_transport(&self, transport_id: &str) -> usize {
        self.inner
            .by_transport
            .get(transport_id)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }
}

impl Inner {
    fn notify(this: &Arc<Self>, topic: &str, partition: i32) {
        let ids: Vec<PendingFetchId> = match this.watches.get(topic) {
            Some(ids) => ids.iter().copied().collect(),
            None => return,
        };
        for id in ids {
            let Some(fetch) = this.fetches.get(&id).map(|f| f.clone()) else {
                continue;
            };
            if fetch.is_pending() && fetch.watches_partition(partition) {
                Self::schedule_fill(this, fetch);
            }
        }
    }

    /// Request a pull attempt for `fetch`.
    ///
    /// Attempts for one fetch never overlap: a notification arriving while a
    /// pull is in flight sets `recheck` and the running attempt pulls again.
    fn schedule_fill(this: &Arc<Self>, fetch: Arc<PendingFetch>) {
        fetch.recheck.store(true, Ordering::SeqCst);
        let inner = this.clone();
        this.runtime.spawn(async move {
            inner.fill(fetch).await;
        });
    }

    async fn fill(&self, fetch: Arc<PendingFetch>) {
        loop {
            let Ok(guard) = fetch.pulling.try_lock() else {
                return;
            };
            while fetch.recheck.swap(false, Ordering::SeqCst) {
                if !fetch.is_pending() {
                    return;
                }
                match self.store.pull(&fetch.request).await {
                    Ok(result) if result.is_empty() && result.code.is_success() => continue,
                    Ok(result) => {
                        self.resolve(&fetch, Outcome::Success(result));
                        return;
                    }
                    Err(error) => {
                        self.resolve(&fetch, Outcome::Exception(error));
                        return;
                    }
                }
            }
            drop(guard);
            // a notification may have raced with releasing the guard
            if !fetch.recheck.load(Ordering::SeqCst) || !fetch.is_pending() {
                return;
            }
        }
    }

    /// Resolve `fetch` with `outcome` if it is still pending.
    ///
    /// Returns `false` when another resolution already won.
    fn resolve(&self, fetch: &Arc<PendingFetch>, outcome: Outcome) -> bool {
        let state = outcome.state();
        if !fetch.transition(state) {
            return false;
        }
        self.detach(fetch);

        let waited = fetch.registered_at.elapsed();
        metrics::record_long_poll_outcome(state.as_str(), waited.as_secs_f64());

        let Some(callback) = fetch.take_callback() else {
            return true;
        };

        let result = match outcome {
            Outcome::Success(pulled) => {
                debug!(
                    fetch_id = fetch.id,
                    topic = %fetch.request.topic,
                    messages = pulled.buffers.len(),
                    waited_ms = waited.as_millis() as u64,
                    "Parked fetch served"
                );
                callback.on_success(pulled)
            }
            Outcome::Expire => {
                debug!(
                    fetch_id = fetch.id,
                    topic = %fetch.request.topic,
                    "Parked fetch expired"
                );
                callback.on_expire()
            }
            Outcome::Exception(error) => callback.on_exception(error),
        };

        if let Err(e) = result {
            warn!(
                fetch_id = fetch.id,
                transport = %fetch.transport_id,
                topic = %fetch.request.topic,
                error = %e,
                "Long-poll callback failed"
            );
        }
        true
    }

    /// Remove a fetch that just left `Pending` from every index.
    fn detach(&self, fetch: &Arc<PendingFetch>) {
        fetch.disarm_timer();

        if self.fetches.remove(&fetch.id).is_some() {
            self.pending_count.fetch_sub(1, Ordering::SeqCst);
        }

        let topic = &fetch.request.topic;
        if let Some(mut ids) = self.watches.get_mut(topic) {
            ids.remove(&fetch.id);
        }
        self.watches.remove_if(topic, |_, ids| ids.is_empty());

        if let Some(mut ids) = self.by_transport.get_mut(&fetch.transport_id) {
            ids.remove(&fetch.id);
        }
        self.by_transport
            .remove_if(&fetch.transport_id, |_, ids| ids.is_empty());

        metrics::set_pending_fetches(self.pending_count.load(Ordering::SeqCst));
    }
}
