//! Per-key cache entry with single-flight reads.
//!
//! A slot moves `Absent → Loading → Ready | Error`. Invalidation marks the
//! entry stale, drops the in-flight fetch and bumps the generation; a fetch
//! that completes under an older generation resolves its own awaiters but is
//! never written back.

use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::{counter, histogram};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, instrument, warn};

use crate::application::error::DataError;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::slot";
const METRIC_CACHE_HIT_TOTAL: &str = "agenda_cache_hit_total";
const METRIC_CACHE_MISS_TOTAL: &str = "agenda_cache_miss_total";
const METRIC_CACHE_JOIN_TOTAL: &str = "agenda_cache_inflight_join_total";
const METRIC_CACHE_FETCH_TOTAL: &str = "agenda_cache_fetch_total";
const METRIC_CACHE_FETCH_MS: &str = "agenda_cache_fetch_ms";

pub type FetchFuture<T> = BoxFuture<'static, Result<T, DataError>>;

/// Produces a fresh backend read for one cache key.
pub type Fetcher<T> = Arc<dyn Fn() -> FetchFuture<T> + Send + Sync>;

type SharedFetch<T> = Shared<BoxFuture<'static, Result<Arc<T>, DataError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryPhase {
    Absent,
    Loading,
    Ready,
    Error,
}

/// What a subscriber sees of a cache entry.
#[derive(Debug)]
pub struct QuerySnapshot<T> {
    pub key: CacheKey,
    pub phase: QueryPhase,
    /// Last successfully fetched collection, kept across refetches and errors.
    pub data: Option<Arc<T>>,
    pub error: Option<DataError>,
    pub is_stale: bool,
}

impl<T> Clone for QuerySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            phase: self.phase,
            data: self.data.clone(),
            error: self.error.clone(),
            is_stale: self.is_stale,
        }
    }
}

impl<T> QuerySnapshot<T> {
    fn absent(key: CacheKey) -> Self {
        Self {
            key,
            phase: QueryPhase::Absent,
            data: None,
            error: None,
            is_stale: false,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == QueryPhase::Loading
    }
}

struct SlotState<T> {
    phase: QueryPhase,
    data: Option<Arc<T>>,
    error: Option<DataError>,
    stale: bool,
    fetched_at: Option<Instant>,
    generation: u64,
    in_flight: Option<SharedFetch<T>>,
}

impl<T> SlotState<T> {
    fn new() -> Self {
        Self {
            phase: QueryPhase::Absent,
            data: None,
            error: None,
            stale: false,
            fetched_at: None,
            generation: 0,
            in_flight: None,
        }
    }
}

struct SlotInner<T> {
    key: CacheKey,
    fetcher: Fetcher<T>,
    config: CacheConfig,
    state: Mutex<SlotState<T>>,
    notify: watch::Sender<QuerySnapshot<T>>,
}

/// Cache entry for one key. Clones share the same entry.
pub struct QuerySlot<T> {
    inner: Arc<SlotInner<T>>,
}

impl<T> Clone for QuerySlot<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for QuerySlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySlot")
            .field("key", &self.inner.key)
            .finish_non_exhaustive()
    }
}

impl<T> QuerySlot<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(key: CacheKey, config: &CacheConfig, fetcher: Fetcher<T>) -> Self {
        let (notify, _) = watch::channel(QuerySnapshot::absent(key));
        Self {
            inner: Arc::new(SlotInner {
                key,
                fetcher,
                config: config.clone(),
                state: Mutex::new(SlotState::new()),
                notify,
            }),
        }
    }

    pub fn key(&self) -> CacheKey {
        self.inner.key
    }

    /// Return the cached collection, or fetch it.
    ///
    /// Callers arriving while a fetch is in flight await that same fetch.
    #[instrument(skip(self), fields(cache_key = %self.inner.key))]
    pub async fn get(&self) -> Result<Arc<T>, DataError> {
        let key = self.inner.key.as_str();
        let fetch = {
            let mut state = mutex_lock(&self.inner.state, SOURCE, "get");
            if let Some(data) = self.fresh_data(&state) {
                counter!(METRIC_CACHE_HIT_TOTAL, "key" => key).increment(1);
                return Ok(data);
            }

            match state.in_flight.clone() {
                Some(fetch) => {
                    counter!(METRIC_CACHE_JOIN_TOTAL, "key" => key).increment(1);
                    debug!("Joining in-flight fetch");
                    fetch
                }
                None => {
                    counter!(METRIC_CACHE_MISS_TOTAL, "key" => key).increment(1);
                    let fetch = self.start_fetch(&mut state);
                    self.publish(&state);
                    fetch
                }
            }
        };

        fetch.await
    }

    /// Mark the entry stale and drop any in-flight fetch.
    ///
    /// Broadcasts exactly one snapshot. With live subscribers and
    /// `refetch_on_invalidate`, a background refetch starts immediately.
    pub fn invalidate(&self) {
        let mut state = mutex_lock(&self.inner.state, SOURCE, "invalidate");
        state.generation += 1;
        state.stale = true;
        if state.in_flight.take().is_some() {
            state.phase = if state.data.is_some() {
                QueryPhase::Ready
            } else {
                QueryPhase::Absent
            };
        }

        let observed = self.inner.notify.receiver_count() > 0;
        if self.inner.config.refetch_on_invalidate && observed {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let fetch = self.start_fetch(&mut state);
                    runtime.spawn(async move {
                        let _ = fetch.await;
                    });
                }
                Err(_) => {
                    debug!(
                        cache_key = %self.inner.key,
                        "No async runtime; refetch deferred to next read"
                    );
                }
            }
        }

        self.publish(&state);
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        let state = mutex_lock(&self.inner.state, SOURCE, "snapshot");
        self.snapshot_of(&state)
    }

    pub fn subscribe(&self) -> watch::Receiver<QuerySnapshot<T>> {
        self.inner.notify.subscribe()
    }

    pub fn phase(&self) -> QueryPhase {
        mutex_lock(&self.inner.state, SOURCE, "phase").phase
    }

    pub fn is_stale(&self) -> bool {
        let state = mutex_lock(&self.inner.state, SOURCE, "is_stale");
        state.stale || self.expired(&state)
    }

    fn fresh_data(&self, state: &SlotState<T>) -> Option<Arc<T>> {
        if state.phase != QueryPhase::Ready || state.stale || self.expired(state) {
            return None;
        }
        state.data.clone()
    }

    fn expired(&self, state: &SlotState<T>) -> bool {
        match (self.inner.config.stale_after(), state.fetched_at) {
            (Some(max_age), Some(fetched_at)) => fetched_at.elapsed() >= max_age,
            _ => false,
        }
    }

    fn start_fetch(&self, state: &mut SlotState<T>) -> SharedFetch<T> {
        let generation = state.generation;
        let owner = Arc::downgrade(&self.inner);
        let fetch = (self.inner.fetcher)();
        let key = self.inner.key.as_str();

        let shared = async move {
            let started_at = Instant::now();
            counter!(METRIC_CACHE_FETCH_TOTAL, "key" => key).increment(1);
            let result = fetch.await.map(Arc::new);
            histogram!(METRIC_CACHE_FETCH_MS, "key" => key)
                .record(started_at.elapsed().as_secs_f64() * 1000.0);
            complete(&owner, generation, &result);
            result
        }
        .boxed()
        .shared();

        state.in_flight = Some(shared.clone());
        state.phase = QueryPhase::Loading;
        shared
    }

    fn publish(&self, state: &SlotState<T>) {
        self.inner.notify.send_replace(self.snapshot_of(state));
    }

    fn snapshot_of(&self, state: &SlotState<T>) -> QuerySnapshot<T> {
        QuerySnapshot {
            key: self.inner.key,
            phase: state.phase,
            data: state.data.clone(),
            error: state.error.clone(),
            is_stale: state.stale || self.expired(state),
        }
    }
}

/// Store a finished fetch, unless the slot is gone or the fetch was
/// superseded by an invalidation.
fn complete<T>(owner: &Weak<SlotInner<T>>, generation: u64, result: &Result<Arc<T>, DataError>)
where
    T: Send + Sync + 'static,
{
    let Some(inner) = owner.upgrade() else {
        return;
    };
    let slot = QuerySlot { inner };

    let mut state = mutex_lock(&slot.inner.state, SOURCE, "complete");
    if state.generation != generation {
        debug!(
            cache_key = %slot.inner.key,
            fetch_generation = generation,
            current_generation = state.generation,
            "Discarding superseded fetch result"
        );
        return;
    }

    state.in_flight = None;
    state.stale = false;
    match result {
        Ok(data) => {
            state.phase = QueryPhase::Ready;
            state.data = Some(Arc::clone(data));
            state.error = None;
            state.fetched_at = Some(Instant::now());
        }
        Err(error) => {
            warn!(
                cache_key = %slot.inner.key,
                error = %error,
                error_kind = error.kind(),
                "Cache fetch failed"
            );
            state.phase = QueryPhase::Error;
            state.error = Some(error.clone());
        }
    }
    slot.publish(&state);
}

/// Subscriber view of one cache key: the `{data, is_loading, error}` surface
/// offered to presentation code.
pub struct QueryHandle<T> {
    slot: QuerySlot<T>,
    receiver: watch::Receiver<QuerySnapshot<T>>,
}

impl<T> QueryHandle<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(slot: QuerySlot<T>) -> Self {
        let receiver = slot.subscribe();
        Self { slot, receiver }
    }

    /// Fetch through the cache, sharing any in-flight read.
    pub async fn load(&self) -> Result<Arc<T>, DataError> {
        self.slot.get().await
    }

    pub fn snapshot(&self) -> QuerySnapshot<T> {
        self.receiver.borrow().clone()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.receiver.borrow().data.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.receiver.borrow().is_loading()
    }

    pub fn error(&self) -> Option<DataError> {
        self.receiver.borrow().error.clone()
    }

    /// Wait for the next broadcast on this key and return it.
    pub async fn changed(&mut self) -> QuerySnapshot<T> {
        // The slot held by this handle keeps the sender alive.
        let _ = self.receiver.changed().await;
        self.receiver.borrow_and_update().clone()
    }
}
