//! Invalidation event log.
//!
//! Every invalidation signal the cache broadcasts is recorded here with a
//! unique id and a monotonic epoch, so callers can audit which keys were
//! invalidated and how often.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::keys::CacheKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";
const METRIC_CACHE_INVALIDATE_TOTAL: &str = "agenda_cache_invalidate_total";

/// Monotonic epoch for ordering invalidations within this process.
pub type Epoch = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationEvent {
    /// Unique identifier (UUIDv4).
    pub id: Uuid,
    pub epoch: Epoch,
    pub key: CacheKey,
    pub timestamp: OffsetDateTime,
}

impl InvalidationEvent {
    pub fn new(key: CacheKey, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            key,
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Bounded FIFO of recent invalidation events. The oldest entries are
/// dropped once the limit is reached; epochs keep counting.
pub struct InvalidationLog {
    events: Mutex<VecDeque<InvalidationEvent>>,
    limit: NonZeroUsize,
    epoch_counter: AtomicU64,
}

impl InvalidationLog {
    pub fn new(limit: NonZeroUsize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(limit.get())),
            limit,
            epoch_counter: AtomicU64::new(0),
        }
    }

    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Record an invalidation of `key` and return the stored event.
    pub fn record(&self, key: CacheKey) -> InvalidationEvent {
        let event = InvalidationEvent::new(key, self.next_epoch());

        info!(
            event_id = %event.id,
            event_epoch = event.epoch,
            cache_key = %key,
            "Cache key invalidated"
        );
        counter!(METRIC_CACHE_INVALIDATE_TOTAL, "key" => key.as_str()).increment(1);

        let mut events = mutex_lock(&self.events, SOURCE, "record");
        if events.len() == self.limit.get() {
            events.pop_front();
        }
        events.push_back(event.clone());
        event
    }

    /// Snapshot of retained events in FIFO order.
    pub fn events(&self) -> Vec<InvalidationEvent> {
        mutex_lock(&self.events, SOURCE, "events")
            .iter()
            .cloned()
            .collect()
    }

    /// Number of retained events for `key`.
    pub fn count_for(&self, key: CacheKey) -> usize {
        mutex_lock(&self.events, SOURCE, "count_for")
            .iter()
            .filter(|event| event.key == key)
            .count()
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.events, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        mutex_lock(&self.events, SOURCE, "clear").clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn log_with_limit(limit: usize) -> InvalidationLog {
        InvalidationLog::new(NonZeroUsize::new(limit).expect("non-zero limit"))
    }

    #[test]
    fn epoch_monotonicity() {
        let log = log_with_limit(8);
        let first = log.record(CacheKey::Clients);
        let second = log.record(CacheKey::Appointments);
        assert!(first.epoch < second.epoch);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn counts_are_per_key() {
        let log = log_with_limit(8);
        log.record(CacheKey::Clients);
        log.record(CacheKey::Appointments);
        log.record(CacheKey::Appointments);

        assert_eq!(log.count_for(CacheKey::Clients), 1);
        assert_eq!(log.count_for(CacheKey::Appointments), 2);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn oldest_events_are_dropped_at_the_limit() {
        let log = log_with_limit(2);
        log.record(CacheKey::Clients);
        log.record(CacheKey::Appointments);
        log.record(CacheKey::Appointments);

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].key, CacheKey::Appointments);
        assert_eq!(events[1].epoch, 2);
    }

    #[test]
    fn clear_empties_the_log() {
        let log = log_with_limit(4);
        log.record(CacheKey::Clients);
        assert!(!log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }
}
