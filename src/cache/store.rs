//! Keyed query cache owning the fetched collections.

use crate::domain::entities::{Appointment, Client};

use super::config::CacheConfig;
use super::events::{InvalidationEvent, InvalidationLog};
use super::keys::CacheKey;
use super::slot::{Fetcher, QueryPhase, QuerySlot};

/// Explicit keyed store: starts empty, populated on first read, invalidated
/// on write. Nothing outside the cache writes its entries.
pub struct QueryCache {
    clients: QuerySlot<Vec<Client>>,
    appointments: QuerySlot<Vec<Appointment>>,
    log: InvalidationLog,
}

impl QueryCache {
    pub fn new(
        config: &CacheConfig,
        clients: Fetcher<Vec<Client>>,
        appointments: Fetcher<Vec<Appointment>>,
    ) -> Self {
        Self {
            clients: QuerySlot::new(CacheKey::Clients, config, clients),
            appointments: QuerySlot::new(CacheKey::Appointments, config, appointments),
            log: InvalidationLog::new(config.invalidation_log_limit_non_zero()),
        }
    }

    pub fn clients(&self) -> &QuerySlot<Vec<Client>> {
        &self.clients
    }

    pub fn appointments(&self) -> &QuerySlot<Vec<Appointment>> {
        &self.appointments
    }

    /// Invalidate exactly one key and record the signal.
    pub fn invalidate(&self, key: CacheKey) -> InvalidationEvent {
        match key {
            CacheKey::Clients => self.clients.invalidate(),
            CacheKey::Appointments => self.appointments.invalidate(),
        }
        self.log.record(key)
    }

    pub fn phase(&self, key: CacheKey) -> QueryPhase {
        match key {
            CacheKey::Clients => self.clients.phase(),
            CacheKey::Appointments => self.appointments.phase(),
        }
    }

    pub fn is_stale(&self, key: CacheKey) -> bool {
        match key {
            CacheKey::Clients => self.clients.is_stale(),
            CacheKey::Appointments => self.appointments.is_stale(),
        }
    }

    pub fn invalidations(&self) -> &InvalidationLog {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::FutureExt;

    use crate::application::error::DataError;

    use super::*;

    fn counting<T: Default + Send + 'static>(calls: Arc<AtomicUsize>) -> Fetcher<T> {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, DataError>(T::default()) }.boxed()
        })
    }

    fn cache() -> (QueryCache, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let client_calls = Arc::new(AtomicUsize::new(0));
        let appointment_calls = Arc::new(AtomicUsize::new(0));
        let config = CacheConfig {
            refetch_on_invalidate: false,
            ..Default::default()
        };
        let cache = QueryCache::new(
            &config,
            counting(Arc::clone(&client_calls)),
            counting(Arc::clone(&appointment_calls)),
        );
        (cache, client_calls, appointment_calls)
    }

    #[test]
    fn starts_empty() {
        let (cache, _, _) = cache();
        for key in CacheKey::ALL {
            assert_eq!(cache.phase(key), QueryPhase::Absent);
            assert!(!cache.is_stale(key));
        }
        assert!(cache.invalidations().is_empty());
    }

    #[tokio::test]
    async fn invalidating_one_key_leaves_the_other_fresh() {
        let (cache, client_calls, appointment_calls) = cache();
        cache.clients().get().await.expect("clients");
        cache.appointments().get().await.expect("appointments");

        let event = cache.invalidate(CacheKey::Appointments);
        assert_eq!(event.key, CacheKey::Appointments);
        assert!(cache.is_stale(CacheKey::Appointments));
        assert!(!cache.is_stale(CacheKey::Clients));

        cache.clients().get().await.expect("clients again");
        cache.appointments().get().await.expect("appointments again");
        assert_eq!(client_calls.load(Ordering::SeqCst), 1);
        assert_eq!(appointment_calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.invalidations().count_for(CacheKey::Clients), 0);
        assert_eq!(cache.invalidations().count_for(CacheKey::Appointments), 1);
    }
}
