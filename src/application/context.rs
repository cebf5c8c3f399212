use std::sync::Arc;

use crate::application::notify::NotificationSink;
use crate::application::repos::RecordStore;
use crate::application::{appointments, clients};
use crate::cache::{CacheConfig, QueryCache};

/// Collaborators shared by every data-access service: the record store, the
/// query cache built on top of it, and the notification sink.
#[derive(Clone)]
pub struct DataContext {
    store: Arc<dyn RecordStore>,
    cache: Arc<QueryCache>,
    notifier: Arc<dyn NotificationSink>,
}

impl DataContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        config: &CacheConfig,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let cache = QueryCache::new(
            config,
            clients::fetcher(Arc::clone(&store)),
            appointments::fetcher(Arc::clone(&store)),
        );
        Self {
            store,
            cache: Arc::new(cache),
            notifier,
        }
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn notifier(&self) -> &dyn NotificationSink {
        self.notifier.as_ref()
    }
}
