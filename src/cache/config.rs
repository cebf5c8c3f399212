//! Query cache configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_INVALIDATION_LOG_LIMIT: usize = 256;

/// Query cache behavior, resolved from the `[cache]` settings section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Spawn a background refetch when an observed key is invalidated.
    pub refetch_on_invalidate: bool,
    /// Age after which a ready entry counts as stale without an invalidation.
    pub stale_after_ms: Option<u64>,
    /// Maximum invalidation events retained for inspection.
    pub invalidation_log_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refetch_on_invalidate: true,
            stale_after_ms: None,
            invalidation_log_limit: DEFAULT_INVALIDATION_LOG_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            refetch_on_invalidate: settings.refetch_on_invalidate,
            stale_after_ms: settings.stale_after.map(|age| age.as_millis() as u64),
            invalidation_log_limit: settings.invalidation_log_limit.get(),
        }
    }
}

impl CacheConfig {
    pub fn stale_after(&self) -> Option<Duration> {
        self.stale_after_ms.map(Duration::from_millis)
    }

    /// Returns the log limit as NonZeroUsize, clamping to 1 if zero.
    pub fn invalidation_log_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.invalidation_log_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
