//! Agenda query cache.
//!
//! One entry per logical resource (`clients`, `appointments`). Reads go
//! through the entry and share in-flight fetches; writes invalidate the
//! affected entry and the next read refetches. Entries are never patched.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! refetch_on_invalidate = true
//! stale_after_ms = 30000
//! invalidation_log_limit = 256
//! ```

mod config;
mod events;
mod keys;
pub(crate) mod lock;
mod slot;
mod store;

pub use config::CacheConfig;
pub use events::{Epoch, InvalidationEvent, InvalidationLog};
pub use keys::CacheKey;
pub use slot::{FetchFuture, Fetcher, QueryHandle, QueryPhase, QuerySlot, QuerySnapshot};
pub use store::QueryCache;
