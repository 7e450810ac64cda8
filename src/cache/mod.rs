//! Query caching and server-to-client data sync.
//!
//! - [`QueryCache`]: keyed results of remote reads with request coalescing,
//!   stale marking and active-key refetch.
//! - [`ServerPrefetch`] and [`Snapshot`]: fill a request-scoped cache while a
//!   page is generated and ship it inside the page.
//! - [`HydrationBridge`]: seed the client session cache from that snapshot.
//! - [`InvalidationCoordinator`]: turn a successful mutation into
//!   invalidations of the query cache and the rendered-page cache.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! query_entry_limit = 1000
//! enable_page_cache = true
//! page_limit = 200
//! ```

mod config;
mod entry;
mod events;
mod hydration;
mod inflight;
mod invalidation;
mod keys;
pub(crate) mod lock;
mod pages;
mod prefetch;
mod query_cache;
mod registry;
mod snapshot;
mod subscription;

pub use config::CacheConfig;
pub use entry::{CacheEntry, QueryState, QueryStatus};
pub use events::{MutationEvent, MutationKind};
pub use hydration::HydrationBridge;
pub use invalidation::{
    InvalidationCoordinator, InvalidationRule, InvalidationSummary, InvalidationTarget, POLICY,
    PolicyRow, predicates_for,
};
pub use keys::{KeyPredicate, QueryKey, canonical_json};
pub use pages::{CachedPage, PageCache, PageKey, PageSource, RenderedPage};
pub use prefetch::{PrefetchError, ServerPrefetch};
pub use query_cache::{HydrationReport, InvalidationReport, QueryCache};
pub use registry::PageRegistry;
pub use snapshot::{
    PAYLOAD_SCRIPT_ID, SNAPSHOT_VERSION, Snapshot, SnapshotEntry, SnapshotError,
    encode_script_json, extract_payload, payload_script,
};
pub use subscription::{Loader, QuerySubscription};
