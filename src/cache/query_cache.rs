//! Keyed store of remote-read results.
//!
//! One instance lives per server request and one per browser session. It
//! coalesces concurrent fetches of the same key, marks entries stale on
//! invalidation, refetches keys that still have subscribers, and converts to
//! and from a [`Snapshot`].

use std::future::Future;
use std::sync::RwLock;

use futures::FutureExt;
use futures::future::join_all;
use lru::LruCache;
use metrics::counter;
use serde_json::Value;
use tracing::{debug, trace};

use crate::application::error::RpcError;

use super::config::CacheConfig;
use super::entry::{CacheEntry, QueryStatus};
use super::inflight::InFlight;
use super::keys::{KeyPredicate, QueryKey};
use super::lock::{rw_read, rw_write};
use super::snapshot::{Snapshot, SnapshotEntry};
use super::subscription::{Loader, Observers, QuerySubscription};

const SOURCE: &str = "cache::query_cache";

pub(crate) const METRIC_QUERY_HIT: &str = "chirp_query_cache_hit_total";
pub(crate) const METRIC_QUERY_MISS: &str = "chirp_query_cache_miss_total";
pub(crate) const METRIC_QUERY_DEDUP: &str = "chirp_query_cache_dedup_total";
pub(crate) const METRIC_QUERY_EVICT: &str = "chirp_query_cache_evict_total";

/// Keys touched by one invalidation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Entries marked stale.
    pub marked: Vec<QueryKey>,
    /// Active keys refetched before the call returned.
    pub refetched: Vec<QueryKey>,
}

/// Outcome of merging a snapshot into a cache.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HydrationReport {
    pub inserted: Vec<QueryKey>,
    /// Keys already present locally, left untouched.
    pub skipped: Vec<QueryKey>,
}

type Outcome = Result<Value, RpcError>;

pub struct QueryCache {
    entries: RwLock<LruCache<QueryKey, CacheEntry>>,
    in_flight: InFlight<QueryKey, Outcome>,
    observers: Observers,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.query_entry_limit_non_zero())),
            in_flight: InFlight::new(),
            observers: Observers::default(),
        }
    }

    /// Current entry for `key`. Never triggers a fetch and does not touch
    /// recency.
    pub fn get(&self, key: &QueryKey) -> Option<CacheEntry> {
        rw_read(&self.entries, SOURCE, "get").peek(key).cloned()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    /// Every key currently held, in key order.
    pub fn keys(&self) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve `key`, running `loader` only when no fresh entry exists and no
    /// fetch for the key is already running.
    ///
    /// Concurrent callers for the same key share one remote call and all
    /// observe the same settled entry.
    pub async fn fetch<F>(&self, key: QueryKey, loader: F) -> CacheEntry
    where
        F: Future<Output = Outcome> + Send + 'static,
    {
        if let Some(entry) = self.fresh_entry(&key) {
            counter!(METRIC_QUERY_HIT).increment(1);
            trace!(key = %key, "Query cache hit");
            return entry;
        }

        let joined = self
            .in_flight
            .join_or_start(&key, move || loader.boxed(), || self.mark_pending(&key));
        if joined.started {
            counter!(METRIC_QUERY_MISS).increment(1);
            debug!(key = %key, "Query cache miss; fetching");
        } else {
            counter!(METRIC_QUERY_DEDUP).increment(1);
            trace!(key = %key, "Joined in-flight fetch");
        }

        let outcome = joined.task.await;
        let mut settled = None;
        let current = self.in_flight.complete(&key, joined.ticket, || {
            settled = Some(self.settle(&key, outcome.clone()));
        });
        if !current {
            // Detached by an invalidation: keep the result, still marked stale.
            self.in_flight.when_idle(&key, || {
                settled = self.settle_detached(&key, outcome.clone());
            });
        }

        match settled {
            Some(entry) => {
                self.observers.notify(&key, Some(entry.clone()));
                entry
            }
            None => self
                .get(&key)
                .filter(|entry| entry.status != QueryStatus::Pending)
                .unwrap_or_else(|| CacheEntry::settled(key, outcome, None)),
        }
    }

    /// Register interest in `key`. While the returned subscription lives,
    /// invalidations of the key trigger `loader` again.
    pub fn subscribe(&self, key: QueryKey, loader: Loader) -> QuerySubscription {
        let current = self.get(&key);
        let receiver = self.observers.subscribe(&key, loader, current);
        QuerySubscription::new(key, receiver)
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        self.observers.subscriber_count(key)
    }

    /// Mark every matching entry stale, notify observers, then refetch the
    /// matching keys that have live subscribers.
    ///
    /// Inactive entries stay stale until the next read.
    pub async fn invalidate(&self, predicate: &KeyPredicate) -> InvalidationReport {
        // Fetches started before the mutation must not settle over the stale mark.
        let detached = self.in_flight.detach_where(|key| predicate.matches(key));
        let marked: Vec<(QueryKey, CacheEntry)> = {
            let mut entries = rw_write(&self.entries, SOURCE, "invalidate");
            entries
                .iter_mut()
                .filter(|(key, _)| predicate.matches(key))
                .map(|(key, entry)| {
                    entry.is_stale = true;
                    (key.clone(), entry.clone())
                })
                .collect()
        };

        for (key, entry) in &marked {
            self.observers.notify(key, Some(entry.clone()));
        }

        let marked: Vec<QueryKey> = marked.into_iter().map(|(key, _)| key).collect();
        let active = self.observers.active_loaders(&marked);
        debug!(
            predicate = ?predicate,
            marked = marked.len(),
            detached,
            active = active.len(),
            "Invalidated query cache entries"
        );

        let refetched = join_all(active.into_iter().map(|(key, loader)| async move {
            self.fetch(key.clone(), loader()).await;
            key
        }))
        .await;

        InvalidationReport { marked, refetched }
    }

    /// Successful entries not marked stale, ordered by key.
    pub fn snapshot(&self) -> Snapshot {
        let entries = rw_read(&self.entries, SOURCE, "snapshot");
        let mut out: Vec<SnapshotEntry> = entries
            .iter()
            .filter(|(_, entry)| entry.status == QueryStatus::Success && !entry.is_stale)
            .filter_map(|(key, entry)| {
                entry.data.as_ref().map(|data| SnapshotEntry {
                    key: key.clone(),
                    data: data.clone(),
                    fetched_at: entry.fetched_at,
                })
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Snapshot::new(out)
    }

    /// Merge a snapshot. Keys already present locally win.
    pub fn hydrate(&self, snapshot: &Snapshot) -> HydrationReport {
        let mut report = HydrationReport::default();
        let mut inserted = Vec::new();
        {
            let mut entries = rw_write(&self.entries, SOURCE, "hydrate");
            for item in &snapshot.entries {
                if entries.contains(&item.key) {
                    report.skipped.push(item.key.clone());
                    continue;
                }
                let entry = CacheEntry::success(item.key.clone(), item.data.clone(), item.fetched_at);
                if let Some((evicted, _)) = entries.push(item.key.clone(), entry.clone()) {
                    if evicted != item.key {
                        counter!(METRIC_QUERY_EVICT).increment(1);
                    }
                }
                report.inserted.push(item.key.clone());
                inserted.push(entry);
            }
        }

        for entry in inserted {
            self.observers.notify(&entry.key.clone(), Some(entry));
        }
        debug!(
            inserted = report.inserted.len(),
            skipped = report.skipped.len(),
            "Hydrated query cache"
        );
        report
    }

    fn fresh_entry(&self, key: &QueryKey) -> Option<CacheEntry> {
        let mut entries = rw_write(&self.entries, SOURCE, "fresh_entry");
        entries.get(key).filter(|entry| entry.is_fresh()).cloned()
    }

    fn mark_pending(&self, key: &QueryKey) {
        let pending = {
            let mut entries = rw_write(&self.entries, SOURCE, "mark_pending");
            let pending = CacheEntry::pending(key.clone(), entries.peek(key));
            self.store(&mut entries, pending.clone());
            pending
        };
        self.observers.notify(key, Some(pending));
    }

    fn settle(&self, key: &QueryKey, outcome: Outcome) -> CacheEntry {
        let mut entries = rw_write(&self.entries, SOURCE, "settle");
        let entry = CacheEntry::settled(key.clone(), outcome, entries.peek(key));
        self.store(&mut entries, entry.clone());
        entry
    }

    /// Store a detached fetch's outcome only over the pending entry it left.
    fn settle_detached(&self, key: &QueryKey, outcome: Outcome) -> Option<CacheEntry> {
        let mut entries = rw_write(&self.entries, SOURCE, "settle_detached");
        let previous = entries
            .peek(key)
            .filter(|entry| entry.status == QueryStatus::Pending)
            .cloned()?;
        let mut entry = CacheEntry::settled(key.clone(), outcome, Some(&previous));
        entry.is_stale = true;
        self.store(&mut entries, entry.clone());
        debug!(key = %key, "Settled detached fetch as stale");
        Some(entry)
    }

    fn store(&self, entries: &mut LruCache<QueryKey, CacheEntry>, entry: CacheEntry) {
        let key = entry.key.clone();
        if let Some((evicted, _)) = entries.push(key.clone(), entry) {
            if evicted != key {
                counter!(METRIC_QUERY_EVICT).increment(1);
                trace!(key = %evicted, "Evicted query cache entry");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn key(name: &str) -> QueryKey {
        QueryKey::new(&["posts", name], &Value::Null)
    }

    fn counting_loader(calls: Arc<AtomicUsize>, value: Value) -> Loader {
        Arc::new(move || {
            let calls = calls.clone();
            let value = value.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        })
    }

    #[tokio::test]
    async fn fetch_caches_success() {
        let cache = QueryCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), json!([1, 2]));

        let first = cache.fetch(key("getAll"), loader()).await;
        let second = cache.fetch(key("getAll"), loader()).await;

        assert_eq!(first.status, QueryStatus::Success);
        assert_eq!(second.data, Some(json!([1, 2])));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_is_cached_without_retry() {
        let cache = QueryCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let calls = calls.clone();
            let entry = cache
                .fetch(key("getAll"), async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(RpcError::internal("boom"))
                })
                .await;
            assert_eq!(entry.status, QueryStatus::Error);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn get_never_fetches() {
        let cache = QueryCache::new(&CacheConfig::default());
        assert!(cache.get(&key("getAll")).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidate_marks_inactive_entries_stale_without_refetch() {
        let cache = QueryCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), json!([]));
        cache.fetch(key("getAll"), loader()).await;

        let report = cache.invalidate(&KeyPredicate::All).await;
        assert_eq!(report.marked, vec![key("getAll")]);
        assert!(report.refetched.is_empty());
        assert!(cache.get(&key("getAll")).expect("entry").is_stale);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.fetch(key("getAll"), loader()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.get(&key("getAll")).expect("entry").is_stale);
    }

    #[tokio::test]
    async fn invalidate_refetches_active_keys() {
        let cache = QueryCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), json!(["fresh"]));
        cache.fetch(key("getAll"), loader()).await;

        let mut subscription = cache.subscribe(key("getAll"), loader.clone());
        let report = cache
            .invalidate(&KeyPredicate::Exact(key("getAll")))
            .await;

        assert_eq!(report.refetched, vec![key("getAll")]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let entry = subscription
            .wait_for(|entry| entry.is_fresh())
            .await
            .expect("entry");
        assert_eq!(entry.data, Some(json!(["fresh"])));
    }

    #[tokio::test]
    async fn dropped_subscription_is_inactive() {
        let cache = QueryCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = counting_loader(calls.clone(), json!([]));
        cache.fetch(key("getAll"), loader()).await;

        let subscription = cache.subscribe(key("getAll"), loader.clone());
        assert_eq!(cache.subscriber_count(&key("getAll")), 1);
        drop(subscription);
        assert_eq!(cache.subscriber_count(&key("getAll")), 0);

        let report = cache.invalidate(&KeyPredicate::All).await;
        assert!(report.refetched.is_empty());
    }

    #[tokio::test]
    async fn hydrate_keeps_local_entries() {
        let server = QueryCache::new(&CacheConfig::default());
        server
            .fetch(key("getAll"), async { Ok(json!(["server"])) })
            .await;
        server
            .fetch(key("other"), async { Ok(json!(["other"])) })
            .await;

        let client = QueryCache::new(&CacheConfig::default());
        client
            .fetch(key("getAll"), async { Ok(json!(["local"])) })
            .await;

        let report = client.hydrate(&server.snapshot());
        assert_eq!(report.inserted, vec![key("other")]);
        assert_eq!(report.skipped, vec![key("getAll")]);
        assert_eq!(
            client.get(&key("getAll")).and_then(|entry| entry.data),
            Some(json!(["local"]))
        );
    }

    #[tokio::test]
    async fn snapshot_skips_failures() {
        let cache = QueryCache::new(&CacheConfig::default());
        cache.fetch(key("b"), async { Ok(json!(1)) }).await;
        cache.fetch(key("a"), async { Ok(json!(2)) }).await;
        cache
            .fetch(key("c"), async { Err(RpcError::internal("down")) })
            .await;

        let snapshot = cache.snapshot();
        let keys: Vec<_> = snapshot.entries.iter().map(|e| e.key.clone()).collect();
        assert_eq!(keys, vec![key("a"), key("b")]);
    }

    #[tokio::test]
    async fn capacity_evicts_least_recent() {
        let cache = QueryCache::new(&CacheConfig {
            query_entry_limit: 1,
            ..Default::default()
        });
        cache.fetch(key("a"), async { Ok(json!(1)) }).await;
        cache.fetch(key("b"), async { Ok(json!(2)) }).await;
        assert!(cache.get(&key("a")).is_none());
        assert_eq!(cache.len(), 1);
    }
}
