//! Rendered-page cache.
//!
//! Profile pages are generated on the first request for their path, then
//! served from here until an invalidation touches one of the query keys they
//! were rendered from. Concurrent first requests for one path wait on a
//! single generation.

use std::fmt;
use std::future::Future;
use std::sync::RwLock;

use bytes::Bytes;
use futures::FutureExt;
use lru::LruCache;
use metrics::counter;
use time::OffsetDateTime;
use tracing::{debug, info};

use super::config::CacheConfig;
use super::inflight::InFlight;
use super::keys::{KeyPredicate, QueryKey};
use super::lock::{rw_read, rw_write};
use super::registry::PageRegistry;

const SOURCE: &str = "cache::pages";

pub(crate) const METRIC_PAGE_HIT: &str = "chirp_page_cache_hit_total";
pub(crate) const METRIC_PAGE_MISS: &str = "chirp_page_cache_miss_total";
pub(crate) const METRIC_PAGE_EVICT: &str = "chirp_page_cache_evict_total";

/// Route path of a cached page, e.g. `/@alice`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey(String);

impl PageKey {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone)]
pub struct CachedPage {
    pub status: u16,
    pub body: Bytes,
    pub generated_at: OffsetDateTime,
}

/// Output of one page generation.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page: CachedPage,
    /// Query keys the page was rendered from. `None` keeps the page out of
    /// the cache.
    pub deps: Option<Vec<QueryKey>>,
}

impl RenderedPage {
    pub fn cacheable(page: CachedPage, deps: Vec<QueryKey>) -> Self {
        Self {
            page,
            deps: Some(deps),
        }
    }

    pub fn uncached(page: CachedPage) -> Self {
        Self { page, deps: None }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSource {
    Cache,
    Generated,
    /// Waited on a generation started by another request.
    Joined,
}

pub struct PageCache {
    enabled: bool,
    pages: RwLock<LruCache<PageKey, CachedPage>>,
    registry: PageRegistry,
    in_flight: InFlight<PageKey, RenderedPage>,
}

impl PageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            enabled: config.enable_page_cache,
            pages: RwLock::new(LruCache::new(config.page_limit_non_zero())),
            registry: PageRegistry::new(),
            in_flight: InFlight::new(),
        }
    }

    pub fn get(&self, key: &PageKey) -> Option<CachedPage> {
        rw_write(&self.pages, SOURCE, "get").get(key).cloned()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.pages, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serve `key` from the cache, or block on `generate` and store its
    /// output when it is cacheable.
    pub async fn get_or_generate<F>(&self, key: PageKey, generate: F) -> (CachedPage, PageSource)
    where
        F: Future<Output = RenderedPage> + Send + 'static,
    {
        if !self.enabled {
            return (generate.await.page, PageSource::Generated);
        }

        if let Some(page) = self.get(&key) {
            counter!(METRIC_PAGE_HIT).increment(1);
            return (page, PageSource::Cache);
        }

        let joined = self
            .in_flight
            .join_or_start(&key, move || generate.boxed(), || {});
        if joined.started {
            counter!(METRIC_PAGE_MISS).increment(1);
            debug!(page = %key, "Generating page");
        }

        let rendered = joined.task.await;
        self.in_flight.complete(&key, joined.ticket, || {
            if let Some(deps) = &rendered.deps {
                self.store(&key, rendered.page.clone(), deps);
            }
        });

        let source = if joined.started {
            PageSource::Generated
        } else {
            PageSource::Joined
        };
        (rendered.page, source)
    }

    /// Evict every page rendered from a query key matching `predicate`.
    pub fn invalidate_matching(&self, predicate: &KeyPredicate) -> usize {
        // Running generations may have read pre-mutation data; none may be stored.
        self.in_flight.detach_where(|_| true);
        let affected = self.registry.pages_matching(predicate);
        if affected.is_empty() {
            return 0;
        }

        let mut pages = rw_write(&self.pages, SOURCE, "invalidate_matching");
        for page in &affected {
            pages.pop(page);
            self.registry.unregister(page);
        }
        info!(
            predicate = ?predicate,
            evicted = affected.len(),
            "Evicted cached pages"
        );
        affected.len()
    }

    fn store(&self, key: &PageKey, page: CachedPage, deps: &[QueryKey]) {
        let evicted = rw_write(&self.pages, SOURCE, "store")
            .push(key.clone(), page)
            .map(|(evicted, _)| evicted)
            .filter(|evicted| evicted != key);
        if let Some(evicted) = evicted {
            counter!(METRIC_PAGE_EVICT).increment(1);
            self.registry.unregister(&evicted);
        }
        self.registry.register(key.clone(), deps.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn by_user(id: &str) -> QueryKey {
        QueryKey::new(&["posts", "getPostsByUserId"], &json!({ "userId": id }))
    }

    fn page(body: &'static str) -> CachedPage {
        CachedPage {
            status: 200,
            body: Bytes::from_static(body.as_bytes()),
            generated_at: OffsetDateTime::now_utc(),
        }
    }

    fn generator(
        calls: Arc<AtomicUsize>,
        body: &'static str,
        deps: Option<Vec<QueryKey>>,
    ) -> impl Future<Output = RenderedPage> + Send + 'static {
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            RenderedPage {
                page: page(body),
                deps,
            }
        }
    }

    #[tokio::test]
    async fn generates_once_then_serves_cache() {
        let cache = PageCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = PageKey::new("/@alice");

        let (_, first) = cache
            .get_or_generate(key.clone(), generator(calls.clone(), "a", Some(vec![])))
            .await;
        let (served, second) = cache
            .get_or_generate(key.clone(), generator(calls.clone(), "b", Some(vec![])))
            .await;

        assert_eq!(first, PageSource::Generated);
        assert_eq!(second, PageSource::Cache);
        assert_eq!(served.body, Bytes::from_static(b"a"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_generation() {
        let cache = Arc::new(PageCache::new(&CacheConfig::default()));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = PageKey::new("/@alice");

        let (a, b) = tokio::join!(
            cache.get_or_generate(key.clone(), generator(calls.clone(), "a", Some(vec![]))),
            cache.get_or_generate(key.clone(), generator(calls.clone(), "b", Some(vec![]))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.0.body, b.0.body);
        assert_eq!(b.1, PageSource::Joined);
    }

    #[tokio::test]
    async fn uncacheable_pages_are_regenerated() {
        let cache = PageCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let key = PageKey::new("/@ghost");

        for _ in 0..2 {
            cache
                .get_or_generate(key.clone(), generator(calls.clone(), "404", None))
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn invalidation_evicts_dependent_pages() {
        let cache = PageCache::new(&CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        cache
            .get_or_generate(
                PageKey::new("/@alice"),
                generator(calls.clone(), "a", Some(vec![by_user("u1")])),
            )
            .await;
        cache
            .get_or_generate(
                PageKey::new("/@bob"),
                generator(calls.clone(), "b", Some(vec![by_user("u2")])),
            )
            .await;

        let evicted = cache.invalidate_matching(&KeyPredicate::Exact(by_user("u1")));
        assert_eq!(evicted, 1);
        assert!(cache.get(&PageKey::new("/@alice")).is_none());
        assert!(cache.get(&PageKey::new("/@bob")).is_some());
    }

    #[tokio::test]
    async fn disabled_cache_always_generates() {
        let cache = PageCache::new(&CacheConfig {
            enable_page_cache: false,
            ..Default::default()
        });
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            cache
                .get_or_generate(PageKey::new("/@a"), generator(calls.clone(), "a", Some(vec![])))
                .await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
