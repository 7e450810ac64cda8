//! Client-side hydration bridge.
//!
//! Owns the one query cache of a client session. The cache is created on
//! first install, seeded from the page snapshot, and handed out to every
//! consumer afterwards. Later installs merge into the same cache without
//! overwriting anything already held.

use std::sync::Arc;

use once_cell::sync::{Lazy, OnceCell};
use tracing::{debug, info};

use super::config::CacheConfig;
use super::query_cache::{HydrationReport, QueryCache};
use super::snapshot::Snapshot;

static GLOBAL: Lazy<HydrationBridge> = Lazy::new(|| HydrationBridge::new(CacheConfig::default()));

pub struct HydrationBridge {
    config: CacheConfig,
    cache: OnceCell<Arc<QueryCache>>,
}

impl HydrationBridge {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            cache: OnceCell::new(),
        }
    }

    /// Process-wide bridge used by the client binary.
    pub fn global() -> &'static HydrationBridge {
        &GLOBAL
    }

    /// Publish the session cache, seeding it from `snapshot`.
    ///
    /// The returned cache already holds every snapshot entry that was not
    /// present before, so a consumer built from it reads hydrated data first.
    pub fn install(&self, snapshot: Option<&Snapshot>) -> (Arc<QueryCache>, HydrationReport) {
        let mut created = false;
        let cache = self
            .cache
            .get_or_init(|| {
                created = true;
                Arc::new(QueryCache::new(&self.config))
            })
            .clone();

        let report = match snapshot {
            Some(snapshot) => cache.hydrate(snapshot),
            None => HydrationReport::default(),
        };

        if created {
            info!(
                hydrated = report.inserted.len(),
                "Client query cache installed"
            );
        } else {
            debug!(
                hydrated = report.inserted.len(),
                skipped = report.skipped.len(),
                "Merged snapshot into existing client cache"
            );
        }
        (cache, report)
    }

    /// The published cache, if installed.
    pub fn cache(&self) -> Option<Arc<QueryCache>> {
        self.cache.get().cloned()
    }
}
