//! Cache configuration.
//!
//! Bounds the query caches and the rendered-page cache. Loaded from the
//! `[cache]` table of `chirp.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_QUERY_ENTRY_LIMIT: usize = 1_000;
const DEFAULT_PAGE_LIMIT: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries held by one query cache.
    pub query_entry_limit: usize,
    /// Cache rendered profile pages between requests.
    pub enable_page_cache: bool,
    /// Maximum rendered pages kept.
    pub page_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            query_entry_limit: DEFAULT_QUERY_ENTRY_LIMIT,
            enable_page_cache: true,
            page_limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            query_entry_limit: settings.query_entry_limit.get(),
            enable_page_cache: settings.enable_page_cache,
            page_limit: settings.page_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Query entry limit, clamped to at least one.
    pub fn query_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.query_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }

    pub fn page_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.page_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
