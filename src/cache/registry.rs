//! Page dependency registry.
//!
//! Records which query keys each cached page was rendered from, in both
//! directions, so an invalidation predicate over query keys can find the
//! pages to evict.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use super::keys::{KeyPredicate, QueryKey};
use super::lock::{rw_read, rw_write};
use super::pages::PageKey;

const SOURCE: &str = "cache::registry";

#[derive(Default)]
struct Maps {
    query_to_pages: HashMap<QueryKey, HashSet<PageKey>>,
    page_to_queries: HashMap<PageKey, HashSet<QueryKey>>,
}

#[derive(Default)]
pub struct PageRegistry {
    maps: RwLock<Maps>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `page` was rendered from `queries`, replacing any earlier
    /// record for the page.
    pub fn register(&self, page: PageKey, queries: impl IntoIterator<Item = QueryKey>) {
        let mut maps = rw_write(&self.maps, SOURCE, "register");
        Self::remove_page(&mut maps, &page);

        let queries: HashSet<QueryKey> = queries.into_iter().collect();
        for query in &queries {
            maps.query_to_pages
                .entry(query.clone())
                .or_default()
                .insert(page.clone());
        }
        maps.page_to_queries.insert(page, queries);
    }

    /// Pages rendered from any query key matching `predicate`.
    pub fn pages_matching(&self, predicate: &KeyPredicate) -> HashSet<PageKey> {
        let maps = rw_read(&self.maps, SOURCE, "pages_matching");
        maps.query_to_pages
            .iter()
            .filter(|(query, _)| predicate.matches(query))
            .flat_map(|(_, pages)| pages.iter().cloned())
            .collect()
    }

    pub fn unregister(&self, page: &PageKey) {
        let mut maps = rw_write(&self.maps, SOURCE, "unregister");
        Self::remove_page(&mut maps, page);
    }

    pub fn page_count(&self) -> usize {
        rw_read(&self.maps, SOURCE, "page_count").page_to_queries.len()
    }

    pub fn query_count(&self) -> usize {
        rw_read(&self.maps, SOURCE, "query_count").query_to_pages.len()
    }

    fn remove_page(maps: &mut Maps, page: &PageKey) {
        let Some(queries) = maps.page_to_queries.remove(page) else {
            return;
        };
        for query in queries {
            if let Some(pages) = maps.query_to_pages.get_mut(&query) {
                pages.remove(page);
                if pages.is_empty() {
                    maps.query_to_pages.remove(&query);
                }
            }
        }
    }
}
