//! Observers of query-cache entries.
//!
//! Each observed key owns a `watch` channel and the loader that refetches it.
//! A key counts as active while at least one [`QuerySubscription`] for it is
//! alive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::application::error::RpcError;

use super::entry::{CacheEntry, QueryState};
use super::keys::QueryKey;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::subscription";

/// Refetches one key. Called again on every invalidation of an active key.
pub type Loader = Arc<dyn Fn() -> BoxFuture<'static, Result<Value, RpcError>> + Send + Sync>;

struct Observer {
    sender: watch::Sender<Option<CacheEntry>>,
    loader: Loader,
}

#[derive(Default)]
pub(crate) struct Observers {
    slots: Mutex<HashMap<QueryKey, Observer>>,
}

impl Observers {
    pub fn subscribe(
        &self,
        key: &QueryKey,
        loader: Loader,
        current: Option<CacheEntry>,
    ) -> watch::Receiver<Option<CacheEntry>> {
        let mut slots = mutex_lock(&self.slots, SOURCE, "subscribe");
        match slots.get_mut(key) {
            Some(observer) => {
                observer.loader = loader;
                observer.sender.subscribe()
            }
            None => {
                let (sender, receiver) = watch::channel(current);
                slots.insert(key.clone(), Observer { sender, loader });
                receiver
            }
        }
    }

    /// Push the new state of `key` to its subscribers. Slots without
    /// subscribers are dropped.
    pub fn notify(&self, key: &QueryKey, entry: Option<CacheEntry>) {
        let mut slots = mutex_lock(&self.slots, SOURCE, "notify");
        let Some(observer) = slots.get(key) else {
            return;
        };
        if observer.sender.receiver_count() == 0 {
            slots.remove(key);
            return;
        }
        observer.sender.send_replace(entry);
    }

    /// Loaders of the given keys that still have live subscribers.
    pub fn active_loaders(&self, keys: &[QueryKey]) -> Vec<(QueryKey, Loader)> {
        let slots = mutex_lock(&self.slots, SOURCE, "active_loaders");
        keys.iter()
            .filter_map(|key| {
                slots
                    .get(key)
                    .filter(|observer| observer.sender.receiver_count() > 0)
                    .map(|observer| (key.clone(), observer.loader.clone()))
            })
            .collect()
    }

    pub fn subscriber_count(&self, key: &QueryKey) -> usize {
        mutex_lock(&self.slots, SOURCE, "subscriber_count")
            .get(key)
            .map(|observer| observer.sender.receiver_count())
            .unwrap_or(0)
    }
}

/// A live view of one cache entry. Dropping it deactivates the key once no
/// other subscription remains.
pub struct QuerySubscription {
    key: QueryKey,
    receiver: watch::Receiver<Option<CacheEntry>>,
}

impl QuerySubscription {
    pub(crate) fn new(key: QueryKey, receiver: watch::Receiver<Option<CacheEntry>>) -> Self {
        Self { key, receiver }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Latest entry, without waiting.
    pub fn current(&self) -> Option<CacheEntry> {
        self.receiver.borrow().clone()
    }

    pub fn state<T: DeserializeOwned>(&self) -> QueryState<T> {
        self.receiver
            .borrow()
            .as_ref()
            .map(CacheEntry::state)
            .unwrap_or(QueryState::Loading)
    }

    /// Wait for the next change. Returns `None` once the cache is gone.
    pub async fn changed(&mut self) -> Option<CacheEntry> {
        self.receiver.changed().await.ok()?;
        self.receiver.borrow_and_update().clone()
    }

    /// Wait until the entry satisfies `ready`, returning it.
    pub async fn wait_for(
        &mut self,
        mut ready: impl FnMut(&CacheEntry) -> bool,
    ) -> Option<CacheEntry> {
        let entry = self
            .receiver
            .wait_for(|entry| entry.as_ref().is_some_and(&mut ready))
            .await
            .ok()?;
        entry.clone()
    }
}
