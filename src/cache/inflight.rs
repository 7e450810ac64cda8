//! Request coalescing.
//!
//! At most one task runs per key. Later callers join the running task and
//! receive a clone of its output. Each task carries a ticket so that only
//! the first waiter to observe the output settles it, and a stale waiter
//! can never remove a newer task started for the same key.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::lock::mutex_lock;

const SOURCE: &str = "cache::inflight";

pub(crate) type SharedTask<V> = Shared<BoxFuture<'static, V>>;

/// Handle on a joined task.
pub(crate) struct Joined<V: Clone> {
    pub ticket: u64,
    pub task: SharedTask<V>,
    /// True for the caller that started the task.
    pub started: bool,
}

pub(crate) struct InFlight<K, V: Clone> {
    tasks: Mutex<HashMap<K, (u64, SharedTask<V>)>>,
    next_ticket: AtomicU64,
}

impl<K, V> InFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            next_ticket: AtomicU64::new(0),
        }
    }

    /// Join the running task for `key`, or start one from `start`.
    ///
    /// `on_start` runs under the registry lock only when a new task is
    /// created, so it is ordered before any waiter can settle.
    pub fn join_or_start(
        &self,
        key: &K,
        start: impl FnOnce() -> BoxFuture<'static, V>,
        on_start: impl FnOnce(),
    ) -> Joined<V> {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "join_or_start");
        if let Some((ticket, task)) = tasks.get(key) {
            return Joined {
                ticket: *ticket,
                task: task.clone(),
                started: false,
            };
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let task = start().shared();
        tasks.insert(key.clone(), (ticket, task.clone()));
        on_start();
        Joined {
            ticket,
            task,
            started: true,
        }
    }

    /// Retire the task for `key` if it is still the one identified by
    /// `ticket`, running `settle` under the registry lock.
    ///
    /// Returns false when another waiter already retired it.
    pub fn complete(&self, key: &K, ticket: u64, settle: impl FnOnce()) -> bool {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "complete");
        match tasks.get(key) {
            Some((current, _)) if *current == ticket => {
                tasks.remove(key);
                settle();
                true
            }
            _ => false,
        }
    }

    /// Run `settle` under the registry lock if no task is registered for
    /// `key`. Used by waiters of a detached task.
    pub fn when_idle(&self, key: &K, settle: impl FnOnce()) -> bool {
        let tasks = mutex_lock(&self.tasks, SOURCE, "when_idle");
        if tasks.contains_key(key) {
            return false;
        }
        settle();
        true
    }

    /// Forget running tasks whose key matches. Their waiters still receive
    /// the output but no longer settle it.
    pub fn detach_where(&self, mut matches: impl FnMut(&K) -> bool) -> usize {
        let mut tasks = mutex_lock(&self.tasks, SOURCE, "detach_where");
        let before = tasks.len();
        tasks.retain(|key, _| !matches(key));
        before - tasks.len()
    }

    pub fn is_running(&self, key: &K) -> bool {
        mutex_lock(&self.tasks, SOURCE, "is_running").contains_key(key)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.tasks, SOURCE, "len").len()
    }
}
