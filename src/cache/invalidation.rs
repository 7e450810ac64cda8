//! Mutation-driven invalidation.
//!
//! [`POLICY`] maps each mutation to the query keys its success makes stale.
//! The [`InvalidationCoordinator`] resolves a [`MutationEvent`] against that
//! table and applies the result to every registered target: the query cache
//! of a client session, the rendered-page cache of the server, or both.

use std::sync::Arc;

use async_trait::async_trait;
use chirp_api_types::Procedure;
use chirp_api_types::procedures::posts::{
    Create, GetAll, GetPostsByUserId, GetPostsByUserIdInput,
};
use metrics::counter;
use tracing::{info, warn};

use crate::application::error::RpcError;

use super::events::{MutationEvent, MutationKind};
use super::keys::{KeyPredicate, QueryKey};
use super::pages::PageCache;
use super::query_cache::QueryCache;

pub(crate) const METRIC_INVALIDATION: &str = "chirp_invalidation_total";

/// One entry of the invalidation table.
#[derive(Clone, Copy)]
pub enum InvalidationRule {
    /// Every cached input of a procedure.
    Procedure(&'static [&'static str]),
    /// A single key derived from the event.
    Keyed(fn(&MutationKind) -> Option<QueryKey>),
}

pub struct PolicyRow {
    pub mutation: &'static [&'static str],
    pub rules: &'static [InvalidationRule],
}

pub const POLICY: &[PolicyRow] = &[PolicyRow {
    mutation: Create::PATH,
    rules: &[
        InvalidationRule::Procedure(GetAll::PATH),
        InvalidationRule::Keyed(author_posts),
    ],
}];

fn author_posts(kind: &MutationKind) -> Option<QueryKey> {
    let user_id = kind.author_id()?.to_string();
    QueryKey::for_procedure::<GetPostsByUserId>(&GetPostsByUserIdInput { user_id }).ok()
}

/// Predicates a mutation event invalidates, in table order.
pub fn predicates_for(kind: &MutationKind) -> Vec<KeyPredicate> {
    let path = kind.mutation_path();
    POLICY
        .iter()
        .filter(|row| row.mutation == path)
        .flat_map(|row| row.rules.iter())
        .filter_map(|rule| match rule {
            InvalidationRule::Procedure(path) => Some(KeyPredicate::Procedure(
                path.iter().map(|seg| seg.to_string()).collect(),
            )),
            InvalidationRule::Keyed(derive) => derive(kind).map(KeyPredicate::Exact),
        })
        .collect()
}

/// Something that holds data derived from query keys.
#[async_trait]
pub trait InvalidationTarget: Send + Sync {
    fn name(&self) -> &'static str;

    /// Apply one predicate; returns how many items were affected.
    async fn invalidate(&self, predicate: &KeyPredicate) -> usize;
}

#[async_trait]
impl InvalidationTarget for QueryCache {
    fn name(&self) -> &'static str {
        "query_cache"
    }

    async fn invalidate(&self, predicate: &KeyPredicate) -> usize {
        QueryCache::invalidate(self, predicate).await.marked.len()
    }
}

#[async_trait]
impl InvalidationTarget for PageCache {
    fn name(&self) -> &'static str {
        "page_cache"
    }

    async fn invalidate(&self, predicate: &KeyPredicate) -> usize {
        self.invalidate_matching(predicate)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationSummary {
    pub predicates: Vec<KeyPredicate>,
    /// Items affected per target, in registration order.
    pub affected: Vec<(&'static str, usize)>,
}

#[derive(Clone, Default)]
pub struct InvalidationCoordinator {
    targets: Vec<Arc<dyn InvalidationTarget>>,
}

impl InvalidationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(mut self, target: Arc<dyn InvalidationTarget>) -> Self {
        self.targets.push(target);
        self
    }

    /// Invalidate everything the event makes stale. Returns after active
    /// query keys have been refetched.
    pub async fn on_success(&self, event: &MutationEvent) -> InvalidationSummary {
        let predicates = predicates_for(&event.kind);
        let mut affected = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let mut count = 0;
            for predicate in &predicates {
                count += target.invalidate(predicate).await;
            }
            affected.push((target.name(), count));
        }

        let mutation = event.kind.mutation_path().join(".");
        counter!(METRIC_INVALIDATION, "mutation" => mutation.clone()).increment(1);
        info!(
            event_id = %event.id,
            mutation = %mutation,
            predicates = predicates.len(),
            affected = ?affected,
            "Applied mutation invalidation"
        );
        InvalidationSummary {
            predicates,
            affected,
        }
    }

    /// A failed mutation invalidates nothing.
    pub fn on_failure(&self, mutation: &[&str], error: &RpcError) {
        warn!(
            mutation = %mutation.join("."),
            code = ?error.code(),
            error = %error,
            "Mutation failed; caches left untouched"
        );
    }
}
