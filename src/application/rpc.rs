//! Typed procedure client.
//!
//! [`RpcClient`] binds a transport to a query cache. Queries go through the
//! cache; mutations go straight to the transport. The same client type runs
//! on the server during page generation (over [`LocalTransport`]) and in the
//! client binary (over HTTP).

use std::sync::Arc;

use async_trait::async_trait;
use chirp_api_types::{Procedure, ProcedureKind};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::application::error::RpcError;
use crate::application::identity::Identity;
use crate::application::procedures::ProcedureRouter;
use crate::cache::{CacheEntry, Loader, QueryCache, QueryKey, QueryState, QuerySubscription};

/// Moves one procedure call to wherever it is executed.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, kind: ProcedureKind, path: &str, input: Value) -> Result<Value, RpcError>;
}

/// Runs procedures in-process on behalf of a fixed identity.
pub struct LocalTransport {
    router: Arc<ProcedureRouter>,
    identity: Identity,
}

impl LocalTransport {
    pub fn new(router: Arc<ProcedureRouter>, identity: Identity) -> Self {
        Self { router, identity }
    }
}

#[async_trait]
impl RpcTransport for LocalTransport {
    async fn call(&self, kind: ProcedureKind, path: &str, input: Value) -> Result<Value, RpcError> {
        self.router.call(&self.identity, kind, path, input).await
    }
}

#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    cache: Arc<QueryCache>,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>, cache: Arc<QueryCache>) -> Self {
        Self { transport, cache }
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    pub fn key<P: Procedure>(input: &P::Input) -> Result<QueryKey, RpcError> {
        QueryKey::for_procedure::<P>(input)
            .map_err(|err| RpcError::internal(format!("failed to encode input: {err}")))
    }

    /// Resolve a query through the cache.
    pub async fn fetch<P: Procedure>(&self, input: &P::Input) -> Result<CacheEntry, RpcError> {
        let key = Self::key::<P>(input)?;
        let loader = self.loader(&key);
        Ok(self.cache.fetch(key, loader()).await)
    }

    /// Resolve a query and decode its entry.
    pub async fn query<P: Procedure>(&self, input: &P::Input) -> QueryState<P::Output> {
        match self.fetch::<P>(input).await {
            Ok(entry) => entry.state(),
            Err(err) => QueryState::Error(err),
        }
    }

    /// Cached state of a query without fetching. Absent keys read as loading.
    pub fn read<P: Procedure>(&self, input: &P::Input) -> QueryState<P::Output> {
        match Self::key::<P>(input) {
            Ok(key) => self
                .cache
                .get(&key)
                .map(|entry| entry.state())
                .unwrap_or(QueryState::Loading),
            Err(err) => QueryState::Error(err),
        }
    }

    /// Keep a query active. Invalidations of its key refetch it while the
    /// subscription lives.
    pub fn subscribe<P: Procedure>(&self, input: &P::Input) -> Result<QuerySubscription, RpcError> {
        let key = Self::key::<P>(input)?;
        let loader = self.loader(&key);
        Ok(self.cache.subscribe(key, loader))
    }

    /// Run a mutation. The cache is not consulted or changed.
    pub async fn mutate<P: Procedure>(&self, input: P::Input) -> Result<P::Output, RpcError> {
        let path = P::dotted_path();
        let input = serde_json::to_value(input)
            .map_err(|err| RpcError::internal(format!("failed to encode input: {err}")))?;
        let output = self.transport.call(P::KIND, &path, input).await?;
        serde_json::from_value(output)
            .map_err(|err| RpcError::internal(format!("unexpected `{path}` output: {err}")))
    }

    fn loader(&self, key: &QueryKey) -> Loader {
        let transport = self.transport.clone();
        let path = key.dotted_path();
        let input = key.input();
        Arc::new(move || -> BoxFuture<'static, Result<Value, RpcError>> {
            let transport = transport.clone();
            let path = path.clone();
            let input = input.clone();
            async move { transport.call(ProcedureKind::Query, &path, input).await }.boxed()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chirp_api_types::procedures::posts::{Create, CreatePostInput, GetAll};
    use serde_json::json;

    use super::*;
    use crate::cache::CacheConfig;

    #[derive(Default)]
    struct ScriptedTransport {
        calls: AtomicUsize,
        seen: Mutex<Vec<(ProcedureKind, String)>>,
    }

    #[async_trait]
    impl RpcTransport for ScriptedTransport {
        async fn call(
            &self,
            kind: ProcedureKind,
            path: &str,
            _input: Value,
        ) -> Result<Value, RpcError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen
                .lock()
                .expect("seen")
                .push((kind, path.to_string()));
            match path {
                "posts.getAll" => Ok(json!([])),
                "posts.create" => Err(RpcError::Unauthorized),
                _ => Err(RpcError::not_found("no procedure")),
            }
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> RpcClient {
        RpcClient::new(transport, Arc::new(QueryCache::new(&CacheConfig::default())))
    }

    #[tokio::test]
    async fn query_goes_through_cache() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client(transport.clone());

        assert!(client.read::<GetAll>(&()).is_loading());
        let state = client.query::<GetAll>(&()).await;
        assert_eq!(state.data(), Some(&Vec::new()));
        client.query::<GetAll>(&()).await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.read::<GetAll>(&()).data(), Some(&Vec::new()));
    }

    #[tokio::test]
    async fn mutation_bypasses_cache() {
        let transport = Arc::new(ScriptedTransport::default());
        let client = client(transport.clone());

        let err = client
            .mutate::<Create>(CreatePostInput {
                content: "hi".to_string(),
            })
            .await
            .expect_err("unauthorized");
        assert_eq!(err, RpcError::Unauthorized);
        assert!(client.cache().is_empty());
        assert_eq!(
            transport.seen.lock().expect("seen").as_slice(),
            &[(ProcedureKind::Mutation, "posts.create".to_string())]
        );
    }
}
