//! Server-side prefetch.
//!
//! A [`ServerPrefetch`] lives for one page generation. It runs procedures
//! in-process against a fresh query cache, then dehydrates that cache into
//! the snapshot embedded in the page.

use std::sync::Arc;
use std::time::Instant;

use chirp_api_types::Procedure;
use metrics::histogram;
use thiserror::Error;
use tracing::debug;

use crate::application::error::RpcError;
use crate::application::identity::Identity;
use crate::application::procedures::ProcedureRouter;
use crate::application::rpc::{LocalTransport, RpcClient};

use super::config::CacheConfig;
use super::entry::QueryStatus;
use super::keys::QueryKey;
use super::query_cache::QueryCache;
use super::snapshot::Snapshot;

pub(crate) const METRIC_PREFETCH_MS: &str = "chirp_prefetch_ms";

#[derive(Debug, Error)]
#[error("prefetch of `{key}` failed")]
pub struct PrefetchError {
    pub key: QueryKey,
    #[source]
    pub source: RpcError,
}

impl PrefetchError {
    pub fn is_not_found(&self) -> bool {
        self.source.is_not_found()
    }
}

pub struct ServerPrefetch {
    client: RpcClient,
}

impl ServerPrefetch {
    pub fn new(router: Arc<ProcedureRouter>, identity: Identity, config: &CacheConfig) -> Self {
        let transport = Arc::new(LocalTransport::new(router, identity));
        let cache = Arc::new(QueryCache::new(config));
        Self {
            client: RpcClient::new(transport, cache),
        }
    }

    /// Run `P` into the request cache and return its decoded output.
    ///
    /// On failure the error entry stays in the cache but is left out of the
    /// snapshot, so the client fetches that key itself.
    pub async fn prefetch<P: Procedure>(
        &self,
        input: &P::Input,
    ) -> Result<P::Output, PrefetchError> {
        let started = Instant::now();
        let key = RpcClient::key::<P>(input).map_err(|source| PrefetchError {
            key: QueryKey::new(P::PATH, &serde_json::Value::Null),
            source,
        })?;

        let entry = self
            .client
            .fetch::<P>(input)
            .await
            .map_err(|source| PrefetchError {
                key: key.clone(),
                source,
            })?;
        histogram!(METRIC_PREFETCH_MS, "procedure" => P::dotted_path())
            .record(started.elapsed().as_secs_f64() * 1000.0);
        debug!(key = %key, status = entry.status.as_str(), "Prefetched query");

        entry
            .state::<P::Output>()
            .into_result()
            .map_err(|source| PrefetchError { key, source })
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    pub fn cache(&self) -> &Arc<QueryCache> {
        self.client.cache()
    }

    /// Keys this generation read, including failed ones.
    pub fn touched_keys(&self) -> Vec<QueryKey> {
        self.cache().keys()
    }

    /// Successful entries only.
    pub fn dehydrate(&self) -> Snapshot {
        self.cache().snapshot()
    }

    pub fn has_failures(&self) -> bool {
        self.cache()
            .keys()
            .iter()
            .filter_map(|key| self.cache().get(key))
            .any(|entry| entry.status == QueryStatus::Error)
    }
}
