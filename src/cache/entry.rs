//! Cached results of remote reads.

use serde::de::DeserializeOwned;
use serde_json::Value;
use time::OffsetDateTime;

use crate::application::error::RpcError;

use super::keys::QueryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStatus {
    Pending,
    Success,
    Error,
}

impl QueryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            QueryStatus::Pending => "pending",
            QueryStatus::Success => "success",
            QueryStatus::Error => "error",
        }
    }
}

/// One slot of a query cache.
///
/// A pending entry may still carry the data of an earlier success; that data
/// stays readable while the refetch runs.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Value>,
    pub error: Option<RpcError>,
    pub fetched_at: OffsetDateTime,
    pub is_stale: bool,
}

impl CacheEntry {
    pub fn success(key: QueryKey, data: Value, fetched_at: OffsetDateTime) -> Self {
        Self {
            key,
            status: QueryStatus::Success,
            data: Some(data),
            error: None,
            fetched_at,
            is_stale: false,
        }
    }

    pub fn failed(key: QueryKey, error: RpcError, previous: Option<&CacheEntry>) -> Self {
        Self {
            key,
            status: QueryStatus::Error,
            data: previous.and_then(|entry| entry.data.clone()),
            error: Some(error),
            fetched_at: OffsetDateTime::now_utc(),
            is_stale: false,
        }
    }

    /// Pending entry for `key`, keeping any earlier data visible.
    pub fn pending(key: QueryKey, previous: Option<&CacheEntry>) -> Self {
        match previous {
            Some(entry) => Self {
                status: QueryStatus::Pending,
                error: None,
                ..entry.clone()
            },
            None => Self {
                key,
                status: QueryStatus::Pending,
                data: None,
                error: None,
                fetched_at: OffsetDateTime::now_utc(),
                is_stale: false,
            },
        }
    }

    pub(crate) fn settled(
        key: QueryKey,
        outcome: Result<Value, RpcError>,
        previous: Option<&CacheEntry>,
    ) -> Self {
        match outcome {
            Ok(data) => Self::success(key, data, OffsetDateTime::now_utc()),
            Err(error) => Self::failed(key, error, previous),
        }
    }

    /// A settled entry that no invalidation has touched since.
    pub fn is_fresh(&self) -> bool {
        self.status != QueryStatus::Pending && !self.is_stale
    }

    /// Typed view of this entry.
    pub fn state<T: DeserializeOwned>(&self) -> QueryState<T> {
        match self.status {
            QueryStatus::Error => QueryState::Error(
                self.error
                    .clone()
                    .unwrap_or_else(|| RpcError::internal("query failed")),
            ),
            QueryStatus::Pending | QueryStatus::Success => match &self.data {
                None => QueryState::Loading,
                Some(data) => match T::deserialize(data) {
                    Ok(data) => QueryState::Success {
                        data,
                        is_stale: self.is_stale || self.status == QueryStatus::Pending,
                    },
                    Err(err) => QueryState::Error(RpcError::internal(format!(
                        "cached `{}` has an unexpected shape: {err}",
                        self.key
                    ))),
                },
            },
        }
    }
}

/// What a component sees for one query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
    Loading,
    Success { data: T, is_stale: bool },
    Error(RpcError),
}

impl<T> QueryState<T> {
    pub fn data(&self) -> Option<&T> {
        match self {
            QueryState::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            QueryState::Success { data, .. } => Some(data),
            _ => None,
        }
    }

    /// Settled view: loading counts as a failure.
    pub fn into_result(self) -> Result<T, RpcError> {
        match self {
            QueryState::Success { data, .. } => Ok(data),
            QueryState::Error(error) => Err(error),
            QueryState::Loading => Err(RpcError::internal("query has not settled")),
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QueryState::Loading)
    }

    pub fn error(&self) -> Option<&RpcError> {
        match self {
            QueryState::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> QueryState<U> {
        match self {
            QueryState::Loading => QueryState::Loading,
            QueryState::Success { data, is_stale } => QueryState::Success {
                data: f(data),
                is_stale,
            },
            QueryState::Error(error) => QueryState::Error(error),
        }
    }
}
