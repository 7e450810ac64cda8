//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::entities::{PostRecord, UserRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub id: Uuid,
    pub author_id: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    /// Newest posts first, at most `limit`.
    async fn list_recent(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError>;

    /// Newest posts of one author first, at most `limit`.
    async fn list_by_author(
        &self,
        author_id: &str,
        limit: usize,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Users with the given ids. Unknown ids are skipped.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<UserRecord>, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;
}
