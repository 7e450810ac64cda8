use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    /// A stored post whose author is not in the user store.
    #[error("post {post_id} refers to unknown author `{author_id}`")]
    OrphanPost { post_id: Uuid, author_id: String },
}

impl DomainError {
    pub fn orphan_post(post_id: Uuid, author_id: impl Into<String>) -> Self {
        Self::OrphanPost {
            post_id,
            author_id: author_id.into(),
        }
    }
}
