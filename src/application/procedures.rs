//! Server-side procedure handlers.
//!
//! [`ProcedureRouter::call`] is the single entry point for both the in-process
//! transport used during page generation and the HTTP endpoint used by
//! clients. Inputs and outputs cross it as JSON.

use std::collections::HashMap;
use std::sync::Arc;

use chirp_api_types::procedures::posts::{
    Create, CreatePostInput, GetAll, GetPostsByUserId, GetPostsByUserIdInput,
};
use chirp_api_types::procedures::profile::{GetUserByUsername, GetUserByUsernameInput};
use chirp_api_types::{Author, Post, PostWithAuthor, Procedure, ProcedureKind};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::application::error::RpcError;
use crate::application::identity::Identity;
use crate::application::rate_limit::PostRateLimiter;
use crate::application::repos::{CreatePostParams, PostsRepo, UsersRepo};
use crate::domain::entities::{PostRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::validation::ContentPolicy;

/// Upper bound on posts returned by one list query.
pub const DEFAULT_FEED_LIMIT: usize = 100;

pub struct ProcedureRouter {
    posts: Arc<dyn PostsRepo>,
    users: Arc<dyn UsersRepo>,
    policy: Arc<dyn ContentPolicy>,
    limiter: PostRateLimiter,
    feed_limit: usize,
}

impl ProcedureRouter {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        users: Arc<dyn UsersRepo>,
        policy: Arc<dyn ContentPolicy>,
        limiter: PostRateLimiter,
        feed_limit: usize,
    ) -> Self {
        Self {
            posts,
            users,
            policy,
            limiter,
            feed_limit,
        }
    }

    /// Dispatch a call by dotted path.
    #[instrument(skip(self, identity, input), fields(viewer = identity.id()))]
    pub async fn call(
        &self,
        identity: &Identity,
        kind: ProcedureKind,
        path: &str,
        input: Value,
    ) -> Result<Value, RpcError> {
        let result = match kind {
            ProcedureKind::Query if is::<GetAll>(path) => {
                decode::<GetAll>(input)?;
                encode(self.get_all().await?)
            }
            ProcedureKind::Query if is::<GetPostsByUserId>(path) => {
                let input = decode::<GetPostsByUserId>(input)?;
                encode(self.get_posts_by_user_id(input).await?)
            }
            ProcedureKind::Query if is::<GetUserByUsername>(path) => {
                let input = decode::<GetUserByUsername>(input)?;
                encode(self.get_user_by_username(input).await?)
            }
            ProcedureKind::Mutation if is::<Create>(path) => {
                let input = decode::<Create>(input)?;
                encode(self.create_post(identity, input).await?)
            }
            _ => Err(RpcError::not_found(format!(
                "no {} procedure `{path}`",
                kind_name(kind)
            ))),
        };

        if let Err(err) = &result {
            debug!(procedure = path, code = ?err.code(), error = %err, "Procedure failed");
        }
        result
    }

    pub async fn get_all(&self) -> Result<Vec<PostWithAuthor>, RpcError> {
        let posts = self.posts.list_recent(self.feed_limit).await?;
        self.with_authors(posts).await
    }

    pub async fn get_posts_by_user_id(
        &self,
        input: GetPostsByUserIdInput,
    ) -> Result<Vec<PostWithAuthor>, RpcError> {
        let posts = self
            .posts
            .list_by_author(&input.user_id, self.feed_limit)
            .await?;
        self.with_authors(posts).await
    }

    pub async fn get_user_by_username(
        &self,
        input: GetUserByUsernameInput,
    ) -> Result<Author, RpcError> {
        self.users
            .find_by_username(&input.username)
            .await?
            .map(Author::from)
            .ok_or_else(|| RpcError::not_found("user not found"))
    }

    pub async fn create_post(
        &self,
        identity: &Identity,
        input: CreatePostInput,
    ) -> Result<Post, RpcError> {
        let author_id = identity.id().ok_or(RpcError::Unauthorized)?;
        let content = self
            .policy
            .validate(&input.content)
            .map_err(RpcError::Validation)?;

        if !self.limiter.allow(author_id) {
            warn!(
                author_id,
                limit = self.limiter.limit(),
                window_secs = self.limiter.window().as_secs(),
                "Post rate limit exceeded"
            );
            return Err(RpcError::TooManyRequests);
        }

        let record = self
            .posts
            .create_post(CreatePostParams {
                id: Uuid::new_v4(),
                author_id: author_id.to_string(),
                content,
                created_at: OffsetDateTime::now_utc(),
            })
            .await?;

        info!(post_id = %record.id, author_id, "Post created");
        Ok(record.into())
    }

    async fn with_authors(&self, posts: Vec<PostRecord>) -> Result<Vec<PostWithAuthor>, RpcError> {
        let mut ids: Vec<String> = posts.iter().map(|post| post.author_id.clone()).collect();
        ids.sort();
        ids.dedup();

        let users = self.users.find_by_ids(&ids).await?;
        let by_id: HashMap<&str, &UserRecord> =
            users.iter().map(|user| (user.id.as_str(), user)).collect();

        posts
            .into_iter()
            .map(|post| -> Result<PostWithAuthor, RpcError> {
                let author = by_id
                    .get(post.author_id.as_str())
                    .map(|user| Author::from((*user).clone()))
                    .ok_or_else(|| DomainError::orphan_post(post.id, post.author_id.clone()))?;
                Ok(PostWithAuthor {
                    post: post.into(),
                    author,
                })
            })
            .collect()
    }
}

fn is<P: Procedure>(path: &str) -> bool {
    P::PATH.iter().copied().eq(path.split('.'))
}

fn decode<P: Procedure>(input: Value) -> Result<P::Input, RpcError> {
    serde_json::from_value(input).map_err(|err| RpcError::invalid_input("input", err.to_string()))
}

fn encode<T: Serialize>(output: T) -> Result<Value, RpcError> {
    serde_json::to_value(output)
        .map_err(|err| RpcError::internal(format!("failed to encode output: {err}")))
}

fn kind_name(kind: ProcedureKind) -> &'static str {
    match kind {
        ProcedureKind::Query => "query",
        ProcedureKind::Mutation => "mutation",
    }
}
