//! In-memory persistence and identity adapters.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::application::identity::{Identity, IdentityProvider};
use crate::application::repos::{CreatePostParams, PostsRepo, RepoError, UsersRepo};
use crate::cache::lock::{rw_read, rw_write};
use crate::domain::entities::{PostRecord, UserRecord};

const SOURCE: &str = "infra::memory";

/// Posts and users held in process memory.
pub struct InMemoryStore {
    posts: RwLock<Vec<PostRecord>>,
    users: DashMap<String, UserRecord>,
}

impl InMemoryStore {
    pub fn new(users: impl IntoIterator<Item = UserRecord>) -> Self {
        let users = users
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();
        Self {
            posts: RwLock::new(Vec::new()),
            users,
        }
    }

    /// Insert a post as-is.
    pub fn insert_post(&self, post: PostRecord) {
        rw_write(&self.posts, SOURCE, "insert_post").push(post);
    }

    pub fn post_count(&self) -> usize {
        self.read_posts(|posts| posts.len())
    }

    fn read_posts<T>(&self, f: impl FnOnce(&[PostRecord]) -> T) -> T {
        f(&rw_read(&self.posts, SOURCE, "read_posts"))
    }

    fn newest_first<'a>(
        posts: impl Iterator<Item = &'a PostRecord>,
        limit: usize,
    ) -> Vec<PostRecord> {
        let mut out: Vec<PostRecord> = posts.cloned().collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out.truncate(limit);
        out
    }
}

#[async_trait]
impl PostsRepo for InMemoryStore {
    async fn list_recent(&self, limit: usize) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.read_posts(|posts| Self::newest_first(posts.iter(), limit)))
    }

    async fn list_by_author(
        &self,
        author_id: &str,
        limit: usize,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Ok(self.read_posts(|posts| {
            Self::newest_first(
                posts.iter().filter(|post| post.author_id == author_id),
                limit,
            )
        }))
    }

    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let exists = self.read_posts(|posts| posts.iter().any(|post| post.id == params.id));
        if exists {
            return Err(RepoError::Duplicate {
                constraint: "posts_pkey".to_string(),
            });
        }

        let record = PostRecord {
            id: params.id,
            author_id: params.author_id,
            content: params.content,
            created_at: params.created_at,
        };
        self.insert_post(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl UsersRepo for InMemoryStore {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<UserRecord>, RepoError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|user| user.value().clone()))
            .collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .iter()
            .find(|user| user.username == username)
            .map(|user| user.value().clone()))
    }
}

/// Session tokens mapped to user ids, resolved against the user store.
pub struct SessionDirectory {
    sessions: HashMap<String, String>,
    users: Arc<dyn UsersRepo>,
}

impl SessionDirectory {
    pub fn new(sessions: HashMap<String, String>, users: Arc<dyn UsersRepo>) -> Self {
        Self { sessions, users }
    }
}

#[async_trait]
impl IdentityProvider for SessionDirectory {
    async fn resolve(&self, session: Option<&str>) -> Identity {
        let Some(user_id) = session.and_then(|token| self.sessions.get(token)) else {
            return Identity::Anonymous;
        };

        match self.users.find_by_ids(std::slice::from_ref(user_id)).await {
            Ok(mut users) => match users.pop() {
                Some(user) => {
                    debug!(user_id = %user.id, "Resolved session");
                    Identity::SignedIn(user)
                }
                None => {
                    warn!(user_id = %user_id, "Session refers to unknown user");
                    Identity::Anonymous
                }
            },
            Err(err) => {
                warn!(error = %err, "Session lookup failed");
                Identity::Anonymous
            }
        }
    }
}
