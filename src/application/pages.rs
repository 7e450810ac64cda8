//! Page generation.
//!
//! Each generation owns a fresh [`ServerPrefetch`], so no query state is
//! shared between concurrent requests. The output carries the snapshot and
//! page props that travel to the client, plus the prefetch itself so the
//! renderer reads exactly what the client will hydrate.

use std::fmt;
use std::sync::Arc;

use chirp_api_types::procedures::posts::{GetAll, GetPostsByUserId, GetPostsByUserIdInput};
use chirp_api_types::procedures::profile::{GetUserByUsername, GetUserByUsernameInput};
use chirp_api_types::Author;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::application::identity::Identity;
use crate::application::procedures::ProcedureRouter;
use crate::cache::{CacheConfig, PrefetchError, QueryKey, ServerPrefetch, Snapshot};
use crate::domain::slug::{ProfileSlugError, parse_profile_slug, profile_slug};

/// What travels to the client inside the page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePayload<P> {
    pub snapshot: Snapshot,
    pub props: P,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedProps {
    /// Signed-in viewer, shown next to the composer.
    pub viewer: Option<Author>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileProps {
    pub username: String,
}

pub struct GeneratedPage<P> {
    pub payload: PagePayload<P>,
    pub prefetch: ServerPrefetch,
}

impl<P> GeneratedPage<P> {
    /// Query keys the page was rendered from.
    pub fn deps(&self) -> Vec<QueryKey> {
        self.prefetch.touched_keys()
    }

    /// False when any prefetch failed and the client will finish loading.
    pub fn is_complete(&self) -> bool {
        !self.prefetch.has_failures()
    }
}

/// Generation state of one profile path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Unresolved,
    Prefetching,
    Resolved,
    NotFound,
}

impl PathState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PathState::Resolved | PathState::NotFound)
    }

    fn can_advance_to(self, next: PathState) -> bool {
        matches!(
            (self, next),
            (PathState::Unresolved, PathState::Prefetching)
                | (PathState::Unresolved, PathState::NotFound)
                | (PathState::Prefetching, PathState::Resolved)
                | (PathState::Prefetching, PathState::NotFound)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("profile path cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: PathState,
    pub to: PathState,
}

/// Resolution of one profile path within one request.
#[derive(Debug, Clone)]
pub struct ProfilePath {
    slug: Option<String>,
    history: Vec<PathState>,
}

impl ProfilePath {
    pub fn new(slug: Option<&str>) -> Self {
        Self {
            slug: slug.map(str::to_string),
            history: vec![PathState::Unresolved],
        }
    }

    pub fn state(&self) -> PathState {
        self.history
            .last()
            .copied()
            .unwrap_or(PathState::Unresolved)
    }

    /// Every state visited, oldest first.
    pub fn history(&self) -> &[PathState] {
        &self.history
    }

    pub fn advance(&mut self, next: PathState) -> Result<(), InvalidTransition> {
        let from = self.state();
        if !from.can_advance_to(next) {
            return Err(InvalidTransition { from, to: next });
        }
        debug!(slug = ?self.slug, ?from, to = ?next, "Profile path transition");
        self.history.push(next);
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ProfileNotFound {
    #[error(transparent)]
    BadSlug(#[from] ProfileSlugError),
    #[error("no user named `{username}`")]
    UnknownUser { username: String },
}

pub enum ProfileOutcome {
    Ready(GeneratedPage<ProfileProps>),
    NotFound(ProfileNotFound),
}

impl fmt::Debug for ProfileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProfileOutcome::Ready(page) => f
                .debug_tuple("Ready")
                .field(&page.payload.props)
                .finish(),
            ProfileOutcome::NotFound(reason) => f.debug_tuple("NotFound").field(reason).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Unknown paths are generated on first request; that request waits.
    Blocking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPaths {
    pub paths: Vec<String>,
    pub fallback: Fallback,
}

pub struct PageGenerator {
    router: Arc<ProcedureRouter>,
    cache_config: CacheConfig,
}

impl PageGenerator {
    pub fn new(router: Arc<ProcedureRouter>, cache_config: CacheConfig) -> Self {
        Self {
            router,
            cache_config,
        }
    }

    pub fn router(&self) -> &Arc<ProcedureRouter> {
        &self.router
    }

    /// The global feed. A failed prefetch leaves the feed for the client to
    /// load.
    pub async fn feed_page(&self, identity: &Identity) -> GeneratedPage<FeedProps> {
        let prefetch = ServerPrefetch::new(self.router.clone(), identity.clone(), &self.cache_config);
        if let Err(err) = prefetch.prefetch::<GetAll>(&()).await {
            warn!(
                error = %err,
                cause = %err.source,
                "Feed prefetch failed; client will load the feed"
            );
        }

        let props = FeedProps {
            viewer: identity.user().cloned().map(Author::from),
        };
        GeneratedPage {
            payload: PagePayload {
                snapshot: prefetch.dehydrate(),
                props,
            },
            prefetch,
        }
    }

    /// A profile page. Viewer-independent, so the result may be shared
    /// between requests.
    pub async fn profile_page(&self, slug: Option<&str>) -> Result<ProfileOutcome, PrefetchError> {
        let mut path = ProfilePath::new(slug);
        self.resolve_profile(&mut path).await
    }

    pub async fn resolve_profile(
        &self,
        path: &mut ProfilePath,
    ) -> Result<ProfileOutcome, PrefetchError> {
        let username = match parse_profile_slug(path.slug.as_deref()) {
            Ok(username) => username,
            Err(err) => {
                debug!(error = %err, "Rejected profile slug");
                advance(path, PathState::NotFound);
                return Ok(ProfileOutcome::NotFound(err.into()));
            }
        };

        advance(path, PathState::Prefetching);
        let prefetch = ServerPrefetch::new(
            self.router.clone(),
            Identity::Anonymous,
            &self.cache_config,
        );

        let author = match prefetch
            .prefetch::<GetUserByUsername>(&GetUserByUsernameInput {
                username: username.clone(),
            })
            .await
        {
            Ok(author) => author,
            Err(err) if err.is_not_found() => {
                advance(path, PathState::NotFound);
                return Ok(ProfileOutcome::NotFound(ProfileNotFound::UnknownUser {
                    username,
                }));
            }
            Err(err) => return Err(err),
        };

        if let Err(err) = prefetch
            .prefetch::<GetPostsByUserId>(&GetPostsByUserIdInput {
                user_id: author.id.clone(),
            })
            .await
        {
            warn!(
                username = %author.username,
                error = %err,
                cause = %err.source,
                "Profile posts prefetch failed; client will load them"
            );
        }

        advance(path, PathState::Resolved);
        info!(username = %author.username, "Generated profile page");
        Ok(ProfileOutcome::Ready(GeneratedPage {
            payload: PagePayload {
                snapshot: prefetch.dehydrate(),
                props: ProfileProps {
                    username: author.username,
                },
            },
            prefetch,
        }))
    }

    /// Profile paths generated ahead of time. Empty: every profile is
    /// generated when first requested.
    pub fn static_profile_paths(&self) -> StaticPaths {
        StaticPaths {
            paths: Vec::new(),
            fallback: Fallback::Blocking,
        }
    }

    pub fn profile_route(username: &str) -> String {
        format!("/{}", profile_slug(username))
    }
}

fn advance(path: &mut ProfilePath, next: PathState) {
    if let Err(err) = path.advance(next) {
        warn!(error = %err, "Ignored invalid profile path transition");
    }
}
