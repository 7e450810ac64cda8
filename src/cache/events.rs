//! Mutation events.
//!
//! A successful write is described by a [`MutationEvent`]. Events carry an
//! id and timestamp so log lines from the server and the client can be
//! correlated.

use chirp_api_types::{Post, Procedure, procedures::posts::Create};
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct MutationEvent {
    pub id: Uuid,
    pub kind: MutationKind,
    pub timestamp: OffsetDateTime,
}

impl MutationEvent {
    pub fn new(kind: MutationKind) -> Self {
        let event = Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: OffsetDateTime::now_utc(),
        };
        info!(
            event_id = %event.id,
            event_kind = ?event.kind,
            "Mutation event published"
        );
        event
    }

    pub fn post_created(post_id: Uuid, author_id: impl Into<String>) -> Self {
        Self::new(MutationKind::PostCreated {
            post_id,
            author_id: author_id.into(),
        })
    }

    /// Event for a mutation that succeeded with `output`, if the mutation
    /// makes anything stale.
    pub fn from_output(path: &str, output: &Value) -> Option<Self> {
        if path == Create::dotted_path() {
            let post = Post::deserialize(output).ok()?;
            return Some(Self::post_created(post.id, post.author_id));
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationKind {
    /// `posts.create` succeeded.
    PostCreated { post_id: Uuid, author_id: String },
}

impl MutationKind {
    /// Path of the procedure whose success produced this event.
    pub fn mutation_path(&self) -> &'static [&'static str] {
        match self {
            MutationKind::PostCreated { .. } => Create::PATH,
        }
    }

    pub fn author_id(&self) -> Option<&str> {
        match self {
            MutationKind::PostCreated { author_id, .. } => Some(author_id),
        }
    }
}
