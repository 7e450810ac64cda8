//! Post composer: the client's mutation boundary.

use chirp_api_types::procedures::posts::{Create, CreatePostInput};
use chirp_api_types::{Post, Procedure};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::application::error::RpcError;
use crate::application::rpc::RpcClient;
use crate::cache::{InvalidationCoordinator, InvalidationSummary, MutationEvent};

pub const GENERIC_FAILURE: &str = "Failed to post! Please try again later.";

/// Transient message for the user after a failed submit.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub message: String,
    pub error: RpcError,
}

impl Notification {
    /// First field error message when the server sent one, else a generic
    /// failure.
    pub fn for_error(error: RpcError) -> Self {
        let message = error
            .field_errors()
            .and_then(|errors| errors.first_message())
            .unwrap_or(GENERIC_FAILURE)
            .to_string();
        Self { message, error }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Posted {
        post: Post,
        invalidation: InvalidationSummary,
    },
    Failed,
}

pub struct PostComposer {
    client: RpcClient,
    coordinator: InvalidationCoordinator,
    notifications: UnboundedSender<Notification>,
    input: String,
}

impl PostComposer {
    /// Composer whose successful posts invalidate the client's own cache.
    pub fn new(client: RpcClient, notifications: UnboundedSender<Notification>) -> Self {
        let coordinator = InvalidationCoordinator::new().with_target(client.cache().clone());
        Self {
            client,
            coordinator,
            notifications,
            input: String::new(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, content: impl Into<String>) {
        self.input = content.into();
    }

    /// Submit `content` as a new post.
    ///
    /// Success clears the input and refetches every active query the post
    /// makes stale. Failure keeps the input and publishes a notification.
    pub async fn submit_post(&mut self, content: impl Into<String>) -> SubmitOutcome {
        self.input = content.into();
        let input = CreatePostInput {
            content: self.input.clone(),
        };

        match self.client.mutate::<Create>(input).await {
            Ok(post) => {
                self.input.clear();
                let event = MutationEvent::post_created(post.id, post.author_id.clone());
                let invalidation = self.coordinator.on_success(&event).await;
                debug!(post_id = %post.id, "Post submitted");
                SubmitOutcome::Posted { post, invalidation }
            }
            Err(error) => {
                self.coordinator.on_failure(Create::PATH, &error);
                let notification = Notification::for_error(error);
                if self.notifications.send(notification).is_err() {
                    warn!("Notification receiver dropped; failure not shown");
                }
                SubmitOutcome::Failed
            }
        }
    }
}
