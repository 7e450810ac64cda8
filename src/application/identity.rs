//! Viewer identity.
//!
//! Identity is resolved from the request's session token by an
//! [`IdentityProvider`]. Procedures only see the resolved [`Identity`].

use async_trait::async_trait;

use crate::domain::entities::UserRecord;

/// Name of the session cookie.
pub const SESSION_COOKIE: &str = "__session";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    #[default]
    Anonymous,
    SignedIn(UserRecord),
}

impl Identity {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, Identity::SignedIn(_))
    }

    pub fn user(&self) -> Option<&UserRecord> {
        match self {
            Identity::SignedIn(user) => Some(user),
            Identity::Anonymous => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.user().map(|user| user.id.as_str())
    }

    pub fn username(&self) -> Option<&str> {
        self.user().map(|user| user.username.as_str())
    }

    pub fn profile_image_url(&self) -> Option<&str> {
        self.user().map(|user| user.profile_image_url.as_str())
    }
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolve a session token. Unknown or absent tokens are anonymous.
    async fn resolve(&self, session: Option<&str>) -> Identity;
}
