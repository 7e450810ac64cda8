//! Domain entities mirrored from storage.

use chirp_api_types::{Author, Post};
use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub author_id: String,
    pub content: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub profile_image_url: String,
}

impl From<PostRecord> for Post {
    fn from(record: PostRecord) -> Self {
        Self {
            id: record.id,
            author_id: record.author_id,
            content: record.content,
            created_at: record.created_at,
        }
    }
}

impl From<UserRecord> for Author {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            profile_image_url: record.profile_image_url,
        }
    }
}
