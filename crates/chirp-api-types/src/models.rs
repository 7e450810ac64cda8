use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A short text message. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub author_id: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Read-only projection of an identity, joined onto posts for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub username: String,
    pub profile_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostWithAuthor {
    pub post: Post,
    pub author: Author,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn post_serializes_with_camel_case_and_rfc3339() {
        let post = Post {
            id: Uuid::nil(),
            author_id: "user_1".to_string(),
            content: "hello".to_string(),
            created_at: datetime!(2024-03-01 12:00 UTC),
        };

        let value = serde_json::to_value(&post).expect("serialize post");
        assert_eq!(value["authorId"], "user_1");
        assert_eq!(value["createdAt"], "2024-03-01T12:00:00Z");

        let back: Post = serde_json::from_value(value).expect("deserialize post");
        assert_eq!(back, post);
    }
}
