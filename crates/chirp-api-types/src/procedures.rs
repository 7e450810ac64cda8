//! Procedure markers. Paths are `router.procedure` pairs.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::models::{Author, Post, PostWithAuthor};

/// Whether a procedure reads (cacheable) or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

/// Compile-time description of one remote procedure.
pub trait Procedure: Send + Sync + 'static {
    const PATH: &'static [&'static str];
    const KIND: ProcedureKind;

    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Dotted path as used on the wire, e.g. `posts.getAll`.
    fn dotted_path() -> String {
        Self::PATH.join(".")
    }
}

pub mod posts {
    use super::*;

    /// Global feed, newest first.
    #[derive(Debug, Clone, Copy)]
    pub struct GetAll;

    impl Procedure for GetAll {
        const PATH: &'static [&'static str] = &["posts", "getAll"];
        const KIND: ProcedureKind = ProcedureKind::Query;
        type Input = ();
        type Output = Vec<PostWithAuthor>;
    }

    #[derive(Debug, Clone, Copy)]
    pub struct GetPostsByUserId;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GetPostsByUserIdInput {
        pub user_id: String,
    }

    impl Procedure for GetPostsByUserId {
        const PATH: &'static [&'static str] = &["posts", "getPostsByUserId"];
        const KIND: ProcedureKind = ProcedureKind::Query;
        type Input = GetPostsByUserIdInput;
        type Output = Vec<PostWithAuthor>;
    }

    #[derive(Debug, Clone, Copy)]
    pub struct Create;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CreatePostInput {
        pub content: String,
    }

    impl Procedure for Create {
        const PATH: &'static [&'static str] = &["posts", "create"];
        const KIND: ProcedureKind = ProcedureKind::Mutation;
        type Input = CreatePostInput;
        type Output = Post;
    }
}

pub mod profile {
    use super::*;

    #[derive(Debug, Clone, Copy)]
    pub struct GetUserByUsername;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct GetUserByUsernameInput {
        pub username: String,
    }

    impl Procedure for GetUserByUsername {
        const PATH: &'static [&'static str] = &["profile", "getUserByUsername"];
        const KIND: ProcedureKind = ProcedureKind::Query;
        type Input = GetUserByUsernameInput;
        type Output = Author;
    }
}
