use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use chirp::application::pages::PageGenerator;
use chirp::application::procedures::{DEFAULT_FEED_LIMIT, ProcedureRouter};
use chirp::application::rate_limit::PostRateLimiter;
use chirp::application::repos::{CreatePostParams, PostsRepo, RepoError};
use chirp::cache::{CacheConfig, PageCache, PageKey};
use chirp::domain::entities::{PostRecord, UserRecord};
use chirp::domain::validation::LengthPolicy;
use chirp::infra::http::{HttpState, build_router};
use chirp::infra::memory::{InMemoryStore, SessionDirectory};
use chirp_api_types::{RpcEnvelope, RpcErrorCode};
use serde_json::{Value, json};
use tower::ServiceExt;

const ALICE_SESSION: &str = "session-alice";

struct TestApp {
    router: Router,
    page_cache: Arc<PageCache>,
    store: Arc<InMemoryStore>,
}

/// Post storage that is down; user lookups still work.
struct UnavailablePosts;

#[async_trait]
impl PostsRepo for UnavailablePosts {
    async fn list_recent(&self, _limit: usize) -> Result<Vec<PostRecord>, RepoError> {
        Err(RepoError::Persistence("posts table unavailable".to_string()))
    }

    async fn list_by_author(
        &self,
        _author_id: &str,
        _limit: usize,
    ) -> Result<Vec<PostRecord>, RepoError> {
        Err(RepoError::Persistence("posts table unavailable".to_string()))
    }

    async fn create_post(&self, _params: CreatePostParams) -> Result<PostRecord, RepoError> {
        Err(RepoError::Persistence("posts table unavailable".to_string()))
    }
}

fn app() -> TestApp {
    app_with_posts(None)
}

fn app_with_posts(posts: Option<Arc<dyn PostsRepo>>) -> TestApp {
    let store = Arc::new(InMemoryStore::new([
        UserRecord {
            id: "user_alice".to_string(),
            username: "alice".to_string(),
            profile_image_url: "https://img.example/alice.png".to_string(),
        },
        UserRecord {
            id: "user_bob".to_string(),
            username: "bob".to_string(),
            profile_image_url: "https://img.example/bob.png".to_string(),
        },
    ]));
    let posts = posts.unwrap_or_else(|| store.clone() as Arc<dyn PostsRepo>);
    let procedures = Arc::new(ProcedureRouter::new(
        posts,
        store.clone(),
        Arc::new(LengthPolicy::default()),
        PostRateLimiter::new(Duration::from_secs(60), 2),
        DEFAULT_FEED_LIMIT,
    ));
    let config = CacheConfig::default();
    let page_cache = Arc::new(PageCache::new(&config));
    let sessions = HashMap::from([(ALICE_SESSION.to_string(), "user_alice".to_string())]);
    let state = HttpState::new(
        Arc::new(PageGenerator::new(procedures, config)),
        page_cache.clone(),
        Arc::new(SessionDirectory::new(sessions, store.clone())),
    );
    TestApp {
        router: build_router(state),
        page_cache,
        store,
    }
}

struct Reply {
    status: StatusCode,
    page_source: Option<String>,
    body: String,
}

async fn send(app: &TestApp, request: Request<Body>) -> Reply {
    let response = app
        .router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    let status = response.status();
    let page_source = response
        .headers()
        .get("x-chirp-page")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    Reply {
        status,
        page_source,
        body: String::from_utf8_lossy(&body).into_owned(),
    }
}

async fn get(app: &TestApp, path: &str) -> Reply {
    send(
        app,
        Request::get(path).body(Body::empty()).expect("request"),
    )
    .await
}

async fn create_post(app: &TestApp, session: Option<&str>, content: &str) -> (StatusCode, RpcEnvelope) {
    let mut request = Request::post("/api/rpc/posts.create")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(session) = session {
        request = request.header(header::AUTHORIZATION, format!("Bearer {session}"));
    }
    let request = request
        .body(Body::from(json!({ "content": content }).to_string()))
        .expect("request");
    let reply = send(app, request).await;
    let envelope = serde_json::from_str(&reply.body).expect("envelope");
    (reply.status, envelope)
}

#[tokio::test]
async fn unknown_profile_is_a_404_that_is_never_cached() {
    let app = app();

    for path in ["/@ghost", "/alice", "/@"] {
        let reply = get(&app, path).await;
        assert_eq!(reply.status, StatusCode::NOT_FOUND, "{path}");
        assert!(reply.body.contains("404"), "{path}");
    }
    assert!(get(&app, "/@ghost").await.body.contains("@ghost does not exist."));
    assert!(app.page_cache.is_empty());
}

#[tokio::test]
async fn profile_with_no_posts_renders_empty_message() {
    let app = app();
    let reply = get(&app, "/@bob").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("@bob"));
    assert!(reply.body.contains("User has not posted"));
    assert!(reply.body.contains("__CHIRP_DATA__"));
}

#[tokio::test]
async fn empty_feed_renders_for_anonymous_viewer() {
    let app = app();
    let reply = get(&app, "/").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("No posts yet"));
    assert!(reply.body.contains("Sign in"));
    assert!(!reply.body.contains("data-procedure=\"posts.create\""));
}

#[tokio::test]
async fn signed_in_feed_shows_composer() {
    let app = app();
    let reply = send(
        &app,
        Request::get("/")
            .header(header::COOKIE, format!("__session={ALICE_SESSION}"))
            .body(Body::empty())
            .expect("request"),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("data-procedure=\"posts.create\""));
    assert!(reply.body.contains("Type some emojis!"));
}

#[tokio::test]
async fn created_post_regenerates_the_author_profile() {
    let app = app();
    assert_eq!(get(&app, "/@alice").await.page_source.as_deref(), Some("generated"));
    assert_eq!(get(&app, "/@alice").await.page_source.as_deref(), Some("cache"));
    assert_eq!(get(&app, "/@bob").await.page_source.as_deref(), Some("generated"));

    let (status, envelope) = create_post(&app, Some(ALICE_SESSION), "🎉").await;
    assert_eq!(status, StatusCode::OK);
    assert!(envelope.into_result().is_ok());
    assert_eq!(app.store.post_count(), 1);
    assert!(app.page_cache.get(&PageKey::new("/@alice")).is_none());

    let reply = get(&app, "/@alice").await;
    assert_eq!(reply.page_source.as_deref(), Some("generated"));
    assert!(reply.body.contains("🎉"));

    let feed = get(&app, "/").await;
    assert!(feed.body.contains("🎉"));
}

#[tokio::test]
async fn failed_post_leaves_cached_pages_alone() {
    let app = app();
    get(&app, "/@alice").await;

    let (status, envelope) = create_post(&app, Some(ALICE_SESSION), &"🐦".repeat(300)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error = envelope.into_result().expect_err("validation");
    assert_eq!(error.code, RpcErrorCode::BadRequest);
    assert!(error.field_errors.is_some_and(|fields| fields.contains_key("content")));

    let (status, _) = create_post(&app, None, "hello").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(get(&app, "/@alice").await.page_source.as_deref(), Some("cache"));
    assert_eq!(app.store.post_count(), 0);
}

#[tokio::test]
async fn posting_is_rate_limited_per_author() {
    let app = app();
    for content in ["one", "two"] {
        let (status, _) = create_post(&app, Some(ALICE_SESSION), content).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, envelope) = create_post(&app, Some(ALICE_SESSION), "three").await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        envelope.into_result().expect_err("limited").code,
        RpcErrorCode::TooManyRequests
    );
    assert_eq!(app.store.post_count(), 2);
}

#[tokio::test]
async fn query_procedures_answer_over_get() {
    let app = app();
    create_post(&app, Some(ALICE_SESSION), "🙂").await;

    let input = serde_json::to_string(&json!({ "username": "alice" })).expect("input");
    let reply = get(
        &app,
        &format!(
            "/api/rpc/profile.getUserByUsername?input={}",
            url::form_urlencoded::byte_serialize(input.as_bytes()).collect::<String>()
        ),
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    let envelope: RpcEnvelope = serde_json::from_str(&reply.body).expect("envelope");
    let author: Value = envelope.into_result().expect("author");
    assert_eq!(author["id"], "user_alice");

    let reply = get(&app, "/api/rpc/posts.getAll").await;
    let envelope: RpcEnvelope = serde_json::from_str(&reply.body).expect("envelope");
    let posts = envelope.into_result().expect("posts");
    assert_eq!(posts.as_array().map(Vec::len), Some(1));
    assert_eq!(posts[0]["author"]["username"], "alice");
}

#[tokio::test]
async fn failed_post_prefetch_renders_loading_and_is_not_cached() {
    let app = app_with_posts(Some(Arc::new(UnavailablePosts)));

    let reply = get(&app, "/@alice").await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.body.contains("@alice"));
    assert!(reply.body.contains("Loading"));
    assert!(!reply.body.contains("Something went wrong"));
    assert_eq!(reply.page_source.as_deref(), Some("generated"));
    assert!(app.page_cache.is_empty());

    let again = get(&app, "/@alice").await;
    assert_eq!(again.page_source.as_deref(), Some("generated"));

    let feed = get(&app, "/").await;
    assert_eq!(feed.status, StatusCode::OK);
    assert!(feed.body.contains("Loading"));
    assert!(!feed.body.contains("Something went wrong"));
}
