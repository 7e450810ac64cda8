use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chirp::application::pages::PageGenerator;
use chirp::application::procedures::{DEFAULT_FEED_LIMIT, ProcedureRouter};
use chirp::application::rate_limit::PostRateLimiter;
use chirp::cache::{CacheConfig, PageCache, QueryCache, QueryKey};
use chirp::domain::entities::UserRecord;
use chirp::domain::validation::LengthPolicy;
use chirp::infra::http::{HttpState, build_router};
use chirp::infra::memory::{InMemoryStore, SessionDirectory};
use futures::future::join;
use metrics_util::debugging::DebuggingRecorder;
use serde_json::{Value, json};
use tower::ServiceExt;

fn user(id: &str, username: &str) -> UserRecord {
    UserRecord {
        id: id.to_string(),
        username: username.to_string(),
        profile_image_url: format!("https://img.example/{username}.png"),
    }
}

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Query cache hit/miss/dedup/evict
    let query_config = CacheConfig {
        query_entry_limit: 1,
        ..Default::default()
    };
    let cache = QueryCache::new(&query_config);
    let feed = QueryKey::new(&["posts", "getAll"], &Value::Null);
    let other = QueryKey::new(
        &["profile", "getUserByUsername"],
        &json!({ "username": "alice" }),
    );
    join(
        cache.fetch(feed.clone(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok(json!([]))
        }),
        cache.fetch(feed.clone(), async { Ok(json!([])) }),
    )
    .await;
    cache.fetch(feed, async { Ok(json!([])) }).await;
    cache.fetch(other, async { Ok(json!({})) }).await;

    // Page cache hit/miss/evict, prefetch latency and invalidation through the router
    let store = Arc::new(InMemoryStore::new([
        user("user_alice", "alice"),
        user("user_bob", "bob"),
    ]));
    let procedures = Arc::new(ProcedureRouter::new(
        store.clone(),
        store.clone(),
        Arc::new(LengthPolicy::default()),
        PostRateLimiter::new(Duration::from_secs(60), 3),
        DEFAULT_FEED_LIMIT,
    ));
    let page_config = CacheConfig {
        page_limit: 1,
        ..Default::default()
    };
    let sessions = HashMap::from([("session-alice".to_string(), "user_alice".to_string())]);
    let app = build_router(HttpState::new(
        Arc::new(PageGenerator::new(procedures, page_config.clone())),
        Arc::new(PageCache::new(&page_config)),
        Arc::new(SessionDirectory::new(sessions, store)),
    ));

    for uri in ["/@alice", "/@alice", "/@bob"] {
        let request = Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/rpc/posts.create")
        .header(header::AUTHORIZATION, "Bearer session-alice")
        .body(Body::from(r#"{"content":"📈"}"#))
        .expect("request should build");
    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond");
    assert_eq!(response.status(), StatusCode::OK);

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "chirp_query_cache_hit_total",
        "chirp_query_cache_miss_total",
        "chirp_query_cache_dedup_total",
        "chirp_query_cache_evict_total",
        "chirp_page_cache_hit_total",
        "chirp_page_cache_miss_total",
        "chirp_page_cache_evict_total",
        "chirp_prefetch_ms",
        "chirp_invalidation_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
