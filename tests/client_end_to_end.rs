use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chirp::application::pages::{FeedProps, PageGenerator};
use chirp::application::procedures::{DEFAULT_FEED_LIMIT, ProcedureRouter};
use chirp::application::rate_limit::PostRateLimiter;
use chirp::cache::{CacheConfig, HydrationBridge, PageCache};
use chirp::client::{ClientApp, HttpTransport, PostComposer, SubmitOutcome};
use chirp::domain::entities::UserRecord;
use chirp::domain::validation::LengthPolicy;
use chirp::infra::http::{HttpState, build_router};
use chirp::infra::memory::{InMemoryStore, SessionDirectory};
use chirp_api_types::procedures::posts::GetAll;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const SESSION: &str = "session-carol";

async fn spawn_server() -> SocketAddr {
    let store = Arc::new(InMemoryStore::new([UserRecord {
        id: "user_carol".to_string(),
        username: "carol".to_string(),
        profile_image_url: "https://img.example/carol.png".to_string(),
    }]));
    let procedures = Arc::new(ProcedureRouter::new(
        store.clone(),
        store.clone(),
        Arc::new(LengthPolicy::default()),
        PostRateLimiter::new(Duration::from_secs(60), 5),
        DEFAULT_FEED_LIMIT,
    ));
    let config = CacheConfig::default();
    let sessions = HashMap::from([(SESSION.to_string(), "user_carol".to_string())]);
    let state = HttpState::new(
        Arc::new(PageGenerator::new(procedures, config.clone())),
        Arc::new(PageCache::new(&config)),
        Arc::new(SessionDirectory::new(sessions, store)),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, build_router(state).into_make_service())
            .await
            .expect("server");
    });
    addr
}

#[tokio::test]
async fn client_boots_from_page_and_posts_over_the_wire() {
    let addr = spawn_server().await;
    let transport =
        Arc::new(HttpTransport::new(&format!("http://{addr}"), Some(SESSION.to_string())).expect("site"));

    let (status, html) = transport.fetch_page("/").await.expect("feed page");
    assert_eq!(status, 200);

    let bridge = HydrationBridge::new(CacheConfig::default());
    let app = ClientApp::boot(&bridge, transport.clone(), &html).expect("boot");
    let props: FeedProps = app.props().expect("props");
    assert_eq!(
        props.viewer.map(|viewer| viewer.username).as_deref(),
        Some("carol")
    );

    let feed = app.client().subscribe::<GetAll>(&()).expect("subscribe");
    assert_eq!(feed.state::<Vec<chirp_api_types::PostWithAuthor>>().data().map(Vec::len), Some(0));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut composer = PostComposer::new(app.client().clone(), tx);
    let SubmitOutcome::Posted { post, invalidation } = composer.submit_post("🌱").await else {
        panic!("post should succeed");
    };
    assert_eq!(post.author_id, "user_carol");
    assert_eq!(invalidation.affected, vec![("query_cache", 1)]);

    let posts = app.client().read::<GetAll>(&()).into_data().expect("feed refetched");
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].post.content, "🌱");
    assert!(rx.try_recv().is_err());

    let (status, profile) = transport.fetch_page("/@carol").await.expect("profile page");
    assert_eq!(status, 200);
    assert!(profile.contains("🌱"));
}

#[tokio::test]
async fn rejected_post_surfaces_field_message() {
    let addr = spawn_server().await;
    let transport =
        Arc::new(HttpTransport::new(&format!("http://{addr}"), Some(SESSION.to_string())).expect("site"));
    let (_, html) = transport.fetch_page("/").await.expect("feed page");
    let bridge = HydrationBridge::new(CacheConfig::default());
    let app = ClientApp::boot(&bridge, transport, &html).expect("boot");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut composer = PostComposer::new(app.client().clone(), tx);
    let outcome = composer.submit_post("   ").await;

    assert_eq!(outcome, SubmitOutcome::Failed);
    assert_eq!(composer.input(), "   ");
    let notification = rx.try_recv().expect("notification");
    assert!(!notification.message.is_empty());
    assert!(notification.error.field_errors().is_some());
}
