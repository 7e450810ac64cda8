use std::{collections::HashMap, process, sync::Arc};

use chirp::{
    application::{
        error::AppError, identity::IdentityProvider, pages::PageGenerator,
        procedures::ProcedureRouter, rate_limit::PostRateLimiter,
    },
    cache::{CacheConfig, PageCache},
    config,
    domain::validation::LengthPolicy,
    infra::{
        error::InfraError,
        http::{self, HttpState},
        memory::{InMemoryStore, SessionDirectory},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(|err| {
        InfraError::configuration(format!("failed to load configuration: {err}"))
    })?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    let app = build_application(&settings);
    match command {
        config::Command::Serve(_) => serve_http(&settings, app).await,
        config::Command::Paths => {
            let paths = app.pages.static_profile_paths();
            for path in &paths.paths {
                println!("{path}");
            }
            info!(
                count = paths.paths.len(),
                fallback = ?paths.fallback,
                "Listed pre-generated profile paths"
            );
            Ok(())
        }
    }
}

fn build_application(settings: &config::Settings) -> HttpState {
    let store = Arc::new(InMemoryStore::new(
        settings
            .identity
            .users
            .iter()
            .map(|seed| seed.record.clone()),
    ));
    let sessions: HashMap<String, String> = settings
        .identity
        .users
        .iter()
        .filter_map(|seed| {
            seed.session
                .clone()
                .map(|token| (token, seed.record.id.clone()))
        })
        .collect();

    let policy = LengthPolicy {
        min_chars: settings.posts.min_chars,
        max_chars: settings.posts.max_chars.get(),
    };
    let limiter = PostRateLimiter::new(
        settings.rate_limit.window(),
        settings.rate_limit.max_posts.get(),
    );
    let procedures = Arc::new(ProcedureRouter::new(
        store.clone(),
        store.clone(),
        Arc::new(policy),
        limiter,
        settings.posts.feed_limit.get(),
    ));

    let cache_config = CacheConfig::from(&settings.cache);
    let identity: Arc<dyn IdentityProvider> = Arc::new(SessionDirectory::new(sessions, store));

    info!(
        users = settings.identity.users.len(),
        page_cache = cache_config.enable_page_cache,
        "Application context ready"
    );

    HttpState::new(
        Arc::new(PageGenerator::new(procedures, cache_config.clone())),
        Arc::new(PageCache::new(&cache_config)),
        identity,
    )
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
