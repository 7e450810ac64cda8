//! chirp-client: boots from a rendered page and resumes its query cache.

mod args;

use std::process;
use std::sync::Arc;

use chirp::application::error::RpcError;
use chirp::application::pages::ProfileProps;
use chirp::cache::HydrationBridge;
use chirp::client::{BootError, ClientApp, HttpTransport, PostComposer, SubmitOutcome, TransportError};
use chirp::presentation::views::relative_time;
use chirp_api_types::PostWithAuthor;
use chirp_api_types::procedures::posts::{GetAll, GetPostsByUserId, GetPostsByUserIdInput};
use chirp_api_types::procedures::profile::{GetUserByUsername, GetUserByUsernameInput};
use clap::Parser;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use args::{Cli, Commands};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("failed to resume page: {0}")]
    Boot(#[from] BootError),
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    Rejected(String),
}

#[tokio::main]
async fn main() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .compact()
        .try_init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let transport = Arc::new(HttpTransport::new(&cli.site, cli.session.clone())?);

    match cli.command {
        Commands::Feed => {
            let app = boot(&transport, "/").await?;
            let feed = app.client().query::<GetAll>(&()).await.into_result()?;
            print_posts(&feed, "No posts yet");
        }
        Commands::Profile { slug } => {
            let app = boot(&transport, &format!("/{slug}")).await?;
            let props: ProfileProps = app.props()?;
            let author = app
                .client()
                .query::<GetUserByUsername>(&GetUserByUsernameInput {
                    username: props.username,
                })
                .await
                .into_result()?;
            let posts = app
                .client()
                .query::<GetPostsByUserId>(&GetPostsByUserIdInput {
                    user_id: author.id.clone(),
                })
                .await
                .into_result()?;
            println!("@{}", author.username);
            print_posts(&posts, "User has not posted");
        }
        Commands::Post { content } => {
            let app = boot(&transport, "/").await?;
            let _feed = app.client().subscribe::<GetAll>(&())?;

            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut composer = PostComposer::new(app.client().clone(), tx);
            match composer.submit_post(content).await {
                SubmitOutcome::Posted { post, .. } => {
                    println!("posted {}", post.id);
                    if let Some(feed) = app.client().read::<GetAll>(&()).into_data() {
                        print_posts(&feed, "No posts yet");
                    }
                }
                SubmitOutcome::Failed => {
                    let message = rx
                        .try_recv()
                        .map(|notification| notification.message)
                        .unwrap_or_else(|_| chirp::client::GENERIC_FAILURE.to_string());
                    return Err(CliError::Rejected(message));
                }
            }
        }
    }
    Ok(())
}

async fn boot(transport: &Arc<HttpTransport>, path: &str) -> Result<ClientApp, CliError> {
    let (status, html) = transport.fetch_page(path).await?;
    if status == 404 {
        return Err(CliError::NotFound(path.trim_start_matches('/').to_string()));
    }
    Ok(ClientApp::boot(
        HydrationBridge::global(),
        transport.clone(),
        &html,
    )?)
}

fn print_posts(posts: &[PostWithAuthor], empty: &str) {
    if posts.is_empty() {
        println!("{empty}");
        return;
    }
    let now = OffsetDateTime::now_utc();
    for item in posts {
        println!(
            "@{} · {}\n  {}",
            item.author.username,
            relative_time(item.post.created_at, now),
            item.post.content
        );
    }
}
