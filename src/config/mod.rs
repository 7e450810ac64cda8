//! Settings for the chirp server.
//!
//! Sources, lowest precedence first: `config/default.toml`, `chirp.toml`, an
//! explicit `--config-file`, `CHIRP__*` environment variables, then `serve`
//! flags.

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::domain::{entities::UserRecord, slug::is_valid_username};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "chirp";
const ENV_PREFIX: &str = "CHIRP";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_QUERY_ENTRY_LIMIT: u64 = 1_000;
const DEFAULT_PAGE_LIMIT: u64 = 200;
const DEFAULT_MIN_CHARS: u64 = 1;
const DEFAULT_MAX_CHARS: u64 = 280;
const DEFAULT_FEED_LIMIT: u64 = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_RATE_LIMIT_MAX_POSTS: u64 = 3;

/// Command-line arguments for the Chirp server.
#[derive(Debug, Parser)]
#[command(name = "chirp", version, about = "Chirp feed server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CHIRP_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP server.
    Serve(Box<ServeArgs>),
    /// Print the profile paths generated ahead of time and exit.
    #[command(name = "paths")]
    Paths,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the per-cache query entry ceiling.
    #[arg(long = "cache-query-entry-limit", value_name = "COUNT")]
    pub cache_query_entry_limit: Option<u64>,

    /// Toggle caching of rendered profile pages.
    #[arg(
        long = "cache-enable-page-cache",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub cache_enable_page_cache: Option<bool>,

    /// Override the rendered page ceiling.
    #[arg(long = "cache-page-limit", value_name = "COUNT")]
    pub cache_page_limit: Option<u64>,

    /// Override the maximum post length in characters.
    #[arg(long = "posts-max-chars", value_name = "COUNT")]
    pub posts_max_chars: Option<u64>,

    /// Override the number of posts shown in feeds.
    #[arg(long = "posts-feed-limit", value_name = "COUNT")]
    pub posts_feed_limit: Option<u64>,

    /// Override the post rate limit window size.
    #[arg(long = "rate-limit-window-seconds", value_name = "SECONDS")]
    pub rate_limit_window_seconds: Option<u64>,

    /// Override the number of posts allowed per window.
    #[arg(long = "rate-limit-max-posts", value_name = "COUNT")]
    pub rate_limit_max_posts: Option<u64>,
}

/// Validated settings the server starts from.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub cache: CacheSettings,
    pub posts: PostSettings,
    pub rate_limit: RateLimitSettings,
    pub identity: IdentitySettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub query_entry_limit: NonZeroUsize,
    pub enable_page_cache: bool,
    pub page_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct PostSettings {
    pub min_chars: usize,
    pub max_chars: NonZeroUsize,
    pub feed_limit: NonZeroUsize,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_posts: NonZeroU32,
}

impl RateLimitSettings {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds.get().into())
    }
}

/// Users known to the server, with the session token each signs in with.
#[derive(Debug, Clone, Default)]
pub struct IdentitySettings {
    pub users: Vec<SeedUser>,
}

#[derive(Debug, Clone)]
pub struct SeedUser {
    pub record: UserRecord,
    pub session: Option<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Resolve settings for already-parsed arguments.
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Paths) | None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    cache: RawCacheSettings,
    posts: RawPostSettings,
    rate_limit: RawRateLimitSettings,
    identity: RawIdentitySettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(limit) = overrides.cache_query_entry_limit {
            self.cache.query_entry_limit = Some(limit);
        }
        if let Some(enabled) = overrides.cache_enable_page_cache {
            self.cache.enable_page_cache = Some(enabled);
        }
        if let Some(limit) = overrides.cache_page_limit {
            self.cache.page_limit = Some(limit);
        }
        if let Some(max) = overrides.posts_max_chars {
            self.posts.max_chars = Some(max);
        }
        if let Some(limit) = overrides.posts_feed_limit {
            self.posts.feed_limit = Some(limit);
        }
        if let Some(window) = overrides.rate_limit_window_seconds {
            self.rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.rate_limit_max_posts {
            self.rate_limit.max_posts = Some(max);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            cache,
            posts,
            rate_limit,
            identity,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            cache: build_cache_settings(cache)?,
            posts: build_post_settings(posts)?,
            rate_limit: build_rate_limit_settings(rate_limit)?,
            identity: build_identity_settings(identity)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let query_entry_limit = non_zero_usize(
        cache.query_entry_limit.unwrap_or(DEFAULT_QUERY_ENTRY_LIMIT),
        "cache.query_entry_limit",
    )?;
    let page_limit = non_zero_usize(
        cache.page_limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        "cache.page_limit",
    )?;

    Ok(CacheSettings {
        query_entry_limit,
        enable_page_cache: cache.enable_page_cache.unwrap_or(true),
        page_limit,
    })
}

fn build_post_settings(posts: RawPostSettings) -> Result<PostSettings, LoadError> {
    let min_chars = posts.min_chars.unwrap_or(DEFAULT_MIN_CHARS);
    let max_chars = non_zero_usize(
        posts.max_chars.unwrap_or(DEFAULT_MAX_CHARS),
        "posts.max_chars",
    )?;
    if min_chars > max_chars.get() as u64 {
        return Err(LoadError::invalid(
            "posts.min_chars",
            "must not exceed posts.max_chars",
        ));
    }
    let min_chars = usize::try_from(min_chars)
        .map_err(|_| LoadError::invalid("posts.min_chars", "value exceeds supported range"))?;

    let feed_limit = non_zero_usize(
        posts.feed_limit.unwrap_or(DEFAULT_FEED_LIMIT),
        "posts.feed_limit",
    )?;

    Ok(PostSettings {
        min_chars,
        max_chars,
        feed_limit,
    })
}

fn build_rate_limit_settings(
    rate_limit: RawRateLimitSettings,
) -> Result<RateLimitSettings, LoadError> {
    let window_seconds = non_zero_u32(
        rate_limit
            .window_seconds
            .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        "rate_limit.window_seconds",
    )?;
    let max_posts = non_zero_u32(
        rate_limit.max_posts.unwrap_or(DEFAULT_RATE_LIMIT_MAX_POSTS),
        "rate_limit.max_posts",
    )?;

    Ok(RateLimitSettings {
        window_seconds,
        max_posts,
    })
}

fn build_identity_settings(identity: RawIdentitySettings) -> Result<IdentitySettings, LoadError> {
    let mut users = Vec::with_capacity(identity.users.len());
    for raw in identity.users {
        if raw.id.trim().is_empty() {
            return Err(LoadError::invalid("identity.users.id", "must not be empty"));
        }
        if !is_valid_username(&raw.username) {
            return Err(LoadError::invalid(
                "identity.users.username",
                format!("`{}` is not a valid username", raw.username),
            ));
        }

        if users
            .iter()
            .any(|seed: &SeedUser| seed.record.id == raw.id || seed.record.username == raw.username)
        {
            return Err(LoadError::invalid(
                "identity.users",
                format!("duplicate user `{}`", raw.username),
            ));
        }

        let profile_image_url = raw
            .profile_image_url
            .unwrap_or_else(|| format!("https://avatars.chirp.invalid/{}.png", raw.username));
        users.push(SeedUser {
            record: UserRecord {
                id: raw.id,
                username: raw.username,
                profile_image_url,
            },
            session: raw.session.filter(|token| !token.trim().is_empty()),
        });
    }
    Ok(IdentitySettings { users })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    query_entry_limit: Option<u64>,
    enable_page_cache: Option<bool>,
    page_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPostSettings {
    min_chars: Option<u64>,
    max_chars: Option<u64>,
    feed_limit: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRateLimitSettings {
    window_seconds: Option<u64>,
    max_posts: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIdentitySettings {
    users: Vec<RawSeedUser>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawSeedUser {
    id: String,
    username: String,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    session: Option<String>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value: usize = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

/// Parse process arguments and resolve settings from them.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[cfg(test)]
mod tests;
