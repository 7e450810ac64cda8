use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_match_the_feed_rules() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3000");
    assert_eq!(settings.posts.min_chars, 1);
    assert_eq!(settings.posts.max_chars.get(), 280);
    assert_eq!(settings.posts.feed_limit.get(), 100);
    assert_eq!(settings.rate_limit.max_posts.get(), 3);
    assert_eq!(settings.rate_limit.window(), Duration::from_secs(60));
    assert!(settings.cache.enable_page_cache);
    assert!(settings.identity.users.is_empty());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_limits_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.query_entry_limit = Some(0);
    let err = Settings::from_raw(raw).expect_err("zero limit");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.query_entry_limit",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.rate_limit.max_posts = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn min_chars_cannot_exceed_max() {
    let mut raw = RawSettings::default();
    raw.posts.min_chars = Some(10);
    raw.posts.max_chars = Some(5);
    let err = Settings::from_raw(raw).expect_err("inverted bounds");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "posts.min_chars",
            ..
        }
    ));
}

#[test]
fn seed_users_are_validated() {
    let mut raw = RawSettings::default();
    raw.identity.users = vec![
        RawSeedUser {
            id: "user_alice".to_string(),
            username: "alice".to_string(),
            profile_image_url: None,
            session: Some("tok-alice".to_string()),
        },
        RawSeedUser {
            id: "user_bob".to_string(),
            username: "bob".to_string(),
            profile_image_url: Some("https://img.example/bob.png".to_string()),
            session: Some("  ".to_string()),
        },
    ];
    let settings = Settings::from_raw(raw.clone()).expect("valid users");
    let users = &settings.identity.users;
    assert_eq!(users.len(), 2);
    assert_eq!(users[0].session.as_deref(), Some("tok-alice"));
    assert!(users[0].record.profile_image_url.contains("alice"));
    assert_eq!(users[1].session, None);

    raw.identity.users[1].username = "alice".to_string();
    assert!(Settings::from_raw(raw.clone()).is_err());

    raw.identity.users[1].username = "bad name".to_string();
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "identity.users.username",
            ..
        })
    ));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["chirp"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "chirp",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-enable-page-cache",
        "false",
        "--rate-limit-max-posts",
        "10",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache_enable_page_cache, Some(false));
            assert_eq!(serve.overrides.rate_limit_max_posts, Some(10));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_paths_command() {
    let args = CliArgs::parse_from(["chirp", "paths"]);
    assert!(matches!(args.command, Some(Command::Paths)));
}
