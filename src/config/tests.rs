use clap::Parser;

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
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert!(settings.database.url.is_none());
    assert_eq!(settings.feed.default_page_size.get(), DEFAULT_FEED_PAGE_SIZE);
    assert_eq!(settings.client.max_cached_feeds.get(), 32);
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn blank_database_url_means_in_memory() {
    let mut raw = RawSettings::default();
    raw.database.url = Some("   ".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(settings.database.url.is_none());
}

#[test]
fn page_sizes_are_bounded() {
    let mut raw = RawSettings::default();
    raw.feed.default_page_size = Some(0);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "feed.default_page_size",
            ..
        })
    ));

    let mut raw = RawSettings::default();
    raw.client.page_size = Some(MAX_PAGE_SIZE + 1);
    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            key: "client.page_size",
            ..
        })
    ));
}

#[test]
fn zero_cached_feeds_is_rejected() {
    let mut raw = RawSettings::default();
    raw.client.max_cached_feeds = Some(0);
    assert!(Settings::from_raw(raw).is_err());
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
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["feedline"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "feedline",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--feed-page-size",
        "20",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.feed_page_size, Some(20));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_feed_arguments() {
    let args = CliArgs::parse_from([
        "feedline",
        "feed",
        "--site",
        "http://127.0.0.1:3000",
        "--token",
        "secret",
        "--pages",
        "3",
        "--page-size",
        "5",
    ]);

    let Some(Command::Feed(feed)) = args.command else {
        panic!("wrong command parsed");
    };
    assert_eq!(feed.site, "http://127.0.0.1:3000");
    assert_eq!(feed.feed, "global");
    assert_eq!(feed.pages, 3);

    let mut raw = RawSettings::default();
    raw.apply_feed_overrides(&feed);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.client.page_size.get(), 5);
}
