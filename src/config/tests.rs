use super::*;

fn site(locale: &str, url: &str) -> RawSiteSettings {
    RawSiteSettings {
        locale: locale.to_string(),
        url: url.to_string(),
    }
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.cache.directory = Some("/srv/from-file".to_string());
    raw.logging.level = Some("info".to_string());

    let overrides = GlobalOverrides {
        cache_directory: Some("/srv/from-cli".to_string()),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.cache.directory.as_deref(), Some("/srv/from-cli"));
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn defaults_are_applied() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert!(settings.cache.directory.is_none());
    assert!(settings.cache.whitelist.is_empty());
    assert_eq!(settings.cache.ttl_minutes, DEFAULT_TTL_MINUTES);
    assert_eq!(settings.cache.file_mode, 0o644);
    assert_eq!(settings.cache.max_body_bytes, 4 * 1024 * 1024);
    assert_eq!(settings.index.max_connections.get(), 4);
    assert!(settings.index.database_url.is_none());
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = GlobalOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn sites_keep_only_the_host() {
    let mut raw = RawSettings::default();
    raw.cache.sites = Some(vec![
        site("en_US", "https://example.com/"),
        site("de_DE", "https://shop.example.de:8443/de"),
    ]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.cache.sites,
        vec![
            SiteSettings {
                locale: "en_US".to_string(),
                host: "example.com".to_string(),
            },
            SiteSettings {
                locale: "de_DE".to_string(),
                host: "shop.example.de".to_string(),
            },
        ]
    );
}

#[test]
fn site_without_valid_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.sites = Some(vec![site("en_US", "not a url")]);

    let err = Settings::from_raw(raw).expect_err("invalid url");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.sites.url",
            ..
        }
    ));
}

#[test]
fn file_mode_is_parsed_as_octal() {
    assert_eq!(parse_file_mode("777").expect("mode"), 0o777);
    assert_eq!(parse_file_mode("0o640").expect("mode"), 0o640);
    assert!(parse_file_mode("999").is_err());
    assert!(parse_file_mode("1777").is_err());
}

#[test]
fn whitelist_entries_are_trimmed() {
    let mut raw = RawSettings::default();
    raw.cache.whitelist = Some(vec![" color ".to_string(), "".to_string(), "size".to_string()]);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.whitelist, vec!["color", "size"]);
}

#[test]
fn zero_body_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_body_bytes = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn parse_clear_arguments() {
    let args = CliArgs::parse_from([
        "pagecache",
        "clear",
        "en",
        "--locale",
        "en_US",
        "--cache-directory",
        "/srv/cache",
    ]);

    assert_eq!(args.overrides.cache_directory.as_deref(), Some("/srv/cache"));
    match args.command {
        Command::Clear(clear) => {
            assert_eq!(clear.subpath.as_deref(), Some("en"));
            assert_eq!(clear.context.locale.as_deref(), Some("en_US"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_resolve_arguments() {
    let args = CliArgs::parse_from([
        "pagecache",
        "resolve",
        "/shop/shoes?color=red",
        "--content-type",
        "application/json",
    ]);

    match args.command {
        Command::Resolve(resolve) => {
            assert_eq!(resolve.uri, "/shop/shoes?color=red");
            assert_eq!(resolve.content_type.as_deref(), Some("application/json"));
            assert!(resolve.context.locale.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_purge_arguments() {
    let args = CliArgs::parse_from(["pagecache", "purge-expired", "--limit", "25"]);
    match args.command {
        Command::PurgeExpired(purge) => assert_eq!(purge.limit, 25),
        _ => panic!("wrong command parsed"),
    }

    let defaults = CliArgs::parse_from(["pagecache", "purge-expired"]);
    match defaults.command {
        Command::PurgeExpired(purge) => assert_eq!(purge.limit, 500),
        _ => panic!("wrong command parsed"),
    }
}
