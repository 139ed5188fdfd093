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
fn defaults_use_file_cache_and_memory_queue() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.cache.backend, CacheBackend::File);
    assert_eq!(settings.cache.file_path, PathBuf::from(DEFAULT_CACHE_FILE));
    assert_eq!(
        settings.cache.pending_lease,
        Some(Duration::from_secs(DEFAULT_PENDING_LEASE_SECS))
    );
    assert_eq!(settings.jobs.backend, JobsBackend::Memory);
    assert_eq!(settings.jobs.max_attempts.get(), DEFAULT_MAX_ATTEMPTS);
    assert!(settings.jobs.embedded_workers);
    assert_eq!(
        settings.uploads.max_request_bytes.get(),
        DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
    );
}

#[test]
fn zero_lease_disables_expiry() {
    let mut raw = RawSettings::default();
    raw.cache.pending_lease_seconds = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.pending_lease, None);
}

#[test]
fn oversized_lease_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.pending_lease_seconds = Some(u64::MAX / 2);

    let err = Settings::from_raw(raw).expect_err("lease out of range");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.pending_lease_seconds",
            ..
        }
    ));
}

#[test]
fn postgres_backends_require_database_url() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("postgres".to_string());
    let err = Settings::from_raw(raw).expect_err("missing url");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));

    let mut raw = RawSettings::default();
    raw.jobs.backend = Some("postgres".to_string());
    let err = Settings::from_raw(raw).expect_err("missing url");
    assert!(matches!(err, LoadError::Invalid { key: "jobs.backend", .. }));

    let mut raw = RawSettings::default();
    raw.database.url = Some("postgres://example".to_string());
    raw.cache.backend = Some("postgres".to_string());
    raw.jobs.backend = Some("postgres".to_string());
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.backend, CacheBackend::Postgres);
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());
    let err = Settings::from_raw(raw).expect_err("unknown backend");
    assert!(matches!(err, LoadError::Invalid { key: "cache.backend", .. }));
}

#[test]
fn malformed_sweep_schedule_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.sweep_schedule = Some("sometimes".to_string());
    let err = Settings::from_raw(raw).expect_err("bad cron");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "jobs.sweep_schedule",
            ..
        }
    ));
}

#[test]
fn zero_concurrency_is_rejected() {
    let mut raw = RawSettings::default();
    raw.jobs.compute_concurrency = Some(0);
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
    let args = CliArgs::parse_from(["itemforge"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "itemforge",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--database-url",
        "postgres://override",
        "--cache-backend",
        "postgres",
        "--jobs-embedded-workers",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.database.database_url.as_deref(),
                Some("postgres://override")
            );
            assert_eq!(serve.overrides.cache.cache_backend.as_deref(), Some("postgres"));
            assert_eq!(serve.overrides.jobs_embedded_workers, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_cache_put_arguments() {
    let args = CliArgs::parse_from([
        "itemforge",
        "cache",
        "--cache-file-path",
        "/tmp/cache.json",
        "put",
        "demo",
        "MyResult",
    ]);

    match args.command.expect("cache command") {
        Command::Cache(cache) => {
            assert_eq!(
                cache.overrides.cache_file_path.as_deref(),
                Some(std::path::Path::new("/tmp/cache.json"))
            );
            match cache.command {
                CacheCommand::Put { key, value } => {
                    assert_eq!(key, "demo");
                    assert_eq!(value, "MyResult");
                }
                other => panic!("wrong cache command parsed: {other:?}"),
            }
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_cache_mark_pending_arguments() {
    let args = CliArgs::parse_from(["itemforge", "cache", "mark-pending", "demo"]);

    match args.command.expect("cache command") {
        Command::Cache(cache) => {
            assert!(matches!(cache.command, CacheCommand::MarkPending { key } if key == "demo"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_worker_arguments() {
    let args = CliArgs::parse_from([
        "itemforge",
        "worker",
        "--database-url",
        "postgres://example",
        "--jobs-compute-concurrency",
        "8",
    ]);

    match args.command.expect("worker command") {
        Command::Worker(worker) => {
            assert_eq!(
                worker.database.database_url.as_deref(),
                Some("postgres://example")
            );
            assert_eq!(worker.jobs_compute_concurrency, Some(8));
        }
        _ => panic!("wrong command parsed"),
    }
}
