//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CacheArgs, CacheCommand, CacheOverrides, CliArgs, Command, DatabaseOverride, ServeArgs,
    ServeOverrides, WorkerArgs,
};

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::jobs::sweep_schedule;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "itemforge";
const ENV_PREFIX: &str = "ITEMFORGE";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_FILE: &str = "local_cache.json";
const DEFAULT_PENDING_LEASE_SECS: u64 = 600;
const MAX_PENDING_LEASE_SECS: u64 = 365 * 24 * 60 * 60;
const DEFAULT_QUEUE_CAPACITY: u32 = 1024;
const DEFAULT_COMPUTE_CONCURRENCY: u32 = 4;
const DEFAULT_IMAGE_CONCURRENCY: u32 = 2;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_SWEEP_SCHEDULE: &str = "0 */5 * * * *";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 10 * 1024 * 1024;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub jobs: JobsSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    File,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub file_path: PathBuf,
    /// `None` when pending entries never expire.
    pub pending_lease: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobsBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone)]
pub struct JobsSettings {
    pub backend: JobsBackend,
    pub embedded_workers: bool,
    pub queue_capacity: NonZeroU32,
    pub compute_concurrency: NonZeroU32,
    pub image_concurrency: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub compute_delay: Duration,
    pub sweep_schedule: String,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub directory: PathBuf,
    pub max_request_bytes: NonZeroU64,
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

/// Load settings using the configured precedence (file → environment → CLI).
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
        Some(Command::Worker(args)) => raw.apply_worker_overrides(args),
        Some(Command::Cache(args)) => {
            raw.apply_database_override(&args.database);
            raw.apply_cache_overrides(&args.overrides);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    cache: RawCacheSettings,
    jobs: RawJobsSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_database_override(&overrides.database);
        self.apply_cache_overrides(&overrides.cache);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(backend) = overrides.jobs_backend.as_ref() {
            self.jobs.backend = Some(backend.clone());
        }
        if let Some(embedded) = overrides.jobs_embedded_workers {
            self.jobs.embedded_workers = Some(embedded);
        }
        if let Some(value) = overrides.jobs_compute_concurrency {
            self.jobs.compute_concurrency = Some(value);
        }
        if let Some(value) = overrides.jobs_image_concurrency {
            self.jobs.image_concurrency = Some(value);
        }
        if let Some(delay) = overrides.jobs_compute_delay_ms {
            self.jobs.compute_delay_ms = Some(delay);
        }
        if let Some(directory) = overrides.uploads_directory.as_ref() {
            self.uploads.directory = Some(directory.clone());
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
    }

    fn apply_worker_overrides(&mut self, args: &WorkerArgs) {
        self.apply_database_override(&args.database);
        self.apply_cache_overrides(&args.cache);

        if let Some(value) = args.jobs_compute_concurrency {
            self.jobs.compute_concurrency = Some(value);
        }
        if let Some(value) = args.jobs_image_concurrency {
            self.jobs.image_concurrency = Some(value);
        }
    }

    fn apply_database_override(&mut self, overrides: &DatabaseOverride) {
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if let Some(backend) = overrides.cache_backend.as_ref() {
            self.cache.backend = Some(backend.clone());
        }
        if let Some(path) = overrides.cache_file_path.as_ref() {
            self.cache.file_path = Some(path.clone());
        }
        if let Some(seconds) = overrides.cache_pending_lease_seconds {
            self.cache.pending_lease_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            cache,
            jobs,
            uploads,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let database = build_database_settings(database)?;
        let cache = build_cache_settings(cache)?;
        let jobs = build_jobs_settings(jobs)?;
        let uploads = build_upload_settings(uploads)?;

        if database.url.is_none() {
            if cache.backend == CacheBackend::Postgres {
                return Err(LoadError::invalid(
                    "cache.backend",
                    "the postgres backend requires database.url",
                ));
            }
            if jobs.backend == JobsBackend::Postgres {
                return Err(LoadError::invalid(
                    "jobs.backend",
                    "the postgres backend requires database.url",
                ));
            }
        }

        Ok(Self {
            server,
            logging,
            database,
            cache,
            jobs,
            uploads,
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

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
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

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = database.url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let max_connections = non_zero_u32(
        database
            .max_connections
            .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS)
            .into(),
        "database.max_connections",
    )?;

    Ok(DatabaseSettings {
        url,
        max_connections,
    })
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let backend = match cache.backend.as_deref().map(str::trim) {
        None | Some("file") => CacheBackend::File,
        Some("postgres") => CacheBackend::Postgres,
        Some(other) => {
            return Err(LoadError::invalid(
                "cache.backend",
                format!("expected `file` or `postgres`, got `{other}`"),
            ));
        }
    };

    let file_path = cache
        .file_path
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_FILE));
    if file_path.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "cache.file_path",
            "path must not be empty",
        ));
    }

    let lease_secs = cache
        .pending_lease_seconds
        .unwrap_or(DEFAULT_PENDING_LEASE_SECS);
    if lease_secs > MAX_PENDING_LEASE_SECS {
        return Err(LoadError::invalid(
            "cache.pending_lease_seconds",
            format!("must be at most {MAX_PENDING_LEASE_SECS} seconds"),
        ));
    }
    let pending_lease = (lease_secs > 0).then(|| Duration::from_secs(lease_secs));

    Ok(CacheSettings {
        backend,
        file_path,
        pending_lease,
    })
}

fn build_jobs_settings(jobs: RawJobsSettings) -> Result<JobsSettings, LoadError> {
    let backend = match jobs.backend.as_deref().map(str::trim) {
        None | Some("memory") => JobsBackend::Memory,
        Some("postgres") => JobsBackend::Postgres,
        Some(other) => {
            return Err(LoadError::invalid(
                "jobs.backend",
                format!("expected `memory` or `postgres`, got `{other}`"),
            ));
        }
    };

    let queue_capacity = non_zero_u32(
        jobs.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY).into(),
        "jobs.queue_capacity",
    )?;
    let compute_concurrency = non_zero_u32(
        jobs.compute_concurrency
            .unwrap_or(DEFAULT_COMPUTE_CONCURRENCY)
            .into(),
        "jobs.compute_concurrency",
    )?;
    let image_concurrency = non_zero_u32(
        jobs.image_concurrency
            .unwrap_or(DEFAULT_IMAGE_CONCURRENCY)
            .into(),
        "jobs.image_concurrency",
    )?;
    let max_attempts = non_zero_u32(
        jobs.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS).into(),
        "jobs.max_attempts",
    )?;

    let sweep_schedule_expr = jobs
        .sweep_schedule
        .unwrap_or_else(|| DEFAULT_SWEEP_SCHEDULE.to_string());
    sweep_schedule(&sweep_schedule_expr)
        .map_err(|reason| LoadError::invalid("jobs.sweep_schedule", reason))?;

    Ok(JobsSettings {
        backend,
        embedded_workers: jobs.embedded_workers.unwrap_or(true),
        queue_capacity,
        compute_concurrency,
        image_concurrency,
        max_attempts,
        compute_delay: Duration::from_millis(jobs.compute_delay_ms.unwrap_or(0)),
        sweep_schedule: sweep_schedule_expr,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let directory = uploads
        .directory
        .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR));

    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings {
        directory,
        max_request_bytes,
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    backend: Option<String>,
    file_path: Option<PathBuf>,
    pending_lease_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawJobsSettings {
    backend: Option<String>,
    embedded_workers: Option<bool>,
    queue_capacity: Option<u32>,
    compute_concurrency: Option<u32>,
    image_concurrency: Option<u32>,
    max_attempts: Option<u32>,
    compute_delay_ms: Option<u64>,
    sweep_schedule: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    directory: Option<PathBuf>,
    max_request_bytes: Option<u64>,
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

#[cfg(test)]
mod tests;
