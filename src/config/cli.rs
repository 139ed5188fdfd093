use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the itemforge binary.
#[derive(Debug, Parser)]
#[command(name = "itemforge", version, about = "Item records and compute-then-cache service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "ITEMFORGE_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP service (and embedded workers unless disabled).
    Serve(Box<ServeArgs>),
    /// Run job workers against the Postgres queue without serving HTTP.
    Worker(WorkerArgs),
    /// Inspect or modify cache entries directly.
    Cache(CacheArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Override the cache backend (file|postgres).
    #[arg(long = "cache-backend", value_name = "BACKEND")]
    pub cache_backend: Option<String>,

    /// Override the file store location.
    #[arg(long = "cache-file-path", value_name = "PATH", value_hint = ValueHint::FilePath)]
    pub cache_file_path: Option<PathBuf>,

    /// Override how long a pending entry is honoured (0 disables expiry).
    #[arg(long = "cache-pending-lease-seconds", value_name = "SECONDS")]
    pub cache_pending_lease_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

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

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the job backend (memory|postgres).
    #[arg(long = "jobs-backend", value_name = "BACKEND")]
    pub jobs_backend: Option<String>,

    /// Toggle workers running inside the serve process.
    #[arg(
        long = "jobs-embedded-workers",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub jobs_embedded_workers: Option<bool>,

    /// Override the compute worker concurrency.
    #[arg(long = "jobs-compute-concurrency", value_name = "COUNT")]
    pub jobs_compute_concurrency: Option<u32>,

    /// Override the image inspection worker concurrency.
    #[arg(long = "jobs-image-concurrency", value_name = "COUNT")]
    pub jobs_image_concurrency: Option<u32>,

    /// Override the simulated compute delay in milliseconds.
    #[arg(long = "jobs-compute-delay-ms", value_name = "MILLIS")]
    pub jobs_compute_delay_ms: Option<u64>,

    /// Override the uploads directory.
    #[arg(long = "uploads-directory", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub uploads_directory: Option<PathBuf>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the compute worker concurrency.
    #[arg(long = "jobs-compute-concurrency", value_name = "COUNT")]
    pub jobs_compute_concurrency: Option<u32>,

    /// Override the image inspection worker concurrency.
    #[arg(long = "jobs-image-concurrency", value_name = "COUNT")]
    pub jobs_image_concurrency: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct CacheArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(flatten)]
    pub overrides: CacheOverrides,

    #[command(subcommand)]
    pub command: CacheCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CacheCommand {
    /// Print the entry stored for a key.
    Get {
        #[arg(value_name = "KEY")]
        key: String,
    },
    /// Write a value, making the entry ready.
    Put {
        #[arg(value_name = "KEY")]
        key: String,
        #[arg(value_name = "VALUE")]
        value: String,
    },
    /// Mark a key as pending.
    #[command(name = "mark-pending")]
    MarkPending {
        #[arg(value_name = "KEY")]
        key: String,
    },
}
