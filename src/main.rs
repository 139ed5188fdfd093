use std::{future::IntoFuture, process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use itemforge::{
    application::{
        compute::ComputeService,
        error::AppError,
        items::ItemService,
        jobs::{
            Dispatcher, EchoComputation, JobWorkerContext, QueueDispatcher, SweepPendingContext,
            WorkerPool, process_compute_job, process_inspect_image_job, process_sweep_pending_job,
            sweep_schedule,
        },
        repos::{CacheStore, ItemsRepo},
    },
    config::{self, CacheBackend, CacheCommand, JobsBackend},
    domain::{cache::validate_key, types::JobType},
    infra::{
        db::{PostgresDispatcher, PostgresRepositories},
        error::InfraError,
        file_cache::FileCacheStore,
        http::{self, AppState},
        memory::MemoryItemsRepo,
        telemetry,
        uploads::UploadStorage,
    },
};
use time::OffsetDateTime;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
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
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Worker(_) => run_worker(settings).await,
        config::Command::Cache(args) => run_cache_command(settings, args.command).await,
    }
}

/// Adapters shared by every command that touches items or the cache.
struct Runtime {
    repositories: Option<Arc<PostgresRepositories>>,
    items: Arc<dyn ItemsRepo>,
    cache: Arc<dyn CacheStore>,
    uploads: Arc<UploadStorage>,
}

impl Runtime {
    async fn init(settings: &config::Settings) -> Result<Self, AppError> {
        let repositories = init_repositories(settings).await?;

        let items: Arc<dyn ItemsRepo> = match repositories.as_ref() {
            Some(repositories) => repositories.clone(),
            None => {
                warn!(
                    target = "itemforge::bootstrap",
                    "database.url is not configured; items are kept in memory"
                );
                Arc::new(MemoryItemsRepo::new())
            }
        };
        let cache = init_cache_store(settings, repositories.as_ref())?;
        let uploads = Arc::new(
            UploadStorage::new(settings.uploads.directory.clone()).map_err(InfraError::from)?,
        );

        Ok(Self {
            repositories,
            items,
            cache,
            uploads,
        })
    }

    fn job_context(&self, settings: &config::Settings) -> JobWorkerContext {
        JobWorkerContext {
            items: self.items.clone(),
            cache: self.cache.clone(),
            uploads: self.uploads.clone(),
            computation: Arc::new(EchoComputation::new(settings.jobs.compute_delay)),
        }
    }

    fn require_postgres(&self, purpose: &str) -> Result<Arc<PostgresRepositories>, AppError> {
        self.repositories.clone().ok_or_else(|| {
            AppError::from(InfraError::configuration(format!(
                "{purpose} requires database.url"
            )))
        })
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Option<Arc<PostgresRepositories>>, AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        return Ok(None);
    };

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Some(Arc::new(PostgresRepositories::new(pool))))
}

fn init_cache_store(
    settings: &config::Settings,
    repositories: Option<&Arc<PostgresRepositories>>,
) -> Result<Arc<dyn CacheStore>, AppError> {
    match settings.cache.backend {
        CacheBackend::File => {
            let store = FileCacheStore::open(settings.cache.file_path.clone())?;
            info!(
                target = "itemforge::bootstrap",
                path = %store.path().display(),
                "Using file cache store"
            );
            Ok(Arc::new(store))
        }
        CacheBackend::Postgres => {
            let repositories = repositories.cloned().ok_or_else(|| {
                AppError::from(InfraError::configuration(
                    "the postgres cache backend requires database.url",
                ))
            })?;
            info!(target = "itemforge::bootstrap", "Using postgres cache store");
            Ok(repositories)
        }
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let runtime = Runtime::init(&settings).await?;
    let job_context = runtime.job_context(&settings);

    let (dispatcher, worker_pool): (Arc<dyn Dispatcher>, Option<WorkerPool>) =
        match settings.jobs.backend {
            JobsBackend::Memory => {
                let workers = settings.jobs.compute_concurrency.get() as usize
                    + settings.jobs.image_concurrency.get() as usize;
                let (dispatcher, pool) = QueueDispatcher::spawn(
                    job_context.clone(),
                    settings.jobs.queue_capacity.get() as usize,
                    workers,
                    settings.jobs.max_attempts.get(),
                );
                (Arc::new(dispatcher), Some(pool))
            }
            JobsBackend::Postgres => {
                let repositories = runtime.require_postgres("the postgres job backend")?;
                let dispatcher =
                    PostgresDispatcher::new(repositories, settings.jobs.max_attempts.get());
                (Arc::new(dispatcher), None)
            }
        };

    let queue_workers = settings.jobs.backend == JobsBackend::Postgres
        && settings.jobs.embedded_workers;
    let monitor = build_monitor(&runtime, job_context, &settings, queue_workers)?;
    let monitor_handle = monitor.map(|monitor| {
        tokio::spawn(async move {
            if let Err(err) = monitor.run().await {
                error!(error = %err, "job monitor stopped");
            }
        })
    });

    let state = AppState {
        items: Arc::new(ItemService::new(
            runtime.items.clone(),
            runtime.uploads.clone(),
            dispatcher.clone(),
        )),
        compute: Arc::new(ComputeService::new(
            runtime.cache.clone(),
            dispatcher,
            settings.cache.pending_lease,
        )),
    };

    let result = serve_http(&settings, state).await;

    if let Some(handle) = monitor_handle {
        handle.abort();
        let _ = handle.await;
    }
    if let Some(pool) = worker_pool {
        pool.shutdown().await;
    }

    result
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    if settings.jobs.backend != JobsBackend::Postgres {
        return Err(AppError::validation(
            "the worker command requires jobs.backend = \"postgres\"",
        ));
    }

    let runtime = Runtime::init(&settings).await?;
    let job_context = runtime.job_context(&settings);
    let monitor = build_monitor(&runtime, job_context, &settings, true)?
        .ok_or_else(|| AppError::unexpected("no workers configured"))?;

    info!(
        target = "itemforge::worker",
        compute_concurrency = settings.jobs.compute_concurrency.get(),
        image_concurrency = settings.jobs.image_concurrency.get(),
        "Starting job workers"
    );

    tokio::select! {
        result = monitor.run() => {
            result.map_err(|err| AppError::from(InfraError::jobs(err.to_string())))
        }
        _ = shutdown_signal() => {
            info!(target = "itemforge::worker", "Shutdown requested; stopping workers");
            Ok(())
        }
    }
}

async fn run_cache_command(
    settings: config::Settings,
    command: CacheCommand,
) -> Result<(), AppError> {
    let repositories = match settings.cache.backend {
        CacheBackend::Postgres => init_repositories(&settings).await?,
        CacheBackend::File => None,
    };
    let cache = init_cache_store(&settings, repositories.as_ref())?;

    let entry = match command {
        CacheCommand::Get { key } => {
            validate_key(&key)?;
            cache
                .get(&key)
                .await?
                .resolve(OffsetDateTime::now_utc(), settings.cache.pending_lease)
        }
        CacheCommand::Put { key, value } => {
            validate_key(&key)?;
            cache.put(&key, &value).await?
        }
        CacheCommand::MarkPending { key } => {
            validate_key(&key)?;
            cache.mark_pending(&key).await?
        }
    };

    let rendered = serde_json::to_string_pretty(&entry)
        .map_err(|err| AppError::unexpected(format!("failed to render entry: {err}")))?;
    println!("{rendered}");
    Ok(())
}

/// Register the apalis workers this process should run.
///
/// Queue workers consume the Postgres job tables; the sweep worker runs
/// whenever pending entries carry a lease.
fn build_monitor(
    runtime: &Runtime,
    context: JobWorkerContext,
    settings: &config::Settings,
    queue_workers: bool,
) -> Result<Option<Monitor>, AppError> {
    let jobs = &settings.jobs;
    let mut monitor = Monitor::new();
    let mut registered = false;

    if queue_workers {
        let repositories = runtime.require_postgres("the postgres job backend")?;

        let compute_storage = PostgresStorage::new_with_config(
            repositories.pool().clone(),
            ApalisSqlConfig::new(JobType::Compute.as_str()),
        );
        let inspect_storage = PostgresStorage::new_with_config(
            repositories.pool().clone(),
            ApalisSqlConfig::new(JobType::InspectImage.as_str()),
        );

        let compute_worker = WorkerBuilder::new("compute-worker")
            .concurrency(jobs.compute_concurrency.get() as usize)
            .data(context.clone())
            .backend(compute_storage)
            .build_fn(process_compute_job);
        let inspect_worker = WorkerBuilder::new("inspect-image-worker")
            .concurrency(jobs.image_concurrency.get() as usize)
            .data(context)
            .backend(inspect_storage)
            .build_fn(process_inspect_image_job);

        monitor = monitor.register(compute_worker).register(inspect_worker);
        registered = true;
    }

    if let Some(lease) = settings.cache.pending_lease {
        let schedule = sweep_schedule(&jobs.sweep_schedule).map_err(AppError::validation)?;
        let sweep_worker = WorkerBuilder::new("sweep-pending-worker")
            .data(SweepPendingContext {
                cache: runtime.cache.clone(),
                lease,
            })
            .backend(CronStream::new(schedule))
            .build_fn(process_sweep_pending_job);

        monitor = monitor.register(sweep_worker);
        registered = true;
    }

    Ok(registered.then_some(monitor))
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let body_limit = settings.uploads.max_request_bytes.get() as usize;
    let router = http::build_router(state, body_limit);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "itemforge::http",
        addr = %settings.server.addr,
        "Listening"
    );

    let shutdown = Arc::new(Notify::new());
    let signalled = shutdown.clone();
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            signalled.notify_one();
        },
    );

    let grace = settings.server.graceful_shutdown;
    tokio::select! {
        result = server.into_future() => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))
        }
        _ = async {
            shutdown.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "itemforge::http",
                grace_seconds = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
