use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use itemforge::application::compute::{ComputeService, ComputeServiceError};
use itemforge::application::jobs::{
    ComputeError, Computation, DispatchError, Dispatcher, EchoComputation, Job, JobWorkerContext,
    QueueDispatcher, Ticket,
};
use itemforge::application::repos::CacheStore;
use itemforge::domain::cache::{CacheEntry, EntryStatus};
use itemforge::domain::types::JobType;
use itemforge::infra::file_cache::FileCacheStore;
use itemforge::infra::memory::MemoryItemsRepo;
use itemforge::infra::uploads::UploadStorage;
use tempfile::TempDir;
use tokio::sync::Mutex;

const LEASE: Option<Duration> = Some(Duration::from_secs(600));

/// Accepts every job and never runs it.
#[derive(Default)]
struct HoldingDispatcher {
    jobs: Mutex<Vec<Job>>,
}

#[async_trait]
impl Dispatcher for HoldingDispatcher {
    async fn enqueue(&self, job: Job) -> Result<Ticket, DispatchError> {
        let mut jobs = self.jobs.lock().await;
        jobs.push(job);
        Ok(Ticket {
            id: format!("held-{}", jobs.len()),
            job_type: JobType::Compute,
        })
    }
}

struct ClosedDispatcher;

#[async_trait]
impl Dispatcher for ClosedDispatcher {
    async fn enqueue(&self, _job: Job) -> Result<Ticket, DispatchError> {
        Err(DispatchError::Closed)
    }
}

struct FailingComputation;

#[async_trait]
impl Computation for FailingComputation {
    async fn compute(&self, key: &str, _input: &str) -> Result<String, ComputeError> {
        Err(ComputeError::Failed {
            key: key.to_string(),
            message: "boom".to_string(),
        })
    }
}

fn open_store(dir: &TempDir) -> Arc<FileCacheStore> {
    Arc::new(FileCacheStore::open(dir.path().join("local_cache.json")).expect("open store"))
}

fn worker_context(
    dir: &TempDir,
    cache: Arc<dyn CacheStore>,
    computation: Arc<dyn Computation>,
) -> JobWorkerContext {
    JobWorkerContext {
        items: Arc::new(MemoryItemsRepo::new()),
        cache,
        uploads: Arc::new(UploadStorage::new(dir.path().join("uploads")).expect("uploads dir")),
        computation,
    }
}

async fn poll_until_ready(service: &ComputeService, key: &str) -> CacheEntry {
    for _ in 0..200 {
        let entry = service.lookup(key).await.expect("lookup");
        if entry.status == EntryStatus::Ready {
            return entry;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("key `{key}` never became ready");
}

#[tokio::test]
async fn miss_then_compute_then_hit() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_store(&dir);
    let context = worker_context(&dir, cache.clone(), Arc::new(EchoComputation::default()));
    let (dispatcher, pool) = QueueDispatcher::spawn(context, 16, 2, 1);
    let service = ComputeService::new(cache, Arc::new(dispatcher), LEASE);

    let before = service.lookup("demo").await.expect("lookup");
    assert_eq!(before.status, EntryStatus::Absent);
    assert_eq!(before.visible_value(), None);

    let ticket = service
        .request_compute("demo", "MyResult")
        .await
        .expect("compute accepted");
    assert!(!ticket.id.is_empty());

    let entry = poll_until_ready(&service, "demo").await;
    assert_eq!(entry.visible_value(), Some("MyResult"));
    assert!(entry.written_at.is_some());

    pool.shutdown().await;
}

#[tokio::test]
async fn request_marks_key_pending_before_the_worker_runs() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_store(&dir);
    let dispatcher = Arc::new(HoldingDispatcher::default());
    let service = ComputeService::new(cache, dispatcher.clone(), LEASE);

    service
        .request_compute("slow", "value")
        .await
        .expect("compute accepted");

    let entry = service.lookup("slow").await.expect("lookup");
    assert_eq!(entry.status, EntryStatus::Pending);
    assert_eq!(entry.visible_value(), None);
    assert!(entry.pending_since.is_some());
    assert_eq!(dispatcher.jobs.lock().await.len(), 1);
}

#[tokio::test]
async fn resubmission_withdraws_the_old_value_until_recomputed() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_store(&dir);
    cache.put("demo", "old").await.expect("seed value");

    let dispatcher = Arc::new(HoldingDispatcher::default());
    let service = ComputeService::new(cache.clone(), dispatcher, LEASE);

    service
        .request_compute("demo", "new")
        .await
        .expect("compute accepted");
    let pending = service.lookup("demo").await.expect("lookup");
    assert_eq!(pending.status, EntryStatus::Pending);
    assert_eq!(pending.visible_value(), None);

    cache.put("demo", "new").await.expect("worker write");
    let ready = service.lookup("demo").await.expect("lookup");
    assert_eq!(ready.visible_value(), Some("new"));
}

#[tokio::test]
async fn expired_pending_entry_reads_as_absent() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_store(&dir);
    cache.mark_pending("stuck").await.expect("mark pending");

    let dispatcher = Arc::new(HoldingDispatcher::default());
    let expiring = ComputeService::new(cache.clone(), dispatcher.clone(), Some(Duration::ZERO));
    assert_eq!(
        expiring.lookup("stuck").await.expect("lookup").status,
        EntryStatus::Absent
    );

    let unbounded = ComputeService::new(cache, dispatcher, None);
    assert_eq!(
        unbounded.lookup("stuck").await.expect("lookup").status,
        EntryStatus::Pending
    );
}

#[tokio::test]
async fn failed_computation_leaves_key_pending() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_store(&dir);
    let context = worker_context(&dir, cache.clone(), Arc::new(FailingComputation));
    let (dispatcher, pool) = QueueDispatcher::spawn(context, 4, 1, 1);
    let service = ComputeService::new(cache, Arc::new(dispatcher), LEASE);

    service
        .request_compute("broken", "input")
        .await
        .expect("compute accepted");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let entry = service.lookup("broken").await.expect("lookup");
    assert_eq!(entry.status, EntryStatus::Pending);
    pool.shutdown().await;
}

#[tokio::test]
async fn dispatch_failure_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let service = ComputeService::new(open_store(&dir), Arc::new(ClosedDispatcher), LEASE);

    let err = service
        .request_compute("demo", "value")
        .await
        .expect_err("closed queue");
    assert!(matches!(err, ComputeServiceError::Dispatch(DispatchError::Closed)));
}

#[tokio::test]
async fn blank_keys_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let service = ComputeService::new(
        open_store(&dir),
        Arc::new(HoldingDispatcher::default()),
        LEASE,
    );

    let err = service.lookup("   ").await.expect_err("blank key");
    assert!(matches!(err, ComputeServiceError::Validation(_)));
}

#[tokio::test]
async fn lease_beyond_the_date_range_keeps_the_key_pending() {
    let dir = TempDir::new().expect("tempdir");
    let cache = open_store(&dir);
    let service = ComputeService::new(
        cache.clone(),
        Arc::new(HoldingDispatcher::default()),
        Some(Duration::from_secs(u64::MAX / 2)),
    );

    cache.mark_pending("demo").await.expect("mark pending");
    let entry = service.lookup("demo").await.expect("lookup");
    assert_eq!(entry.status, EntryStatus::Pending);
}
