use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use itemforge::application::compute::ComputeService;
use itemforge::application::jobs::{EchoComputation, JobWorkerContext, QueueDispatcher};
use itemforge::domain::cache::EntryStatus;
use itemforge::infra::file_cache::FileCacheStore;
use itemforge::infra::memory::MemoryItemsRepo;
use itemforge::infra::uploads::UploadStorage;
use metrics_util::debugging::DebuggingRecorder;
use tempfile::TempDir;

#[tokio::test]
async fn compute_protocol_emits_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let dir = TempDir::new().expect("tempdir");
    let cache = Arc::new(FileCacheStore::open(dir.path().join("cache.json")).expect("open store"));
    let context = JobWorkerContext {
        items: Arc::new(MemoryItemsRepo::new()),
        cache: cache.clone(),
        uploads: Arc::new(UploadStorage::new(dir.path().join("uploads")).expect("uploads dir")),
        computation: Arc::new(EchoComputation::default()),
    };
    let (dispatcher, pool) = QueueDispatcher::spawn(context, 8, 1, 1);
    let service = ComputeService::new(cache, Arc::new(dispatcher), Some(Duration::from_secs(600)));

    // miss on an unknown key
    service.lookup("metrics").await.expect("lookup");
    service
        .request_compute("metrics", "value")
        .await
        .expect("compute accepted");

    let mut ready = false;
    for _ in 0..200 {
        if service.lookup("metrics").await.expect("lookup").status == EntryStatus::Ready {
            ready = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(ready, "compute job never completed");
    pool.shutdown().await;

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    for expected in [
        "itemforge_cache_hit_total",
        "itemforge_cache_miss_total",
        "itemforge_compute_enqueued_total",
        "itemforge_compute_completed_total",
        "itemforge_compute_ms",
    ] {
        assert!(names.contains(expected), "missing metric {expected}");
    }
}
