use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use itemforge::application::items::{ImageUpload, ItemService, ItemServiceError};
use itemforge::application::jobs::{
    DispatchError, Dispatcher, EchoComputation, InspectImageJobPayload, Job, JobWorkerContext,
    Ticket, run_inspect_image_job,
};
use itemforge::application::repos::{ItemsRepo, ProcessingUpdate, RepoError};
use itemforge::domain::items::{
    ImageAttachment, ItemDraft, ItemRecord, NewItem, ProcessingStatus,
};
use itemforge::domain::types::JobType;
use itemforge::infra::file_cache::FileCacheStore;
use itemforge::infra::memory::MemoryItemsRepo;
use itemforge::infra::uploads::UploadStorage;
use tempfile::TempDir;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct RecordingDispatcher {
    jobs: Mutex<Vec<Job>>,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn enqueue(&self, job: Job) -> Result<Ticket, DispatchError> {
        let job_type = job.job_type();
        self.jobs.lock().await.push(job);
        Ok(Ticket {
            id: Uuid::new_v4().to_string(),
            job_type,
        })
    }
}

/// Rejects every insert, as a database outage would.
struct RejectingRepo;

#[async_trait]
impl ItemsRepo for RejectingRepo {
    async fn create_item(
        &self,
        _item: NewItem,
        _image: Option<ImageAttachment>,
    ) -> Result<ItemRecord, RepoError> {
        Err(RepoError::Timeout)
    }

    async fn find_item(&self, _id: Uuid) -> Result<Option<ItemRecord>, RepoError> {
        Ok(None)
    }

    async fn update_processing(
        &self,
        _id: Uuid,
        _update: ProcessingUpdate,
    ) -> Result<(), RepoError> {
        Err(RepoError::NotFound)
    }
}

fn draft(title: &str) -> ItemDraft {
    ItemDraft {
        title: Some(title.to_string()),
        ..Default::default()
    }
}

fn jpeg_upload(data: &'static [u8]) -> ImageUpload {
    ImageUpload {
        filename: Some("photo.jpg".to_string()),
        content_type: Some("image/jpeg".to_string()),
        data: Bytes::from_static(data),
    }
}

fn count_files(dir: &std::path::Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(Result::ok)
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() { count_files(&path) } else { 1 }
        })
        .sum()
}

#[tokio::test]
async fn failed_insert_removes_the_stored_image() {
    let dir = TempDir::new().expect("tempdir");
    let uploads_root = dir.path().join("uploads");
    let uploads = Arc::new(UploadStorage::new(uploads_root.clone()).expect("uploads dir"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = ItemService::new(Arc::new(RejectingRepo), uploads, dispatcher.clone());

    let err = service
        .create(draft("Doomed"), Some(jpeg_upload(b"\xFF\xD8\xFFjpeg")))
        .await
        .expect_err("insert fails");

    assert!(matches!(err, ItemServiceError::Repo(RepoError::Timeout)));
    assert_eq!(count_files(&uploads_root), 0);
    assert!(dispatcher.jobs.lock().await.is_empty());
}

#[tokio::test]
async fn create_queues_inspection_and_records_the_ticket() {
    let dir = TempDir::new().expect("tempdir");
    let repo = Arc::new(MemoryItemsRepo::new());
    let uploads = Arc::new(UploadStorage::new(dir.path().join("uploads")).expect("uploads dir"));
    let dispatcher = Arc::new(RecordingDispatcher::default());
    let service = ItemService::new(repo.clone(), uploads, dispatcher.clone());

    let record = service
        .create(draft("Queued"), None)
        .await
        .expect("create item");

    assert_eq!(record.processing_status, Some(ProcessingStatus::Queued));
    let jobs = dispatcher.jobs.lock().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_type(), JobType::InspectImage);

    let stored = repo
        .find_item(record.id)
        .await
        .expect("find")
        .expect("item exists");
    assert_eq!(stored.task_id, record.task_id);
}

#[tokio::test]
async fn undecodable_image_is_marked_inspect_failed() {
    let dir = TempDir::new().expect("tempdir");
    let repo = Arc::new(MemoryItemsRepo::new());
    let uploads = Arc::new(UploadStorage::new(dir.path().join("uploads")).expect("uploads dir"));
    let service = ItemService::new(
        repo.clone(),
        uploads.clone(),
        Arc::new(RecordingDispatcher::default()),
    );

    let record = service
        .create(draft("Garbage"), Some(jpeg_upload(b"definitely not a jpeg")))
        .await
        .expect("create item");

    let context = JobWorkerContext {
        items: repo.clone(),
        cache: Arc::new(
            FileCacheStore::open(dir.path().join("cache.json")).expect("open cache store"),
        ),
        uploads,
        computation: Arc::new(EchoComputation::default()),
    };
    run_inspect_image_job(&context, &InspectImageJobPayload { item_id: record.id })
        .await
        .expect("inspection completes");

    let stored = repo
        .find_item(record.id)
        .await
        .expect("find")
        .expect("item exists");
    assert_eq!(stored.processing_status, Some(ProcessingStatus::InspectFailed));
    let image = stored.image.expect("image kept");
    assert_eq!(image.width, None);
    assert_eq!(image.height, None);
}

#[tokio::test]
async fn missing_item_is_skipped() {
    let dir = TempDir::new().expect("tempdir");
    let context = JobWorkerContext {
        items: Arc::new(MemoryItemsRepo::new()),
        cache: Arc::new(
            FileCacheStore::open(dir.path().join("cache.json")).expect("open cache store"),
        ),
        uploads: Arc::new(UploadStorage::new(dir.path().join("uploads")).expect("uploads dir")),
        computation: Arc::new(EchoComputation::default()),
    };

    run_inspect_image_job(
        &context,
        &InspectImageJobPayload {
            item_id: Uuid::new_v4(),
        },
    )
    .await
    .expect("nothing to inspect");
}
