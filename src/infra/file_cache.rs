//! Single-node cache store persisted as one JSON document.
//!
//! Writers hold an exclusive lock on `<file>.lock` for the whole
//! read-modify-write cycle and replace the document through a rename, so
//! readers never take the lock and still never see a half-written file.

use std::{
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use crate::{
    application::repos::{CacheStore, CacheStoreError},
    domain::cache::{CacheEntry, EntryStatus},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    status: EntryStatus,
    #[serde(default)]
    value: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    written_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pending_since: Option<OffsetDateTime>,
}

impl StoredEntry {
    fn into_entry(self, key: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            status: self.status,
            value: self.value,
            written_at: self.written_at,
            pending_since: self.pending_since,
        }
    }
}

impl From<&CacheEntry> for StoredEntry {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            status: entry.status,
            value: entry.value.clone(),
            written_at: entry.written_at,
            pending_since: entry.pending_since,
        }
    }
}

type Document = BTreeMap<String, StoredEntry>;

#[derive(Debug, Clone)]
pub struct FileCacheStore {
    inner: Arc<Paths>,
}

#[derive(Debug)]
struct Paths {
    document: PathBuf,
    lock: PathBuf,
}

impl FileCacheStore {
    /// Open the store at `path`. The file itself is created on first write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheStoreError> {
        let document = path.into();
        if let Some(parent) = document.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                CacheStoreError::unavailable(format!(
                    "cannot create `{}`: {err}",
                    parent.display()
                ))
            })?;
        }

        let mut lock = document.clone().into_os_string();
        lock.push(".lock");

        Ok(Self {
            inner: Arc::new(Paths {
                document,
                lock: PathBuf::from(lock),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.document
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, CacheStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Paths) -> Result<T, CacheStoreError> + Send + 'static,
    {
        let paths = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&paths))
            .await
            .map_err(|err| CacheStoreError::unavailable(format!("store task failed: {err}")))?
    }
}

impl Paths {
    fn read_document(&self) -> Result<Document, CacheStoreError> {
        let raw = match fs::read(&self.document) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(err) => {
                return Err(CacheStoreError::unavailable(format!(
                    "cannot read `{}`: {err}",
                    self.document.display()
                )));
            }
        };

        if raw.iter().all(u8::is_ascii_whitespace) {
            return Ok(Document::new());
        }

        serde_json::from_slice(&raw).map_err(|err| {
            CacheStoreError::unavailable(format!(
                "corrupt cache file `{}`: {err}",
                self.document.display()
            ))
        })
    }

    fn write_document(&self, document: &Document) -> Result<(), CacheStoreError> {
        let encoded = serde_json::to_vec_pretty(document)
            .map_err(|err| CacheStoreError::unavailable(format!("encode failed: {err}")))?;
        let directory = self
            .document
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        let write = || -> std::io::Result<()> {
            let mut temp = tempfile::NamedTempFile::new_in(directory)?;
            temp.write_all(&encoded)?;
            temp.as_file().sync_all()?;
            temp.persist(&self.document).map_err(|err| err.error)?;
            Ok(())
        };

        write().map_err(|err| {
            CacheStoreError::unavailable(format!(
                "cannot write `{}`: {err}",
                self.document.display()
            ))
        })
    }

    /// Run `mutate` on the current document under the writer lock.
    fn update<T>(
        &self,
        mutate: impl FnOnce(&mut Document) -> T,
    ) -> Result<T, CacheStoreError> {
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock)
            .map_err(|err| {
                CacheStoreError::unavailable(format!(
                    "cannot open lock `{}`: {err}",
                    self.lock.display()
                ))
            })?;
        lock.lock()
            .map_err(|err| CacheStoreError::unavailable(format!("cannot lock store: {err}")))?;

        let result = self.update_locked(mutate);
        let _ = lock.unlock();
        result
    }

    fn update_locked<T>(
        &self,
        mutate: impl FnOnce(&mut Document) -> T,
    ) -> Result<T, CacheStoreError> {
        let mut document = self.read_document()?;
        let result = mutate(&mut document);
        self.write_document(&document)?;
        Ok(result)
    }
}

fn current(document: &Document, key: &str) -> CacheEntry {
    document
        .get(key)
        .cloned()
        .map(|stored| stored.into_entry(key))
        .unwrap_or_else(|| CacheEntry::absent(key))
}

#[async_trait]
impl CacheStore for FileCacheStore {
    async fn get(&self, key: &str) -> Result<CacheEntry, CacheStoreError> {
        let key = key.to_string();
        self.blocking(move |paths| {
            let document = paths.read_document()?;
            Ok(current(&document, &key))
        })
        .await
    }

    async fn put(&self, key: &str, value: &str) -> Result<CacheEntry, CacheStoreError> {
        let key = key.to_string();
        let value = value.to_string();
        let entry = self
            .blocking(move |paths| {
                paths.update(|document| {
                    let entry = current(document, &key).into_ready(value, OffsetDateTime::now_utc());
                    document.insert(key, StoredEntry::from(&entry));
                    entry
                })
            })
            .await?;

        debug!(
            target = "infra::file_cache",
            op = "put",
            key = %entry.key,
            "Cache entry written"
        );
        Ok(entry)
    }

    async fn mark_pending(&self, key: &str) -> Result<CacheEntry, CacheStoreError> {
        let key = key.to_string();
        self.blocking(move |paths| {
            paths.update(|document| {
                let entry = current(document, &key).into_pending(OffsetDateTime::now_utc());
                document.insert(key, StoredEntry::from(&entry));
                entry
            })
        })
        .await
    }

    async fn purge_stale_pending(&self, cutoff: OffsetDateTime) -> Result<u64, CacheStoreError> {
        self.blocking(move |paths| {
            paths.update(|document| {
                let before = document.len();
                document.retain(|_, stored| {
                    !(stored.status == EntryStatus::Pending
                        && stored.pending_since.is_some_and(|since| since <= cutoff))
                });
                (before - document.len()) as u64
            })
        })
        .await
    }

    async fn health_check(&self) -> Result<(), CacheStoreError> {
        self.blocking(|paths| paths.read_document().map(|_| ())).await
    }
}
