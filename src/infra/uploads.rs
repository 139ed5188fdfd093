//! Filesystem storage for item images.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use sha2::{Digest, Sha256};
use slug::slugify;
use thiserror::Error;
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum UploadStorageError {
    #[error("invalid stored path")]
    InvalidPath,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("uploaded file size exceeds supported range")]
    SizeOverflow,
    #[error("upload writer task failed: {0}")]
    Join(String),
}

/// Result of storing an upload payload.
#[derive(Debug, Clone)]
pub struct StoredUpload {
    pub stored_path: String,
    pub checksum: String,
    pub size_bytes: i64,
}

#[derive(Debug)]
pub struct UploadStorage {
    root: PathBuf,
}

impl UploadStorage {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    pub fn new(root: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store `data` under a fresh dated path.
    ///
    /// The file is written to a temporary name and renamed into place, so a
    /// stored path never refers to a partially written file.
    pub async fn store(
        &self,
        original_name: &str,
        data: &[u8],
    ) -> Result<StoredUpload, UploadStorageError> {
        let size_bytes =
            i64::try_from(data.len()).map_err(|_| UploadStorageError::SizeOverflow)?;
        let mut hasher = Sha256::new();
        hasher.update(data);
        let checksum = hex::encode(hasher.finalize());
        let stored_path = build_stored_path(original_name);
        let absolute = self.resolve(&stored_path)?;
        let payload = data.to_vec();

        tokio::task::spawn_blocking(move || write_atomically(&absolute, &payload))
            .await
            .map_err(|err| UploadStorageError::Join(err.to_string()))??;

        Ok(StoredUpload {
            stored_path,
            checksum,
            size_bytes,
        })
    }

    pub async fn read(&self, stored_path: &str) -> Result<Bytes, UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        let data = fs::read(absolute).await?;
        Ok(Bytes::from(data))
    }

    /// Remove the stored payload. Missing files are treated as success.
    pub async fn delete(&self, stored_path: &str) -> Result<(), UploadStorageError> {
        let absolute = self.resolve(stored_path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(UploadStorageError::Io(err)),
        }
    }

    fn resolve(&self, stored_path: &str) -> Result<PathBuf, UploadStorageError> {
        let relative = Path::new(stored_path);
        if relative.is_absolute()
            || relative
                .components()
                .any(|component| matches!(component, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(UploadStorageError::InvalidPath);
        }

        Ok(self.root.join(relative))
    }
}

fn write_atomically(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("stored path has no parent directory"))?;
    std::fs::create_dir_all(parent)?;

    let mut file = tempfile::NamedTempFile::new_in(parent)?;
    file.write_all(data)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}

fn build_stored_path(original_name: &str) -> String {
    let (year, month, day) = time::OffsetDateTime::now_utc().to_calendar_date();
    let directory = format!("{year}/{:02}/{:02}", month as u8, day);
    let identifier = Uuid::new_v4();
    let filename = sanitize_filename(original_name);
    format!("{directory}/{identifier}-{filename}")
}

fn sanitize_filename(original: &str) -> String {
    let path = Path::new(original);
    let stem = path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("image");
    let mut base = slugify(stem);
    if base.is_empty() {
        base = "image".to_string();
    }

    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.trim_matches('.').to_ascii_lowercase())
        .filter(|value| !value.is_empty());

    match extension {
        Some(ext) => format!("{base}.{ext}"),
        None => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_read_and_delete_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        let stored = storage
            .store("Holiday Photo.JPG", b"jpeg-bytes")
            .await
            .expect("store");
        assert!(stored.stored_path.ends_with("-holiday-photo.jpg"));
        assert_eq!(stored.size_bytes, 10);
        assert_eq!(stored.checksum.len(), 64);

        let data = storage.read(&stored.stored_path).await.expect("read");
        assert_eq!(&data[..], b"jpeg-bytes");

        storage.delete(&stored.stored_path).await.expect("delete");
        storage
            .delete(&stored.stored_path)
            .await
            .expect("deleting twice is fine");
        assert!(storage.read(&stored.stored_path).await.is_err());
    }

    #[tokio::test]
    async fn traversal_paths_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = UploadStorage::new(dir.path().to_path_buf()).expect("storage");

        assert!(matches!(
            storage.read("../etc/passwd").await,
            Err(UploadStorageError::InvalidPath)
        ));
        assert!(matches!(
            storage.read("/etc/passwd").await,
            Err(UploadStorageError::InvalidPath)
        ));
    }

    #[test]
    fn sanitize_falls_back_to_default_name() {
        assert_eq!(sanitize_filename("???.jpeg"), "image.jpeg");
        assert_eq!(sanitize_filename("plain"), "plain");
    }
}
