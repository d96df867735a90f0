//! Object storage for raw uploaded document bytes.
//!
//! Document metadata lives in the store; the files themselves live behind
//! this seam, addressed by an opaque `storage_ref` of the form
//! `course_id/object-name`.

use crate::error::{PensumError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Object reference for an upload: a fresh name under the course keeping
/// only the original extension, so colliding file names cannot clobber
/// each other's bytes.
pub fn storage_ref_for(course_id: Uuid, name: &str) -> String {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{}/{}.{}", course_id, Uuid::new_v4(), ext.to_lowercase()),
        None => format!("{}/{}", course_id, Uuid::new_v4()),
    }
}

/// Trait for raw document byte storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch the bytes at a reference. `NotFound` if nothing is stored there.
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>>;

    /// Store bytes at a reference, replacing any existing object.
    async fn put(&self, reference: &str, data: &[u8]) -> Result<()>;

    /// Remove the object at a reference. Removing a missing object is fine.
    async fn delete(&self, reference: &str) -> Result<()>;
}

/// Filesystem-backed object store rooted at a single directory.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    /// Create a store rooted at `root`. The directory is created lazily on
    /// first write.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Resolve a reference to a path under the root.
    ///
    /// References are relative paths with plain components only; anything
    /// absolute or containing `..` is rejected so a reference can never
    /// escape the root.
    fn resolve(&self, reference: &str) -> Result<PathBuf> {
        let relative = Path::new(reference);
        let safe = !reference.is_empty()
            && relative.is_relative()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(PensumError::Storage(format!(
                "Invalid storage reference: {}",
                reference
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip(self))]
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self.resolve(reference)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PensumError::NotFound(format!("object {}", reference)))
            }
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, data), fields(bytes = data.len()))]
    async fn put(&self, reference: &str, data: &[u8]) -> Result<()> {
        let path = self.resolve(reference)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        debug!("Stored object {}", reference);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, reference: &str) -> Result<()> {
        let path = self.resolve(reference)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_fetch_delete_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());

        store.put("course-1/notes.txt", b"week one").await.unwrap();
        let data = store.fetch("course-1/notes.txt").await.unwrap();
        assert_eq!(data, b"week one");

        store.delete("course-1/notes.txt").await.unwrap();
        let missing = store.fetch("course-1/notes.txt").await;
        assert!(matches!(missing, Err(PensumError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());
        let result = store.fetch("course-1/nothing-here.pdf").await;
        assert!(matches!(result, Err(PensumError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());
        assert!(store.delete("course-1/already-gone.txt").await.is_ok());
    }

    #[tokio::test]
    async fn test_traversal_references_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().to_path_buf());

        for reference in ["../outside.txt", "/etc/passwd", "a/../../b", ""] {
            let result = store.fetch(reference).await;
            assert!(
                matches!(result, Err(PensumError::Storage(_))),
                "reference {:?} should be rejected",
                reference
            );
        }
    }

    #[test]
    fn test_storage_ref_keeps_extension_only() {
        let course = Uuid::new_v4();
        let reference = storage_ref_for(course, "Week 1 - Lecture Notes.PDF");

        assert!(reference.starts_with(&format!("{}/", course)));
        assert!(reference.ends_with(".pdf"));
        assert!(!reference.contains("Lecture"));
    }

    #[test]
    fn test_storage_ref_without_extension() {
        let course = Uuid::new_v4();
        let reference = storage_ref_for(course, "README");

        assert!(reference.starts_with(&format!("{}/", course)));
        assert!(!reference.contains('.'));
    }
}
