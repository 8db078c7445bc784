//! Transient staging of uploaded images
//!
//! An [`UploadedImage`] lives only for the duration of one classification. It
//! is written under the configured upload directory with a random name and is
//! removed either explicitly through [`UploadedImage::discard`] or, failing
//! that, when the value is dropped.

use crate::observability::metrics::metrics;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// Upload staging errors
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Failed to prepare upload directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to stage upload: {0}")]
    Stage(#[source] std::io::Error),

    #[error("Failed to remove staged upload: {0}")]
    Remove(#[source] std::io::Error),
}

/// Owns the directory uploads are staged into
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

impl UploadStore {
    /// Open the store, creating the directory if it does not exist yet
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, UploadError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| UploadError::Directory {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a fresh file in the store
    pub fn stage(
        &self,
        original_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<UploadedImage, UploadError> {
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".img")
            .tempfile_in(&self.dir)
            .map_err(UploadError::Stage)?;

        file.write_all(&bytes).map_err(UploadError::Stage)?;
        file.flush().map_err(UploadError::Stage)?;

        metrics().upload_staged();
        debug!(
            path = %file.path().display(),
            size = bytes.len(),
            "Staged upload"
        );

        Ok(UploadedImage {
            file: Some(file),
            bytes,
            original_name: original_name.map(str::to_string),
        })
    }

    /// Number of files currently sitting in the store
    pub fn staged_count(&self) -> std::io::Result<usize> {
        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            if entry?.file_type()?.is_file() {
                count += 1;
            }
        }
        Ok(count)
    }
}

/// A staged upload; the backing file is removed on discard or drop
#[derive(Debug)]
pub struct UploadedImage {
    file: Option<NamedTempFile>,
    bytes: Vec<u8>,
    original_name: Option<String>,
}

impl UploadedImage {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Filename supplied by the client, for logging only
    pub fn original_name(&self) -> Option<&str> {
        self.original_name.as_deref()
    }

    /// Location of the staged file on disk
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path())
    }

    /// Remove the staged file, reporting I/O failures
    pub fn discard(mut self) -> Result<(), UploadError> {
        match self.file.take() {
            Some(file) => {
                let result = file.close().map_err(UploadError::Remove);
                metrics().upload_removed();
                result
            }
            None => Ok(()),
        }
    }
}

impl Drop for UploadedImage {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = file.close() {
                warn!(error = %e, "Failed to remove staged upload on drop");
            }
            metrics().upload_removed();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();

        let image = store.stage(Some("cam.jpg"), vec![1, 2, 3]).unwrap();
        let path = image.path().unwrap().to_path_buf();

        assert!(path.exists());
        assert!(path.starts_with(dir.path()));
        assert_eq!(std::fs::read(&path).unwrap(), vec![1, 2, 3]);
        assert_eq!(image.original_name(), Some("cam.jpg"));
        assert_eq!(image.len(), 3);
    }

    #[test]
    fn test_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();

        let image = store.stage(None, vec![0xff; 16]).unwrap();
        let path = image.path().unwrap().to_path_buf();
        image.discard().unwrap();

        assert!(!path.exists());
        assert_eq!(store.staged_count().unwrap(), 0);
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();

        let path = {
            let image = store.stage(None, vec![7; 4]).unwrap();
            image.path().unwrap().to_path_buf()
        };

        assert!(!path.exists());
    }

    #[test]
    fn test_staged_names_do_not_use_client_filename() {
        let dir = tempfile::tempdir().unwrap();
        let store = UploadStore::open(dir.path()).unwrap();

        let image = store.stage(Some("../../etc/passwd"), vec![1]).unwrap();
        let path = image.path().unwrap();

        assert!(path.starts_with(dir.path()));
        assert!(!path.to_string_lossy().contains("passwd"));
    }

    #[test]
    fn test_open_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("uploads");

        let store = UploadStore::open(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested.as_path());
    }
}
