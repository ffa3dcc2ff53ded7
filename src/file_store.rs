// src/file_store.rs
//
// FileSystemObjectStore implementation for POSIX file I/O
// This provides the same ObjectStore interface for local filesystem operations

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::trace;

use crate::constants::FILE_SCHEME;
use crate::object_store::{ObjectMetadata, ObjectStore};

/// FileSystem adapter that implements ObjectStore for local POSIX file operations.
#[derive(Debug, Clone, Default)]
pub struct FileSystemObjectStore;

impl FileSystemObjectStore {
    pub fn new() -> Self {
        Self
    }

    fn uri_to_path(uri: &str) -> Result<PathBuf> {
        match uri.strip_prefix(FILE_SCHEME) {
            Some(path) => Ok(PathBuf::from(path)),
            None => bail!("FileSystemObjectStore expects file:// URI, got: {}", uri),
        }
    }

    fn path_to_uri(path: &Path) -> String {
        format!("{}{}", FILE_SCHEME, path.display())
    }

    async fn collect_files_recursive(dir: &Path, results: &mut Vec<String>) -> Result<()> {
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("reading directory {}", dir.display()))?;

        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            if entry.file_type().await?.is_dir() {
                Box::pin(Self::collect_files_recursive(&entry_path, results)).await?;
            } else {
                results.push(Self::path_to_uri(&entry_path));
            }
        }

        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FileSystemObjectStore {
    async fn get(&self, uri: &str) -> Result<Bytes> {
        let path = Self::uri_to_path(uri)?;
        let data = fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        trace!("read {} bytes from {}", data.len(), path.display());
        Ok(Bytes::from(data))
    }

    async fn list(&self, uri_prefix: &str, recursive: bool) -> Result<Vec<String>> {
        let base_path = Self::uri_to_path(uri_prefix)?;
        let mut results = Vec::new();

        let meta = match fs::metadata(&base_path).await {
            Ok(meta) => meta,
            Err(_) => return Ok(results), // Empty list for non-existent paths
        };

        if meta.is_file() {
            results.push(Self::path_to_uri(&base_path));
        } else if recursive {
            Self::collect_files_recursive(&base_path, &mut results).await?;
        } else {
            let mut entries = fs::read_dir(&base_path).await?;
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    results.push(Self::path_to_uri(&entry.path()));
                }
            }
        }

        Ok(results)
    }

    async fn stat(&self, uri: &str) -> Result<ObjectMetadata> {
        let path = Self::uri_to_path(uri)?;
        let metadata = fs::metadata(&path)
            .await
            .with_context(|| format!("stat {}", path.display()))?;
        if !metadata.is_file() {
            bail!("Path is not a file: {}", path.display());
        }
        Ok(ObjectMetadata { size: metadata.len() })
    }
}
