// src/content_cache.rs
//
// Thread-safe cache of fetched file content, keyed by dataset file id.
//
// The cache belongs to a dataset and outlives every pass over it: a pass only
// references entries by id. Admission is decided by the partition state (which
// owns the budget); the cache itself never evicts on its own.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

use crate::types::FileId;

/// Shared content cache.
///
/// Reads take the read half of a `tokio::sync::RwLock`, so concurrent lookups
/// from different partitions do not block each other.
#[derive(Debug, Default)]
pub struct ContentCache {
    entries: RwLock<HashMap<FileId, Bytes>>,
    bytes: AtomicU64,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get cached content for `file` (cheap `Bytes` clone).
    pub async fn get(&self, file: FileId) -> Option<Bytes> {
        let entries = self.entries.read().await;
        match entries.get(&file) {
            Some(content) => {
                tracing::trace!("Cache HIT: file {} ({} bytes)", file, content.len());
                Some(content.clone())
            }
            None => {
                tracing::trace!("Cache MISS: file {}", file);
                None
            }
        }
    }

    pub async fn contains(&self, file: FileId) -> bool {
        self.entries.read().await.contains_key(&file)
    }

    /// Store content for `file`, returning the previous entry if one was replaced.
    pub async fn insert(&self, file: FileId, content: Bytes) -> Option<Bytes> {
        let mut entries = self.entries.write().await;
        tracing::trace!("Caching: file {} → {} bytes", file, content.len());
        self.bytes.fetch_add(content.len() as u64, Ordering::Relaxed);
        let previous = entries.insert(file, content);
        if let Some(old) = &previous {
            self.bytes.fetch_sub(old.len() as u64, Ordering::Relaxed);
        }
        previous
    }

    pub async fn remove(&self, file: FileId) -> Option<Bytes> {
        let mut entries = self.entries.write().await;
        let removed = entries.remove(&file);
        if let Some(old) = &removed {
            self.bytes.fetch_sub(old.len() as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Drop every entry.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
        self.bytes.store(0, Ordering::Relaxed);
        tracing::debug!("Cleared all content cache entries");
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = self.entries.read().await;
        CacheStats {
            entries: entries.len(),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about cache state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cached files
    pub entries: usize,
    /// Total cached content size in bytes
    pub bytes: u64,
}
