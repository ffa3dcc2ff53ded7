// src/backend.rs
//
// Backend fetch used by the direct-read path of a pass. The partition state
// always calls `fetch` with its lock released.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::object_store::ObjectStore;
use crate::types::{Content, FileId, PartitionId};

/// Everything a backend may need to locate one file.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub pass_id: u64,
    pub dataset_id: u32,
    pub partition: PartitionId,
    pub file: FileId,
    /// Catalog name of `file`.
    pub name: &'a str,
}

/// Slow, out-of-band content source (remote storage, another tier, ...).
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<Content>;
}

/// Adapts any [`ObjectStore`] into a [`Backend`] by joining catalog names onto a base URI.
pub struct StoreBackend {
    store: Arc<dyn ObjectStore>,
    base_uri: String,
}

impl StoreBackend {
    /// `base_uri` is the prefix the catalog names are relative to, e.g. `file:///data/train/`.
    pub fn new(store: Arc<dyn ObjectStore>, base_uri: impl Into<String>) -> Self {
        let mut base_uri = base_uri.into();
        if !base_uri.is_empty() && !base_uri.ends_with('/') {
            base_uri.push('/');
        }
        Self { store, base_uri }
    }

    pub fn uri_for(&self, name: &str) -> String {
        format!("{}{}", self.base_uri, name)
    }
}

#[async_trait]
impl Backend for StoreBackend {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<Content> {
        let uri = self.uri_for(req.name);
        tracing::trace!(
            pass = req.pass_id,
            dataset = req.dataset_id,
            partition = %req.partition,
            file = %req.file,
            "backend fetch {}",
            uri
        );
        match self.store.get(&uri).await {
            Ok(content) => Ok(content),
            // A missing object is the common failure; name it plainly.
            Err(err) if !self.store.exists(&uri).await.unwrap_or(true) => {
                Err(err.context(format!("file {} not found at {}", req.file, uri)))
            }
            Err(err) => Err(err.context(format!("fetching file {} ({})", req.file, uri))),
        }
    }
}
