// src/catalog.rs
//
// Dataset catalog: file names, dense file ids, fixed-size partitions with a
// cache budget each, and the content cache shared by every pass.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use crate::constants::{DEFAULT_PARTITION_CACHE_BYTES, DEFAULT_PARTITION_SIZE};
use crate::content_cache::ContentCache;
use crate::object_store::ObjectStore;
use crate::types::{Content, FileId, PartitionId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("partition size must be at least 1")]
    ZeroPartitionSize,

    #[error("duplicate file name in catalog: {0}")]
    DuplicateName(String),

    #[error("catalog holds {0} files, more than a u32 file id can address")]
    TooManyFiles(usize),
}

/// Cache budget of one partition, in bytes.
///
/// The budget lives on the dataset, so it is shared by every pass over it.
#[derive(Debug)]
pub struct CacheBudget {
    allowed: u64,
    used: AtomicU64,
}

impl CacheBudget {
    pub fn new(allowed: u64) -> Self {
        Self { allowed, used: AtomicU64::new(0) }
    }

    pub fn allowed(&self) -> u64 {
        self.allowed
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Admit `bytes` if the budget is not yet exhausted (`used < allowed`).
    ///
    /// Admission only checks that room remains, so the last admitted file may
    /// push `used` past `allowed`.
    pub fn try_admit(&self, bytes: u64) -> bool {
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.allowed).then(|| used.saturating_add(bytes))
            })
            .is_ok()
    }

    /// Charge `bytes` unconditionally (content placed by a prefetch producer).
    pub fn charge(&self, bytes: u64) {
        self.used.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Return `bytes` to the budget, e.g. after evicting content.
    pub fn release(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                Some(used.saturating_sub(bytes))
            });
    }
}

/// Result of [`Dataset::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// The cache already held content for the file; nothing was charged.
    AlreadyResident,
    /// The partition budget is spent; the content was not cached.
    OverBudget,
}

/// Contiguous run of dataset file ids owned by one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRange {
    first: FileId,
    count: u32,
}

impl FileRange {
    pub fn new(first: FileId, count: u32) -> Self {
        Self { first, count }
    }

    pub fn first(&self) -> FileId {
        self.first
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Offset of `file` inside the range, if the range holds it.
    pub fn local_index(&self, file: FileId) -> Option<u32> {
        file.0
            .checked_sub(self.first.0)
            .filter(|&offset| offset < self.count)
    }

    pub fn file_at(&self, local: u32) -> FileId {
        FileId(self.first.0 + local)
    }
}

/// One fixed group of files sharing a cache budget.
#[derive(Debug)]
pub struct Partition {
    id: PartitionId,
    range: FileRange,
    budget: CacheBudget,
}

impl Partition {
    pub fn id(&self) -> PartitionId {
        self.id
    }

    /// File ids owned by this partition.
    pub fn range(&self) -> FileRange {
        self.range
    }

    /// First dataset-global file id owned by this partition.
    pub fn first(&self) -> FileId {
        self.range.first()
    }

    pub fn file_count(&self) -> u32 {
        self.range.len()
    }

    pub fn budget(&self) -> &CacheBudget {
        &self.budget
    }

    pub fn local_index(&self, file: FileId) -> Option<u32> {
        self.range.local_index(file)
    }

    pub fn file_at(&self, local: u32) -> FileId {
        self.range.file_at(local)
    }
}

/// A partitioned file collection plus its shared content cache.
#[derive(Debug)]
pub struct Dataset {
    id: u32,
    names: Vec<String>,
    by_name: HashMap<String, FileId>,
    partition_size: u32,
    partitions: Vec<Partition>,
    cache: Arc<ContentCache>,
}

impl Dataset {
    pub fn builder(id: u32) -> DatasetBuilder {
        DatasetBuilder::new(id)
    }

    /// Build a catalog from every object under `prefix`.
    ///
    /// File names are the listed URIs with `prefix` stripped, in sorted order,
    /// so the same listing always yields the same file ids.
    pub async fn from_store_prefix(
        store: &dyn ObjectStore,
        prefix: &str,
        builder: DatasetBuilder,
    ) -> Result<Self> {
        let mut uris = store.list(prefix, true).await?;
        uris.sort();
        let names = uris
            .into_iter()
            .map(|uri| match uri.strip_prefix(prefix) {
                Some(rest) => rest.trim_start_matches('/').to_string(),
                None => uri,
            })
            .collect::<Vec<_>>();
        tracing::debug!("cataloged {} objects under {}", names.len(), prefix);
        Ok(builder.names(names).build()?)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn file_count(&self) -> usize {
        self.names.len()
    }

    pub fn partition_size(&self) -> u32 {
        self.partition_size
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn partition(&self, id: PartitionId) -> Option<&Partition> {
        self.partitions.get(id.0 as usize)
    }

    pub fn resolve_name(&self, name: &str) -> Option<FileId> {
        self.by_name.get(name).copied()
    }

    pub fn file_name(&self, file: FileId) -> Option<&str> {
        self.names.get(file.0 as usize).map(String::as_str)
    }

    pub fn partition_of(&self, file: FileId) -> Option<PartitionId> {
        ((file.0 as usize) < self.names.len()).then(|| PartitionId(file.0 / self.partition_size))
    }

    /// Content cache shared by every pass over this dataset.
    pub fn cache(&self) -> &Arc<ContentCache> {
        &self.cache
    }

    fn budget_of(&self, file: FileId) -> Option<&CacheBudget> {
        self.partition_of(file)
            .and_then(|p| self.partition(p))
            .map(Partition::budget)
    }

    /// Offer fetched content to the shared cache, subject to the owning
    /// partition's budget. Content already resident is left as is and not
    /// charged again.
    pub async fn admit(&self, file: FileId, content: Content) -> Admission {
        if self.cache.contains(file).await {
            return Admission::AlreadyResident;
        }
        let Some(budget) = self.budget_of(file) else {
            return Admission::OverBudget;
        };
        if !budget.try_admit(content.len() as u64) {
            return Admission::OverBudget;
        }
        // Another pass may have stored the same file since the check above.
        if let Some(old) = self.cache.insert(file, content).await {
            budget.release(old.len() as u64);
        }
        Admission::Admitted
    }

    /// Store content unconditionally. The owning partition's budget is charged
    /// for the new bytes and credited for any entry they replace, so `used`
    /// keeps matching what the partition holds in the cache.
    pub async fn store(&self, file: FileId, content: Content) -> Option<Content> {
        let len = content.len() as u64;
        let previous = self.cache.insert(file, content).await;
        if let Some(budget) = self.budget_of(file) {
            budget.charge(len);
            if let Some(old) = &previous {
                budget.release(old.len() as u64);
            }
        }
        previous
    }

    /// Drop `file`'s content from the shared cache and give its bytes back
    /// to the owning partition's budget.
    pub async fn evict(&self, file: FileId) -> Option<Content> {
        let content = self.cache.remove(file).await?;
        if let Some(budget) = self.budget_of(file) {
            budget.release(content.len() as u64);
        }
        tracing::debug!("evicted file {} ({} bytes)", file, content.len());
        Some(content)
    }
}

/// Builder-style construction, mirroring the fluent option helpers used by the loader.
#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    id: u32,
    partition_size: u32,
    cache_budget: u64,
    names: Vec<String>,
    cache: Option<Arc<ContentCache>>,
}

impl DatasetBuilder {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            partition_size: DEFAULT_PARTITION_SIZE,
            cache_budget: DEFAULT_PARTITION_CACHE_BYTES,
            names: Vec::new(),
            cache: None,
        }
    }

    /// Number of files per partition (the last partition may be smaller).
    pub fn partition_size(mut self, files: u32) -> Self {
        self.partition_size = files;
        self
    }

    /// Cache budget applied to every partition, in bytes.
    pub fn cache_budget(mut self, bytes: u64) -> Self {
        self.cache_budget = bytes;
        self
    }

    pub fn names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.names.extend(names.into_iter().map(Into::into));
        self
    }

    /// Reuse an existing content cache instead of starting empty.
    pub fn with_cache(mut self, cache: Arc<ContentCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> std::result::Result<Dataset, CatalogError> {
        if self.partition_size == 0 {
            return Err(CatalogError::ZeroPartitionSize);
        }
        let total = u32::try_from(self.names.len())
            .map_err(|_| CatalogError::TooManyFiles(self.names.len()))?;

        let mut by_name = HashMap::with_capacity(self.names.len());
        for (idx, name) in self.names.iter().enumerate() {
            if by_name.insert(name.clone(), FileId(idx as u32)).is_some() {
                return Err(CatalogError::DuplicateName(name.clone()));
            }
        }

        let partitions = (0..total.div_ceil(self.partition_size))
            .map(|p| {
                let first = p * self.partition_size;
                Partition {
                    id: PartitionId(p),
                    range: FileRange::new(FileId(first), self.partition_size.min(total - first)),
                    budget: CacheBudget::new(self.cache_budget),
                }
            })
            .collect();

        Ok(Dataset {
            id: self.id,
            names: self.names,
            by_name,
            partition_size: self.partition_size,
            partitions,
            cache: self.cache.unwrap_or_default(),
        })
    }
}
