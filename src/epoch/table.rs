// src/epoch/table.rs
//
// One pass over a dataset: a `PartitionState` per partition plus the routing
// from catalog names and file ids to the owning partition.

use std::sync::{Arc, OnceLock};
use tracing::{debug, info};

use crate::backend::Backend;
use crate::catalog::Dataset;
use crate::epoch::error::{GetError, InitError};
use crate::epoch::options::{GetOptions, PassOptions};
use crate::epoch::partition::{PartitionState, PassContext};
use crate::epoch::stats::{PartitionStats, PassStats};
use crate::types::{Content, FileId, PartitionId};

struct Ready {
    dataset: Arc<Dataset>,
    partitions: Vec<PartitionState>,
}

/// The epoch table of one pass.
///
/// Created empty; [`init`](Self::init) binds it to a dataset exactly once.
/// All other operations are safe to call concurrently from any task.
pub struct EpochTable {
    pass_id: u64,
    backend: Arc<dyn Backend>,
    options: PassOptions,
    ready: OnceLock<Ready>,
}

impl EpochTable {
    pub fn new(pass_id: u64, backend: Arc<dyn Backend>, options: PassOptions) -> Self {
        Self { pass_id, backend, options, ready: OnceLock::new() }
    }

    pub fn pass_id(&self) -> u64 {
        self.pass_id
    }

    pub fn options(&self) -> &PassOptions {
        &self.options
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.get().is_some()
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.ready.get().map(|r| &r.dataset)
    }

    /// Allocate per-partition state for `dataset`. Every file starts unread.
    pub fn init(&self, dataset: Arc<Dataset>) -> Result<(), InitError> {
        if self.is_initialized() {
            return Err(InitError::AlreadyInitialized);
        }
        let partitions = dataset
            .partitions()
            .iter()
            .map(|p| PartitionState::new(p, &self.options))
            .collect::<Result<Vec<_>, _>>()?;
        let (count, files) = (partitions.len(), dataset.file_count());

        self.ready
            .set(Ready { dataset, partitions })
            .map_err(|_| InitError::AlreadyInitialized)?;
        info!(
            pass = self.pass_id,
            partitions = count,
            files,
            "epoch table initialized"
        );
        Ok(())
    }

    fn ready(&self) -> Result<&Ready, GetError> {
        self.ready.get().ok_or(GetError::NotInitialized)
    }

    fn context<'a>(&'a self, ready: &'a Ready) -> PassContext<'a> {
        PassContext {
            pass_id: self.pass_id,
            dataset: &ready.dataset,
            backend: self.backend.as_ref(),
            options: &self.options,
        }
    }

    fn route(&self, file: FileId) -> Result<(&Ready, &PartitionState), GetError> {
        let ready = self.ready()?;
        let state = ready
            .dataset
            .partition_of(file)
            .and_then(|p| ready.partitions.get(p.0 as usize))
            .ok_or_else(|| GetError::NotFound(format!("file id {file}")))?;
        Ok((ready, state))
    }

    /// Resolve a catalog name to its file id.
    pub fn resolve(&self, name: &str) -> Result<FileId, GetError> {
        self.ready()?
            .dataset
            .resolve_name(name)
            .ok_or_else(|| GetError::NotFound(name.to_string()))
    }

    /// Read `name` with the pass defaults.
    pub async fn get(&self, name: &str) -> Result<Content, GetError> {
        self.get_with(name, &GetOptions::default()).await
    }

    pub async fn get_with(&self, name: &str, opts: &GetOptions) -> Result<Content, GetError> {
        let file = self.resolve(name)?;
        self.get_file(file, opts).await
    }

    /// Read by file id. The returned content is the requested file's own
    /// content, or in substitute mode possibly another not-yet-delivered file
    /// of the same partition.
    pub async fn get_file(&self, file: FileId, opts: &GetOptions) -> Result<Content, GetError> {
        let (ready, state) = self.route(file)?;
        state.get(&self.context(ready), file, opts).await
    }

    /// Producer: take `file` out of the unread pool before fetching it.
    pub fn begin_prefetch(&self, file: FileId) -> Result<bool, GetError> {
        let (_, state) = self.route(file)?;
        state.begin_prefetch(file)
    }

    /// Producer: take a random unread file of `partition` to prefetch.
    pub fn claim_prefetch(&self, partition: PartitionId) -> Result<Option<FileId>, GetError> {
        let ready = self.ready()?;
        let state = ready
            .partitions
            .get(partition.0 as usize)
            .ok_or_else(|| GetError::NotFound(format!("partition {partition}")))?;
        Ok(state.claim_prefetch())
    }

    /// Producer: give an in-flight file back to the unread pool.
    pub fn register_unread(&self, file: FileId) -> Result<bool, GetError> {
        let (_, state) = self.route(file)?;
        state.register_unread(file)
    }

    /// Producer: a prefetch of `file` completed. Stores `content` in the
    /// dataset cache and makes the file available to readers.
    pub async fn land_in_cache(&self, file: FileId, content: Content) -> Result<bool, GetError> {
        let (ready, state) = self.route(file)?;
        state.land_in_cache(&ready.dataset, file, content).await
    }

    /// Warm start: move unread files already resident in the dataset cache
    /// into the cached pools. Returns the number of files adopted.
    pub async fn adopt_resident(&self) -> Result<usize, GetError> {
        let ready = self.ready()?;
        let mut adopted = 0;
        for state in &ready.partitions {
            adopted += state.adopt_resident(&ready.dataset).await;
        }
        debug!(pass = self.pass_id, adopted, "resident content adopted");
        Ok(adopted)
    }

    pub fn partition_stats(&self, partition: PartitionId) -> Result<PartitionStats, GetError> {
        let ready = self.ready()?;
        ready
            .partitions
            .get(partition.0 as usize)
            .map(PartitionState::stats)
            .ok_or_else(|| GetError::NotFound(format!("partition {partition}")))
    }

    pub fn stats(&self) -> Result<PassStats, GetError> {
        let ready = self.ready()?;
        let mut total = PassStats::default();
        for state in &ready.partitions {
            total.add(&state.stats());
        }
        Ok(total)
    }

    /// Ids whose content is in the dataset cache after being consumed this
    /// pass, in the order they were recorded per partition.
    pub fn resident_ids(&self) -> Result<Vec<FileId>, GetError> {
        let ready = self.ready()?;
        Ok(ready.partitions.iter().flat_map(PartitionState::resident_log).collect())
    }

    /// No partition has anything left to hand out or waiting to land.
    pub fn is_complete(&self) -> bool {
        self.ready
            .get()
            .is_some_and(|ready| ready.partitions.iter().all(|p| p.stats().is_drained()))
    }
}
