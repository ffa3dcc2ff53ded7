// src/epoch/partition.rs
//
// Per-partition, per-pass read state.
//
// Every file of the partition is, at any instant, in exactly one of:
//
//   unread     -> in `unread`
//   in flight  -> counted by `in_flight` (a prefetch producer owns it)
//   cached     -> in `cached`, content resident in the dataset cache
//   consumed   -> `consumed` bit set, content handed to some reader
//
// and moves only forward: unread -> in flight -> cached -> consumed, or
// unread -> consumed through a direct backend fetch. `requested` is a separate
// bit per file marking that a read *naming* the file has been satisfied, by
// whatever content.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::backend::{Backend, FetchRequest};
use crate::catalog::{Admission, Dataset, FileRange, Partition};
use crate::epoch::error::{ExhaustCause, GetError};
use crate::epoch::options::{FetchFailurePolicy, GetMode, GetOptions, PassOptions};
use crate::epoch::stats::{PartitionCounters, PartitionStats};
use crate::stdx::{AllocError, DenseIndexSet, DynamicBitSet};
use crate::types::{Content, FileId, PartitionId};

/// What a partition needs from its pass to serve a read.
pub(crate) struct PassContext<'a> {
    pub pass_id: u64,
    pub dataset: &'a Dataset,
    pub backend: &'a dyn Backend,
    pub options: &'a PassOptions,
}

pub struct PartitionState {
    partition: PartitionId,
    range: FileRange,
    requeue_failed: bool,
    inner: Mutex<Inner>,
    landed: Notify,
    counters: PartitionCounters,
}

struct Inner {
    requested: DynamicBitSet,
    consumed: DynamicBitSet,
    unread: DenseIndexSet,
    cached: DenseIndexSet,
    in_flight: u32,
    /// Direct fetches whose outcome is not settled yet.
    fetching: u32,
    waiters: u32,
    exact_waiters: u32,
    resident: Vec<FileId>,
    rng: ChaCha20Rng,
}

impl Inner {
    fn take_cached(&mut self, local: u32, mode: GetMode) -> Option<u32> {
        if self.cached.is_empty() {
            return None;
        }
        match mode {
            GetMode::Exact => self.cached.remove(local).then_some(local),
            GetMode::Substitute => {
                if !self.consumed.test(local as usize) && self.cached.remove(local) {
                    Some(local)
                } else {
                    self.cached.remove_random_with(&mut self.rng)
                }
            }
        }
    }

    fn take_unread(&mut self, local: u32, mode: GetMode) -> Option<u32> {
        if self.unread.is_empty() {
            return None;
        }
        match mode {
            GetMode::Exact => self.unread.remove(local).then_some(local),
            GetMode::Substitute => {
                if !self.consumed.test(local as usize) && self.unread.remove(local) {
                    Some(local)
                } else {
                    self.unread.remove_random_with(&mut self.rng)
                }
            }
        }
    }

    /// Content may still show up without any reader fetching it.
    fn has_pending(&self, requeue_failed: bool) -> bool {
        self.in_flight > 0 || (requeue_failed && self.fetching > 0)
    }
}

enum Plan<'a> {
    Cached { source: u32 },
    Fetch { candidate: u32 },
    Wait(Waiter<'a>),
}

/// A registered waiter. Deregisters itself when dropped.
struct Waiter<'a> {
    state: &'a PartitionState,
    exact: bool,
    notified: Pin<Box<Notified<'a>>>,
}

impl Waiter<'_> {
    async fn wait(
        mut self,
        deadline: Option<Instant>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), ExhaustCause> {
        tokio::select! {
            _ = self.notified.as_mut() => Ok(()),
            _ = expire(deadline) => Err(ExhaustCause::DeadlineExpired),
            _ = cancelled(cancel) => Err(ExhaustCause::Cancelled),
        }
    }
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        let mut inner = self.state.lock();
        inner.waiters -= 1;
        if self.exact {
            inner.exact_waiters -= 1;
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// Settles a direct fetch as failed unless disarmed, so a read dropped
/// mid-fetch does not leak its candidate.
struct FetchGuard<'a> {
    state: &'a PartitionState,
    local: u32,
    candidate: u32,
    armed: bool,
}

impl FetchGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FetchGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.settle_failed_fetch(self.local, self.candidate);
        }
    }
}

impl PartitionState {
    /// Fresh state for one pass: every file unread, nothing requested or consumed.
    pub fn new(partition: &Partition, options: &PassOptions) -> Result<Self, AllocError> {
        let n = partition.file_count();
        let rng = match options.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed ^ u64::from(partition.id().0).rotate_left(32)),
            None => ChaCha20Rng::seed_from_u64(rand::random()),
        };
        let inner = Inner {
            requested: DynamicBitSet::try_new(n as usize)?,
            consumed: DynamicBitSet::try_new(n as usize)?,
            unread: DenseIndexSet::with_all(n)?,
            cached: DenseIndexSet::with_capacity(n)?,
            in_flight: 0,
            fetching: 0,
            waiters: 0,
            exact_waiters: 0,
            resident: Vec::new(),
            rng,
        };
        Ok(Self {
            partition: partition.id(),
            range: partition.range(),
            requeue_failed: options.fetch_failure == FetchFailurePolicy::Requeue,
            inner: Mutex::new(inner),
            landed: Notify::new(),
            counters: PartitionCounters::default(),
        })
    }

    pub fn partition(&self) -> PartitionId {
        self.partition
    }

    pub fn file_count(&self) -> u32 {
        self.range.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn local_index(&self, file: FileId) -> Result<u32, GetError> {
        self.range.local_index(file).ok_or_else(|| {
            GetError::NotFound(format!("file {file} is not in partition {}", self.partition))
        })
    }

    fn file_at(&self, local: u32) -> FileId {
        self.range.file_at(local)
    }

    fn exhausted(&self, cause: ExhaustCause) -> GetError {
        GetError::Exhausted { partition: self.partition, cause }
    }

    /// Wake waiters after a transition. Caller holds the lock.
    ///
    /// One waiter is enough when a single new file became available. Everyone
    /// is woken when nothing is pending any more (they must all observe the
    /// drained partition) or when exact readers wait, since a signal-one could
    /// land on a reader that wants a different file.
    fn wake(&self, inner: &Inner, new_work: bool) {
        if inner.waiters == 0 {
            return;
        }
        if inner.exact_waiters > 0 || !inner.has_pending(self.requeue_failed) {
            self.landed.notify_waiters();
        } else if new_work {
            self.landed.notify_one();
        }
    }

    /// Read one file for `file`'s request.
    pub(crate) async fn get(
        &self,
        ctx: &PassContext<'_>,
        file: FileId,
        opts: &GetOptions,
    ) -> Result<Content, GetError> {
        let local = self.local_index(file)?;
        let mode = opts.mode.unwrap_or(ctx.options.default_mode);
        let mut deadline = opts.deadline;

        loop {
            match self.plan(local, mode)? {
                Plan::Cached { source } => return self.read_cached(ctx, local, source).await,
                Plan::Fetch { candidate } => return self.fetch_direct(ctx, local, candidate).await,
                Plan::Wait(waiter) => {
                    if deadline.is_none() {
                        deadline = ctx.options.wait_timeout.map(|t| Instant::now() + t);
                    }
                    debug!(partition = %self.partition, file = %file, "waiting for prefetched content");
                    if let Err(cause) = waiter.wait(deadline, opts.cancel.as_ref()).await {
                        debug!(partition = %self.partition, file = %file, "wait ended: {}", cause);
                        return Err(self.exhausted(cause));
                    }
                    trace!(partition = %self.partition, file = %file, "woken, re-checking pools");
                }
            }
        }
    }

    /// Decide the next step of a read and apply its state transition under the lock.
    fn plan(&self, local: u32, mode: GetMode) -> Result<Plan<'_>, GetError> {
        let mut inner = self.lock();

        if inner.requested.test(local as usize) {
            return Err(GetError::AlreadyRequested(self.file_at(local)));
        }

        if let Some(source) = inner.take_cached(local, mode) {
            inner.consumed.set(source as usize);
            inner.requested.set(local as usize);
            inner.resident.push(self.file_at(source));
            return Ok(Plan::Cached { source });
        }

        if let Some(candidate) = inner.take_unread(local, mode) {
            // Reserve both bits now; a failed fetch clears them again.
            inner.consumed.set(candidate as usize);
            inner.requested.set(local as usize);
            inner.fetching += 1;
            return Ok(Plan::Fetch { candidate });
        }

        let exact = mode == GetMode::Exact;
        let must_wait = if exact {
            if inner.consumed.test(local as usize) {
                return Err(self.exhausted(ExhaustCause::Consumed));
            }
            // Not unread, cached or consumed: a producer owns it.
            if inner.in_flight == 0 {
                return Err(GetError::InternalInvariantViolation(format!(
                    "file {} of partition {} is in no pool and nothing is in flight",
                    self.file_at(local),
                    self.partition
                )));
            }
            true
        } else {
            inner.has_pending(self.requeue_failed)
        };

        if !must_wait {
            return Err(self.exhausted(ExhaustCause::Drained));
        }

        let mut notified = Box::pin(self.landed.notified());
        notified.as_mut().enable();
        inner.waiters += 1;
        if exact {
            inner.exact_waiters += 1;
        }
        PartitionCounters::bump(&self.counters.waits);
        Ok(Plan::Wait(Waiter { state: self, exact, notified }))
    }

    async fn read_cached(
        &self,
        ctx: &PassContext<'_>,
        local: u32,
        source: u32,
    ) -> Result<Content, GetError> {
        let source_file = self.file_at(source);
        PartitionCounters::bump(&self.counters.cache_hits);
        if source != local {
            PartitionCounters::bump(&self.counters.substitutions);
            trace!(
                partition = %self.partition,
                "request for {} served by cached {}",
                self.file_at(local),
                source_file
            );
        }
        ctx.dataset.cache().get(source_file).await.ok_or_else(|| {
            GetError::InternalInvariantViolation(format!(
                "file {source_file} is marked cached in partition {} but absent from the content cache",
                self.partition
            ))
        })
    }

    async fn fetch_direct(
        &self,
        ctx: &PassContext<'_>,
        local: u32,
        candidate: u32,
    ) -> Result<Content, GetError> {
        let file = self.file_at(candidate);
        let guard = FetchGuard { state: self, local, candidate, armed: true };

        let name = ctx.dataset.file_name(file).ok_or_else(|| {
            GetError::InternalInvariantViolation(format!("file {file} has no catalog name"))
        })?;
        let req = FetchRequest {
            pass_id: ctx.pass_id,
            dataset_id: ctx.dataset.id(),
            partition: self.partition,
            file,
            name,
        };
        trace!(partition = %self.partition, "direct fetch of {} for request {}", file, self.file_at(local));

        let content = match ctx.backend.fetch(req).await {
            Ok(content) => content,
            Err(err) => {
                drop(guard);
                warn!(partition = %self.partition, file = %file, "backend fetch failed: {:#}", err);
                return Err(GetError::fetch_failed(file, err));
            }
        };
        guard.disarm();
        PartitionCounters::bump(&self.counters.direct_fetches);

        {
            let mut inner = self.lock();
            inner.fetching -= 1;
            self.wake(&inner, false);
        }

        match ctx.dataset.admit(file, content.clone()).await {
            Admission::Admitted | Admission::AlreadyResident => {
                self.lock().resident.push(file);
                trace!(partition = %self.partition, file = %file, "fetched file resident in cache");
            }
            Admission::OverBudget => {
                debug!(partition = %self.partition, file = %file, "cache budget spent; fetched file not cached");
            }
        }
        Ok(content)
    }

    fn settle_failed_fetch(&self, local: u32, candidate: u32) {
        PartitionCounters::bump(&self.counters.fetch_failures);
        let mut inner = self.lock();
        inner.fetching -= 1;
        inner.requested.clear(local as usize);
        if self.requeue_failed {
            inner.consumed.clear(candidate as usize);
            inner.unread.insert(candidate);
            debug!(partition = %self.partition, "file {} returned to the unread pool", self.file_at(candidate));
            self.wake(&inner, true);
        } else {
            warn!(partition = %self.partition, "file {} dropped for the rest of the pass", self.file_at(candidate));
            self.wake(&inner, false);
        }
    }

    // ---------------------------------------------------------------------
    // Prefetch producer side
    // ---------------------------------------------------------------------

    /// Move `file` from unread to in flight. Returns `false` if it was not unread.
    pub fn begin_prefetch(&self, file: FileId) -> Result<bool, GetError> {
        let local = self.local_index(file)?;
        let mut inner = self.lock();
        if !inner.unread.remove(local) {
            return Ok(false);
        }
        inner.in_flight += 1;
        trace!(partition = %self.partition, file = %file, in_flight = inner.in_flight, "prefetch started");
        Ok(true)
    }

    /// Move a random unread file to in flight and return it.
    pub fn claim_prefetch(&self) -> Option<FileId> {
        let mut inner = self.lock();
        let inner = &mut *inner;
        let local = inner.unread.remove_random_with(&mut inner.rng)?;
        inner.in_flight += 1;
        Some(self.file_at(local))
    }

    /// Hand an in-flight file back to the unread pool (the producer gave up on it).
    ///
    /// Returns `false` without changing anything when the file is already
    /// unread, cached or consumed.
    pub fn register_unread(&self, file: FileId) -> Result<bool, GetError> {
        let local = self.local_index(file)?;
        let mut inner = self.lock();
        if inner.unread.contains(local)
            || inner.cached.contains(local)
            || inner.consumed.test(local as usize)
        {
            return Ok(false);
        }
        if inner.in_flight == 0 {
            return Err(GetError::InternalInvariantViolation(format!(
                "file {file} returned to partition {} with nothing in flight",
                self.partition
            )));
        }
        inner.in_flight -= 1;
        inner.unread.insert(local);
        self.wake(&inner, true);
        Ok(true)
    }

    /// Record that a producer's fetch of `file` completed with `content`.
    ///
    /// The content goes into the dataset cache before the file becomes
    /// visible in the cached pool. Returns `false` when the file was already
    /// consumed or already cached.
    pub(crate) async fn land_in_cache(
        &self,
        dataset: &Dataset,
        file: FileId,
        content: Content,
    ) -> Result<bool, GetError> {
        let local = self.local_index(file)?;
        if self.is_stale_landing(local) {
            return Ok(false);
        }

        // Charged even if the landing is ignored below: the bytes stay in the
        // cache either way and the budget tracks what the cache holds.
        dataset.store(file, content).await;

        let mut inner = self.lock();
        if inner.consumed.test(local as usize) || inner.cached.contains(local) {
            warn!(partition = %self.partition, file = %file, "landing raced with another transition; ignored");
            return Ok(false);
        }
        if !inner.unread.remove(local) {
            if inner.in_flight == 0 {
                return Err(GetError::InternalInvariantViolation(format!(
                    "file {file} landed in partition {} with nothing in flight",
                    self.partition
                )));
            }
            inner.in_flight -= 1;
        }
        inner.cached.insert(local);
        trace!(partition = %self.partition, file = %file, cached = inner.cached.len(), "landed in cache");
        self.wake(&inner, true);
        Ok(true)
    }

    fn is_stale_landing(&self, local: u32) -> bool {
        let inner = self.lock();
        if inner.consumed.test(local as usize) {
            warn!(partition = %self.partition, "file {} landed after it was consumed; ignored", self.file_at(local));
            true
        } else if inner.cached.contains(local) {
            warn!(partition = %self.partition, "file {} landed twice; ignored", self.file_at(local));
            true
        } else {
            false
        }
    }

    /// Move every unread file whose content is already in the dataset cache
    /// (left there by an earlier pass) into the cached pool.
    pub(crate) async fn adopt_resident(&self, dataset: &Dataset) -> usize {
        let unread: Vec<u32> = self.lock().unread.iter().collect();
        let mut resident = Vec::new();
        for local in unread {
            if dataset.cache().contains(self.file_at(local)).await {
                resident.push(local);
            }
        }

        let mut inner = self.lock();
        let mut adopted = 0;
        for local in resident {
            if inner.unread.remove(local) {
                inner.cached.insert(local);
                adopted += 1;
            }
        }
        if adopted > 0 {
            debug!(partition = %self.partition, adopted, "adopted resident files");
            self.wake(&inner, true);
        }
        adopted
    }

    /// Files whose content is in the dataset cache after being consumed this pass.
    pub fn resident_log(&self) -> Vec<FileId> {
        self.lock().resident.clone()
    }

    pub fn is_requested(&self, file: FileId) -> bool {
        self.local_index(file)
            .map(|local| self.lock().requested.test(local as usize))
            .unwrap_or(false)
    }

    pub fn is_consumed(&self, file: FileId) -> bool {
        self.local_index(file)
            .map(|local| self.lock().consumed.test(local as usize))
            .unwrap_or(false)
    }

    pub fn stats(&self) -> PartitionStats {
        let inner = self.lock();
        PartitionStats {
            partition: self.partition,
            file_count: self.range.len(),
            unread: inner.unread.len(),
            cached: inner.cached.len(),
            in_flight: inner.in_flight,
            fetching: inner.fetching,
            requested: inner.requested.count(),
            consumed: inner.consumed.count(),
            waiters: inner.waiters,
            resident: inner.resident.len(),
            cache_hits: 0,
            substitutions: 0,
            direct_fetches: 0,
            waits: 0,
            fetch_failures: 0,
        }
        .fill_counters(&self.counters)
    }
}
