// src/epoch/error.rs

use std::fmt;
use thiserror::Error;

use crate::stdx::AllocError;
use crate::types::{FileId, PartitionId};

/// Why a partition had nothing to hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustCause {
    /// No unread, cached or in-flight files remain in this pass.
    Drained,
    /// Exact read whose file was already handed to another reader by substitution.
    Consumed,
    /// The wait for prefetched content passed its deadline.
    DeadlineExpired,
    /// The wait for prefetched content was cancelled.
    Cancelled,
}

impl fmt::Display for ExhaustCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExhaustCause::Drained => "drained",
            ExhaustCause::Consumed => "content already consumed",
            ExhaustCause::DeadlineExpired => "wait deadline expired",
            ExhaustCause::Cancelled => "wait cancelled",
        })
    }
}

#[derive(Error, Debug)]
pub enum GetError {
    #[error("epoch table used before init")]
    NotInitialized,

    #[error("file not found in catalog: {0}")]
    NotFound(String),

    #[error("file {0} was already requested in this pass")]
    AlreadyRequested(FileId),

    #[error("partition {partition} has nothing left for this pass: {cause}")]
    Exhausted {
        partition: PartitionId,
        cause: ExhaustCause,
    },

    #[error("backend fetch of file {file} failed: {source}")]
    FetchFailed {
        file: FileId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    #[error("internal invariant violated: {0}")]
    InternalInvariantViolation(String),
}

impl GetError {
    /// True for every outcome callers should treat as "this partition is done for now".
    pub fn is_exhausted(&self) -> bool {
        matches!(self, GetError::Exhausted { .. })
    }

    pub(crate) fn fetch_failed(file: FileId, err: anyhow::Error) -> Self {
        GetError::FetchFailed { file, source: err.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InitError {
    #[error("epoch table is already initialized")]
    AlreadyInitialized,

    #[error(transparent)]
    Alloc(#[from] AllocError),
}
