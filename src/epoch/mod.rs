// src/epoch/mod.rs
//
// Per-pass read protocol: each file of a dataset is delivered at most once
// per pass, served from prefetched content when possible.

pub mod error;
pub mod options;
pub mod partition;
pub mod stats;
pub mod table;

pub use error::{ExhaustCause, GetError, InitError};
pub use options::{FetchFailurePolicy, GetMode, GetOptions, PassOptions};
pub use partition::PartitionState;
pub use stats::{PartitionStats, PassStats};
pub use table::EpochTable;
