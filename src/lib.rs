// src/lib.rs
//
// Crate root: module tree plus the re-exports most callers need.

pub mod backend;
pub mod catalog;
pub mod constants;
pub mod content_cache;
pub mod epoch;
pub mod file_store;
pub mod object_store;
pub mod stdx;
pub mod types;

pub use backend::{Backend, FetchRequest, StoreBackend};
pub use catalog::{Admission, CacheBudget, CatalogError, Dataset, DatasetBuilder, FileRange, Partition};
pub use content_cache::{CacheStats, ContentCache};
pub use epoch::{
    EpochTable, ExhaustCause, FetchFailurePolicy, GetError, GetMode, GetOptions, InitError,
    PartitionStats, PassOptions, PassStats,
};
pub use file_store::FileSystemObjectStore;
pub use object_store::{infer_scheme, store_for_uri, ObjectMetadata, ObjectStore, Scheme};
pub use types::{Content, FileId, PartitionId};
