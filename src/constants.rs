// src/constants.rs
//
// Centralized constants for epochcache to avoid hardcoded values throughout the codebase

/// Default number of files grouped into one partition when the caller does not choose.
pub const DEFAULT_PARTITION_SIZE: u32 = 1024;

/// Default per-partition content cache budget (256 MiB).
pub const DEFAULT_PARTITION_CACHE_BYTES: u64 = 256 * 1024 * 1024;

/// URI scheme handled by the local filesystem store.
pub const FILE_SCHEME: &str = "file://";

// ============================================================================
// Environment variables read by `PassOptions::from_env`
// ============================================================================

/// `substitute` | `exact`
pub const ENV_MODE: &str = "EPOCHCACHE_MODE";

/// `requeue` | `drop`
pub const ENV_FETCH_FAILURE: &str = "EPOCHCACHE_FETCH_FAILURE";

/// humantime duration, e.g. `30s` or `500ms`
pub const ENV_WAIT_TIMEOUT: &str = "EPOCHCACHE_WAIT_TIMEOUT";

/// u64 seed for reproducible pool draws
pub const ENV_SEED: &str = "EPOCHCACHE_SEED";
