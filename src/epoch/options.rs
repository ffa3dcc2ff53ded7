// src/epoch/options.rs
//!
//! Options for one pass (`PassOptions`) and for one read (`GetOptions`).
//!
//! Builder helpers are provided so callers can write a fluent style:
//!
//! let opts = PassOptions::default()
//!     .mode(GetMode::Exact)
//!     .fetch_failure(FetchFailurePolicy::Drop)
//!     .wait_timeout(Duration::from_secs(30))
//!     .seed(42);
//!

use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::constants::{ENV_FETCH_FAILURE, ENV_MODE, ENV_SEED, ENV_WAIT_TIMEOUT};

/// Whether a read may be served with a different file's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetMode {
    /// Deliver any not-yet-delivered file of the partition, preferring the named one.
    #[default]
    Substitute,
    /// Deliver only the named file's own content.
    Exact,
}

impl FromStr for GetMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "substitute" | "any" => Ok(GetMode::Substitute),
            "exact" | "strict" => Ok(GetMode::Exact),
            other => bail!("unknown read mode {other:?} (expected substitute|exact)"),
        }
    }
}

/// What happens to a file whose direct backend fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchFailurePolicy {
    /// Put the file back in the unread pool so a later read can retry it.
    #[default]
    Requeue,
    /// Give the file up for the rest of the pass.
    Drop,
}

impl FromStr for FetchFailurePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "requeue" | "retry" => Ok(FetchFailurePolicy::Requeue),
            "drop" => Ok(FetchFailurePolicy::Drop),
            other => bail!("unknown fetch failure policy {other:?} (expected requeue|drop)"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PassOptions {
    /// Mode used by reads that do not choose one.
    pub default_mode: GetMode,
    /// Handling of files whose direct fetch failed.
    pub fetch_failure: FetchFailurePolicy,
    /// Upper bound on one wait for prefetched content. `None` waits indefinitely.
    pub wait_timeout: Option<Duration>,
    /// Seed for the random pool draws. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl PassOptions {
    pub fn mode(mut self, mode: GetMode) -> Self {
        self.default_mode = mode;
        self
    }

    pub fn fetch_failure(mut self, policy: FetchFailurePolicy) -> Self {
        self.fetch_failure = policy;
        self
    }

    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Load options from environment variables, starting from the defaults.
    ///
    /// Unset variables keep their default; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut opts = Self::default();

        if let Some(mode) = lookup(ENV_MODE) {
            opts.default_mode = mode.parse().with_context(|| format!("parsing {ENV_MODE}"))?;
        }
        if let Some(policy) = lookup(ENV_FETCH_FAILURE) {
            opts.fetch_failure = policy
                .parse()
                .with_context(|| format!("parsing {ENV_FETCH_FAILURE}"))?;
        }
        if let Some(timeout) = lookup(ENV_WAIT_TIMEOUT) {
            opts.wait_timeout = Some(
                humantime::parse_duration(timeout.trim())
                    .with_context(|| format!("parsing {ENV_WAIT_TIMEOUT}={timeout:?}"))?,
            );
        }
        if let Some(seed) = lookup(ENV_SEED) {
            opts.seed = Some(
                seed.trim()
                    .parse()
                    .with_context(|| format!("parsing {ENV_SEED}={seed:?}"))?,
            );
        }

        Ok(opts)
    }
}

/// Per-read overrides.
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Overrides [`PassOptions::default_mode`].
    pub mode: Option<GetMode>,
    /// Absolute deadline for waiting on prefetched content.
    /// Overrides [`PassOptions::wait_timeout`].
    pub deadline: Option<Instant>,
    /// Cancels a read blocked on prefetched content.
    pub cancel: Option<CancellationToken>,
}

impl GetOptions {
    pub fn exact() -> Self {
        Self { mode: Some(GetMode::Exact), ..Self::default() }
    }

    pub fn substitute() -> Self {
        Self { mode: Some(GetMode::Substitute), ..Self::default() }
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.deadline(Instant::now() + timeout)
    }

    pub fn with_cancellation_token(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let opts = PassOptions::default();
        assert_eq!(opts.default_mode, GetMode::Substitute);
        assert_eq!(opts.fetch_failure, FetchFailurePolicy::Requeue);
        assert_eq!(opts.wait_timeout, None);
        assert_eq!(opts.seed, None);
    }

    #[test]
    fn env_overrides() {
        let opts = PassOptions::from_lookup(lookup(&[
            (ENV_MODE, "Exact"),
            (ENV_FETCH_FAILURE, "drop"),
            (ENV_WAIT_TIMEOUT, "1m 30s"),
            (ENV_SEED, "7"),
        ]))
        .unwrap();
        assert_eq!(opts.default_mode, GetMode::Exact);
        assert_eq!(opts.fetch_failure, FetchFailurePolicy::Drop);
        assert_eq!(opts.wait_timeout, Some(Duration::from_secs(90)));
        assert_eq!(opts.seed, Some(7));
    }

    #[test]
    fn env_rejects_garbage() {
        assert!(PassOptions::from_lookup(lookup(&[(ENV_MODE, "sometimes")])).is_err());
        assert!(PassOptions::from_lookup(lookup(&[(ENV_WAIT_TIMEOUT, "soon")])).is_err());
        assert!(PassOptions::from_lookup(lookup(&[(ENV_SEED, "-1")])).is_err());
    }

    #[test]
    fn builders() {
        let opts = PassOptions::default()
            .mode(GetMode::Exact)
            .fetch_failure(FetchFailurePolicy::Drop)
            .wait_timeout(Duration::from_millis(250))
            .seed(9);
        assert_eq!(opts.default_mode, GetMode::Exact);
        assert_eq!(opts.wait_timeout, Some(Duration::from_millis(250)));

        let get = GetOptions::exact().with_cancellation_token(CancellationToken::new());
        assert_eq!(get.mode, Some(GetMode::Exact));
        assert!(get.cancel.is_some());
        assert!(get.deadline.is_none());
    }
}
