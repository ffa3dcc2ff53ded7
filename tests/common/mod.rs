// tests/common/mod.rs
//
// Shared helpers for the integration tests: an in-memory backend with
// failure injection and artificial latency.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use epochcache::{Backend, Content, Dataset, FetchRequest};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves `"content:<name>"` for every file, optionally after a delay.
#[derive(Default)]
pub struct MockBackend {
    delay: Option<Duration>,
    failing: Mutex<HashSet<String>>,
    fetches: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    /// Every later fetch of `name` fails until [`heal`](Self::heal) is called.
    pub fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn fetch(&self, req: FetchRequest<'_>) -> Result<Content> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(req.name) {
            bail!("injected failure for {}", req.name);
        }
        Ok(content_for(req.name))
    }
}

pub fn content_for(name: &str) -> Content {
    Content::from(format!("content:{name}"))
}

pub fn names(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("sample-{i:04}.bin")).collect()
}

pub fn dataset(files: usize, partition_size: u32) -> Arc<Dataset> {
    Arc::new(
        Dataset::builder(0)
            .partition_size(partition_size)
            .names(names(files))
            .build()
            .expect("valid catalog"),
    )
}

/// Install a test subscriber once; honours RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
