// src/object_store.rs
//
// Pluggable object-store abstraction the backend fetch reads through.
// Only file:// is compiled in.

use anyhow::{bail, Result};
use async_trait::async_trait;
use bytes::Bytes;

use crate::constants::FILE_SCHEME;

/// Provider-neutral object metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectMetadata {
    pub size: u64,
}

/// A minimal scheme enum so we can route URIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    File,
    Unknown,
}

/// Best-effort scheme inference from a URI.
pub fn infer_scheme(uri: &str) -> Scheme {
    if uri.starts_with(FILE_SCHEME) { Scheme::File } else { Scheme::Unknown }
}

/// ObjectStore trait for pluggable storage backends.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get entire object into memory.
    async fn get(&self, uri: &str) -> Result<Bytes>;

    /// List objects under a prefix. Returns full URIs.
    async fn list(&self, uri_prefix: &str, recursive: bool) -> Result<Vec<String>>;

    /// Stat a single object (HEAD-like).
    async fn stat(&self, uri: &str) -> Result<ObjectMetadata>;

    /// Check if an object exists.
    async fn exists(&self, uri: &str) -> Result<bool> {
        match self.stat(uri).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }
}

/// Convenience factory that picks a backend from a URI.
pub fn store_for_uri(uri: &str) -> Result<Box<dyn ObjectStore>> {
    match infer_scheme(uri) {
        Scheme::File => Ok(Box::new(crate::file_store::FileSystemObjectStore::new())),
        Scheme::Unknown => bail!("Unable to infer backend from URI: {uri}. Supported schemes: file://"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_inference() {
        assert_eq!(infer_scheme("s3://bucket/key"), Scheme::Unknown);
        assert_eq!(infer_scheme("file:///tmp/x"), Scheme::File);
        assert_eq!(infer_scheme("/tmp/x"), Scheme::Unknown);
    }

    #[test]
    fn factory_rejects_unsupported_schemes() {
        assert!(store_for_uri("file:///tmp").is_ok());
        assert!(store_for_uri("s3://bucket/").is_err());
        assert!(store_for_uri("ftp://host/").is_err());
    }
}
