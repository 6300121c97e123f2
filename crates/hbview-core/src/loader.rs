//! Template loaders.
//!
//! A loader reads raw template source for an id. It makes a single attempt
//! and never retries; failures surface as [`ViewError::Load`].

use crate::{Result, TemplateId, ViewError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Trait that template storage backends must implement.
#[async_trait]
pub trait TemplateLoader: Send + Sync {
    /// Read the raw source of a template.
    async fn load(&self, id: &TemplateId) -> Result<String>;
}

/// Loads templates from the filesystem.
///
/// Ids are treated as paths, resolved against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct FsLoader {
    root: Option<PathBuf>,
}

impl FsLoader {
    /// Create a loader that uses ids as paths verbatim.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve ids relative to `root`.
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// The path an id resolves to.
    pub fn path_for(&self, id: &TemplateId) -> PathBuf {
        match &self.root {
            Some(root) => root.join(id.as_path()),
            None => id.as_path().to_path_buf(),
        }
    }
}

#[async_trait]
impl TemplateLoader for FsLoader {
    async fn load(&self, id: &TemplateId) -> Result<String> {
        let path = self.path_for(id);
        debug!("Reading template {} from {:?}", id, path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ViewError::Load {
                id: id.clone(),
                source,
            })
    }
}

/// In-memory template store.
///
/// Counts loads per id and can be told to fail for specific ids, which makes
/// it the loader of choice for tests and for hosts that embed templates.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    sources: DashMap<TemplateId, String>,
    failures: DashMap<TemplateId, io::ErrorKind>,
    loads: DashMap<TemplateId, usize>,
    total_loads: AtomicUsize,
    delay: Option<Duration>,
}

impl MemoryLoader {
    /// Create an empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template.
    pub fn with_template(self, id: impl Into<TemplateId>, source: impl Into<String>) -> Self {
        self.insert(id, source);
        self
    }

    /// Sleep this long inside every load, so concurrent loads overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Add or replace a template.
    pub fn insert(&self, id: impl Into<TemplateId>, source: impl Into<String>) {
        self.sources.insert(id.into(), source.into());
    }

    /// Remove a template; later loads fail with `NotFound`.
    pub fn remove(&self, id: &str) {
        self.sources.remove(id);
    }

    /// Make every load of `id` fail with `kind` until cleared.
    pub fn fail_with(&self, id: impl Into<TemplateId>, kind: io::ErrorKind) {
        self.failures.insert(id.into(), kind);
    }

    /// Stop injecting failures for `id`.
    pub fn clear_failure(&self, id: &str) {
        self.failures.remove(id);
    }

    /// Number of load attempts for `id`, successful or not.
    pub fn load_count(&self, id: &str) -> usize {
        self.loads.get(id).map(|n| *n).unwrap_or(0)
    }

    /// Number of load attempts across all ids.
    pub fn total_loads(&self) -> usize {
        self.total_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TemplateLoader for MemoryLoader {
    async fn load(&self, id: &TemplateId) -> Result<String> {
        *self.loads.entry(id.clone()).or_insert(0) += 1;
        self.total_loads.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(kind) = self.failures.get(id).map(|k| *k) {
            return Err(ViewError::Load {
                id: id.clone(),
                source: io::Error::new(kind, format!("injected failure for {}", id)),
            });
        }

        self.sources
            .get(id)
            .map(|s| s.value().clone())
            .ok_or_else(|| ViewError::Load {
                id: id.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, format!("no template named {}", id)),
            })
    }
}
