//! Compiled template cache.
//!
//! Maps a [`TemplateId`] to its raw source and compiled form. Entries are
//! filled lazily on first resolution and live as long as the cache; the only
//! way to refresh one is a bypassing resolve.

use crate::{CompiledTemplate, Result, TemplateCompiler, TemplateId, TemplateLoader};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A raw template source and the template compiled from it.
#[derive(Debug)]
pub struct CacheEntry {
    /// Unmodified source text.
    pub raw: String,

    /// Executable template derived from `raw`.
    pub compiled: CompiledTemplate,
}

/// Process-wide template cache.
///
/// Entries are stored behind an `Arc` and replaced with a single insert, so a
/// reader always sees a `raw`/`compiled` pair that belong together.
pub struct TemplateCache {
    loader: Arc<dyn TemplateLoader>,
    compiler: Arc<dyn TemplateCompiler>,
    entries: DashMap<TemplateId, Arc<CacheEntry>>,
    // One marker per id with a miss in progress.
    in_flight: DashMap<TemplateId, Arc<Mutex<()>>>,
    coalesce_misses: bool,
}

impl TemplateCache {
    /// Create an empty cache.
    pub fn new(loader: Arc<dyn TemplateLoader>, compiler: Arc<dyn TemplateCompiler>) -> Self {
        Self {
            loader,
            compiler,
            entries: DashMap::new(),
            in_flight: DashMap::new(),
            coalesce_misses: true,
        }
    }

    /// Share one load+compile between concurrent misses for the same id.
    ///
    /// When disabled, concurrent misses each load and compile, and the last
    /// insert wins.
    pub fn with_coalescing(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Resolve a template, loading and compiling it on a miss.
    ///
    /// With `bypass_cache` set the cached entry is ignored and replaced by a
    /// fresh one. A failed load or compile leaves any existing entry intact.
    pub async fn resolve(&self, id: &TemplateId, bypass_cache: bool) -> Result<Arc<CacheEntry>> {
        if bypass_cache {
            debug!("Bypassing cache for {}", id);
            return self.refresh(id).await;
        }

        if let Some(entry) = self.peek(id) {
            debug!("Template cache hit: {}", id);
            return Ok(entry);
        }

        if !self.coalesce_misses {
            return self.refresh(id).await;
        }

        let marker = self.in_flight.entry(id.clone()).or_default().value().clone();
        let result = {
            let _guard = marker.lock().await;
            match self.peek(id) {
                Some(entry) => {
                    debug!("Template resolved by concurrent miss: {}", id);
                    Ok(entry)
                }
                None => self.refresh(id).await,
            }
        };
        // Map + our clone means nobody else is waiting on it.
        self.in_flight.remove_if(id, |_, m| Arc::strong_count(m) <= 2);
        result
    }

    /// Load, compile and store a fresh entry.
    async fn refresh(&self, id: &TemplateId) -> Result<Arc<CacheEntry>> {
        let raw = self.loader.load(id).await?;
        let compiled = self.compiler.compile(id, &raw)?;
        let entry = Arc::new(CacheEntry { raw, compiled });
        self.entries.insert(id.clone(), Arc::clone(&entry));
        info!("Compiled and cached template {} ({})", id, self.compiler.name());
        Ok(entry)
    }

    /// Serialize the freshest raw source of a template for another runtime.
    ///
    /// Always reloads and recompiles (refreshing the cached entry), then
    /// returns the raw source as a JSON string literal.
    pub async fn stringify_raw(&self, id: &TemplateId) -> Result<String> {
        let entry = self.resolve(id, true).await?;
        Ok(serde_json::to_string(&entry.raw)?)
    }

    /// Emit standalone source code for a template.
    ///
    /// Never reads or writes the cache.
    pub async fn precompile_to_code(&self, id: &TemplateId) -> Result<String> {
        let raw = self.loader.load(id).await?;
        self.compiler.precompile(id, &raw)
    }

    /// The cached entry for `id`, without loading.
    pub fn peek(&self, id: &TemplateId) -> Option<Arc<CacheEntry>> {
        self.entries.get(id).map(|e| Arc::clone(e.value()))
    }

    /// Whether `id` has a cached entry.
    pub fn contains(&self, id: &TemplateId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for TemplateCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCache")
            .field("compiler", &self.compiler.name())
            .field("entries", &self.entries.len())
            .field("coalesce_misses", &self.coalesce_misses)
            .finish()
    }
}
