//! # hbview Configuration
//!
//! Central configuration for the view engine.
//! Supports loading from environment variables and programmatic defaults.

use std::env;
use std::path::PathBuf;

/// Configuration for a [`ViewEngine`](crate::ViewEngine).
///
/// # Example
/// ```rust
/// use hbview_core::ViewConfig;
///
/// // Load from environment
/// let config = ViewConfig::from_env();
///
/// // Or customize
/// let config = ViewConfig::default()
///     .with_template_root("views")
///     .with_cache_templates(false);
/// assert!(!config.cache_templates);
/// ```
#[derive(Debug, Clone)]
pub struct ViewConfig {
    /// Directory template ids are resolved against.
    /// Default: None (ids are used as paths), Env: HBVIEW_TEMPLATE_ROOT=views
    pub template_root: Option<PathBuf>,

    /// Serve compiled templates from the cache.
    /// When false every render reloads and recompiles (development mode).
    /// Default: true, Env: HBVIEW_CACHE_TEMPLATES=false
    pub cache_templates: bool,

    /// Fail rendering when a template references a missing field.
    /// Default: false, Env: HBVIEW_STRICT=true
    pub strict_mode: bool,

    /// Escape HTML in `{{expr}}` output.
    /// Default: true, Env: HBVIEW_ESCAPE_HTML=false
    pub escape_html: bool,

    /// Share one load+compile between concurrent misses for the same template.
    /// Default: true, Env: HBVIEW_COALESCE=false
    pub coalesce_misses: bool,

    /// Event name passed to render hooks.
    /// Default: "hb", Env: HBVIEW_HOOK_EVENT=view
    pub hook_event: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            template_root: None,
            cache_templates: true,
            strict_mode: false,
            escape_html: true,
            coalesce_misses: true,
            hook_event: "hb".to_string(),
        }
    }
}

fn flag_on(v: &str) -> bool {
    v.eq_ignore_ascii_case("true") || v == "1"
}

fn flag_off(v: &str) -> bool {
    v.eq_ignore_ascii_case("false") || v == "0"
}

impl ViewConfig {
    /// Create a new config from environment variables.
    /// Falls back to defaults for missing variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = env::var("HBVIEW_TEMPLATE_ROOT") {
            if !v.is_empty() {
                config.template_root = Some(PathBuf::from(v));
            }
        }
        if let Ok(v) = env::var("HBVIEW_CACHE_TEMPLATES") {
            config.cache_templates = !flag_off(&v);
        }
        if let Ok(v) = env::var("HBVIEW_STRICT") {
            config.strict_mode = flag_on(&v);
        }
        if let Ok(v) = env::var("HBVIEW_ESCAPE_HTML") {
            config.escape_html = !flag_off(&v);
        }
        if let Ok(v) = env::var("HBVIEW_COALESCE") {
            config.coalesce_misses = !flag_off(&v);
        }
        if let Ok(v) = env::var("HBVIEW_HOOK_EVENT") {
            config.hook_event = v;
        }

        config
    }

    /// Builder: Set the template root directory.
    pub fn with_template_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.template_root = Some(root.into());
        self
    }

    /// Builder: Enable or disable template caching.
    pub fn with_cache_templates(mut self, enabled: bool) -> Self {
        self.cache_templates = enabled;
        self
    }

    /// Builder: Enable or disable strict mode.
    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    /// Builder: Enable or disable HTML escaping.
    pub fn with_escape_html(mut self, enabled: bool) -> Self {
        self.escape_html = enabled;
        self
    }

    /// Builder: Enable or disable miss coalescing.
    pub fn with_coalesce_misses(mut self, enabled: bool) -> Self {
        self.coalesce_misses = enabled;
        self
    }

    /// Builder: Set the hook event name.
    pub fn with_hook_event(mut self, event: impl Into<String>) -> Self {
        self.hook_event = event.into();
        self
    }
}
