//! # hbview Core
//!
//! Server-side Handlebars view engine.
//!
//! Given a template id and a data payload, the engine loads the template
//! source, compiles it, caches the compiled form and pushes the rendered
//! output into a caller-supplied sink, either as a final chunk or as one
//! piece of a streamed response.
//!
//! ## Features
//!
//! - Pluggable template storage ([`TemplateLoader`])
//! - Process-wide compiled template cache with per-call bypass
//! - Incremental (`flush`) or terminal (`done`) delivery through [`OutputSink`]
//! - Start/end render hooks for observability
//! - Precompilation to standalone Rust source
//!
//! ## Example
//!
//! ```rust,ignore
//! use hbview_core::prelude::*;
//!
//! let engine = ViewEngine::from_config(ViewConfig::default().with_template_root("views"));
//! let mut sink = CollectingSink::new();
//!
//! engine.render(&data, "greet.hb.html", &mut sink, &RenderMeta::new(), false).await;
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod error;
pub mod hook;
pub mod loader;
pub mod meta;
pub mod sink;
pub mod template;

pub use cache::{CacheEntry, TemplateCache};
pub use compiler::{HandlebarsCompiler, TemplateCompiler};
pub use config::ViewConfig;
pub use engine::{RenderState, ViewEngine};
pub use error::{Result, ViewError};
pub use hook::{HookHandle, HookPhase, HookPtr, RenderHook, TracingHook};
pub use loader::{FsLoader, MemoryLoader, TemplateLoader};
pub use meta::RenderMeta;
pub use sink::{ChannelSink, CollectingSink, OutputSink, SinkEvent};
pub use template::{CompiledTemplate, TemplateId};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::{
        ChannelSink, CollectingSink, OutputSink, RenderMeta, Result, SinkEvent, TemplateCache,
        TemplateId, ViewConfig, ViewEngine, ViewError,
    };
}
