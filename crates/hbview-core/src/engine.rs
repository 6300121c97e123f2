//! View Engine - orchestrates a render request.
//!
//! Resolves the compiled template through the cache, invokes it with data and
//! pushes the output into the caller's sink. Per call the sequence is:
//! start hook, resolve, invoke, end hook, one sink callback.

use crate::{
    hook::{self, HookPhase, HookPtr},
    FsLoader, HandlebarsCompiler, OutputSink, RenderMeta, Result, TemplateCache, TemplateId,
    ViewConfig,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Where a render call is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Start,
    Resolving,
    Invoking,
    Delivered,
    Errored,
}

impl fmt::Display for RenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::Resolving => "resolving",
            Self::Invoking => "invoking",
            Self::Delivered => "delivered",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

/// The Handlebars view engine.
///
/// # Example
///
/// ```rust,ignore
/// use hbview_core::{CollectingSink, RenderMeta, ViewConfig, ViewEngine};
///
/// let engine = ViewEngine::from_config(ViewConfig::from_env());
/// let mut sink = CollectingSink::new();
///
/// engine
///     .render(&serde_json::json!({"name": "Ada"}), "greet.hb.html", &mut sink, &RenderMeta::new(), false)
///     .await;
/// ```
pub struct ViewEngine {
    cache: Arc<TemplateCache>,
    hook: Option<HookPtr>,
    config: ViewConfig,
}

impl ViewEngine {
    /// Create an engine over an existing cache.
    pub fn new(cache: Arc<TemplateCache>) -> Self {
        Self {
            cache,
            hook: None,
            config: ViewConfig::default(),
        }
    }

    /// Create an engine that reads templates from disk as configured.
    pub fn from_config(config: ViewConfig) -> Self {
        let mut loader = FsLoader::new();
        if let Some(root) = &config.template_root {
            loader = loader.with_root(root);
        }
        let cache = TemplateCache::new(
            Arc::new(loader),
            Arc::new(HandlebarsCompiler::from_config(&config)),
        )
        .with_coalescing(config.coalesce_misses);

        Self {
            cache: Arc::new(cache),
            hook: None,
            config,
        }
    }

    /// Set the render hook.
    pub fn with_hook(mut self, hook: HookPtr) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Replace the configuration.
    ///
    /// Only the render-time settings (`cache_templates`, `hook_event`) take
    /// effect here; the cache keeps the loader and compiler it was built with.
    pub fn with_config(mut self, config: ViewConfig) -> Self {
        self.config = config;
        self
    }

    /// The shared template cache.
    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    /// Render a template into `sink`.
    ///
    /// The result is delivered only through the sink: `done` when `has_more`
    /// is false, `flush` when it is true, or `error` on failure.
    pub async fn render<T, S>(
        &self,
        data: &T,
        template_id: impl Into<TemplateId>,
        sink: &mut S,
        meta: &RenderMeta,
        has_more: bool,
    ) where
        T: Serialize,
        S: OutputSink + ?Sized,
    {
        let id = template_id.into();
        self.render_template(data, &id, sink, meta, has_more).await
    }

    #[instrument(skip(self, data, id, sink, meta), fields(template = %id))]
    async fn render_template<T, S>(
        &self,
        data: &T,
        id: &TemplateId,
        sink: &mut S,
        meta: &RenderMeta,
        has_more: bool,
    ) where
        T: Serialize,
        S: OutputSink + ?Sized,
    {
        let bypass_cache = !self.config.cache_templates || meta.bypass_cache();
        debug!(state = %RenderState::Start, bypass_cache);

        hook::dispatch(
            self.hook.as_ref(),
            &self.config.hook_event,
            sink.hook(),
            HookPhase::Start,
            id,
        );

        debug!(state = %RenderState::Resolving);
        let entry = match self.cache.resolve(id, bypass_cache).await {
            Ok(entry) => entry,
            Err(err) => {
                debug!(state = %RenderState::Errored, error = %err);
                sink.error(err);
                return;
            }
        };

        debug!(state = %RenderState::Invoking);
        let output = match entry.compiled.render(data) {
            Ok(output) => output,
            Err(err) => {
                debug!(state = %RenderState::Errored, error = %err);
                sink.error(err);
                return;
            }
        };

        hook::dispatch(
            self.hook.as_ref(),
            &self.config.hook_event,
            sink.hook(),
            HookPhase::End,
            id,
        );

        debug!(state = %RenderState::Delivered, bytes = output.len());
        if has_more {
            sink.flush(output, meta);
        } else {
            sink.done(output, meta);
        }
    }

    /// Serialized raw source of a template, for re-compilation elsewhere.
    ///
    /// Always reloads and recompiles, even when the template is cached.
    pub async fn serialized_raw(&self, template_id: impl Into<TemplateId>) -> Result<String> {
        self.cache.stringify_raw(&template_id.into()).await
    }

    /// Standalone Rust source that renders the template.
    pub async fn precompiled_source(&self, template_id: impl Into<TemplateId>) -> Result<String> {
        self.cache.precompile_to_code(&template_id.into()).await
    }
}

impl fmt::Debug for ViewEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewEngine")
            .field("cache", &self.cache)
            .field("has_hook", &self.hook.is_some())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hook::RenderHook, ChannelSink, CollectingSink, HookHandle, MemoryLoader, SinkEvent,
        ViewError,
    };
    use serde_json::json;
    use std::io;
    use std::sync::Mutex;
    use tokio_stream::StreamExt;

    /// Sink + hook that log into one shared timeline.
    #[derive(Clone, Default)]
    struct Timeline(Arc<Mutex<Vec<String>>>);

    impl Timeline {
        fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl RenderHook for Timeline {
        fn on_event(&self, event: &str, handle: Option<&HookHandle>, phase: HookPhase, template_id: &str) {
            let label = handle.and_then(HookHandle::label).unwrap_or("-");
            self.push(format!("hook:{event}:{phase}:{template_id}:{label}"));
        }
    }

    struct TimelineSink {
        timeline: Timeline,
        handle: HookHandle,
    }

    impl OutputSink for TimelineSink {
        fn error(&mut self, err: ViewError) {
            let kind = match err {
                ViewError::Load { .. } => "load",
                ViewError::Compile { .. } => "compile",
                ViewError::Render { .. } => "render",
                ViewError::Json(_) | ViewError::Config(_) => "other",
            };
            self.timeline.push(format!("error:{kind}"));
        }

        fn flush(&mut self, output: String, _meta: &RenderMeta) {
            self.timeline.push(format!("flush:{output}"));
        }

        fn done(&mut self, output: String, _meta: &RenderMeta) {
            self.timeline.push(format!("done:{output}"));
        }

        fn hook(&self) -> Option<&HookHandle> {
            Some(&self.handle)
        }
    }

    fn setup() -> (Arc<MemoryLoader>, ViewEngine) {
        let loader = Arc::new(
            MemoryLoader::new()
                .with_template("greet.tmpl", "Hello, {{name}}")
                .with_template("t", "<p>{{body}}</p>"),
        );
        let cache = TemplateCache::new(loader.clone(), Arc::new(HandlebarsCompiler::new()));
        (loader, ViewEngine::new(Arc::new(cache)))
    }

    #[tokio::test]
    async fn test_render_done() {
        let (_, engine) = setup();
        let mut sink = CollectingSink::new();
        let meta = RenderMeta::new();

        engine
            .render(&json!({"name": "Ada"}), "greet.tmpl", &mut sink, &meta, false)
            .await;

        assert_eq!(sink.events().len(), 1);
        match &sink.events()[0] {
            SinkEvent::Done { output, meta: m } => {
                assert_eq!(output, "Hello, Ada");
                assert_eq!(m, &RenderMeta::new());
            }
            other => panic!("expected done, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_render_with_more_flushes() {
        let (_, engine) = setup();
        let mut sink = CollectingSink::new();

        engine
            .render(&json!({"body": "x"}), "t", &mut sink, &RenderMeta::new(), true)
            .await;

        assert_eq!(sink.flush_count(), 1);
        assert_eq!(sink.done_count(), 0);
        assert_eq!(sink.body(), "<p>x</p>");
    }

    #[tokio::test]
    async fn test_missing_template_errors_without_end_hook() {
        let (_, engine) = setup();
        let timeline = Timeline::default();
        let engine = engine.with_hook(Arc::new(timeline.clone()));
        let mut sink = TimelineSink {
            timeline: timeline.clone(),
            handle: HookHandle::new().with_label("req"),
        };

        engine
            .render(&json!({}), "missing.tmpl", &mut sink, &RenderMeta::new(), false)
            .await;

        assert_eq!(
            timeline.entries(),
            vec!["hook:hb:start:missing.tmpl:req".to_string(), "error:load".to_string()]
        );
    }

    #[tokio::test]
    async fn test_hooks_bracket_delivery() {
        let (_, engine) = setup();
        let timeline = Timeline::default();
        let engine = engine.with_hook(Arc::new(timeline.clone()));
        let mut sink = TimelineSink {
            timeline: timeline.clone(),
            handle: HookHandle::new().with_label("req"),
        };

        engine
            .render(&json!({"name": "Ada"}), "greet.tmpl", &mut sink, &RenderMeta::new(), false)
            .await;

        assert_eq!(
            timeline.entries(),
            vec![
                "hook:hb:start:greet.tmpl:req".to_string(),
                "hook:hb:end:greet.tmpl:req".to_string(),
                "done:Hello, Ada".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_render_uses_cache_unless_bypassed() {
        let (loader, engine) = setup();
        let data = json!({"name": "Ada"});

        for _ in 0..3 {
            let mut sink = CollectingSink::new();
            engine.render(&data, "greet.tmpl", &mut sink, &RenderMeta::new(), false).await;
        }
        assert_eq!(loader.load_count("greet.tmpl"), 1);

        loader.insert("greet.tmpl", "Hi, {{name}}");
        let mut sink = CollectingSink::new();
        engine
            .render(&data, "greet.tmpl", &mut sink, &RenderMeta::bypassing_cache(), false)
            .await;
        assert_eq!(sink.body(), "Hi, Ada");
        assert_eq!(loader.load_count("greet.tmpl"), 2);

        // Bypass does not stick to later calls.
        let mut sink = CollectingSink::new();
        engine.render(&data, "greet.tmpl", &mut sink, &RenderMeta::new(), false).await;
        assert_eq!(sink.body(), "Hi, Ada");
        assert_eq!(loader.load_count("greet.tmpl"), 2);
    }

    #[tokio::test]
    async fn test_cache_templates_disabled_always_reloads() {
        let (loader, engine) = setup();
        let engine = engine.with_config(ViewConfig::default().with_cache_templates(false));

        for _ in 0..2 {
            let mut sink = CollectingSink::new();
            engine
                .render(&json!({"name": "Ada"}), "greet.tmpl", &mut sink, &RenderMeta::new(), false)
                .await;
        }
        assert_eq!(loader.load_count("greet.tmpl"), 2);
    }

    #[tokio::test]
    async fn test_failed_bypass_does_not_evict() {
        let (loader, engine) = setup();
        let data = json!({"name": "Ada"});

        let mut sink = CollectingSink::new();
        engine.render(&data, "greet.tmpl", &mut sink, &RenderMeta::new(), false).await;

        loader.fail_with("greet.tmpl", io::ErrorKind::NotFound);
        let mut sink = CollectingSink::new();
        engine
            .render(&data, "greet.tmpl", &mut sink, &RenderMeta::bypassing_cache(), false)
            .await;
        assert_eq!(sink.errors().count(), 1);
        assert_eq!(sink.done_count(), 0);

        let mut sink = CollectingSink::new();
        engine.render(&data, "greet.tmpl", &mut sink, &RenderMeta::new(), false).await;
        assert_eq!(sink.body(), "Hello, Ada");
    }

    #[tokio::test]
    async fn test_render_failure_errors_without_end_hook() {
        let loader = Arc::new(MemoryLoader::new().with_template("strict", "{{missing}}"));
        let compiler = HandlebarsCompiler::new().with_strict_mode(true);
        let timeline = Timeline::default();
        let engine = ViewEngine::new(Arc::new(TemplateCache::new(loader, Arc::new(compiler))))
            .with_hook(Arc::new(timeline.clone()));
        let mut sink = TimelineSink {
            timeline: timeline.clone(),
            handle: HookHandle::new().with_label("req"),
        };

        engine.render(&json!({}), "strict", &mut sink, &RenderMeta::new(), false).await;

        assert_eq!(
            timeline.entries(),
            vec!["hook:hb:start:strict:req".to_string(), "error:render".to_string()]
        );
    }

    #[tokio::test]
    async fn test_compile_failure_errors_without_end_hook() {
        let (loader, engine) = setup();
        loader.insert("broken.tmpl", "{{#if x}}unclosed");
        let timeline = Timeline::default();
        let engine = engine.with_hook(Arc::new(timeline.clone()));
        let mut sink = TimelineSink {
            timeline: timeline.clone(),
            handle: HookHandle::new().with_label("req"),
        };

        engine
            .render(&json!({"x": true}), "broken.tmpl", &mut sink, &RenderMeta::new(), true)
            .await;

        assert_eq!(
            timeline.entries(),
            vec!["hook:hb:start:broken.tmpl:req".to_string(), "error:compile".to_string()]
        );
        assert!(!engine.cache().contains(&TemplateId::from("broken.tmpl")));
    }

    #[tokio::test]
    async fn test_panicking_hook_does_not_break_render() {
        struct Exploding;
        impl RenderHook for Exploding {
            fn on_event(&self, _: &str, _: Option<&HookHandle>, _: HookPhase, _: &str) {
                panic!("boom");
            }
        }

        let (_, engine) = setup();
        let engine = engine.with_hook(Arc::new(Exploding));
        let mut sink = CollectingSink::new();

        engine
            .render(&json!({"name": "Ada"}), "greet.tmpl", &mut sink, &RenderMeta::new(), false)
            .await;
        assert_eq!(sink.body(), "Hello, Ada");
    }

    #[tokio::test]
    async fn test_streamed_response_over_channel() {
        let (_, engine) = setup();
        let (mut sink, stream) = ChannelSink::channel();
        let meta = RenderMeta::new();

        engine.render(&json!({"body": "head"}), "t", &mut sink, &meta, true).await;
        engine.render(&json!({"name": "Ada"}), "greet.tmpl", &mut sink, &meta, false).await;
        drop(sink);

        let events: Vec<SinkEvent> = stream.collect().await;
        let kinds: Vec<bool> = events.iter().map(SinkEvent::is_done).collect();
        assert_eq!(kinds, vec![false, true]);
        assert_eq!(events[0].output(), Some("<p>head</p>"));
        assert_eq!(events[1].output(), Some("Hello, Ada"));
    }

    #[tokio::test]
    async fn test_serialized_raw_bypasses_cache() {
        let (loader, engine) = setup();
        let mut sink = CollectingSink::new();
        engine
            .render(&json!({"name": "Ada"}), "greet.tmpl", &mut sink, &RenderMeta::new(), false)
            .await;

        let raw = engine.serialized_raw("greet.tmpl").await.unwrap();
        assert_eq!(raw, "\"Hello, {{name}}\"");
        assert_eq!(loader.load_count("greet.tmpl"), 2);
    }

    #[tokio::test]
    async fn test_ancillary_errors_are_returned() {
        let (_, engine) = setup();
        assert!(engine.serialized_raw("missing.tmpl").await.unwrap_err().is_not_found());
        assert!(engine.precompiled_source("missing.tmpl").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_precompiled_source() {
        let (_, engine) = setup();
        let code = engine.precompiled_source("greet.tmpl").await.unwrap();
        assert!(code.contains("Hello, {{name}}"));
        assert!(engine.cache().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_renders_share_compile() {
        let loader = Arc::new(
            MemoryLoader::new()
                .with_template("t", "{{n}}")
                .with_delay(std::time::Duration::from_millis(10)),
        );
        let cache = TemplateCache::new(loader.clone(), Arc::new(HandlebarsCompiler::new()));
        let engine = Arc::new(ViewEngine::new(Arc::new(cache)));

        let mut handles = Vec::new();
        for n in 0..6 {
            let engine = Arc::clone(&engine);
            handles.push(tokio::spawn(async move {
                let mut sink = CollectingSink::new();
                engine.render(&json!({"n": n}), "t", &mut sink, &RenderMeta::new(), false).await;
                sink.body()
            }));
        }

        let mut bodies = Vec::new();
        for handle in handles {
            bodies.push(handle.await.unwrap());
        }
        assert_eq!(bodies, vec!["0", "1", "2", "3", "4", "5"]);
        assert_eq!(loader.load_count("t"), 1);
    }
}
