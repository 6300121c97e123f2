use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use hbview_core::{
    ChannelSink, CollectingSink, HookHandle, OutputSink, RenderMeta, SinkEvent, TracingHook,
    ViewConfig, ViewEngine, ViewError,
};
use log::{debug, info, warn};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_stream::StreamExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory template paths are resolved against (overrides HBVIEW_TEMPLATE_ROOT)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Fail on references to missing fields
    #[arg(long, global = true)]
    strict: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render one or more templates into a single response
    Render {
        /// Template to render; repeat to render several templates into one response
        #[arg(short, long, required = true)]
        template: Vec<PathBuf>,

        /// Print each chunk as soon as it is rendered
        #[arg(long)]
        stream: bool,

        /// JSON file with the data payload (defaults to `{}`)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// JSON file with render metadata
        #[arg(long)]
        meta: Option<PathBuf>,

        /// Output file path (optional, prints to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the template's raw source as a JSON string
    Stringify {
        /// Path to the template file
        #[arg(short, long)]
        template: PathBuf,
    },

    /// Emit standalone Rust source that renders the template
    Precompile {
        /// Path to the template file
        #[arg(short, long)]
        template: PathBuf,

        /// Output file path (optional, prints to stdout if not provided)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let cli = Cli::parse();

    let mut config = ViewConfig::from_env();
    if let Some(root) = &cli.root {
        config = config.with_template_root(root);
    }
    if cli.strict {
        config = config.with_strict_mode(true);
    }
    debug!("Using config {:?}", config);

    let engine = ViewEngine::from_config(config).with_hook(Arc::new(TracingHook));

    match cli.command {
        Commands::Render {
            template,
            stream,
            data,
            meta,
            output,
        } => {
            let data = read_json(data.as_ref()).await?.unwrap_or(Value::Object(Default::default()));
            let meta = read_json(meta.as_ref()).await?.map(RenderMeta::from).unwrap_or_default();
            render(&engine, &template, &data, &meta, stream, output.as_ref()).await?;
        }
        Commands::Stringify { template } => {
            let serialized = engine
                .serialized_raw(template.as_path())
                .await
                .with_context(|| format!("Failed to stringify {:?}", template))?;
            println!("{}", serialized);
        }
        Commands::Precompile { template, output } => {
            let code = engine
                .precompiled_source(template.as_path())
                .await
                .with_context(|| format!("Failed to precompile {:?}", template))?;
            write_output(output.as_ref(), &code).await?;
        }
    }

    Ok(())
}

async fn read_json(path: Option<&PathBuf>) -> Result<Option<Value>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {:?}", path))?;
    let value = serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {:?}", path))?;
    Ok(Some(value))
}

async fn render(
    engine: &ViewEngine,
    templates: &[PathBuf],
    data: &Value,
    meta: &RenderMeta,
    stream: bool,
    output: Option<&PathBuf>,
) -> Result<()> {
    if stream {
        let body = render_streamed(engine, templates, data, meta, output.is_none()).await?;
        match output {
            Some(path) => write_output(Some(path), &body).await?,
            None => println!(),
        }
    } else {
        let body = render_collected(engine, templates, data, meta).await?;
        write_output(output, &body).await?;
    }
    Ok(())
}

fn request_handle() -> HookHandle {
    HookHandle::new().with_label("hbview-cli")
}

/// Render every template into one `CollectingSink`; the last one gets `done`.
async fn render_collected(
    engine: &ViewEngine,
    templates: &[PathBuf],
    data: &Value,
    meta: &RenderMeta,
) -> Result<String> {
    let mut sink = CollectingSink::new().with_hook(request_handle());

    for (i, template) in templates.iter().enumerate() {
        let has_more = i + 1 < templates.len();
        info!("Rendering {:?}", template);
        engine
            .render(data, template.as_path(), &mut sink, meta, has_more)
            .await;
        if let Some(err) = sink.errors().next() {
            bail!("Render of {:?} failed: {}", template, err);
        }
    }

    Ok(sink.body())
}

/// Forwards to a `ChannelSink` and remembers whether a render failed.
struct FailFastSink {
    inner: ChannelSink,
    failed: bool,
}

impl OutputSink for FailFastSink {
    fn error(&mut self, err: ViewError) {
        self.failed = true;
        self.inner.error(err);
    }

    fn flush(&mut self, output: String, meta: &RenderMeta) {
        self.inner.flush(output, meta);
    }

    fn done(&mut self, output: String, meta: &RenderMeta) {
        self.inner.done(output, meta);
    }

    fn hook(&self) -> Option<&HookHandle> {
        self.inner.hook()
    }
}

/// Render through a `ChannelSink` while a separate task drains it, so each
/// chunk is written (when `echo` is set) as soon as its render finishes.
async fn render_streamed(
    engine: &ViewEngine,
    templates: &[PathBuf],
    data: &Value,
    meta: &RenderMeta,
    echo: bool,
) -> Result<String> {
    let (channel, mut events) = ChannelSink::channel();

    let drain = tokio::spawn(async move {
        let mut body = String::new();
        while let Some(event) = events.next().await {
            match event {
                SinkEvent::Flush { output: chunk, .. } | SinkEvent::Done { output: chunk, .. } => {
                    if echo {
                        let mut stdout = std::io::stdout().lock();
                        stdout.write_all(chunk.as_bytes())?;
                        stdout.flush()?;
                    }
                    body.push_str(&chunk);
                }
                SinkEvent::Error(err) => bail!("Render failed: {}", err),
            }
        }
        Ok::<_, anyhow::Error>(body)
    });

    let mut sink = FailFastSink {
        inner: channel.with_hook(request_handle()),
        failed: false,
    };
    for (i, template) in templates.iter().enumerate() {
        let has_more = i + 1 < templates.len();
        info!("Rendering {:?}", template);
        engine
            .render(data, template.as_path(), &mut sink, meta, has_more)
            .await;
        if sink.failed {
            warn!("Stopping after failed render of {:?}", template);
            break;
        }
    }
    drop(sink);

    drain.await.context("Output task failed")?
}

async fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            tokio::fs::write(path, content)
                .await
                .context("Failed to write output file")?;
            info!("Success! Output written to {:?}", path);
        }
        None => println!("{}", content),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hbview_core::{HandlebarsCompiler, MemoryLoader, TemplateCache};
    use serde_json::json;

    fn setup() -> (Arc<MemoryLoader>, ViewEngine) {
        let loader = Arc::new(
            MemoryLoader::new()
                .with_template("head", "<h1>{{title}}</h1>")
                .with_template("body", "<p>{{title}}</p>"),
        );
        let cache = TemplateCache::new(loader.clone(), Arc::new(HandlebarsCompiler::new()));
        (loader, ViewEngine::new(Arc::new(cache)))
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[tokio::test]
    async fn test_collected_render_joins_templates() {
        let (_, engine) = setup();
        let body = render_collected(&engine, &paths(&["head", "body"]), &json!({"title": "Hi"}), &RenderMeta::new())
            .await
            .unwrap();
        assert_eq!(body, "<h1>Hi</h1><p>Hi</p>");
    }

    #[tokio::test]
    async fn test_streamed_render_joins_templates() {
        let (_, engine) = setup();
        let body = render_streamed(
            &engine,
            &paths(&["head", "body"]),
            &json!({"title": "Hi"}),
            &RenderMeta::new(),
            false,
        )
        .await
        .unwrap();
        assert_eq!(body, "<h1>Hi</h1><p>Hi</p>");
    }

    #[tokio::test]
    async fn test_collected_render_stops_at_first_error() {
        let (loader, engine) = setup();
        let err = render_collected(&engine, &paths(&["head", "missing", "body"]), &json!({}), &RenderMeta::new())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("missing"));
        assert_eq!(loader.load_count("body"), 0);
    }

    #[tokio::test]
    async fn test_streamed_render_stops_at_first_error() {
        let (loader, engine) = setup();
        let result = render_streamed(
            &engine,
            &paths(&["head", "missing", "body"]),
            &json!({}),
            &RenderMeta::new(),
            false,
        )
        .await;

        assert!(result.is_err());
        assert_eq!(loader.load_count("head"), 1);
        assert_eq!(loader.load_count("body"), 0);
    }
}
