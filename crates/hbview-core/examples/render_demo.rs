use hbview_core::prelude::*;
use hbview_core::{HandlebarsCompiler, HookHandle, MemoryLoader, TracingHook};
use serde_json::json;
use std::sync::Arc;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("hbview streamed render demo");
    println!("---------------------------");

    // 1. Templates live in memory for the demo
    let loader = Arc::new(
        MemoryLoader::new()
            .with_template("head.hb.html", "<head><title>{{title}}</title></head>\n")
            .with_template("body.hb.html", "<body>Hello, {{name}}</body>\n"),
    );
    let cache = TemplateCache::new(loader.clone(), Arc::new(HandlebarsCompiler::new()));
    let engine = ViewEngine::new(Arc::new(cache)).with_hook(Arc::new(TracingHook));

    // 2. Render two partials into one streamed response
    let (mut sink, mut stream) = ChannelSink::channel();
    let mut sink_with_hook = sink.clone().with_hook(HookHandle::new().with_label("demo"));
    let meta = RenderMeta::new();

    engine
        .render(&json!({"title": "Demo"}), "head.hb.html", &mut sink_with_hook, &meta, true)
        .await;
    engine
        .render(&json!({"name": "Ada"}), "body.hb.html", &mut sink, &meta, false)
        .await;
    drop(sink);
    drop(sink_with_hook);

    while let Some(event) = stream.next().await {
        match event {
            SinkEvent::Flush { output, .. } => print!("[flush] {}", output),
            SinkEvent::Done { output, .. } => print!("[done]  {}", output),
            SinkEvent::Error(err) => println!("[error] {}", err),
        }
    }

    // 3. Ancillary outputs
    println!("\nSerialized raw: {}", engine.serialized_raw("body.hb.html").await?);
    println!("\nPrecompiled:\n{}", engine.precompiled_source("body.hb.html").await?);
    println!("Loads of body.hb.html: {}", loader.load_count("body.hb.html"));

    Ok(())
}
