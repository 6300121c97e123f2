//! Output sinks.
//!
//! A sink receives exactly one terminal callback per render: `error`,
//! `flush` (more output for the same response follows from later renders)
//! or `done` (final chunk).

use crate::{HookHandle, RenderMeta, ViewError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

/// Consumer-supplied output channel for render calls.
pub trait OutputSink: Send {
    /// The render failed.
    fn error(&mut self, err: ViewError);

    /// A chunk of output; more will follow.
    fn flush(&mut self, output: String, meta: &RenderMeta);

    /// The final chunk of output.
    fn done(&mut self, output: String, meta: &RenderMeta);

    /// Handle passed to hooks for this request.
    fn hook(&self) -> Option<&HookHandle> {
        None
    }
}

/// One sink callback.
#[derive(Debug)]
pub enum SinkEvent {
    Flush { output: String, meta: RenderMeta },
    Done { output: String, meta: RenderMeta },
    Error(ViewError),
}

impl SinkEvent {
    /// The output carried by a `Flush` or `Done`.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Flush { output, .. } | Self::Done { output, .. } => Some(output),
            Self::Error(_) => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Sink that records every callback in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Vec<SinkEvent>,
    hook: Option<HookHandle>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expose `handle` to hooks.
    pub fn with_hook(mut self, handle: HookHandle) -> Self {
        self.hook = Some(handle);
        self
    }

    pub fn events(&self) -> &[SinkEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<SinkEvent> {
        self.events
    }

    /// Outputs of every `flush` and `done`, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(SinkEvent::output)
    }

    /// All output concatenated.
    pub fn body(&self) -> String {
        self.outputs().collect()
    }

    pub fn flush_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, SinkEvent::Flush { .. }))
            .count()
    }

    pub fn done_count(&self) -> usize {
        self.events.iter().filter(|e| e.is_done()).count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ViewError> {
        self.events.iter().filter_map(|e| match e {
            SinkEvent::Error(err) => Some(err),
            _ => None,
        })
    }
}

impl OutputSink for CollectingSink {
    fn error(&mut self, err: ViewError) {
        self.events.push(SinkEvent::Error(err));
    }

    fn flush(&mut self, output: String, meta: &RenderMeta) {
        self.events.push(SinkEvent::Flush {
            output,
            meta: meta.clone(),
        });
    }

    fn done(&mut self, output: String, meta: &RenderMeta) {
        self.events.push(SinkEvent::Done {
            output,
            meta: meta.clone(),
        });
    }

    fn hook(&self) -> Option<&HookHandle> {
        self.hook.as_ref()
    }
}

/// Sink that forwards callbacks over a channel for incremental delivery.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkEvent>,
    hook: Option<HookHandle>,
}

impl ChannelSink {
    /// Create a sink and the stream its events arrive on.
    pub fn channel() -> (Self, UnboundedReceiverStream<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, hook: None }, UnboundedReceiverStream::new(rx))
    }

    /// Expose `handle` to hooks.
    pub fn with_hook(mut self, handle: HookHandle) -> Self {
        self.hook = Some(handle);
        self
    }

    fn send(&self, event: SinkEvent) {
        if self.tx.send(event).is_err() {
            debug!("Sink receiver dropped; discarding event");
        }
    }
}

impl OutputSink for ChannelSink {
    fn error(&mut self, err: ViewError) {
        self.send(SinkEvent::Error(err));
    }

    fn flush(&mut self, output: String, meta: &RenderMeta) {
        self.send(SinkEvent::Flush {
            output,
            meta: meta.clone(),
        });
    }

    fn done(&mut self, output: String, meta: &RenderMeta) {
        self.send(SinkEvent::Done {
            output,
            meta: meta.clone(),
        });
    }

    fn hook(&self) -> Option<&HookHandle> {
        self.hook.as_ref()
    }
}
