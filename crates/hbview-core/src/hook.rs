//! Render hooks.
//!
//! Hooks are notified before a template is resolved and after it rendered.
//! They are fire-and-forget: their result is ignored and a panicking hook is
//! logged and swallowed.

use crate::TemplateId;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Which side of a render a hook fires on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    Start,
    End,
}

impl HookPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::End => "end",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request handle a sink hands to hooks so they can correlate events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookHandle {
    request_id: Uuid,
    label: Option<String>,
}

impl Default for HookHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl HookHandle {
    /// Create a handle with a random request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            label: None,
        }
    }

    /// Attach a human-readable label (route, mojit, etc.).
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Trait for observing render events.
pub trait RenderHook: Send + Sync {
    /// Called at the start and end of a render.
    fn on_event(&self, event: &str, handle: Option<&HookHandle>, phase: HookPhase, template_id: &str);
}

pub type HookPtr = Arc<dyn RenderHook>;

/// Hook that emits a `tracing` event per notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl RenderHook for TracingHook {
    fn on_event(&self, event: &str, handle: Option<&HookHandle>, phase: HookPhase, template_id: &str) {
        debug!(
            event,
            phase = %phase,
            template = template_id,
            request_id = ?handle.map(HookHandle::request_id),
            label = ?handle.and_then(HookHandle::label),
            "view hook"
        );
    }
}

/// Notify `hook`, if any. Never propagates a failure.
pub(crate) fn dispatch(
    hook: Option<&HookPtr>,
    event: &str,
    handle: Option<&HookHandle>,
    phase: HookPhase,
    template_id: &TemplateId,
) {
    let Some(hook) = hook else {
        return;
    };
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        hook.on_event(event, handle, phase, template_id.as_str())
    }));
    if outcome.is_err() {
        warn!("Hook panicked during {} of {}; ignoring", phase, template_id);
    }
}
