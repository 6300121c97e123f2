//! Template identifiers and compiled templates.
//!
//! A [`TemplateId`] names where a template's source lives and doubles as the
//! cache key. A [`CompiledTemplate`] is the executable form produced by a
//! [`TemplateCompiler`](crate::TemplateCompiler).

use crate::{Result, ViewError};
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::Path;

/// Opaque identifier of a template's storage location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateId(String);

impl TemplateId {
    /// Create a new template id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The id interpreted as a filesystem path.
    pub fn as_path(&self) -> &Path {
        Path::new(&self.0)
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TemplateId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for TemplateId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TemplateId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TemplateId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&TemplateId> for TemplateId {
    fn from(id: &TemplateId) -> Self {
        id.clone()
    }
}

impl From<&Path> for TemplateId {
    fn from(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }
}

/// An executable template.
///
/// Each compiled template owns a private Handlebars registry holding exactly
/// one parsed template, so rendering never re-parses the source.
#[derive(Debug)]
pub struct CompiledTemplate {
    id: TemplateId,
    registry: Handlebars<'static>,
}

impl CompiledTemplate {
    pub(crate) fn new(id: TemplateId, registry: Handlebars<'static>) -> Self {
        Self { id, registry }
    }

    /// The template this was compiled from.
    pub fn id(&self) -> &TemplateId {
        &self.id
    }

    /// Render the template with the given data.
    pub fn render<T: Serialize>(&self, data: &T) -> Result<String> {
        self.registry
            .render(self.id.as_str(), data)
            .map_err(|source| ViewError::Render {
                id: self.id.clone(),
                source,
            })
    }
}
