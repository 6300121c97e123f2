//! Error types for hbview.

use crate::TemplateId;
use thiserror::Error;

/// Result type alias for hbview operations.
pub type Result<T> = std::result::Result<T, ViewError>;

/// Main error type for the view engine.
///
/// Every failure travels the same channel (a sink's `error` callback or the
/// `Err` side of an ancillary call). The variants only record where the
/// failure happened; nothing in the render path branches on them.
#[derive(Debug, Error)]
pub enum ViewError {
    /// Template source could not be read from storage.
    #[error("Failed to load template '{id}': {source}")]
    Load {
        id: TemplateId,
        #[source]
        source: std::io::Error,
    },

    /// Template source is not valid Handlebars.
    #[error("Failed to compile template '{id}': {source}")]
    Compile {
        id: TemplateId,
        #[source]
        source: handlebars::TemplateError,
    },

    /// The compiled template failed while rendering data.
    #[error("Failed to render template '{id}': {source}")]
    Render {
        id: TemplateId,
        #[source]
        source: handlebars::RenderError,
    },

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ViewError {
    /// The template this error is about, if any.
    pub fn template_id(&self) -> Option<&TemplateId> {
        match self {
            Self::Load { id, .. } | Self::Compile { id, .. } | Self::Render { id, .. } => Some(id),
            Self::Json(_) | Self::Config(_) => None,
        }
    }

    /// True when storage reported that the template does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Load { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_not_found_detection() {
        let err = ViewError::Load {
            id: TemplateId::from("missing.tmpl"),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file"),
        };
        assert!(err.is_not_found());
        assert_eq!(err.template_id().map(|id| id.as_str()), Some("missing.tmpl"));
        assert!(err.to_string().contains("missing.tmpl"));
    }

    #[test]
    fn test_config_error_has_no_template() {
        let err = ViewError::Config("bad root".into());
        assert!(!err.is_not_found());
        assert!(err.template_id().is_none());
    }
}
