//! Template compilation.
//!
//! Turns raw Handlebars source into a [`CompiledTemplate`], or into standalone
//! Rust source that renders the same template elsewhere.

use crate::{CompiledTemplate, Result, TemplateId, ViewConfig, ViewError};
use handlebars::Handlebars;

/// Trait that template compilers must implement.
pub trait TemplateCompiler: Send + Sync {
    /// Get the compiler name.
    fn name(&self) -> &str;

    /// Compile raw source into an executable template.
    ///
    /// Fails with [`ViewError::Compile`] on malformed source.
    fn compile(&self, id: &TemplateId, raw: &str) -> Result<CompiledTemplate>;

    /// Emit standalone source code equivalent to the compiled template.
    fn precompile(&self, id: &TemplateId, raw: &str) -> Result<String>;
}

/// Handlebars compiler.
#[derive(Debug, Clone)]
pub struct HandlebarsCompiler {
    strict_mode: bool,
    escape_html: bool,
}

impl Default for HandlebarsCompiler {
    fn default() -> Self {
        Self {
            strict_mode: false,
            escape_html: true,
        }
    }
}

impl HandlebarsCompiler {
    /// Create a compiler with default settings (lenient, HTML escaping on).
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compiler from the view configuration.
    pub fn from_config(config: &ViewConfig) -> Self {
        Self {
            strict_mode: config.strict_mode,
            escape_html: config.escape_html,
        }
    }

    /// Fail rendering when a referenced field is missing.
    pub fn with_strict_mode(mut self, enabled: bool) -> Self {
        self.strict_mode = enabled;
        self
    }

    /// Escape HTML in `{{expr}}` output.
    pub fn with_escape_html(mut self, enabled: bool) -> Self {
        self.escape_html = enabled;
        self
    }

    fn registry(&self) -> Handlebars<'static> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(self.strict_mode);
        if !self.escape_html {
            registry.register_escape_fn(handlebars::no_escape);
        }
        registry
    }
}

impl TemplateCompiler for HandlebarsCompiler {
    fn name(&self) -> &str {
        "handlebars"
    }

    fn compile(&self, id: &TemplateId, raw: &str) -> Result<CompiledTemplate> {
        let mut registry = self.registry();
        registry
            .register_template_string(id.as_str(), raw)
            .map_err(|source| ViewError::Compile {
                id: id.clone(),
                source,
            })?;
        Ok(CompiledTemplate::new(id.clone(), registry))
    }

    fn precompile(&self, id: &TemplateId, raw: &str) -> Result<String> {
        handlebars::Template::compile(raw).map_err(|source| ViewError::Compile {
            id: id.clone(),
            source,
        })?;

        let escape = if self.escape_html {
            ""
        } else {
            "    registry.register_escape_fn(handlebars::no_escape);\n"
        };

        Ok(format!(
            "// Precompiled from {id:?}.\n\
             pub const SOURCE: &str = {raw:?};\n\
             \n\
             pub fn render<T: serde::Serialize>(data: &T) -> Result<String, handlebars::RenderError> {{\n\
             \x20   let mut registry = handlebars::Handlebars::new();\n\
             \x20   registry.set_strict_mode({strict});\n\
             {escape}\
             \x20   registry.render_template(SOURCE, data)\n\
             }}\n",
            id = id.as_str(),
            strict = self.strict_mode,
        ))
    }
}
