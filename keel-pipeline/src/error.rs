//! Error types for keel-pipeline.

use std::path::PathBuf;

use thiserror::Error;

use keel_core::ManifestError;
use keel_renderer::cel::EnvironmentError;
use keel_renderer::TemplateError;

/// All errors that can arise from rendering a component or writing its release.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The render request is incomplete or inconsistent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An addon instance names an addon the request does not define.
    #[error("addon {0} referenced but not found in addons list")]
    UnknownAddon(String),

    /// The pipeline's extension functions clash with the engine's.
    #[error("failed to set up template engine: {0}")]
    Engine(#[from] EnvironmentError),

    #[error("failed to evaluate includeWhen for resource {resource}: {source}")]
    IncludeWhen {
        resource: String,
        #[source]
        source: TemplateError,
    },

    #[error("includeWhen must evaluate to bool for resource {resource}, got {kind}")]
    IncludeWhenNotBool { resource: String, kind: &'static str },

    #[error("failed to evaluate forEach expression for resource {resource}: {source}")]
    ForEach {
        resource: String,
        #[source]
        source: TemplateError,
    },

    #[error("forEach must evaluate to a list for resource {resource}, got {kind}")]
    ForEachNotList { resource: String, kind: &'static str },

    #[error("failed to render template for resource {resource}: {source}")]
    Render {
        resource: String,
        #[source]
        source: TemplateError,
    },

    #[error("template must render to an object for resource {resource}, got {kind}")]
    NotAnObject { resource: String, kind: &'static str },

    #[error("resource {resource} missing required field '{field}'")]
    MissingField {
        resource: String,
        field: &'static str,
    },

    /// Post-render validation of the whole resource list failed.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("failed to serialize render context: {0}")]
    Context(#[from] serde_json::Error),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    /// The underlying template error, for callers that want the failing
    /// expression.
    pub fn template_error(&self) -> Option<&TemplateError> {
        match self {
            PipelineError::IncludeWhen { source, .. }
            | PipelineError::ForEach { source, .. }
            | PipelineError::Render { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Convenience constructor for [`PipelineError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> PipelineError {
    PipelineError::Io {
        path: path.into(),
        source,
    }
}

/// Short type name of a rendered value, for error messages.
pub(crate) fn kind_of(value: &keel_core::TemplateValue) -> &'static str {
    use keel_core::TemplateValue;
    match value {
        TemplateValue::Null => "null",
        TemplateValue::Bool(_) => "bool",
        TemplateValue::Number(_) => "number",
        TemplateValue::String(_) => "string",
        TemplateValue::Array(_) => "list",
        TemplateValue::Object(_) => "map",
    }
}
