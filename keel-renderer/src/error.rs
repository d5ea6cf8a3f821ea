//! Error types for keel-renderer.

use thiserror::Error;

use crate::cel::{CompileError, EnvironmentError, EvalError};

/// All errors that can arise from rendering a template value.
///
/// Every variant except [`TemplateError::Environment`] names the expression
/// or key that failed so template authors can find it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Declaring the input variables failed.
    #[error("failed to build CEL environment: {0}")]
    Environment(#[from] EnvironmentError),

    /// The expression does not parse, or references something undeclared.
    #[error("CEL compilation error in expression '{expression}': {source}")]
    Compile {
        expression: String,
        source: CompileError,
    },

    /// The expression compiled but failed at runtime.
    #[error("CEL evaluation error in expression '{expression}': {source}")]
    Evaluation {
        expression: String,
        source: EvalError,
    },

    /// A map key written as a whole-string expression produced a non-string.
    #[error("dynamic map key '{key}' must evaluate to a string, got {kind}: {value}")]
    DynamicKeyType {
        key: String,
        kind: &'static str,
        value: String,
    },
}

impl TemplateError {
    /// Whether the failure means "the data isn't there": a missing map key at
    /// runtime or an undeclared variable at compile time. Optional contexts
    /// treat these as absent instead of failing.
    pub fn is_missing_data(&self) -> bool {
        match self {
            TemplateError::Compile { source, .. } => {
                matches!(source, CompileError::UndeclaredReference(_))
            }
            TemplateError::Evaluation { source, .. } => matches!(
                source,
                EvalError::NoSuchKey(_) | EvalError::UndeclaredReference(_)
            ),
            _ => false,
        }
    }

    /// The failing expression source, when there is one.
    pub fn expression(&self) -> Option<&str> {
        match self {
            TemplateError::Compile { expression, .. }
            | TemplateError::Evaluation { expression, .. } => Some(expression),
            _ => None,
        }
    }
}
