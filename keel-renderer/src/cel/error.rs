//! Error types for expression compilation and evaluation.

use thiserror::Error;

/// Errors raised while turning expression source into a program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// Lexing or parsing failed; `column` is 1-based.
    #[error("syntax error at column {column}: {message}")]
    Syntax { column: usize, message: String },

    /// An identifier that is neither an input variable nor a bound
    /// comprehension variable.
    #[error("undeclared reference to '{0}' (in container '')")]
    UndeclaredReference(String),

    /// A call to a function no library registers.
    #[error("undeclared reference to function '{0}'")]
    UndeclaredFunction(String),

    /// A registered function called in a style it does not support
    /// (`x.f()` vs `f(x)`).
    #[error("function '{name}' cannot be called as {style}")]
    CallStyle { name: String, style: &'static str },

    /// A macro rejected its arguments.
    #[error("{0}")]
    Macro(String),
}

impl CompileError {
    pub(crate) fn syntax(column: usize, message: impl Into<String>) -> Self {
        CompileError::Syntax {
            column,
            message: message.into(),
        }
    }
}

/// Errors raised while evaluating a compiled program.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// A map lookup (`m.k` or `m["k"]`) on a key that is not present.
    #[error("no such key: {0}")]
    NoSuchKey(String),

    /// Variable missing from the activation.
    #[error("undeclared reference to '{0}'")]
    UndeclaredReference(String),

    #[error("no such overload: {function}({args})")]
    NoSuchOverload { function: String, args: String },

    #[error("type '{0}' does not support field selection")]
    UnsupportedSelection(&'static str),

    #[error("unsupported map key type: {0}")]
    UnsupportedKeyType(&'static str),

    #[error("index '{index}' out of range in list of size {size}")]
    IndexOutOfRange { index: i64, size: usize },

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulus by zero")]
    ModulusByZero,

    #[error("integer overflow in {0}")]
    Overflow(&'static str),

    #[error("repeated key in map literal: {0}")]
    DuplicateKey(String),

    #[error("optional.none() dereference")]
    EmptyOptional,

    #[error("invalid argument to {function}: {message}")]
    InvalidArgument { function: String, message: String },
}

impl EvalError {
    /// Build a [`EvalError::NoSuchOverload`] from the function name and the
    /// argument values that failed to match.
    pub fn no_overload(function: &str, args: &[crate::cel::Value]) -> Self {
        let args = args
            .iter()
            .map(|a| a.type_name())
            .collect::<Vec<_>>()
            .join(", ");
        EvalError::NoSuchOverload {
            function: function.to_owned(),
            args,
        }
    }

    pub fn invalid(function: &str, message: impl Into<String>) -> Self {
        EvalError::InvalidArgument {
            function: function.to_owned(),
            message: message.into(),
        }
    }
}

/// Errors raised while assembling an environment or extending a library.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvironmentError {
    /// An input variable name that can never be declared.
    #[error("invalid variable name '{0}'")]
    InvalidVariable(String),

    #[error("function '{0}' is already registered")]
    DuplicateFunction(String),

    #[error("macro '{0}' is already registered with the same arity")]
    DuplicateMacro(String),
}
