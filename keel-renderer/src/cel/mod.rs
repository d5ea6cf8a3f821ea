//! A CEL dialect: lexer, parser, macro expansion, reference checking and a
//! tree-walking evaluator over dynamically typed values.
//!
//! The pipeline for one expression is
//! `parse` → `macros::expand` → `checker::check` → [`Program`].

pub mod ast;
pub mod checker;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod library;
pub mod macros;
pub mod parser;
pub mod program;
pub mod stdlib;
pub mod value;

pub use ast::Expr;
pub use error::{CompileError, EnvironmentError, EvalError};
pub use eval::{Activation, Evaluator};
pub use library::{Arity, CallStyle, Function, Library, Macro};
pub use parser::parse;
pub use program::Program;
pub use stdlib::standard_library;
pub use value::{format_double, map_get, MapKey, Value, ValueMap};
