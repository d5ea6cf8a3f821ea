//! Compiled, reusable programs.

use std::fmt;
use std::sync::Arc;

use crate::cel::ast::Expr;
use crate::cel::error::EvalError;
use crate::cel::eval::{Activation, Evaluator};
use crate::cel::library::Library;
use crate::cel::value::Value;

/// A checked expression bound to the library it was compiled against.
/// Programs are immutable and may be evaluated from many threads at once.
#[derive(Clone)]
pub struct Program {
    source: String,
    expr: Expr,
    library: Arc<Library>,
}

impl Program {
    pub fn new(source: impl Into<String>, expr: Expr, library: Arc<Library>) -> Self {
        Program {
            source: source.into(),
            expr,
            library,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn eval(&self, activation: &dyn Activation) -> Result<Value, EvalError> {
        Evaluator::new(&self.library).eval(&self.expr, activation)
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}
