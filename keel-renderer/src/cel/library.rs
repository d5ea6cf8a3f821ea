//! Function and macro registry.
//!
//! A [`Library`] is the set of callables an environment compiles against.
//! Functions run on evaluated arguments; macros rewrite the syntax tree before
//! checking. Libraries are plain values: clone one, add to it, and hand it to
//! an engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::cel::ast::Expr;
use crate::cel::error::{CompileError, EnvironmentError, EvalError};
use crate::cel::value::Value;

pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Receives the (already expanded) call target and arguments. Returns
/// `Ok(None)` to leave the call untouched.
pub type MacroExpander =
    Arc<dyn Fn(Option<&Expr>, &[Expr]) -> Result<Option<Expr>, CompileError> + Send + Sync>;

/// How a function may be invoked. Member calls pass the receiver as the
/// first argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStyle {
    Global,
    Member,
    Both,
}

impl CallStyle {
    pub fn allows_global(self) -> bool {
        matches!(self, CallStyle::Global | CallStyle::Both)
    }

    pub fn allows_member(self) -> bool {
        matches!(self, CallStyle::Member | CallStyle::Both)
    }
}

#[derive(Clone)]
pub struct Function {
    name: String,
    style: CallStyle,
    imp: FunctionImpl,
}

impl Function {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn style(&self) -> CallStyle {
        self.style
    }

    pub fn call(&self, args: &[Value]) -> Result<Value, EvalError> {
        (self.imp)(args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("style", &self.style)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Variadic,
}

#[derive(Clone)]
pub struct Macro {
    name: String,
    receiver: bool,
    arity: Arity,
    expander: MacroExpander,
}

impl Macro {
    /// A macro matched by `name(args...)`.
    pub fn global(
        name: impl Into<String>,
        arity: Arity,
        expander: impl Fn(Option<&Expr>, &[Expr]) -> Result<Option<Expr>, CompileError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Macro {
            name: name.into(),
            receiver: false,
            arity,
            expander: Arc::new(expander),
        }
    }

    /// A macro matched by `target.name(args...)`.
    pub fn receiver(
        name: impl Into<String>,
        arity: Arity,
        expander: impl Fn(Option<&Expr>, &[Expr]) -> Result<Option<Expr>, CompileError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Macro {
            name: name.into(),
            receiver: true,
            arity,
            expander: Arc::new(expander),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn matches(&self, receiver: bool, argc: usize) -> bool {
        self.receiver == receiver
            && match self.arity {
                Arity::Exact(n) => n == argc,
                Arity::Variadic => true,
            }
    }

    fn same_signature(&self, other: &Macro) -> bool {
        self.name == other.name && self.receiver == other.receiver && self.arity == other.arity
    }

    pub fn expand(&self, target: Option<&Expr>, args: &[Expr]) -> Result<Option<Expr>, CompileError> {
        (self.expander)(target, args)
    }
}

impl fmt::Debug for Macro {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Macro")
            .field("name", &self.name)
            .field("receiver", &self.receiver)
            .field("arity", &self.arity)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Library
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Library {
    functions: HashMap<String, Function>,
    macros: HashMap<String, Vec<Macro>>,
}

impl Library {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a function.
    pub fn define(
        &mut self,
        name: &str,
        style: CallStyle,
        imp: impl Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    ) -> &mut Self {
        self.functions.insert(
            name.to_owned(),
            Function {
                name: name.to_owned(),
                style,
                imp: Arc::new(imp),
            },
        );
        self
    }

    /// Register `alias` as a second name for an already defined function.
    pub fn alias(&mut self, alias: &str, name: &str) -> &mut Self {
        if let Some(function) = self.functions.get(name).cloned() {
            self.functions.insert(
                alias.to_owned(),
                Function {
                    name: alias.to_owned(),
                    ..function
                },
            );
        }
        self
    }

    pub fn add_macro(&mut self, m: Macro) -> &mut Self {
        self.macros.entry(m.name.clone()).or_default().push(m);
        self
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.get(name)
    }

    pub fn find_macro(&self, name: &str, receiver: bool, argc: usize) -> Option<&Macro> {
        self.macros
            .get(name)?
            .iter()
            .find(|m| m.matches(receiver, argc))
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// Merge `other` into this library. Unlike [`Library::define`], a name
    /// that is already taken is an error.
    pub fn extend(&mut self, other: Library) -> Result<(), EnvironmentError> {
        for name in other.functions.keys() {
            if self.functions.contains_key(name) {
                return Err(EnvironmentError::DuplicateFunction(name.clone()));
            }
        }
        for macros in other.macros.values() {
            for m in macros {
                let taken = self
                    .macros
                    .get(&m.name)
                    .is_some_and(|existing| existing.iter().any(|e| e.same_signature(m)));
                if taken {
                    return Err(EnvironmentError::DuplicateMacro(m.name.clone()));
                }
            }
        }
        self.functions.extend(other.functions);
        for (name, macros) in other.macros {
            self.macros.entry(name).or_default().extend(macros);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
