//! Compiled evaluation environments.
//!
//! An environment declares one dynamically typed variable per input key and
//! carries the function library. Its identity is the *set* of variable names,
//! so renders with the same input shape share one environment regardless of
//! the values.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use keel_core::Inputs;

use crate::cel::{self, checker, lexer, macros, CompileError, EnvironmentError, Library, Program};

/// Separator between sorted variable names. Cannot appear in a YAML key that
/// a template could reference.
const KEY_SEPARATOR: char = '\x1f';

/// Order-independent identity of an input variable set.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnvironmentKey(String);

impl EnvironmentKey {
    pub fn from_inputs(inputs: &Inputs) -> Self {
        Self::from_names(inputs.keys().map(String::as_str))
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names: Vec<&str> = names.into_iter().collect();
        names.sort_unstable();
        names.dedup();
        let mut key = String::new();
        for (i, name) in names.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(name);
        }
        EnvironmentKey(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.split(KEY_SEPARATOR).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Declared variables plus the library expressions compile against.
/// Immutable once built; shared between renders through an `Arc`.
pub struct Environment {
    key: EnvironmentKey,
    variables: HashSet<String>,
    library: Arc<Library>,
}

impl Environment {
    /// Declare every key of `inputs` as a variable.
    pub fn build(inputs: &Inputs, library: Arc<Library>) -> Result<Self, EnvironmentError> {
        let mut variables = HashSet::with_capacity(inputs.len());
        for name in inputs.keys() {
            if name.is_empty() || lexer::is_reserved(name) {
                return Err(EnvironmentError::InvalidVariable(name.clone()));
            }
            variables.insert(name.clone());
        }
        Ok(Environment {
            key: EnvironmentKey::from_inputs(inputs),
            variables,
            library,
        })
    }

    pub fn key(&self) -> &EnvironmentKey {
        &self.key
    }

    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    pub fn declares(&self, name: &str) -> bool {
        self.variables.contains(name)
    }

    /// Parse, expand macros and check `source` against this environment.
    pub fn compile(&self, source: &str) -> Result<Program, CompileError> {
        let expr = cel::parse(source)?;
        let expr = macros::expand(expr, &self.library)?;
        let expr = checker::check(expr, &self.variables, &self.library)?;
        Ok(Program::new(source, expr, Arc::clone(&self.library)))
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("key", &self.key)
            .field("functions", &self.library.function_count())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
