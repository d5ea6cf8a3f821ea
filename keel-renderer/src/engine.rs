//! The render engine — walks template data and evaluates `${...}` expressions.
//!
//! # String rendering
//!
//! | String                 | Mode          | Result                         |
//! |------------------------|---------------|--------------------------------|
//! | `plain`                | literal       | `"plain"`                      |
//! | `${spec.replicas}`     | standalone    | native value, e.g. `3`         |
//! | `  ${spec.replicas}  ` | standalone    | surrounding whitespace ignored |
//! | `replicas=${n}`        | interpolation | `"replicas=3"`                 |
//! | `${a}-${b}`            | interpolation | `"x-y"`                        |
//!
//! Maps render their keys first (a whole-string key expression must produce a
//! string), then their values. Map entries and list items whose value renders
//! to [`Rendered::Omitted`] are removed. Rendering stops at the first error.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use serde_json::Map;

use keel_core::{Inputs, TemplateValue};

use crate::cache::{EngineCache, EngineOptions};
use crate::cel::{format_double, EnvironmentError, Library, Value};
use crate::convert::{self, Rendered};
use crate::env::Environment;
use crate::error::TemplateError;
use crate::functions::base_library;
use crate::scanner::find_expressions;

/// Renders template values. Cheap to clone; clones share one [`EngineCache`].
#[derive(Debug, Clone)]
pub struct Engine {
    cache: Arc<EngineCache>,
}

impl Engine {
    /// An engine with unbounded caches and the base function library.
    pub fn new() -> Self {
        Self::with_options(&EngineOptions::default())
    }

    pub fn with_options(options: &EngineOptions) -> Self {
        Engine {
            cache: Arc::new(EngineCache::new(options)),
        }
    }

    /// An engine whose expressions may also call the functions and macros of
    /// `extensions`. Fails if an extension reuses a base name.
    pub fn with_extensions(
        options: &EngineOptions,
        extensions: Library,
    ) -> Result<Self, EnvironmentError> {
        let mut library = Library::clone(&base_library());
        library.extend(extensions)?;
        Ok(Engine {
            cache: Arc::new(EngineCache::with_library(options, Arc::new(library))),
        })
    }

    /// An engine sharing an existing cache (and its library).
    pub fn with_cache(cache: Arc<EngineCache>) -> Self {
        Engine { cache }
    }

    pub fn cache(&self) -> &Arc<EngineCache> {
        &self.cache
    }

    /// Render `data` against `inputs`.
    ///
    /// Returns [`Rendered::Omitted`] only when `data` itself is a string that
    /// is a single omitted expression; the caller decides what that means.
    pub fn render(&self, data: &TemplateValue, inputs: &Inputs) -> Result<Rendered, TemplateError> {
        RenderCall::new(&self.cache, inputs).render(data)
    }

    /// Evaluate one bare expression (no `${}` delimiters).
    pub fn evaluate(&self, expression: &str, inputs: &Inputs) -> Result<Rendered, TemplateError> {
        RenderCall::new(&self.cache, inputs).evaluate(expression)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// One render call
// ---------------------------------------------------------------------------

/// Per-call state. The environment and the variable bindings are resolved at
/// most once, and only if the data contains an expression.
struct RenderCall<'a> {
    cache: &'a EngineCache,
    inputs: &'a Inputs,
    environment: OnceCell<Arc<Environment>>,
    activation: OnceCell<HashMap<String, Value>>,
}

impl<'a> RenderCall<'a> {
    fn new(cache: &'a EngineCache, inputs: &'a Inputs) -> Self {
        RenderCall {
            cache,
            inputs,
            environment: OnceCell::new(),
            activation: OnceCell::new(),
        }
    }

    fn render(&self, data: &TemplateValue) -> Result<Rendered, TemplateError> {
        match data {
            TemplateValue::String(s) => self.render_string(s),
            TemplateValue::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, value) in map {
                    let key = self.render_key(key)?;
                    if let Rendered::Value(v) = self.render(value)? {
                        out.insert(key, v);
                    }
                }
                Ok(Rendered::Value(TemplateValue::Object(out)))
            }
            TemplateValue::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Rendered::Value(v) = self.render(item)? {
                        out.push(v);
                    }
                }
                Ok(Rendered::Value(TemplateValue::Array(out)))
            }
            scalar => Ok(Rendered::Value(scalar.clone())),
        }
    }

    fn render_key(&self, key: &str) -> Result<String, TemplateError> {
        match self.render_string(key)? {
            Rendered::Value(TemplateValue::String(s)) => Ok(s),
            Rendered::Value(other) => Err(TemplateError::DynamicKeyType {
                key: key.to_owned(),
                kind: kind_name(&other),
                value: other.to_string(),
            }),
            Rendered::Omitted => Err(TemplateError::DynamicKeyType {
                key: key.to_owned(),
                kind: "omit",
                value: "omit()".to_owned(),
            }),
        }
    }

    fn render_string(&self, s: &str) -> Result<Rendered, TemplateError> {
        let matches = find_expressions(s);
        match matches.as_slice() {
            [] => Ok(Rendered::Value(TemplateValue::String(s.to_owned()))),
            [only] if only.full_expr == s.trim() => self.evaluate(only.inner_expr),
            _ => {
                let mut out = String::with_capacity(s.len());
                let mut cursor = 0;
                for m in &matches {
                    out.push_str(&s[cursor..m.start]);
                    // An omitted value inside text contributes nothing.
                    if let Rendered::Value(v) = self.evaluate(m.inner_expr)? {
                        out.push_str(&interpolate(&v));
                    }
                    cursor = m.end;
                }
                out.push_str(&s[cursor..]);
                Ok(Rendered::Value(TemplateValue::String(out)))
            }
        }
    }

    fn evaluate(&self, expression: &str) -> Result<Rendered, TemplateError> {
        let env = self
            .environment
            .get_or_try_init(|| self.cache.environment(self.inputs))?;
        let program = self
            .cache
            .program(env, expression)
            .map_err(|source| TemplateError::Compile {
                expression: expression.to_owned(),
                source,
            })?;
        let activation = self
            .activation
            .get_or_init(|| convert::activation(self.inputs));
        let value = program
            .eval(activation)
            .map_err(|source| TemplateError::Evaluation {
                expression: expression.to_owned(),
                source,
            })?;
        Ok(convert::to_native(value))
    }
}

/// String form of a value substituted into surrounding text.
pub fn interpolate(value: &TemplateValue) -> String {
    match value {
        TemplateValue::String(s) => s.clone(),
        TemplateValue::Bool(b) => b.to_string(),
        TemplateValue::Number(n) if n.is_f64() => match n.as_f64() {
            Some(d) => format_double(d),
            None => n.to_string(),
        },
        TemplateValue::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_else(|_| other.to_string()),
    }
}

fn kind_name(value: &TemplateValue) -> &'static str {
    match value {
        TemplateValue::Null => "null",
        TemplateValue::Bool(_) => "bool",
        TemplateValue::Number(n) if n.is_i64() => "int",
        TemplateValue::Number(n) if n.is_u64() => "uint",
        TemplateValue::Number(_) => "double",
        TemplateValue::String(_) => "string",
        TemplateValue::Array(_) => "list",
        TemplateValue::Object(_) => "map",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
