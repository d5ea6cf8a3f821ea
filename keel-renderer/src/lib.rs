//! # keel-renderer
//!
//! Expression-driven template engine: renders YAML/JSON template data whose
//! strings carry `${...}` CEL expressions against a set of named inputs.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use keel_renderer::{Engine, Rendered};
//! use serde_json::json;
//!
//! fn render_deployment() {
//!     let engine = Engine::new();
//!     let template = json!({
//!         "metadata": {"name": "${metadata.name}"},
//!         "spec": {"replicas": "${parameters.replicas}"}
//!     });
//!     let inputs = json!({
//!         "metadata": {"name": "api"},
//!         "parameters": {"replicas": 3}
//!     });
//!     if let Some(inputs) = inputs.as_object() {
//!         if let Ok(Rendered::Value(out)) = engine.render(&template, inputs) {
//!             println!("{out}");
//!         }
//!     }
//! }
//! ```

pub mod cache;
pub mod cel;
pub mod convert;
pub mod engine;
pub mod env;
pub mod error;
pub mod functions;
pub mod scanner;

pub use cache::{CacheMode, CacheStats, EngineCache, EngineOptions};
pub use convert::Rendered;
pub use engine::Engine;
pub use env::{Environment, EnvironmentKey};
pub use error::TemplateError;
pub use functions::{base_library, fnv_hash, generate_name, generate_name_with_limit};
pub use scanner::{find_expressions, ExpressionMatch};
