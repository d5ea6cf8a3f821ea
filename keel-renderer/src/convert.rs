//! Conversion between template data and expression values.
//!
//! Inputs go in through [`from_native`]; results come back through
//! [`to_native`], which is where `omit()` turns into [`Rendered::Omitted`] and
//! omitted list items and map entries disappear.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Number};

use keel_core::{Inputs, TemplateValue};

use crate::cel::{MapKey, Value, ValueMap};

/// The result of rendering one template value.
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    Value(TemplateValue),
    /// The value asked to be removed from its container.
    Omitted,
}

impl Rendered {
    pub fn is_omitted(&self) -> bool {
        matches!(self, Rendered::Omitted)
    }

    /// The rendered value, or `None` when omitted.
    pub fn into_value(self) -> Option<TemplateValue> {
        match self {
            Rendered::Value(v) => Some(v),
            Rendered::Omitted => None,
        }
    }

    pub fn as_value(&self) -> Option<&TemplateValue> {
        match self {
            Rendered::Value(v) => Some(v),
            Rendered::Omitted => None,
        }
    }
}

impl From<TemplateValue> for Rendered {
    fn from(v: TemplateValue) -> Self {
        Rendered::Value(v)
    }
}

/// Adapt a template value for evaluation.
pub fn from_native(value: &TemplateValue) -> Value {
    match value {
        TemplateValue::Null => Value::Null,
        TemplateValue::Bool(b) => Value::Bool(*b),
        TemplateValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(u) = n.as_u64() {
                Value::Uint(u)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        TemplateValue::String(s) => Value::from(s.as_str()),
        TemplateValue::Array(items) => Value::list(items.iter().map(from_native).collect()),
        TemplateValue::Object(map) => {
            let entries: ValueMap = map
                .iter()
                .map(|(k, v)| (MapKey::from(k.as_str()), from_native(v)))
                .collect();
            Value::map(entries)
        }
    }
}

/// Bind every input as a variable.
pub fn activation(inputs: &Inputs) -> HashMap<String, Value> {
    inputs
        .iter()
        .map(|(k, v)| (k.clone(), from_native(v)))
        .collect()
}

/// Convert an evaluation result into template data.
///
/// `omit()` anywhere a slot can be removed (list item, map value) removes the
/// slot; `omit()` as the whole result yields [`Rendered::Omitted`]. An empty
/// optional counts as omitted. Non-finite doubles become `null`.
pub fn to_native(value: Value) -> Rendered {
    match value {
        Value::Omit => Rendered::Omitted,
        Value::Optional(Some(inner)) => to_native(*inner),
        // An empty optional is a value, not a removal request.
        Value::Null | Value::Optional(None) => Rendered::Value(TemplateValue::Null),
        Value::Bool(b) => Rendered::Value(TemplateValue::Bool(b)),
        Value::Int(i) => Rendered::Value(TemplateValue::from(i)),
        Value::Uint(u) => Rendered::Value(TemplateValue::from(u)),
        Value::Double(d) => Rendered::Value(
            Number::from_f64(d)
                .map(TemplateValue::Number)
                .unwrap_or(TemplateValue::Null),
        ),
        Value::String(s) => Rendered::Value(TemplateValue::String(s.to_string())),
        Value::Bytes(b) => Rendered::Value(TemplateValue::String(STANDARD.encode(&*b))),
        Value::List(items) => {
            let items = unwrap_or_clone(items);
            let out: Vec<TemplateValue> = items
                .into_iter()
                .filter_map(|item| to_native(item).into_value())
                .collect();
            Rendered::Value(TemplateValue::Array(out))
        }
        Value::Map(entries) => {
            let entries = unwrap_or_clone(entries);
            let mut out = Map::with_capacity(entries.len());
            for (k, v) in entries {
                if let Rendered::Value(v) = to_native(v) {
                    out.insert(map_key_string(&k), v);
                }
            }
            Rendered::Value(TemplateValue::Object(out))
        }
    }
}

fn unwrap_or_clone<T: Clone>(shared: std::sync::Arc<T>) -> T {
    std::sync::Arc::try_unwrap(shared).unwrap_or_else(|shared| (*shared).clone())
}

fn map_key_string(key: &MapKey) -> String {
    match key {
        MapKey::String(s) => s.to_string(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
