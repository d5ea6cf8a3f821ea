//! Runtime values.
//!
//! [`Value`] is the closed set of types expressions evaluate to. Compound
//! values are reference counted so that variables bound once per render can be
//! handed to many expressions without copying.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::cel::error::EvalError;

/// Ordered map storage. Iteration follows insertion order, which keeps
/// rendered output stable.
pub type ValueMap = IndexMap<MapKey, Value>;

// ---------------------------------------------------------------------------
// MapKey
// ---------------------------------------------------------------------------

/// The value types allowed as map keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Bool(bool),
    Int(i64),
    Uint(u64),
    String(Arc<str>),
}

impl MapKey {
    /// Convert an evaluated value into a key, rejecting unsupported types.
    pub fn from_value(value: &Value) -> Result<MapKey, EvalError> {
        match value {
            Value::Bool(b) => Ok(MapKey::Bool(*b)),
            Value::Int(i) => Ok(MapKey::Int(*i)),
            Value::Uint(u) => Ok(MapKey::Uint(*u)),
            Value::String(s) => Ok(MapKey::String(s.clone())),
            other => Err(EvalError::UnsupportedKeyType(other.type_name())),
        }
    }

    /// The same number under the other integer key type, if representable.
    /// `1` and `1u` name the same map entry.
    pub fn numeric_twin(&self) -> Option<MapKey> {
        match self {
            MapKey::Int(i) => u64::try_from(*i).ok().map(MapKey::Uint),
            MapKey::Uint(u) => i64::try_from(*u).ok().map(MapKey::Int),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            MapKey::Bool(b) => Value::Bool(*b),
            MapKey::Int(i) => Value::Int(*i),
            MapKey::Uint(u) => Value::Uint(*u),
            MapKey::String(s) => Value::String(s.clone()),
        }
    }
}

impl From<&str> for MapKey {
    fn from(s: &str) -> Self {
        MapKey::String(Arc::from(s))
    }
}

impl fmt::Display for MapKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapKey::Bool(b) => b.fmt(f),
            MapKey::Int(i) => i.fmt(f),
            MapKey::Uint(u) => u.fmt(f),
            MapKey::String(s) => s.fmt(f),
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A runtime value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Double(f64),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    List(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    /// `optional.of(x)` / `optional.none()` and the result of `a.?b`.
    Optional(Option<Box<Value>>),
    /// Produced by `omit()`: the enclosing slot is removed from rendered output.
    Omit,
}

impl Value {
    pub fn string(s: impl Into<Arc<str>>) -> Value {
        Value::String(s.into())
    }

    pub fn bytes(b: impl Into<Arc<[u8]>>) -> Value {
        Value::Bytes(b.into())
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Arc::new(items))
    }

    pub fn map(entries: ValueMap) -> Value {
        Value::Map(Arc::new(entries))
    }

    pub fn optional_none() -> Value {
        Value::Optional(None)
    }

    pub fn optional_of(value: Value) -> Value {
        Value::Optional(Some(Box::new(value)))
    }

    /// Type name as it appears in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null_type",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Uint(_) => "uint",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Optional(_) => "optional_type",
            Value::Omit => "omit",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Whether this is the zero value of its type (`0`, `""`, `[]`, `{}`, …).
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::Uint(u) => *u == 0,
            Value::Double(d) => *d == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::List(l) => l.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Optional(o) => o.is_none(),
            Value::Omit => false,
        }
    }

    /// Ordering across comparable types. Numeric types compare across
    /// int/uint/double; anything else only compares within its own type.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Uint(a), Value::Uint(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Uint(b)) => Some(cmp_int_uint(*a, *b)),
            (Value::Uint(a), Value::Int(b)) => Some(cmp_int_uint(*b, *a).reverse()),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Uint(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Uint(b)) => a.partial_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

fn cmp_int_uint(i: i64, u: u64) -> Ordering {
    if i < 0 {
        Ordering::Less
    } else {
        (i as u64).cmp(&u)
    }
}

/// Look up `key` in `map`, treating numerically equal int/uint/double keys as
/// the same key.
pub fn map_get<'m>(map: &'m ValueMap, key: &Value) -> Option<&'m Value> {
    match key {
        Value::String(s) => map.get(&MapKey::String(s.clone())),
        Value::Bool(b) => map.get(&MapKey::Bool(*b)),
        Value::Int(i) => map.get(&MapKey::Int(*i)).or_else(|| {
            u64::try_from(*i)
                .ok()
                .and_then(|u| map.get(&MapKey::Uint(u)))
        }),
        Value::Uint(u) => map.get(&MapKey::Uint(*u)).or_else(|| {
            i64::try_from(*u)
                .ok()
                .and_then(|i| map.get(&MapKey::Int(i)))
        }),
        Value::Double(d) if d.fract() == 0.0 => {
            if *d >= 0.0 && *d < u64::MAX as f64 {
                map_get(map, &Value::Uint(*d as u64))
            } else if *d >= i64::MIN as f64 && *d < 0.0 {
                map.get(&MapKey::Int(*d as i64))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Heterogeneous equality: numbers compare by value across int/uint/double,
/// lists and maps compare deeply, values of different kinds are unequal.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Omit, Value::Omit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x == y)
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a
                        .iter()
                        .all(|(k, v)| map_get(b, &k.to_value()).is_some_and(|w| v == w))
            }
            (Value::Optional(a), Value::Optional(b)) => match (a, b) {
                (None, None) => true,
                (Some(x), Some(y)) => x == y,
                _ => false,
            },
            (a, b) if is_numeric(a) && is_numeric(b) => {
                a.compare(b) == Some(Ordering::Equal)
            }
            _ => false,
        }
    }
}

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Int(_) | Value::Uint(_) | Value::Double(_))
}

/// Shortest round-trip rendering of a double, switching to exponent form
/// (`1.234567e+06`, `1e-05`) outside `1e-4 <= |d| < 1e6`.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_owned();
    }
    if d.is_infinite() {
        return if d > 0.0 { "+Inf" } else { "-Inf" }.to_owned();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }
    let sci = format!("{d:e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return d.to_string();
    };
    let exp: i32 = exp.parse().unwrap_or_default();
    if (-4..6).contains(&exp) {
        d.to_string()
    } else {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.unsigned_abs())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
