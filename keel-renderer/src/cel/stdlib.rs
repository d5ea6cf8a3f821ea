//! Standard function library.
//!
//! Conversions, string helpers, encoders, math, list and set helpers and the
//! optional type. Member-style functions receive their receiver as the first
//! argument.

use std::cmp::Ordering;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use regex::Regex;

use crate::cel::error::EvalError;
use crate::cel::library::{CallStyle, Library};
use crate::cel::macros::{self, insert_entries, MAP_INSERT, NOT_STRICTLY_FALSE};
use crate::cel::value::{format_double, MapKey, Value, ValueMap};

/// Every standard function plus the comprehension macros.
pub fn standard_library() -> Library {
    let mut lib = Library::new();
    macros::register_standard(&mut lib);
    register_internal(&mut lib);
    register_conversions(&mut lib);
    register_strings(&mut lib);
    register_encoders(&mut lib);
    register_math(&mut lib);
    register_lists(&mut lib);
    register_sets(&mut lib);
    register_optional(&mut lib);
    lib
}

type Result<T> = std::result::Result<T, EvalError>;

fn int_arg(function: &str, v: &Value) -> Result<i64> {
    match v {
        Value::Int(i) => Ok(*i),
        Value::Uint(u) => i64::try_from(*u).map_err(|_| EvalError::Overflow("int conversion")),
        other => Err(EvalError::no_overload(function, &[other.clone()])),
    }
}

fn str_arg<'a>(function: &str, v: &'a Value) -> Result<&'a str> {
    v.as_str()
        .ok_or_else(|| EvalError::no_overload(function, &[v.clone()]))
}

// ---------------------------------------------------------------------------
// Internal helpers used by macro expansions
// ---------------------------------------------------------------------------

fn register_internal(lib: &mut Library) {
    lib.define(NOT_STRICTLY_FALSE, CallStyle::Global, |args| {
        Ok(Value::Bool(!matches!(args, [Value::Bool(false)])))
    })
    .define(MAP_INSERT, CallStyle::Global, |args| match args {
        [Value::Map(target), key, value] => {
            let key = MapKey::from_value(key)?;
            if target.contains_key(&key) {
                return Err(EvalError::DuplicateKey(key.to_string()));
            }
            let mut out = ValueMap::clone(target);
            out.insert(key, value.clone());
            Ok(Value::map(out))
        }
        [Value::Map(target), Value::Map(entries)] => {
            let mut out = ValueMap::clone(target);
            insert_entries(&mut out, entries)?;
            Ok(Value::map(out))
        }
        _ => Err(EvalError::no_overload(MAP_INSERT, args)),
    });
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

fn register_conversions(lib: &mut Library) {
    lib.define("size", CallStyle::Both, |args| match args {
        [Value::String(s)] => Ok(Value::Int(s.chars().count() as i64)),
        [Value::Bytes(b)] => Ok(Value::Int(b.len() as i64)),
        [Value::List(l)] => Ok(Value::Int(l.len() as i64)),
        [Value::Map(m)] => Ok(Value::Int(m.len() as i64)),
        _ => Err(EvalError::no_overload("size", args)),
    })
    .define("string", CallStyle::Global, |args| match args {
        [Value::String(s)] => Ok(Value::String(s.clone())),
        [Value::Int(i)] => Ok(Value::from(i.to_string())),
        [Value::Uint(u)] => Ok(Value::from(u.to_string())),
        [Value::Double(d)] => Ok(Value::from(format_double(*d))),
        [Value::Bool(b)] => Ok(Value::from(b.to_string())),
        [Value::Bytes(b)] => std::str::from_utf8(b)
            .map(Value::from)
            .map_err(|e| EvalError::invalid("string", e.to_string())),
        _ => Err(EvalError::no_overload("string", args)),
    })
    .define("int", CallStyle::Global, |args| match args {
        [Value::Int(i)] => Ok(Value::Int(*i)),
        [v @ Value::Uint(_)] => int_arg("int", v).map(Value::Int),
        [Value::Double(d)] => {
            if d.is_finite() && *d > i64::MIN as f64 && *d < i64::MAX as f64 {
                Ok(Value::Int(d.trunc() as i64))
            } else {
                Err(EvalError::Overflow("int conversion"))
            }
        }
        [Value::String(s)] => s
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|e| EvalError::invalid("int", format!("'{s}': {e}"))),
        _ => Err(EvalError::no_overload("int", args)),
    })
    .define("uint", CallStyle::Global, |args| match args {
        [Value::Uint(u)] => Ok(Value::Uint(*u)),
        [Value::Int(i)] => u64::try_from(*i)
            .map(Value::Uint)
            .map_err(|_| EvalError::Overflow("uint conversion")),
        [Value::Double(d)] => {
            if d.is_finite() && *d >= 0.0 && *d < u64::MAX as f64 {
                Ok(Value::Uint(d.trunc() as u64))
            } else {
                Err(EvalError::Overflow("uint conversion"))
            }
        }
        [Value::String(s)] => s
            .parse::<u64>()
            .map(Value::Uint)
            .map_err(|e| EvalError::invalid("uint", format!("'{s}': {e}"))),
        _ => Err(EvalError::no_overload("uint", args)),
    })
    .define("double", CallStyle::Global, |args| match args {
        [Value::Double(d)] => Ok(Value::Double(*d)),
        [Value::Int(i)] => Ok(Value::Double(*i as f64)),
        [Value::Uint(u)] => Ok(Value::Double(*u as f64)),
        [Value::String(s)] => s
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|e| EvalError::invalid("double", format!("'{s}': {e}"))),
        _ => Err(EvalError::no_overload("double", args)),
    })
    .define("bytes", CallStyle::Global, |args| match args {
        [Value::Bytes(b)] => Ok(Value::Bytes(b.clone())),
        [Value::String(s)] => Ok(Value::bytes(s.as_bytes())),
        _ => Err(EvalError::no_overload("bytes", args)),
    })
    .define("bool", CallStyle::Global, |args| match args {
        [Value::Bool(b)] => Ok(Value::Bool(*b)),
        [Value::String(s)] => match &**s {
            "true" | "True" | "TRUE" | "t" | "1" => Ok(Value::Bool(true)),
            "false" | "False" | "FALSE" | "f" | "0" => Ok(Value::Bool(false)),
            other => Err(EvalError::invalid("bool", format!("'{other}' is not a boolean"))),
        },
        _ => Err(EvalError::no_overload("bool", args)),
    })
    .define("dyn", CallStyle::Global, |args| match args {
        [v] => Ok(v.clone()),
        _ => Err(EvalError::no_overload("dyn", args)),
    });
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

fn char_slice(function: &str, s: &str, start: i64, end: i64) -> Result<Value> {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    if start < 0 || end > len || start > end {
        return Err(EvalError::invalid(
            function,
            format!("range [{start}, {end}) out of bounds for string of length {len}"),
        ));
    }
    Ok(Value::from(
        chars[start as usize..end as usize].iter().collect::<String>(),
    ))
}

/// Code point offset of `needle` in `haystack`, searching from `from`.
fn char_index(haystack: &str, needle: &str, from: usize, last: bool) -> Option<usize> {
    let chars: Vec<char> = haystack.chars().collect();
    let needle: Vec<char> = needle.chars().collect();
    if needle.len() > chars.len() {
        return None;
    }
    let positions = from..=chars.len() - needle.len();
    let hit = |i: &usize| chars[*i..*i + needle.len()] == needle[..];
    if last {
        positions.rev().find(hit)
    } else {
        positions.into_iter().find(hit)
    }
}

fn register_strings(lib: &mut Library) {
    lib.define("contains", CallStyle::Member, |args| match args {
        [Value::String(s), Value::String(sub)] => Ok(Value::Bool(s.contains(&**sub))),
        _ => Err(EvalError::no_overload("contains", args)),
    })
    .define("startsWith", CallStyle::Member, |args| match args {
        [Value::String(s), Value::String(p)] => Ok(Value::Bool(s.starts_with(&**p))),
        _ => Err(EvalError::no_overload("startsWith", args)),
    })
    .define("endsWith", CallStyle::Member, |args| match args {
        [Value::String(s), Value::String(p)] => Ok(Value::Bool(s.ends_with(&**p))),
        _ => Err(EvalError::no_overload("endsWith", args)),
    })
    .define("matches", CallStyle::Both, |args| match args {
        [Value::String(s), Value::String(pattern)] => {
            let re = Regex::new(pattern)
                .map_err(|e| EvalError::invalid("matches", e.to_string()))?;
            Ok(Value::Bool(re.is_match(s)))
        }
        _ => Err(EvalError::no_overload("matches", args)),
    })
    .define("lowerAscii", CallStyle::Member, |args| match args {
        [Value::String(s)] => Ok(Value::from(s.to_ascii_lowercase())),
        _ => Err(EvalError::no_overload("lowerAscii", args)),
    })
    .define("upperAscii", CallStyle::Member, |args| match args {
        [Value::String(s)] => Ok(Value::from(s.to_ascii_uppercase())),
        _ => Err(EvalError::no_overload("upperAscii", args)),
    })
    .define("trim", CallStyle::Member, |args| match args {
        [Value::String(s)] => Ok(Value::from(s.trim())),
        _ => Err(EvalError::no_overload("trim", args)),
    })
    .define("split", CallStyle::Member, |args| {
        let (s, sep, limit) = match args {
            [Value::String(s), Value::String(sep)] => (s, sep, -1),
            [Value::String(s), Value::String(sep), n] => (s, sep, int_arg("split", n)?),
            _ => return Err(EvalError::no_overload("split", args)),
        };
        let parts: Vec<Value> = match limit {
            0 => Vec::new(),
            n if sep.is_empty() => split_chars(s, n),
            n if n < 0 => s.split(&**sep).map(Value::from).collect(),
            n => s.splitn(n as usize, &**sep).map(Value::from).collect(),
        };
        Ok(Value::list(parts))
    })
    .define("join", CallStyle::Member, |args| {
        let (items, sep) = match args {
            [Value::List(items)] => (items, ""),
            [Value::List(items), sep] => (items, str_arg("join", sep)?),
            _ => return Err(EvalError::no_overload("join", args)),
        };
        let parts = items
            .iter()
            .map(|v| str_arg("join", v))
            .collect::<Result<Vec<_>>>()?;
        Ok(Value::from(parts.join(sep)))
    })
    .define("replace", CallStyle::Member, |args| match args {
        [Value::String(s), Value::String(from), Value::String(to)] => {
            Ok(Value::from(s.replace(&**from, to)))
        }
        [Value::String(s), Value::String(from), Value::String(to), n] => {
            let n = int_arg("replace", n)?;
            if n < 0 {
                Ok(Value::from(s.replace(&**from, to)))
            } else {
                Ok(Value::from(s.replacen(&**from, to, n as usize)))
            }
        }
        _ => Err(EvalError::no_overload("replace", args)),
    })
    .define("substring", CallStyle::Member, |args| match args {
        [Value::String(s), start] => {
            let len = s.chars().count() as i64;
            char_slice("substring", s, int_arg("substring", start)?, len)
        }
        [Value::String(s), start, end] => char_slice(
            "substring",
            s,
            int_arg("substring", start)?,
            int_arg("substring", end)?,
        ),
        _ => Err(EvalError::no_overload("substring", args)),
    })
    .define("indexOf", CallStyle::Member, |args| string_index("indexOf", args, false))
    .define("lastIndexOf", CallStyle::Member, |args| {
        string_index("lastIndexOf", args, true)
    })
    .define("charAt", CallStyle::Member, |args| match args {
        [Value::String(s), i] => {
            let i = int_arg("charAt", i)?;
            let len = s.chars().count() as i64;
            if i == len {
                return Ok(Value::from(""));
            }
            char_slice("charAt", s, i, i.saturating_add(1))
        }
        _ => Err(EvalError::no_overload("charAt", args)),
    })
    .define("reverse", CallStyle::Member, |args| match args {
        [Value::String(s)] => Ok(Value::from(s.chars().rev().collect::<String>())),
        [Value::List(l)] => Ok(Value::list(l.iter().rev().cloned().collect())),
        _ => Err(EvalError::no_overload("reverse", args)),
    })
    .define("format", CallStyle::Member, |args| match args {
        [Value::String(s), Value::List(items)] => format_string(s, items).map(Value::from),
        _ => Err(EvalError::no_overload("format", args)),
    })
    .define("strings.quote", CallStyle::Global, |args| match args {
        [Value::String(s)] => Ok(Value::from(quote(s))),
        _ => Err(EvalError::no_overload("strings.quote", args)),
    });
}

/// Expands `%s %d %f %e %x %X %o %b` clauses (with an optional `.N`
/// precision for the floating point ones) and `%%`.
fn format_string(template: &str, args: &[Value]) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut remaining = args.iter();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut precision = None;
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }
            precision = Some(digits.parse::<usize>().unwrap_or(0));
        }
        let verb = chars
            .next()
            .ok_or_else(|| EvalError::invalid("format", "unterminated formatting clause"))?;
        if verb == '%' && precision.is_none() {
            out.push('%');
            continue;
        }
        let arg = remaining.next().ok_or_else(|| {
            EvalError::invalid("format", format!("missing argument for clause %{verb}"))
        })?;
        let formatted = match verb {
            's' => display_value(arg, false),
            'd' => match arg {
                Value::Int(i) => i.to_string(),
                Value::Uint(u) => u.to_string(),
                Value::Double(d) if !d.is_finite() => non_finite(*d),
                other => return Err(EvalError::no_overload("format %d", &[other.clone()])),
            },
            'f' => fixed_or_scientific(arg, precision.unwrap_or(6), false)?,
            'e' => fixed_or_scientific(arg, precision.unwrap_or(6), true)?,
            'x' | 'X' => {
                let hex = match arg {
                    Value::String(s) => hex::encode(s.as_bytes()),
                    Value::Bytes(b) => hex::encode(b),
                    other => radix(other, 16)?,
                };
                if verb == 'X' {
                    hex.to_ascii_uppercase()
                } else {
                    hex
                }
            }
            'o' => radix(arg, 8)?,
            'b' => match arg {
                Value::Bool(b) => u8::from(*b).to_string(),
                other => radix(other, 2)?,
            },
            other => {
                return Err(EvalError::invalid(
                    "format",
                    format!("unrecognized formatting clause %{other}"),
                ))
            }
        };
        out.push_str(&formatted);
    }
    Ok(out)
}

fn non_finite(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_owned()
    } else if d > 0.0 {
        "Infinity".to_owned()
    } else {
        "-Infinity".to_owned()
    }
}

fn fixed_or_scientific(arg: &Value, precision: usize, scientific: bool) -> Result<String> {
    let d = match arg {
        Value::Double(d) => *d,
        Value::Int(i) => *i as f64,
        Value::Uint(u) => *u as f64,
        other => {
            let clause = if scientific { "format %e" } else { "format %f" };
            return Err(EvalError::no_overload(clause, &[other.clone()]));
        }
    };
    if !d.is_finite() {
        return Ok(non_finite(d));
    }
    if !scientific {
        return Ok(format!("{d:.precision$}"));
    }
    // Rust prints `1.5e3`; the exponent is written signed and two digits wide.
    let sci = format!("{d:.precision$e}");
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return Ok(sci);
    };
    let exp: i32 = exp.parse().unwrap_or_default();
    let sign = if exp < 0 { '-' } else { '+' };
    Ok(format!("{mantissa}e{sign}{:02}", exp.unsigned_abs()))
}

fn radix(arg: &Value, base: u32) -> Result<String> {
    let (negative, magnitude) = match arg {
        Value::Int(i) => (*i < 0, i.unsigned_abs()),
        Value::Uint(u) => (false, *u),
        other => return Err(EvalError::no_overload("format", &[other.clone()])),
    };
    let digits = match base {
        2 => format!("{magnitude:b}"),
        8 => format!("{magnitude:o}"),
        _ => format!("{magnitude:x}"),
    };
    Ok(if negative { format!("-{digits}") } else { digits })
}

/// `%s` rendering. Strings nested in lists and maps are quoted.
fn display_value(v: &Value, nested: bool) -> String {
    match v {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Uint(u) => u.to_string(),
        Value::Double(d) if !d.is_finite() => non_finite(*d),
        Value::Double(d) => format_double(*d),
        Value::String(s) if nested => quote(s),
        Value::String(s) => s.to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::List(items) => {
            let parts: Vec<String> = items.iter().map(|i| display_value(i, true)).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(m) => {
            let parts: Vec<String> = m
                .iter()
                .map(|(k, v)| {
                    let key = match k {
                        MapKey::String(s) => quote(s),
                        other => other.to_string(),
                    };
                    format!("{key}: {}", display_value(v, true))
                })
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Optional(Some(inner)) => format!("optional.of({})", display_value(inner, true)),
        Value::Optional(None) => "optional.none()".to_owned(),
        Value::Omit => "omit()".to_owned(),
    }
}

/// Double-quoted string literal with control characters escaped.
fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{b}' => out.push_str("\\v"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// An empty separator splits between characters; with a positive `limit`
/// the last part keeps the rest of the string.
fn split_chars(s: &str, limit: i64) -> Vec<Value> {
    let mut parts = Vec::new();
    for (i, (at, c)) in s.char_indices().enumerate() {
        if limit > 0 && i as i64 == limit - 1 {
            parts.push(Value::from(&s[at..]));
            return parts;
        }
        parts.push(Value::from(c.to_string()));
    }
    parts
}

fn string_index(function: &str, args: &[Value], last: bool) -> Result<Value> {
    let (s, sub, from) = match args {
        [Value::String(s), Value::String(sub)] => (s, sub, None),
        [Value::String(s), Value::String(sub), offset] => (s, sub, Some(int_arg(function, offset)?)),
        _ => return Err(EvalError::no_overload(function, args)),
    };
    let len = s.chars().count() as i64;
    if let Some(offset) = from {
        if offset < 0 || offset > len {
            return Err(EvalError::invalid(
                function,
                format!("offset {offset} out of range for string of length {len}"),
            ));
        }
    }
    let found = if last {
        // The offset bounds where a match may start.
        let limit = from.map_or(len, |o| o) as usize;
        let prefix_end = (limit + sub.chars().count()).min(len as usize);
        let prefix: String = s.chars().take(prefix_end).collect();
        char_index(&prefix, sub, 0, true)
    } else {
        char_index(s, sub, from.unwrap_or(0) as usize, false)
    };
    Ok(Value::Int(found.map_or(-1, |i| i as i64)))
}

// ---------------------------------------------------------------------------
// Encoders
// ---------------------------------------------------------------------------

fn register_encoders(lib: &mut Library) {
    lib.define("base64.encode", CallStyle::Global, |args| match args {
        [Value::Bytes(b)] => Ok(Value::from(STANDARD.encode(b))),
        [Value::String(s)] => Ok(Value::from(STANDARD.encode(s.as_bytes()))),
        _ => Err(EvalError::no_overload("base64.encode", args)),
    })
    .define("base64.decode", CallStyle::Global, |args| match args {
        [Value::String(s)] => STANDARD
            .decode(s.as_bytes())
            .map(Value::bytes)
            .map_err(|e| EvalError::invalid("base64.decode", e.to_string())),
        _ => Err(EvalError::no_overload("base64.decode", args)),
    });
}

// ---------------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------------

fn extreme(function: &str, args: &[Value], wanted: Ordering) -> Result<Value> {
    let candidates: &[Value] = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    let mut best: Option<&Value> = None;
    for v in candidates {
        if !matches!(v, Value::Int(_) | Value::Uint(_) | Value::Double(_)) {
            return Err(EvalError::no_overload(function, args));
        }
        best = match best {
            Some(b) if v.compare(b) != Some(wanted) => Some(b),
            _ => Some(v),
        };
    }
    best.cloned()
        .ok_or_else(|| EvalError::invalid(function, "requires at least one argument"))
}

fn rounding(
    function: &'static str,
    op: fn(f64) -> f64,
) -> impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static {
    move |args| match args {
        [Value::Double(d)] => Ok(Value::Double(op(*d))),
        _ => Err(EvalError::no_overload(function, args)),
    }
}

fn register_math(lib: &mut Library) {
    lib.define("math.greatest", CallStyle::Global, |args| {
        extreme("math.greatest", args, Ordering::Greater)
    })
    .define("math.least", CallStyle::Global, |args| {
        extreme("math.least", args, Ordering::Less)
    })
    .define("math.abs", CallStyle::Global, |args| match args {
        [Value::Int(i)] => i
            .checked_abs()
            .map(Value::Int)
            .ok_or(EvalError::Overflow("math.abs")),
        [Value::Uint(u)] => Ok(Value::Uint(*u)),
        [Value::Double(d)] => Ok(Value::Double(d.abs())),
        _ => Err(EvalError::no_overload("math.abs", args)),
    })
    .define("math.ceil", CallStyle::Global, rounding("math.ceil", f64::ceil))
    .define("math.floor", CallStyle::Global, rounding("math.floor", f64::floor))
    .define("math.round", CallStyle::Global, rounding("math.round", f64::round))
    .define("math.sign", CallStyle::Global, |args| match args {
        [Value::Int(i)] => Ok(Value::Int(i.signum())),
        [Value::Uint(u)] => Ok(Value::Uint(u64::from(*u != 0))),
        [Value::Double(d)] if d.is_nan() || *d == 0.0 => Ok(Value::Double(*d)),
        [Value::Double(d)] => Ok(Value::Double(d.signum())),
        _ => Err(EvalError::no_overload("math.sign", args)),
    })
    .define("math.bitAnd", CallStyle::Global, bitwise("math.bitAnd", |a, b| a & b))
    .define("math.bitOr", CallStyle::Global, bitwise("math.bitOr", |a, b| a | b))
    .define("math.bitXor", CallStyle::Global, bitwise("math.bitXor", |a, b| a ^ b))
    .define("math.bitNot", CallStyle::Global, |args| match args {
        [Value::Int(i)] => Ok(Value::Int(!i)),
        [Value::Uint(u)] => Ok(Value::Uint(!u)),
        _ => Err(EvalError::no_overload("math.bitNot", args)),
    })
    .define("math.bitShiftLeft", CallStyle::Global, |args| {
        let (value, shift) = shift_args("math.bitShiftLeft", args)?;
        Ok(match value {
            Value::Int(i) => Value::Int(if shift > 63 { 0 } else { i << shift }),
            _ => Value::Uint(if shift > 63 { 0 } else { shift_bits(value) << shift }),
        })
    })
    .define("math.bitShiftRight", CallStyle::Global, |args| {
        // Right shifts are logical for signed values too.
        let (value, shift) = shift_args("math.bitShiftRight", args)?;
        let bits = if shift > 63 { 0 } else { shift_bits(value) >> shift };
        Ok(match value {
            Value::Int(_) => Value::Int(bits as i64),
            _ => Value::Uint(bits),
        })
    });
}

fn bitwise(
    function: &'static str,
    op: fn(u64, u64) -> u64,
) -> impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static {
    move |args| match args {
        [Value::Int(a), Value::Int(b)] => Ok(Value::Int(op(*a as u64, *b as u64) as i64)),
        [Value::Uint(a), Value::Uint(b)] => Ok(Value::Uint(op(*a, *b))),
        _ => Err(EvalError::no_overload(function, args)),
    }
}

fn shift_args<'a>(function: &str, args: &'a [Value]) -> Result<(&'a Value, u32)> {
    match args {
        [value @ (Value::Int(_) | Value::Uint(_)), Value::Int(shift)] => {
            if *shift < 0 {
                return Err(EvalError::invalid(
                    function,
                    format!("negative offset: {shift}"),
                ));
            }
            Ok((value, u32::try_from(*shift).unwrap_or(u32::MAX)))
        }
        _ => Err(EvalError::no_overload(function, args)),
    }
}

fn shift_bits(value: &Value) -> u64 {
    match value {
        Value::Int(i) => *i as u64,
        Value::Uint(u) => *u,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Lists and sets
// ---------------------------------------------------------------------------

fn flatten_into(out: &mut Vec<Value>, items: &[Value], depth: i64) {
    for item in items {
        match item {
            Value::List(inner) if depth > 0 => flatten_into(out, inner, depth - 1),
            other => out.push(other.clone()),
        }
    }
}

fn register_lists(lib: &mut Library) {
    lib.define("flatten", CallStyle::Member, |args| {
        let (items, depth) = match args {
            [Value::List(items)] => (items, 1),
            [Value::List(items), depth] => (items, int_arg("flatten", depth)?),
            _ => return Err(EvalError::no_overload("flatten", args)),
        };
        if depth < 0 {
            return Err(EvalError::invalid("flatten", "level must be non-negative"));
        }
        let mut out = Vec::with_capacity(items.len());
        flatten_into(&mut out, items, depth);
        Ok(Value::list(out))
    })
    .define("distinct", CallStyle::Member, |args| match args {
        [Value::List(items)] => {
            let mut out: Vec<Value> = Vec::with_capacity(items.len());
            for item in items.iter() {
                if !out.contains(item) {
                    out.push(item.clone());
                }
            }
            Ok(Value::list(out))
        }
        _ => Err(EvalError::no_overload("distinct", args)),
    })
    .define("slice", CallStyle::Member, |args| match args {
        [Value::List(items), start, end] => {
            let start = int_arg("slice", start)?;
            let end = int_arg("slice", end)?;
            if start < 0 || end < start || end as usize > items.len() {
                return Err(EvalError::invalid(
                    "slice",
                    format!("range [{start}, {end}) out of bounds for list of size {}", items.len()),
                ));
            }
            Ok(Value::list(items[start as usize..end as usize].to_vec()))
        }
        _ => Err(EvalError::no_overload("slice", args)),
    })
    .define("sort", CallStyle::Member, |args| match args {
        [Value::List(items)] => {
            let mut out = items.to_vec();
            for pair in out.windows(2) {
                if pair[0].compare(&pair[1]).is_none() {
                    return Err(EvalError::invalid(
                        "sort",
                        format!(
                            "list elements must be comparable, got {} and {}",
                            pair[0].type_name(),
                            pair[1].type_name()
                        ),
                    ));
                }
            }
            out.sort_by(|a, b| a.compare(b).unwrap_or(Ordering::Equal));
            Ok(Value::list(out))
        }
        _ => Err(EvalError::no_overload("sort", args)),
    })
    .define("lists.range", CallStyle::Global, |args| match args {
        [n] => {
            let n = int_arg("lists.range", n)?;
            Ok(Value::list((0..n.max(0)).map(Value::Int).collect()))
        }
        _ => Err(EvalError::no_overload("lists.range", args)),
    });
}

fn register_sets(lib: &mut Library) {
    lib.define("sets.contains", CallStyle::Global, |args| match args {
        [Value::List(a), Value::List(b)] => Ok(Value::Bool(b.iter().all(|x| a.contains(x)))),
        _ => Err(EvalError::no_overload("sets.contains", args)),
    })
    .define("sets.equivalent", CallStyle::Global, |args| match args {
        [Value::List(a), Value::List(b)] => Ok(Value::Bool(
            b.iter().all(|x| a.contains(x)) && a.iter().all(|x| b.contains(x)),
        )),
        _ => Err(EvalError::no_overload("sets.equivalent", args)),
    })
    .define("sets.intersects", CallStyle::Global, |args| match args {
        [Value::List(a), Value::List(b)] => Ok(Value::Bool(a.iter().any(|x| b.contains(x)))),
        _ => Err(EvalError::no_overload("sets.intersects", args)),
    });
}

// ---------------------------------------------------------------------------
// Optional
// ---------------------------------------------------------------------------

fn register_optional(lib: &mut Library) {
    lib.define("optional.of", CallStyle::Global, |args| match args {
        [v] => Ok(Value::optional_of(v.clone())),
        _ => Err(EvalError::no_overload("optional.of", args)),
    })
    .define("optional.none", CallStyle::Global, |args| match args {
        [] => Ok(Value::optional_none()),
        _ => Err(EvalError::no_overload("optional.none", args)),
    })
    .define("optional.ofNonZeroValue", CallStyle::Global, |args| match args {
        [v] if v.is_zero() => Ok(Value::optional_none()),
        [v] => Ok(Value::optional_of(v.clone())),
        _ => Err(EvalError::no_overload("optional.ofNonZeroValue", args)),
    })
    .define("hasValue", CallStyle::Member, |args| match args {
        [Value::Optional(o)] => Ok(Value::Bool(o.is_some())),
        _ => Err(EvalError::no_overload("hasValue", args)),
    })
    .define("value", CallStyle::Member, |args| match args {
        [Value::Optional(Some(v))] => Ok((**v).clone()),
        [Value::Optional(None)] => Err(EvalError::EmptyOptional),
        _ => Err(EvalError::no_overload("value", args)),
    })
    .define("orValue", CallStyle::Member, |args| match args {
        [Value::Optional(Some(v)), _] => Ok((**v).clone()),
        [Value::Optional(None), fallback] => Ok(fallback.clone()),
        _ => Err(EvalError::no_overload("orValue", args)),
    })
    .define("or", CallStyle::Member, |args| match args {
        [some @ Value::Optional(Some(_)), Value::Optional(_)] => Ok(some.clone()),
        [Value::Optional(None), other @ Value::Optional(_)] => Ok(other.clone()),
        _ => Err(EvalError::no_overload("or", args)),
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
