//! Template functions: `omit`, `merge`, `generate_name` and `hash`.
//!
//! Each is registered under its plain name and an `oc_`-prefixed alias. The
//! variadic forms of `merge` and `generate_name` are macros that rewrite the
//! call before checking:
//!
//! | Source                   | Rewritten to                      |
//! |--------------------------|-----------------------------------|
//! | `merge(a, b, c)`         | `merge(merge(a, b), c)`           |
//! | `generate_name()`        | `generate_name([])`               |
//! | `generate_name(a, b, c)` | `generate_name([a, b, c])`        |

use std::sync::Arc;

use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

use crate::cel::{
    standard_library, Arity, CallStyle, CompileError, EvalError, Expr, Library, Macro, Value,
    ValueMap,
};

/// Maximum length of a Kubernetes DNS subdomain name.
pub const MAX_RESOURCE_NAME_LENGTH: usize = 253;

/// Maximum length of a DNS label (service and port names, resource IDs).
pub const MAX_LABEL_LENGTH: usize = 63;

const ALIAS_PREFIX: &str = "oc_";

/// Older templates call name generation by this name.
const LEGACY_NAME_FUNCTION: &str = "sanitizeK8sResourceName";

static BASE_LIBRARY: Lazy<Arc<Library>> = Lazy::new(|| {
    let mut lib = standard_library();
    // Custom names never collide with standard ones.
    if let Err(e) = lib.extend(custom_library()) {
        tracing::error!(error = %e, "custom template functions clash with the standard library");
    }
    Arc::new(lib)
});

/// The standard library plus the template functions, built once per process.
pub fn base_library() -> Arc<Library> {
    Arc::clone(&BASE_LIBRARY)
}

/// Only the template functions and their macros.
pub fn custom_library() -> Library {
    let mut lib = Library::new();
    lib.define("omit", CallStyle::Global, omit)
        .define("merge", CallStyle::Global, merge)
        .define("generate_name", CallStyle::Global, generate_name_fn)
        .define("hash", CallStyle::Global, hash_fn);

    for name in ["omit", "merge", "generate_name", "hash"] {
        lib.alias(&format!("{ALIAS_PREFIX}{name}"), name);
    }
    lib.alias(LEGACY_NAME_FUNCTION, "generate_name");

    for name in ["merge", "oc_merge"] {
        lib.add_macro(Macro::global(name, Arity::Variadic, move |_, args| {
            merge_macro(name, args)
        }));
    }
    for name in ["generate_name", "oc_generate_name", LEGACY_NAME_FUNCTION] {
        lib.add_macro(Macro::global(name, Arity::Variadic, move |_, args| {
            Ok(generate_name_macro(name, args))
        }));
    }
    lib
}

// ---------------------------------------------------------------------------
// Macros
// ---------------------------------------------------------------------------

fn merge_macro(name: &str, args: &[Expr]) -> Result<Option<Expr>, CompileError> {
    match args {
        [] | [_] => Err(CompileError::Macro(format!(
            "{name} requires at least 2 arguments"
        ))),
        [_, _] => Ok(None),
        [first, second, rest @ ..] => {
            let seed = Expr::call(name, vec![first.clone(), second.clone()]);
            Ok(Some(rest.iter().fold(seed, |acc, next| {
                Expr::call(name, vec![acc, next.clone()])
            })))
        }
    }
}

fn generate_name_macro(name: &str, args: &[Expr]) -> Option<Expr> {
    match args {
        [_] => None,
        _ => Some(Expr::call(name, vec![Expr::list(args.to_vec())])),
    }
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn omit(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [] => Ok(Value::Omit),
        _ => Err(EvalError::no_overload("omit", args)),
    }
}

/// Shallow merge: keys of `rhs` replace keys of `lhs` wholesale.
fn merge(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::Map(lhs), Value::Map(rhs)] => {
            if rhs.is_empty() {
                return Ok(Value::Map(Arc::clone(lhs)));
            }
            let mut out = ValueMap::clone(lhs);
            for (k, v) in rhs.iter() {
                out.insert(k.clone(), v.clone());
            }
            Ok(Value::map(out))
        }
        _ => Err(EvalError::no_overload("merge", args)),
    }
}

fn generate_name_fn(args: &[Value]) -> Result<Value, EvalError> {
    let parts: Vec<&str> = match args {
        [Value::String(s)] => vec![&**s],
        [Value::List(items)] => items.iter().filter_map(Value::as_str).collect(),
        _ => return Err(EvalError::no_overload("generate_name", args)),
    };
    Ok(Value::from(generate_name(&parts)))
}

fn hash_fn(args: &[Value]) -> Result<Value, EvalError> {
    match args {
        [Value::String(s)] => Ok(Value::from(fnv_hash(s))),
        _ => Err(EvalError::no_overload("hash", args)),
    }
}

// ---------------------------------------------------------------------------
// Naming helpers
// ---------------------------------------------------------------------------

/// FNV-1a 32-bit digest as 8 lowercase hex digits.
pub fn fnv_hash(input: &str) -> String {
    const OFFSET_BASIS: u32 = 0x811c_9dc5;
    const PRIME: u32 = 0x0100_0193;
    let h = input
        .bytes()
        .fold(OFFSET_BASIS, |h, b| (h ^ u32::from(b)).wrapping_mul(PRIME));
    format!("{h:08x}")
}

/// [`generate_name_with_limit`] with the DNS subdomain limit.
pub fn generate_name(parts: &[&str]) -> String {
    generate_name_with_limit(parts, MAX_RESOURCE_NAME_LENGTH)
}

/// Build a valid DNS-style name of at most `limit` bytes from `parts`.
///
/// Parts are sanitized individually and joined with `-`. The 8-hex suffix is
/// taken from a SHA-256 of the raw parts, so inputs that sanitize to the same
/// base still get different names.
pub fn generate_name_with_limit(parts: &[&str], limit: usize) -> String {
    let suffix = {
        let digest = Sha256::digest(parts.join("-").as_bytes());
        let mut hex = hex::encode(digest);
        hex.truncate(8);
        hex
    };

    let base = parts
        .iter()
        .map(|p| sanitize_part(p))
        .collect::<Vec<_>>()
        .join("-");
    let max_base = limit.saturating_sub(suffix.len() + 1);
    let mut base = base;
    base.truncate(max_base);
    let base = base.trim_end_matches(['-', '.']);

    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

fn sanitize_part(part: &str) -> String {
    let lowered: String = part
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    lowered.trim_matches(['-', '.']).to_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cel::{macros, parse};

    #[test]
    fn fnv_hash_known_values() {
        assert_eq!(fnv_hash("hello world"), "d58b3fa7");
        assert_eq!(fnv_hash("test"), "afd071e5");
        assert_ne!(fnv_hash("test"), fnv_hash("test2"));
        assert_eq!(fnv_hash("").len(), 8);
    }

    #[test]
    fn generate_name_known_values() {
        assert_eq!(generate_name(&["Hello World!"]), "hello-world-7f83b165");
        assert_eq!(generate_name(&["my-app", "v1.2.3"]), "my-app-v1.2.3-4f878dd8");
        assert_eq!(
            generate_name(&["payment-service", "-", "v2.0"]),
            "payment-service--v2.0-38fcb255"
        );
    }

    #[test]
    fn generate_name_distinguishes_sanitization_collisions() {
        let a = generate_name(&["My App!"]);
        let b = generate_name(&["my-app"]);
        assert!(a.starts_with("my-app-"));
        assert!(b.starts_with("my-app-"));
        assert_ne!(a, b);
    }

    #[test]
    fn generate_name_respects_limit() {
        let long = "x".repeat(300);
        let name = generate_name(&[&long]);
        assert_eq!(name.len(), MAX_RESOURCE_NAME_LENGTH);
        let short = generate_name_with_limit(&[&long], MAX_LABEL_LENGTH);
        assert_eq!(short.len(), MAX_LABEL_LENGTH);
    }

    #[test]
    fn generate_name_of_nothing_is_the_hash() {
        assert_eq!(generate_name(&[]).len(), 8);
        assert_eq!(generate_name(&["!!!"]).len(), 8);
    }

    #[test]
    fn truncation_never_leaves_trailing_separator() {
        let part = format!("{}-tail", "a".repeat(MAX_LABEL_LENGTH - 10));
        let name = generate_name_with_limit(&[&part], MAX_LABEL_LENGTH);
        assert!(!name.contains("--"));
        assert!(name.len() <= MAX_LABEL_LENGTH);
    }

    #[test]
    fn merge_macro_rejects_too_few_arguments() {
        let lib = custom_library();
        let err = macros::expand(parse("oc_merge(a)").expect("parse"), &lib).unwrap_err();
        assert_eq!(err.to_string(), "oc_merge requires at least 2 arguments");
        let err = macros::expand(parse("merge()").expect("parse"), &lib).unwrap_err();
        assert_eq!(err.to_string(), "merge requires at least 2 arguments");
    }

    #[test]
    fn merge_macro_folds_left() {
        let lib = custom_library();
        let expr = macros::expand(parse("merge(a, b, c)").expect("parse"), &lib).expect("expand");
        let inner = Expr::call("merge", vec![Expr::ident("a"), Expr::ident("b")]);
        assert_eq!(expr, Expr::call("merge", vec![inner, Expr::ident("c")]));
    }

    #[test]
    fn generate_name_macro_wraps_in_list() {
        let lib = custom_library();
        let expand = |src: &str| macros::expand(parse(src).expect("parse"), &lib).expect("expand");
        assert_eq!(
            expand("generate_name()"),
            Expr::call("generate_name", vec![Expr::list(vec![])])
        );
        assert_eq!(
            expand("generate_name(x)"),
            Expr::call("generate_name", vec![Expr::ident("x")])
        );
        assert_eq!(
            expand("oc_generate_name(a, b)"),
            Expr::call(
                "oc_generate_name",
                vec![Expr::list(vec![Expr::ident("a"), Expr::ident("b")])]
            )
        );
    }

    #[test]
    fn generate_name_ignores_non_string_items() {
        let out = generate_name_fn(&[Value::list(vec![
            Value::from("api"),
            Value::Int(7),
            Value::from("prod"),
        ])])
        .expect("call");
        assert_eq!(out, Value::from(generate_name(&["api", "prod"])));
    }

    #[test]
    fn merge_is_shallow() {
        let map = |pairs: &[(&str, Value)]| {
            let mut m = ValueMap::new();
            for (k, v) in pairs {
                m.insert((*k).into(), v.clone());
            }
            Value::map(m)
        };
        let lhs = map(&[(
            "resources",
            map(&[("cpu", Value::from("100m")), ("memory", Value::from("128Mi"))]),
        )]);
        let rhs = map(&[("resources", map(&[("cpu", Value::from("200m"))]))]);
        let merged = merge(&[lhs, rhs.clone()]).expect("merge");
        assert_eq!(merged, rhs);
    }

    #[test]
    fn base_library_has_aliases_and_standard_functions() {
        let lib = base_library();
        for name in ["omit", "oc_omit", "merge", "oc_hash", "sanitizeK8sResourceName", "size"] {
            assert!(lib.function(name).is_some(), "missing {name}");
        }
    }
}
