//! Pipeline expression extensions.
//!
//! `workload.toServicePorts()` is rewritten at compile time to
//! `workloadToServicePorts(workload)`, which turns the workload's endpoints
//! into Service port entries `{name, port, targetPort, protocol}`, sorted by
//! endpoint name.

use std::collections::HashSet;

use keel_renderer::cel::{
    Arity, CallStyle, EvalError, Expr, Library, Macro, MapKey, Value, ValueMap,
};

const FUNCTION: &str = "workloadToServicePorts";

/// IANA service name limit, which Kubernetes applies to port names.
const MAX_PORT_NAME_LENGTH: usize = 15;

/// Functions and macros the pipeline adds to the base library: service
/// ports here plus the [`crate::configurations`] helpers.
pub fn extensions() -> Library {
    let mut lib = Library::new();
    crate::configurations::register(&mut lib);
    lib.define(FUNCTION, CallStyle::Global, workload_to_service_ports);
    lib.add_macro(Macro::receiver(
        "toServicePorts",
        Arity::Exact(0),
        |target, _| match target {
            Some(Expr::Ident(name)) if name == "workload" => {
                Ok(Some(Expr::call(FUNCTION, vec![Expr::ident("workload")])))
            }
            _ => Ok(None),
        },
    ));
    lib
}

fn workload_to_service_ports(args: &[Value]) -> Result<Value, EvalError> {
    let workload = match args {
        [Value::Map(m)] => m,
        _ => return Err(EvalError::no_overload(FUNCTION, args)),
    };
    let endpoints = match workload.get(&MapKey::from("endpoints")) {
        None | Some(Value::Null) => return Ok(Value::list(Vec::new())),
        Some(Value::Map(m)) => m,
        Some(other) => {
            return Err(EvalError::invalid(
                FUNCTION,
                format!("workload.endpoints must be a map, got {}", other.type_name()),
            ))
        }
    };

    let mut names: Vec<(&MapKey, String)> = endpoints.keys().map(|k| (k, k.to_string())).collect();
    names.sort_by(|a, b| a.1.cmp(&b.1));

    let mut used = HashSet::new();
    let mut ports = Vec::with_capacity(names.len());
    for (key, name) in names {
        let endpoint = match endpoints.get(key) {
            Some(Value::Map(m)) => m,
            Some(other) => {
                return Err(EvalError::invalid(
                    FUNCTION,
                    format!("endpoint '{name}' must be an object, got {}", other.type_name()),
                ))
            }
            None => continue,
        };
        let port = endpoint_port(&name, endpoint)?;
        let protocol = match endpoint.get(&MapKey::from("type")).and_then(Value::as_str) {
            Some("UDP") => "UDP",
            _ => "TCP",
        };

        let base = match sanitize_port_name(&name) {
            s if s.is_empty() => format!("port-{port}"),
            s => s,
        };
        let final_name = unique_name(&base, &mut used);

        let mut entry = ValueMap::new();
        entry.insert("name".into(), Value::from(final_name.as_str()));
        entry.insert("port".into(), Value::Int(port));
        entry.insert("targetPort".into(), Value::Int(port));
        entry.insert("protocol".into(), Value::from(protocol));
        ports.push(Value::map(entry));
    }
    Ok(Value::list(ports))
}

fn endpoint_port(name: &str, endpoint: &ValueMap) -> Result<i64, EvalError> {
    match endpoint.get(&MapKey::from("port")) {
        Some(Value::Int(p)) => Ok(*p),
        Some(Value::Uint(p)) => i64::try_from(*p)
            .map_err(|_| EvalError::invalid(FUNCTION, format!("endpoint '{name}' port is out of range"))),
        Some(Value::Double(d)) if d.fract() == 0.0 => Ok(*d as i64),
        Some(Value::Double(d)) => Err(EvalError::invalid(
            FUNCTION,
            format!("endpoint '{name}' port must be an integer, got {d}"),
        )),
        None | Some(Value::Null) => Err(EvalError::invalid(
            FUNCTION,
            format!("endpoint '{name}' is missing required 'port' field"),
        )),
        Some(other) => Err(EvalError::invalid(
            FUNCTION,
            format!("endpoint '{name}' must have a numeric port, got {}", other.type_name()),
        )),
    }
}

fn unique_name(base: &str, used: &mut HashSet<String>) -> String {
    let mut candidate = base.to_owned();
    let mut counter = 2;
    while used.contains(&candidate) {
        let suffix = format!("-{counter}");
        candidate = match MAX_PORT_NAME_LENGTH.checked_sub(suffix.len()) {
            Some(room) if room > 0 => {
                let cut = base.len().min(room);
                format!("{}{suffix}", &base[..cut])
            }
            _ => format!("p{suffix}"),
        };
        counter += 1;
    }
    used.insert(candidate.clone());
    candidate
}

/// Lowercase, `_` to `-`, drop anything outside `[a-z0-9-]`, trim hyphens,
/// cap at 15 characters. Empty when nothing survives.
pub fn sanitize_port_name(name: &str) -> String {
    let cleaned: String = name
        .to_lowercase()
        .replace('_', "-")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-')
        .collect();
    let mut trimmed = cleaned.trim_matches('-').to_owned();
    if trimmed.len() > MAX_PORT_NAME_LENGTH {
        trimmed.truncate(MAX_PORT_NAME_LENGTH);
        trimmed = trimmed.trim_end_matches('-').to_owned();
    }
    trimmed
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use keel_renderer::{Engine, EngineOptions, Rendered};
    use serde_json::json;

    use super::*;

    fn engine() -> Engine {
        Engine::with_extensions(&EngineOptions::default(), extensions()).expect("engine")
    }

    fn render(expr: &str, workload: serde_json::Value) -> Rendered {
        let mut inputs = keel_core::Inputs::new();
        inputs.insert("workload".into(), workload);
        engine().render(&json!(expr), &inputs).expect("render")
    }

    #[test]
    fn endpoints_become_sorted_service_ports() {
        let out = render(
            "${workload.toServicePorts()}",
            json!({"endpoints": {
                "web_API": {"type": "HTTP", "port": 8080},
                "metrics": {"type": "UDP", "port": 9090},
            }}),
        );
        assert_eq!(
            out,
            Rendered::Value(json!([
                {"name": "metrics", "port": 9090, "targetPort": 9090, "protocol": "UDP"},
                {"name": "web-api", "port": 8080, "targetPort": 8080, "protocol": "TCP"},
            ]))
        );
    }

    #[test]
    fn no_endpoints_is_an_empty_list() {
        assert_eq!(
            render("${workload.toServicePorts()}", json!({"name": "w"})),
            Rendered::Value(json!([]))
        );
    }

    #[test]
    fn colliding_names_get_suffixes() {
        let out = render(
            "${workload.toServicePorts().map(p, p.name)}",
            json!({"endpoints": {
                "http": {"port": 80},
                "HTTP!": {"port": 81},
                "!!!": {"port": 82},
            }}),
        );
        assert_eq!(out, Rendered::Value(json!(["port-82", "http", "http-2"])));
    }

    #[test]
    fn missing_port_is_an_error() {
        let mut inputs = keel_core::Inputs::new();
        inputs.insert("workload".into(), json!({"endpoints": {"web": {"type": "HTTP"}}}));
        let err = engine()
            .render(&json!("${workload.toServicePorts()}"), &inputs)
            .unwrap_err();
        assert!(err.to_string().contains("missing required 'port' field"), "{err}");
    }

    #[test]
    fn other_receivers_are_left_alone() {
        let mut inputs = keel_core::Inputs::new();
        inputs.insert("workload".into(), json!({}));
        inputs.insert("other".into(), json!({}));
        assert!(engine()
            .render(&json!("${other.toServicePorts()}"), &inputs)
            .is_err());
    }

    #[test]
    fn long_names_are_capped() {
        assert_eq!(sanitize_port_name("a-very-long-endpoint-name"), "a-very-long-end");
        assert_eq!(sanitize_port_name("abcdefghijklmn-xyz"), "abcdefghijklmn");
        assert_eq!(sanitize_port_name("__"), "");
    }

    #[test]
    fn suffix_respects_length_cap() {
        let mut used = HashSet::new();
        assert_eq!(unique_name("abcdefghijklmno", &mut used), "abcdefghijklmno");
        assert_eq!(unique_name("abcdefghijklmno", &mut used), "abcdefghijklm-2");
    }
}
