pub mod eval;
pub mod render;
pub mod template;

use std::path::Path;

use anyhow::{Context, Result};

use keel_core::{manifest, Inputs, TemplateValue};
use keel_renderer::Engine;

use crate::config::KeelConfig;

/// An engine with the configured caches and the same function set the
/// component pipeline uses, so `workload.toServicePorts()` works here too.
pub(crate) fn build_engine(config: &KeelConfig) -> Result<Engine> {
    Engine::with_extensions(&config.engine, keel_pipeline::ports::extensions())
        .context("failed to build expression engine")
}

/// Load `--inputs` (if any) and layer `--set key=value` pairs on top.
///
/// Keys are dotted paths (`parameters.replicas=3`); values are parsed as YAML
/// so numbers, booleans and lists keep their type.
pub(crate) fn collect_inputs(path: Option<&Path>, sets: &[String]) -> Result<Inputs> {
    let mut inputs = match path {
        Some(path) => manifest::load_inputs(path)
            .with_context(|| format!("failed to load inputs {}", path.display()))?,
        None => Inputs::new(),
    };
    for assignment in sets {
        let (key, raw) = assignment
            .split_once('=')
            .with_context(|| format!("--set expects key=value, got '{assignment}'"))?;
        let value: TemplateValue = if raw.is_empty() {
            TemplateValue::String(String::new())
        } else {
            serde_yaml::from_str(raw).with_context(|| format!("invalid value for '{key}'"))?
        };
        set_path(&mut inputs, key, value)?;
    }
    Ok(inputs)
}

fn set_path(inputs: &mut Inputs, key: &str, value: TemplateValue) -> Result<()> {
    let mut segments = key.split('.').peekable();
    let mut current = inputs;
    while let Some(segment) = segments.next() {
        if segment.is_empty() {
            anyhow::bail!("empty segment in --set key '{key}'");
        }
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return Ok(());
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| TemplateValue::Object(Inputs::new()));
        if !slot.is_object() {
            *slot = TemplateValue::Object(Inputs::new());
        }
        current = match slot.as_object_mut() {
            Some(map) => map,
            None => anyhow::bail!("cannot set '{key}'"),
        };
    }
    anyhow::bail!("empty --set key")
}

/// Print a value as pretty JSON or YAML.
pub(crate) fn print_value(value: &TemplateValue, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        print!("{}", manifest::to_yaml_string(value)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_builds_nested_typed_values() {
        let sets = vec![
            "parameters.replicas=3".to_string(),
            "parameters.debug=true".to_string(),
            "metadata.name=api".to_string(),
            "tags=[a, b]".to_string(),
        ];
        let inputs = collect_inputs(None, &sets).expect("inputs");
        assert_eq!(
            TemplateValue::Object(inputs),
            json!({
                "parameters": {"replicas": 3, "debug": true},
                "metadata": {"name": "api"},
                "tags": ["a", "b"]
            })
        );
    }

    #[test]
    fn set_overrides_loaded_inputs() {
        let dir = tempfile::TempDir::new().expect("tmp");
        let path = dir.path().join("inputs.yaml");
        std::fs::write(&path, "parameters:\n  replicas: 1\n  image: nginx\n").expect("write");

        let inputs =
            collect_inputs(Some(&path), &["parameters.replicas=5".to_string()]).expect("inputs");
        assert_eq!(inputs["parameters"], json!({"replicas": 5, "image": "nginx"}));
    }

    #[test]
    fn set_without_equals_is_rejected() {
        let err = collect_inputs(None, &["replicas".to_string()]).unwrap_err();
        assert!(err.to_string().contains("key=value"));
    }

    #[test]
    fn empty_value_is_an_empty_string() {
        let inputs = collect_inputs(None, &["name=".to_string()]).expect("inputs");
        assert_eq!(inputs["name"], json!(""));
    }
}
