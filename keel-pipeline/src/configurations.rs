//! Helpers over `configurations`, the per-container env and file entries
//! built by [`crate::context::configurations`].
//!
//! Each `configurations.toX(...)` call is rewritten at compile time into a
//! global call that also receives the resource name prefix
//! `metadata.componentName + "-" + metadata.environmentName`.
//!
//! | Call                         | Entries                                                  |
//! |------------------------------|----------------------------------------------------------|
//! | `toConfigFileList()`         | `{name, mountPath, value, resourceName, remoteRef?}`     |
//! | `toSecretFileList()`         | `{name, mountPath, resourceName, remoteRef?}`            |
//! | `toContainerEnvFrom(c)`      | `{configMapRef: {name}}`, `{secretRef: {name}}`          |
//! | `toContainerVolumeMounts(c)` | `{name, mountPath, subPath}` per file of container `c`   |
//! | `toVolumes()`                | `{name, configMap: {name}}` or `{name, secret: {secretName}}` |
//! | `toConfigEnvsByContainer()`  | `{container, resourceName, envs}`                        |
//! | `toSecretEnvsByContainer()`  | `{container, resourceName, envs}`                        |
//!
//! Only the `configurations` identifier is rewritten; the same method on any
//! other receiver stays an undeclared function.

use keel_renderer::cel::ast::BinaryOp;
use keel_renderer::cel::{
    Arity, CallStyle, EvalError, Expr, Library, Macro, MapKey, Value, ValueMap,
};
use keel_renderer::{fnv_hash, generate_name};

const RECEIVER: &str = "configurations";
const CONFIGS: &str = "configs";
const SECRETS: &str = "secrets";

const CONFIG_FILE_LIST: &str = "configurationsToConfigFileList";
const SECRET_FILE_LIST: &str = "configurationsToSecretFileList";
const CONTAINER_ENV_FROM: &str = "configurationsToContainerEnvFrom";
const CONTAINER_VOLUME_MOUNTS: &str = "configurationsToContainerVolumeMounts";
const VOLUMES: &str = "configurationsToVolumes";
const CONFIG_ENVS_BY_CONTAINER: &str = "configurationsToConfigEnvsByContainer";
const SECRET_ENVS_BY_CONTAINER: &str = "configurationsToSecretEnvsByContainer";

/// A receiver method and the function it expands to.
#[derive(Clone, Copy)]
struct Helper {
    method: &'static str,
    function: &'static str,
    /// Takes a container name argument.
    per_container: bool,
    /// Receives the resource name prefix as its last argument.
    prefixed: bool,
}

const HELPERS: [Helper; 7] = [
    Helper {
        method: "toConfigFileList",
        function: CONFIG_FILE_LIST,
        per_container: false,
        prefixed: true,
    },
    Helper {
        method: "toSecretFileList",
        function: SECRET_FILE_LIST,
        per_container: false,
        prefixed: true,
    },
    Helper {
        method: "toContainerEnvFrom",
        function: CONTAINER_ENV_FROM,
        per_container: true,
        prefixed: true,
    },
    Helper {
        method: "toContainerVolumeMounts",
        function: CONTAINER_VOLUME_MOUNTS,
        per_container: true,
        prefixed: false,
    },
    Helper {
        method: "toVolumes",
        function: VOLUMES,
        per_container: false,
        prefixed: true,
    },
    Helper {
        method: "toConfigEnvsByContainer",
        function: CONFIG_ENVS_BY_CONTAINER,
        per_container: false,
        prefixed: true,
    },
    Helper {
        method: "toSecretEnvsByContainer",
        function: SECRET_ENVS_BY_CONTAINER,
        per_container: false,
        prefixed: true,
    },
];

/// Add the configuration macros and their backing functions to `lib`.
pub fn register(lib: &mut Library) {
    for helper in HELPERS {
        let arity = Arity::Exact(usize::from(helper.per_container));
        lib.add_macro(Macro::receiver(helper.method, arity, move |target, args| {
            match target {
                Some(Expr::Ident(name)) if name == RECEIVER => {
                    let mut call_args = Vec::with_capacity(args.len() + 2);
                    call_args.push(Expr::ident(RECEIVER));
                    call_args.extend(args.iter().cloned());
                    if helper.prefixed {
                        call_args.push(prefix_expr());
                    }
                    Ok(Some(Expr::call(helper.function, call_args)))
                }
                _ => Ok(None),
            }
        }));
    }

    lib.define(CONFIG_FILE_LIST, CallStyle::Global, |args| {
        file_list(CONFIG_FILE_LIST, args, CONFIGS)
    })
    .define(SECRET_FILE_LIST, CallStyle::Global, |args| {
        file_list(SECRET_FILE_LIST, args, SECRETS)
    })
    .define(CONTAINER_ENV_FROM, CallStyle::Global, container_env_from)
    .define(CONTAINER_VOLUME_MOUNTS, CallStyle::Global, container_volume_mounts)
    .define(VOLUMES, CallStyle::Global, volumes)
    .define(CONFIG_ENVS_BY_CONTAINER, CallStyle::Global, |args| {
        envs_by_container(CONFIG_ENVS_BY_CONTAINER, args, CONFIGS)
    })
    .define(SECRET_ENVS_BY_CONTAINER, CallStyle::Global, |args| {
        envs_by_container(SECRET_ENVS_BY_CONTAINER, args, SECRETS)
    });
}

/// `metadata.componentName + "-" + metadata.environmentName`
fn prefix_expr() -> Expr {
    let field = |name: &str| Expr::Select {
        operand: Box::new(Expr::ident("metadata")),
        field: name.to_owned(),
        test_only: false,
        optional: false,
    };
    Expr::binary(
        BinaryOp::Add,
        Expr::binary(
            BinaryOp::Add,
            field("componentName"),
            Expr::Literal(Value::from("-")),
        ),
        field("environmentName"),
    )
}

// ---------------------------------------------------------------------------
// Functions
// ---------------------------------------------------------------------------

fn file_list(function: &str, args: &[Value], section: &str) -> Result<Value, EvalError> {
    let (configurations, prefix) = match args {
        [configurations, prefix] => (
            configurations_arg(function, configurations)?,
            string_arg(function, "prefix", prefix)?,
        ),
        _ => return Err(EvalError::no_overload(function, args)),
    };

    let mut out = Vec::new();
    for (container, config) in containers(configurations) {
        for file in entries(config, section, "files") {
            let name = text(file, "name");
            let mut entry = ValueMap::new();
            entry.insert("name".into(), Value::from(name));
            entry.insert("mountPath".into(), Value::from(text(file, "mountPath")));
            if section == CONFIGS {
                entry.insert("value".into(), Value::from(text(file, "value")));
            }
            entry.insert(
                "resourceName".into(),
                Value::from(file_resource_name(prefix, container, section, name)),
            );
            if let Some(remote @ Value::Map(_)) = file.get(&MapKey::from("remoteRef")) {
                entry.insert("remoteRef".into(), remote.clone());
            }
            out.push(Value::map(entry));
        }
    }
    Ok(Value::list(out))
}

fn container_env_from(args: &[Value]) -> Result<Value, EvalError> {
    let function = CONTAINER_ENV_FROM;
    let (configurations, name, prefix) = match args {
        [configurations, name, prefix] => (
            configurations_arg(function, configurations)?,
            string_arg(function, "containerName", name)?,
            string_arg(function, "prefix", prefix)?,
        ),
        _ => return Err(EvalError::no_overload(function, args)),
    };
    let config = container_arg(function, configurations, name)?;

    let mut out = Vec::new();
    if !entries_of(config, CONFIGS, "envs").is_empty() {
        out.push(reference(
            "configMapRef",
            "name",
            generate_name(&[prefix, name, "env-configs"]),
        ));
    }
    if !entries_of(config, SECRETS, "envs").is_empty() {
        out.push(reference(
            "secretRef",
            "name",
            generate_name(&[prefix, name, "env-secrets"]),
        ));
    }
    Ok(Value::list(out))
}

fn container_volume_mounts(args: &[Value]) -> Result<Value, EvalError> {
    let function = CONTAINER_VOLUME_MOUNTS;
    let (configurations, name) = match args {
        [configurations, name] => (
            configurations_arg(function, configurations)?,
            string_arg(function, "containerName", name)?,
        ),
        _ => return Err(EvalError::no_overload(function, args)),
    };
    let config = container_arg(function, configurations, name)?;

    let mut out = Vec::new();
    for section in [CONFIGS, SECRETS] {
        for file in entries(config, section, "files") {
            let file_name = text(file, "name");
            let mount_path = text(file, "mountPath");
            let mut entry = ValueMap::new();
            entry.insert(
                "name".into(),
                Value::from(volume_name(name, mount_path, file_name)),
            );
            entry.insert(
                "mountPath".into(),
                Value::from(format!("{mount_path}/{file_name}")),
            );
            entry.insert("subPath".into(), Value::from(file_name));
            out.push(Value::map(entry));
        }
    }
    Ok(Value::list(out))
}

fn volumes(args: &[Value]) -> Result<Value, EvalError> {
    let (configurations, prefix) = match args {
        [configurations, prefix] => (
            configurations_arg(VOLUMES, configurations)?,
            string_arg(VOLUMES, "prefix", prefix)?,
        ),
        _ => return Err(EvalError::no_overload(VOLUMES, args)),
    };

    // Keyed by volume name; two files at the same path share one volume.
    let mut volumes = ValueMap::new();
    for (container, config) in containers(configurations) {
        for section in [CONFIGS, SECRETS] {
            for file in entries(config, section, "files") {
                let file_name = text(file, "name");
                let name = volume_name(container, text(file, "mountPath"), file_name);
                let resource = file_resource_name(prefix, container, section, file_name);
                let (kind, field) = if section == CONFIGS {
                    ("configMap", "name")
                } else {
                    ("secret", "secretName")
                };
                let mut source = ValueMap::new();
                source.insert(field.into(), Value::from(resource));
                let mut volume = ValueMap::new();
                volume.insert("name".into(), Value::from(name.as_str()));
                volume.insert(kind.into(), Value::map(source));
                volumes.insert(MapKey::from(name.as_str()), Value::map(volume));
            }
        }
    }
    Ok(Value::list(volumes.into_values().collect()))
}

fn envs_by_container(function: &str, args: &[Value], section: &str) -> Result<Value, EvalError> {
    let (configurations, prefix) = match args {
        [configurations, prefix] => (
            configurations_arg(function, configurations)?,
            string_arg(function, "prefix", prefix)?,
        ),
        _ => return Err(EvalError::no_overload(function, args)),
    };
    let suffix = if section == CONFIGS {
        "env-configs"
    } else {
        "env-secrets"
    };

    let mut out = Vec::new();
    for (container, config) in containers(configurations) {
        let envs = entries_of(config, section, "envs");
        if envs.is_empty() {
            continue;
        }
        let mut entry = ValueMap::new();
        entry.insert("container".into(), Value::from(container));
        entry.insert(
            "resourceName".into(),
            Value::from(generate_name(&[prefix, container, suffix])),
        );
        entry.insert("envs".into(), Value::list(envs.to_vec()));
        out.push(Value::map(entry));
    }
    Ok(Value::list(out))
}

// ---------------------------------------------------------------------------
// Naming and access helpers
// ---------------------------------------------------------------------------

/// `prefix-container-{config|secret}-file-name-with-dashes`, length-capped.
fn file_resource_name(prefix: &str, container: &str, section: &str, file: &str) -> String {
    let kind = if section == CONFIGS { "config" } else { "secret" };
    generate_name(&[prefix, container, kind, &file.replace('.', "-")])
}

fn volume_name(container: &str, mount_path: &str, file: &str) -> String {
    format!(
        "{container}-file-mount-{}",
        fnv_hash(&format!("{mount_path}/{file}"))
    )
}

/// `{outer: {inner: value}}`
fn reference(outer: &str, inner: &str, value: String) -> Value {
    let mut target = ValueMap::new();
    target.insert(inner.into(), Value::from(value));
    let mut entry = ValueMap::new();
    entry.insert(outer.into(), Value::map(target));
    Value::map(entry)
}

fn configurations_arg<'a>(function: &str, v: &'a Value) -> Result<&'a ValueMap, EvalError> {
    match v {
        Value::Map(m) => Ok(m),
        other => Err(EvalError::invalid(
            function,
            format!("expected configurations to be a map, got {}", other.type_name()),
        )),
    }
}

fn string_arg<'a>(function: &str, what: &str, v: &'a Value) -> Result<&'a str, EvalError> {
    v.as_str()
        .ok_or_else(|| EvalError::invalid(function, format!("{what} must be a string")))
}

fn container_arg<'a>(
    function: &str,
    configurations: &'a ValueMap,
    name: &str,
) -> Result<&'a ValueMap, EvalError> {
    match configurations.get(&MapKey::from(name)) {
        Some(Value::Map(m)) => Ok(m),
        Some(other) => Err(EvalError::invalid(
            function,
            format!(
                "expected a map for container '{name}', got {}",
                other.type_name()
            ),
        )),
        None => Err(EvalError::invalid(
            function,
            format!("container '{name}' not found in configurations"),
        )),
    }
}

/// Containers whose configuration is a map; anything else is skipped.
fn containers(configurations: &ValueMap) -> impl Iterator<Item = (&str, &ValueMap)> {
    configurations.iter().filter_map(|(k, v)| match (k, v) {
        (MapKey::String(name), Value::Map(config)) => Some((&**name, &**config)),
        _ => None,
    })
}

/// `config[section][field]` when it is a list, otherwise empty.
fn entries_of<'a>(config: &'a ValueMap, section: &str, field: &str) -> &'a [Value] {
    match config.get(&MapKey::from(section)) {
        Some(Value::Map(s)) => match s.get(&MapKey::from(field)) {
            Some(Value::List(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    }
}

/// The map-shaped items of `config[section][field]`.
fn entries<'a>(
    config: &'a ValueMap,
    section: &str,
    field: &str,
) -> impl Iterator<Item = &'a ValueMap> {
    entries_of(config, section, field)
        .iter()
        .filter_map(|v| match v {
            Value::Map(m) => Some(&**m),
            _ => None,
        })
}

fn text<'a>(entry: &'a ValueMap, key: &str) -> &'a str {
    entry
        .get(&MapKey::from(key))
        .and_then(Value::as_str)
        .unwrap_or("")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use keel_renderer::{Engine, EngineOptions, Rendered, TemplateError};
    use rstest::rstest;
    use serde_json::{json, Value as Json};

    use super::*;

    fn engine() -> Engine {
        Engine::with_extensions(&EngineOptions::default(), crate::ports::extensions())
            .expect("engine")
    }

    fn inputs(configurations: Json) -> keel_core::Inputs {
        let mut inputs = keel_core::Inputs::new();
        inputs.insert(
            "metadata".into(),
            json!({"componentName": "app", "environmentName": "dev"}),
        );
        inputs.insert("configurations".into(), configurations);
        inputs
    }

    fn render(expr: &str, configurations: Json) -> Result<Rendered, TemplateError> {
        engine().render(&json!(format!("${{{expr}}}")), &inputs(configurations))
    }

    fn rendered(expr: &str, configurations: Json) -> Json {
        match render(expr, configurations).expect("render") {
            Rendered::Value(v) => v,
            Rendered::Omitted => panic!("unexpected omit"),
        }
    }

    fn config_resource(container: &str, file: &str) -> String {
        file_resource_name("app-dev", container, CONFIGS, file)
    }

    fn secret_resource(container: &str, file: &str) -> String {
        file_resource_name("app-dev", container, SECRETS, file)
    }

    fn mount(container: &str, path: &str, file: &str) -> String {
        volume_name(container, path, file)
    }

    #[rstest]
    #[case::single_file(
        json!({"main": {
            "configs": {"files": [{"name": "config.yaml", "mountPath": "/etc/config", "value": "key: value"}]},
            "secrets": {"files": []},
        }}),
        json!([{
            "name": "config.yaml",
            "mountPath": "/etc/config",
            "value": "key: value",
            "resourceName": config_resource("main", "config.yaml"),
        }])
    )]
    #[case::files_across_containers(
        json!({
            "api": {"configs": {"files": [{"name": "a.yaml", "mountPath": "/a", "value": "a"}]}},
            "worker": {"configs": {"files": [{"name": "b.yaml", "mountPath": "/b", "value": "b"}]}},
        }),
        json!([
            {"name": "a.yaml", "mountPath": "/a", "value": "a", "resourceName": config_resource("api", "a.yaml")},
            {"name": "b.yaml", "mountPath": "/b", "value": "b", "resourceName": config_resource("worker", "b.yaml")},
        ])
    )]
    #[case::remote_ref_is_carried(
        json!({"main": {"configs": {"files": [{
            "name": "db.conf",
            "mountPath": "/etc/db",
            "remoteRef": {"key": "db", "property": "conf"},
        }]}}}),
        json!([{
            "name": "db.conf",
            "mountPath": "/etc/db",
            "value": "",
            "resourceName": config_resource("main", "db.conf"),
            "remoteRef": {"key": "db", "property": "conf"},
        }])
    )]
    #[case::secret_files_are_ignored(
        json!({"main": {
            "configs": {"files": []},
            "secrets": {"files": [{"name": "tls.crt", "mountPath": "/etc/tls"}]},
        }}),
        json!([])
    )]
    #[case::no_files(json!({"main": {"configs": {"envs": []}}}), json!([]))]
    #[case::empty_configurations(json!({}), json!([]))]
    fn config_files_flatten(#[case] configurations: Json, #[case] expected: Json) {
        assert_eq!(rendered("configurations.toConfigFileList()", configurations), expected);
    }

    #[rstest]
    #[case::single_file(
        json!({"main": {"secrets": {"files": [{
            "name": "tls.key",
            "mountPath": "/etc/tls",
            "remoteRef": {"key": "tls", "property": "key"},
        }]}}}),
        json!([{
            "name": "tls.key",
            "mountPath": "/etc/tls",
            "resourceName": secret_resource("main", "tls.key"),
            "remoteRef": {"key": "tls", "property": "key"},
        }])
    )]
    #[case::config_files_are_ignored(
        json!({"main": {
            "configs": {"files": [{"name": "a.yaml", "mountPath": "/a", "value": "a"}]},
            "secrets": {"files": []},
        }}),
        json!([])
    )]
    #[case::empty_configurations(json!({}), json!([]))]
    fn secret_files_flatten(#[case] configurations: Json, #[case] expected: Json) {
        assert_eq!(rendered("configurations.toSecretFileList()", configurations), expected);
    }

    #[rstest]
    #[case::config_and_secret_envs(
        json!({"configs": {"envs": [{"name": "LOG_LEVEL", "value": "info"}]},
               "secrets": {"envs": [{"name": "API_KEY", "remoteRef": {"key": "api"}}]}}),
        json!([
            {"configMapRef": {"name": generate_name(&["app-dev", "main", "env-configs"])}},
            {"secretRef": {"name": generate_name(&["app-dev", "main", "env-secrets"])}},
        ])
    )]
    #[case::only_config_envs(
        json!({"configs": {"envs": [{"name": "LOG_LEVEL", "value": "info"}]}, "secrets": {"envs": []}}),
        json!([{"configMapRef": {"name": generate_name(&["app-dev", "main", "env-configs"])}}])
    )]
    #[case::only_secret_envs(
        json!({"secrets": {"envs": [{"name": "API_KEY", "remoteRef": {"key": "api"}}]}}),
        json!([{"secretRef": {"name": generate_name(&["app-dev", "main", "env-secrets"])}}])
    )]
    #[case::no_envs(json!({"configs": {"envs": []}, "secrets": {"envs": []}}), json!([]))]
    #[case::empty_container(json!({}), json!([]))]
    fn env_from_references(#[case] container: Json, #[case] expected: Json) {
        assert_eq!(
            rendered(
                "configurations.toContainerEnvFrom('main')",
                json!({"main": container})
            ),
            expected
        );
    }

    #[test]
    fn unknown_container_is_an_error() {
        let err = render(
            "configurations.toContainerEnvFrom('ghost')",
            json!({"main": {}}),
        )
        .expect_err("missing container");
        assert!(
            err.to_string()
                .contains("container 'ghost' not found in configurations"),
            "{err}"
        );
        assert!(render("configurations.toContainerVolumeMounts('ghost')", json!({})).is_err());
    }

    #[test]
    fn container_volume_mounts_cover_config_and_secret_files() {
        let configurations = json!({"main": {
            "configs": {"files": [
                {"name": "app.properties", "mountPath": "/etc/config"},
                {"name": "config.json", "mountPath": "/etc/config"},
            ]},
            "secrets": {"files": [{"name": "tls.crt", "mountPath": "/etc/tls"}]},
        }});
        assert_eq!(
            rendered("configurations.toContainerVolumeMounts('main')", configurations),
            json!([
                {
                    "name": mount("main", "/etc/config", "app.properties"),
                    "mountPath": "/etc/config/app.properties",
                    "subPath": "app.properties",
                },
                {
                    "name": mount("main", "/etc/config", "config.json"),
                    "mountPath": "/etc/config/config.json",
                    "subPath": "config.json",
                },
                {
                    "name": mount("main", "/etc/tls", "tls.crt"),
                    "mountPath": "/etc/tls/tls.crt",
                    "subPath": "tls.crt",
                },
            ])
        );
        assert_eq!(
            rendered(
                "configurations.toContainerVolumeMounts('main')",
                json!({"main": {"configs": {"files": []}, "secrets": {"files": []}}})
            ),
            json!([])
        );
    }

    #[test]
    fn volumes_reference_config_maps_and_secrets() {
        let configurations = json!({"main": {
            "configs": {"files": [{"name": "app.properties", "mountPath": "/etc/config"}]},
            "secrets": {"files": [{"name": "tls.crt", "mountPath": "/etc/tls"}]},
        }});
        assert_eq!(
            rendered("configurations.toVolumes()", configurations),
            json!([
                {
                    "name": mount("main", "/etc/config", "app.properties"),
                    "configMap": {"name": config_resource("main", "app.properties")},
                },
                {
                    "name": mount("main", "/etc/tls", "tls.crt"),
                    "secret": {"secretName": secret_resource("main", "tls.crt")},
                },
            ])
        );
        assert_eq!(rendered("configurations.toVolumes()", json!({})), json!([]));
    }

    #[test]
    fn same_mount_path_shares_one_volume() {
        let configurations = json!({"main": {
            "configs": {"files": [
                {"name": "a.yaml", "mountPath": "/etc", "value": "1"},
                {"name": "a.yaml", "mountPath": "/etc", "value": "2"},
            ]},
        }});
        assert_eq!(
            rendered("size(configurations.toVolumes())", configurations),
            json!(1)
        );
    }

    #[rstest]
    #[case::config_envs(
        "configurations.toConfigEnvsByContainer()",
        json!({"main": {"configs": {"envs": [{"name": "LOG_LEVEL", "value": "info"}]}}}),
        json!([{
            "container": "main",
            "resourceName": generate_name(&["app-dev", "main", "env-configs"]),
            "envs": [{"name": "LOG_LEVEL", "value": "info"}],
        }])
    )]
    #[case::config_envs_skip_secret_only(
        "configurations.toConfigEnvsByContainer()",
        json!({"main": {"secrets": {"envs": [{"name": "API_KEY", "remoteRef": {"key": "api"}}]}}}),
        json!([])
    )]
    #[case::secret_envs(
        "configurations.toSecretEnvsByContainer()",
        json!({
            "api": {"secrets": {"envs": [{"name": "API_KEY", "remoteRef": {"key": "api"}}]}},
            "worker": {"secrets": {"envs": [{"name": "DB_PASS", "remoteRef": {"key": "db", "property": "pw"}}]}},
        }),
        json!([
            {
                "container": "api",
                "resourceName": generate_name(&["app-dev", "api", "env-secrets"]),
                "envs": [{"name": "API_KEY", "remoteRef": {"key": "api"}}],
            },
            {
                "container": "worker",
                "resourceName": generate_name(&["app-dev", "worker", "env-secrets"]),
                "envs": [{"name": "DB_PASS", "remoteRef": {"key": "db", "property": "pw"}}],
            },
        ])
    )]
    #[case::secret_envs_skip_config_only(
        "configurations.toSecretEnvsByContainer()",
        json!({"main": {"configs": {"envs": [{"name": "LOG_LEVEL", "value": "info"}]}}}),
        json!([])
    )]
    #[case::empty_configurations("configurations.toSecretEnvsByContainer()", json!({}), json!([]))]
    fn envs_grouped_by_container(#[case] expr: &str, #[case] configurations: Json, #[case] expected: Json) {
        assert_eq!(rendered(expr, configurations), expected);
    }

    #[test]
    fn results_compose_with_other_expressions() {
        let configurations = json!({"main": {"configs": {"files": [
            {"name": "a.yaml", "mountPath": "/a", "value": "1"},
            {"name": "b.yaml", "mountPath": "/b", "value": "2"},
        ]}}});
        assert_eq!(
            rendered(
                "configurations.toConfigFileList().map(f, f.name)",
                configurations.clone()
            ),
            json!(["a.yaml", "b.yaml"])
        );
        assert_eq!(
            rendered("size(configurations.toConfigFileList())", configurations),
            json!(2)
        );
    }

    #[test]
    fn dots_in_file_names_become_dashes_in_resource_names() {
        let name = config_resource("main", "app.config.yaml");
        assert!(name.starts_with("app-dev-main-config-app-config-yaml-"), "{name}");
    }

    #[test]
    fn other_receivers_are_not_rewritten() {
        let mut inputs = inputs(json!({}));
        inputs.insert("other".into(), json!({}));
        let err = engine()
            .render(&json!("${other.toVolumes()}"), &inputs)
            .expect_err("not a configurations receiver");
        assert!(matches!(err, TemplateError::Compile { .. }), "{err:?}");
    }
}
