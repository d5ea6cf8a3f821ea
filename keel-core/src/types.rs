//! Domain types for keel manifests.
//!
//! Everything here is plain data: serializable/deserializable via serde +
//! serde_yaml, with Kubernetes-style `camelCase` field names. Template bodies
//! stay as untyped [`TemplateValue`] trees until the renderer walks them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Template data
// ---------------------------------------------------------------------------

/// An arbitrarily nested template value: string, number, bool, null, ordered
/// mapping or sequence. Key order is preserved (`preserve_order`).
pub type TemplateValue = serde_json::Value;

/// Evaluation inputs: variable name → value, supplied fresh per render call.
pub type Inputs = serde_json::Map<String, TemplateValue>;

/// One templated resource declared by a component type or an addon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// Stable identifier used in error messages and warnings.
    pub id: String,
    /// Standalone boolean expression; the resource is skipped when false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_when: Option<String>,
    /// Standalone list expression; the template renders once per item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,
    /// Variable the current `forEach` item is bound to (default `item`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var: Option<String>,
    /// The resource body, containing `${...}` expressions.
    pub template: TemplateValue,
}

// ---------------------------------------------------------------------------
// Component model
// ---------------------------------------------------------------------------

/// A component type: the reusable definition that templates resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentType {
    pub name: String,
    /// e.g. `deployment`, `statefulset`, `cronjob`.
    #[serde(default)]
    pub workload_type: String,
    /// `None` means the type declares no resources at all, which is invalid input.
    #[serde(default)]
    pub resources: Option<Vec<ResourceTemplate>>,
}

/// A concrete component instance of a [`ComponentType`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub project: String,
    /// Parameters exposed to templates as `parameters`.
    #[serde(default)]
    pub parameters: Inputs,
    /// Addon instances attached to this component.
    #[serde(default)]
    pub addons: Vec<AddonInstance>,
}

/// An addon attached to a component, referencing an [`Addon`] by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonInstance {
    pub name: String,
    pub instance_name: String,
    #[serde(default)]
    pub parameters: Inputs,
}

/// An addon definition: extra resources created next to the component's own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Addon {
    pub name: String,
    #[serde(default)]
    pub creates: Vec<ResourceTemplate>,
}

/// The workload a component runs: containers, endpoints and connections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub containers: BTreeMap<String, Container>,
    #[serde(default)]
    pub endpoints: BTreeMap<String, Endpoint>,
    #[serde(default)]
    pub connections: BTreeMap<String, TemplateValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileMount>,
}

/// An environment variable: either an inline `value` or a `secretRef`
/// pointing into the data plane's secret store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<RemoteRef>,
}

/// A file mounted into a container at `mountPath/key`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMount {
    pub key: String,
    pub mount_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<RemoteRef>,
}

/// Location of a value in an external secret store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRef {
    pub key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub property: String,
}

/// A network endpoint exposed by the workload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Protocol family, e.g. `HTTP`, `gRPC`, `TCP`, `UDP`.
    #[serde(rename = "type", default = "default_endpoint_type")]
    pub kind: String,
    pub port: i64,
}

fn default_endpoint_type() -> String {
    "HTTP".to_owned()
}

/// Per-environment deployment of a component, carrying parameter overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDeployment {
    pub name: String,
    /// Deep-merged over the component's parameters.
    #[serde(default)]
    pub overrides: Inputs,
    /// Deep-merged over addon instance parameters, keyed by instance name.
    #[serde(default)]
    pub addon_overrides: BTreeMap<String, Inputs>,
}

/// Reference to the data plane a release is deployed to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPlaneRef {
    pub name: String,
    #[serde(default)]
    pub public_virtual_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_store: Option<String>,
}

/// Precomputed naming and labelling metadata for the rendered resources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataContext {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub component_name: String,
    #[serde(default)]
    pub environment_name: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub pod_selectors: BTreeMap<String, String>,
}

/// Everything needed to render one component for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub component_type: ComponentType,
    pub component: Component,
    #[serde(default)]
    pub workload: Workload,
    pub environment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_deployment: Option<ComponentDeployment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataplane: Option<DataPlaneRef>,
    #[serde(default)]
    pub addons: Vec<Addon>,
    pub metadata: MetadataContext,
}

// ---------------------------------------------------------------------------
// Release
// ---------------------------------------------------------------------------

/// A rendered resource tagged with its release identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseResource {
    pub id: String,
    pub object: TemplateValue,
}

/// The persisted result of a render: the resource list for one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    pub name: String,
    pub namespace: String,
    pub environment: String,
    pub resources: Vec<ReleaseResource>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const COMPONENT_TYPE: &str = r#"
name: web-service
workloadType: deployment
resources:
  - id: deployment
    template:
      apiVersion: apps/v1
      kind: Deployment
      metadata:
        name: ${metadata.name}
  - id: hpa
    includeWhen: ${parameters.autoscaling.enabled}
    template:
      kind: HorizontalPodAutoscaler
  - id: config
    forEach: ${parameters.configs}
    var: cfg
    template:
      kind: ConfigMap
"#;

    #[test]
    fn component_type_parses_camel_case_fields() {
        let ct: ComponentType = serde_yaml::from_str(COMPONENT_TYPE).expect("parse");
        assert_eq!(ct.workload_type, "deployment");
        let resources = ct.resources.expect("resources");
        assert_eq!(resources.len(), 3);
        assert_eq!(
            resources[1].include_when.as_deref(),
            Some("${parameters.autoscaling.enabled}")
        );
        assert_eq!(resources[2].var.as_deref(), Some("cfg"));
        assert_eq!(resources[0].template["metadata"]["name"], "${metadata.name}");
    }

    #[test]
    fn missing_resources_is_none_not_empty() {
        let ct: ComponentType = serde_yaml::from_str("name: bare\n").expect("parse");
        assert!(ct.resources.is_none());
    }

    #[rstest]
    #[case("port: 8080\n", "HTTP", 8080)]
    #[case("type: UDP\nport: 53\n", "UDP", 53)]
    #[case("type: gRPC\nport: 9090\n", "gRPC", 9090)]
    fn endpoint_type_defaults_to_http(#[case] yaml: &str, #[case] kind: &str, #[case] port: i64) {
        let ep: Endpoint = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(ep.kind, kind);
        assert_eq!(ep.port, port);
    }

    #[test]
    fn container_env_and_files_parse() {
        let container: Container = serde_yaml::from_str(
            r#"
image: nginx
env:
  - key: LOG_LEVEL
    value: info
  - key: API_KEY
    secretRef: {key: prod/api, property: token}
files:
  - key: app.yaml
    mountPath: /etc/app
    value: "a: 1"
"#,
        )
        .expect("parse");
        assert_eq!(container.env.len(), 2);
        assert_eq!(
            container.env[1].secret_ref,
            Some(RemoteRef {
                key: "prod/api".into(),
                property: "token".into(),
            })
        );
        assert_eq!(container.files[0].mount_path, "/etc/app");

        let bare = serde_json::to_value(Container {
            image: "nginx".into(),
            ..Container::default()
        })
        .expect("serialize");
        assert_eq!(bare, serde_json::json!({"image": "nginx", "command": [], "args": []}));
    }

    #[test]
    fn template_preserves_key_order() {
        let ct: ComponentType = serde_yaml::from_str(COMPONENT_TYPE).expect("parse");
        let template = &ct.resources.expect("resources")[0].template;
        let keys: Vec<_> = template.as_object().expect("object").keys().cloned().collect();
        assert_eq!(keys, vec!["apiVersion", "kind", "metadata"]);
    }
}
