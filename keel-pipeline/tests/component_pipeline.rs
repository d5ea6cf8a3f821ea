use keel_core::{RenderRequest, TemplateValue};
use keel_pipeline::{
    build_release, write_release, Pipeline, PipelineError, RenderOptions, WriteResult,
};
use keel_renderer::EngineOptions;
use serde_json::json;
use tempfile::TempDir;

const REQUEST: &str = r#"
componentType:
  name: web-service
  workloadType: deployment
  resources:
    - id: deployment
      template:
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: ${metadata.name}
          namespace: ${metadata.namespace}
          labels: ${metadata.labels}
        spec:
          replicas: ${parameters.replicas}
          selector:
            matchLabels: ${metadata.podSelectors}
          template:
            spec:
              containers:
                - name: main
                  image: ${workload.containers.main.image}
                  args: "${size(workload.containers.main.args) > 0 ? workload.containers.main.args : omit()}"
    - id: service
      includeWhen: "${size(workload.endpoints) > 0}"
      template:
        apiVersion: v1
        kind: Service
        metadata:
          name: ${metadata.name}
          namespace: ${metadata.namespace}
        spec:
          selector: ${metadata.podSelectors}
          ports: ${workload.toServicePorts()}
    - id: hpa
      includeWhen: ${parameters.autoscaling.enabled}
      template:
        apiVersion: autoscaling/v2
        kind: HorizontalPodAutoscaler
        metadata:
          name: ${metadata.name}
    - id: config
      forEach: ${parameters.configs}
      var: cfg
      template:
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: ${metadata.name}-${cfg.name}
          namespace: ${metadata.namespace}
        data: ${cfg.data}
component:
  name: api
  namespace: shop
  project: store
  parameters:
    replicas: 2
    configs:
      - name: app
        data:
          LOG_LEVEL: info
      - name: feature
        data:
          FLAGS: a,b
  addons:
    - name: persistent-volume
      instanceName: data
      parameters:
        size: 1Gi
workload:
  name: api
  containers:
    main:
      image: registry.example.com/api:1.0
  endpoints:
    http:
      type: HTTP
      port: 8080
environment: dev
componentDeployment:
  name: api-dev
  overrides:
    replicas: 3
  addonOverrides:
    data:
      size: 5Gi
addons:
  - name: persistent-volume
    creates:
      - id: pvc
        template:
          apiVersion: v1
          kind: PersistentVolumeClaim
          metadata:
            name: ${metadata.name}-${addon.instanceName}
            namespace: ${metadata.namespace}
          spec:
            resources:
              requests:
                storage: ${addon.config.size}
metadata:
  name: api-dev-1a2b3c4d
  namespace: shop-dev
  componentName: api
  environmentName: dev
  projectName: store
  labels:
    app: api
  podSelectors:
    keel.dev/component-uid: abc123
"#;

fn request() -> RenderRequest {
    serde_yaml::from_str(REQUEST).expect("parse request")
}

fn kinds(resources: &[TemplateValue]) -> Vec<&str> {
    resources
        .iter()
        .map(|r| r["kind"].as_str().unwrap_or(""))
        .collect()
}

#[test]
fn renders_base_and_addon_resources_sorted() {
    let pipeline = Pipeline::new().expect("pipeline");
    let output = pipeline.render(&request()).expect("render");

    assert_eq!(
        kinds(&output.resources),
        vec!["ConfigMap", "ConfigMap", "Deployment", "PersistentVolumeClaim", "Service"]
    );
    assert_eq!(output.metadata.resource_count, 5);
    assert_eq!(output.metadata.base_resource_count, 4);
    assert_eq!(output.metadata.addon_count, 1);
    assert_eq!(output.metadata.addon_resource_count, 1);
}

#[test]
fn overrides_and_omissions_shape_the_deployment() {
    let output = Pipeline::new().expect("pipeline").render(&request()).expect("render");
    let deployment = output
        .resources
        .iter()
        .find(|r| r["kind"] == "Deployment")
        .expect("deployment");

    assert_eq!(deployment["spec"]["replicas"], json!(3));
    assert_eq!(
        deployment["spec"]["selector"]["matchLabels"],
        json!({"keel.dev/component-uid": "abc123"})
    );
    let container = &deployment["spec"]["template"]["spec"]["containers"][0];
    assert_eq!(container["image"], "registry.example.com/api:1.0");
    assert!(container.get("args").is_none(), "empty args must be omitted");
}

#[test]
fn for_each_binds_the_named_variable() {
    let output = Pipeline::new().expect("pipeline").render(&request()).expect("render");
    let names: Vec<&str> = output
        .resources
        .iter()
        .filter(|r| r["kind"] == "ConfigMap")
        .map(|r| r["metadata"]["name"].as_str().unwrap_or(""))
        .collect();
    assert_eq!(names, vec!["api-dev-1a2b3c4d-app", "api-dev-1a2b3c4d-feature"]);
}

#[test]
fn service_ports_come_from_workload_endpoints() {
    let output = Pipeline::new().expect("pipeline").render(&request()).expect("render");
    let service = output
        .resources
        .iter()
        .find(|r| r["kind"] == "Service")
        .expect("service");
    assert_eq!(
        service["spec"]["ports"],
        json!([{"name": "http", "port": 8080, "targetPort": 8080, "protocol": "TCP"}])
    );
}

#[test]
fn addon_sees_instance_config_with_overrides() {
    let output = Pipeline::new().expect("pipeline").render(&request()).expect("render");
    let pvc = output
        .resources
        .iter()
        .find(|r| r["kind"] == "PersistentVolumeClaim")
        .expect("pvc");
    assert_eq!(pvc["metadata"]["name"], "api-dev-1a2b3c4d-data");
    assert_eq!(pvc["spec"]["resources"]["requests"]["storage"], "5Gi");
}

#[test]
fn missing_include_when_data_skips_with_warning() {
    let output = Pipeline::new().expect("pipeline").render(&request()).expect("render");
    assert!(!kinds(&output.resources).contains(&"HorizontalPodAutoscaler"));
    assert_eq!(output.metadata.warnings.len(), 1);
    assert!(output.metadata.warnings[0].contains("resource hpa skipped"));
}

#[test]
fn include_when_true_includes_the_resource() {
    let mut req = request();
    req.component
        .parameters
        .insert("autoscaling".into(), json!({"enabled": true}));
    let output = Pipeline::new().expect("pipeline").render(&req).expect("render");
    assert!(kinds(&output.resources).contains(&"HorizontalPodAutoscaler"));
    assert!(output.metadata.warnings.is_empty());
}

#[test]
fn common_and_configured_labels_are_added() {
    let mut options = RenderOptions::default();
    options
        .resource_labels
        .insert("team".into(), "payments".into());
    options
        .resource_annotations
        .insert("keel.dev/managed".into(), "true".into());
    let pipeline = Pipeline::with_options(&EngineOptions::default(), options).expect("pipeline");
    let output = pipeline.render(&request()).expect("render");

    for resource in &output.resources {
        let labels = &resource["metadata"]["labels"];
        assert_eq!(labels["keel.dev/component"], "api");
        assert_eq!(labels["keel.dev/environment"], "dev");
        assert_eq!(labels["keel.dev/project"], "store");
        assert_eq!(labels["team"], "payments");
        assert_eq!(resource["metadata"]["annotations"]["keel.dev/managed"], "true");
    }
    let deployment = output
        .resources
        .iter()
        .find(|r| r["kind"] == "Deployment")
        .expect("deployment");
    assert_eq!(deployment["metadata"]["labels"]["app"], "api");
}

#[test]
fn unknown_addon_is_an_error() {
    let mut req = request();
    req.addons.clear();
    let err = Pipeline::new().expect("pipeline").render(&req).unwrap_err();
    assert!(matches!(err, PipelineError::UnknownAddon(ref name) if name == "persistent-volume"));
}

#[test]
fn component_type_without_resources_is_invalid() {
    let mut req = request();
    req.component_type.resources = None;
    let err = Pipeline::new().expect("pipeline").render(&req).unwrap_err();
    assert_eq!(err.to_string(), "invalid input: component type has no resources");
}

#[test]
fn empty_metadata_name_is_invalid() {
    let mut req = request();
    req.metadata.name.clear();
    assert!(matches!(
        Pipeline::new().expect("pipeline").render(&req),
        Err(PipelineError::InvalidInput(_))
    ));
}

#[test]
fn for_each_must_be_a_list() {
    let mut req = request();
    req.component
        .parameters
        .insert("configs".into(), json!("not-a-list"));
    let err = Pipeline::new().expect("pipeline").render(&req).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::ForEachNotList { ref resource, kind: "string" } if resource == "config"
    ));
}

#[test]
fn template_error_aborts_and_names_resource_and_expression() {
    let mut req = request();
    req.component_type.resources.as_mut().expect("resources")[0].template["spec"]["replicas"] =
        json!("${parameters.replicas +}");
    let err = Pipeline::new().expect("pipeline").render(&req).unwrap_err();
    assert!(err.to_string().starts_with("failed to render template for resource deployment"));
    assert_eq!(
        err.template_error().and_then(|e| e.expression()),
        Some("parameters.replicas +")
    );
}

#[test]
fn missing_kind_is_rejected() {
    let mut req = request();
    let resources = req.component_type.resources.as_mut().expect("resources");
    if let Some(template) = resources[2].template.as_object_mut() {
        template.remove("kind");
    }
    resources[2].include_when = None;
    let err = Pipeline::new().expect("pipeline").render(&req).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::MissingField { ref resource, field: "kind" } if resource == "hpa"
    ));
}

#[test]
fn release_ids_and_file_write_are_stable() {
    let req = request();
    let output = Pipeline::new().expect("pipeline").render(&req).expect("render");
    let release = build_release(&req, &output);

    assert_eq!(release.name, "api-dev-1a2b3c4d");
    assert_eq!(release.environment, "dev");
    let ids: Vec<&str> = release.resources.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "configmap-api-dev-1a2b3c4d-app",
            "configmap-api-dev-1a2b3c4d-feature",
            "deployment-api-dev-1a2b3c4d",
            "persistentvolumeclaim-api-dev-1a2b3c4d-data",
            "service-api-dev-1a2b3c4d",
        ]
    );

    let dir = TempDir::new().expect("tmp");
    let path = dir.path().join("release.yaml");
    let first = write_release(&path, &release, false).expect("write");
    assert!(matches!(first, WriteResult::Written { .. }));

    let again = build_release(&req, &Pipeline::new().expect("pipeline").render(&req).expect("render"));
    let second = write_release(&path, &again, false).expect("rewrite");
    assert!(matches!(second, WriteResult::Unchanged { .. }));
}

#[test]
fn one_pipeline_serves_concurrent_renders() {
    let pipeline = Pipeline::new().expect("pipeline");
    let expected = pipeline.render(&request()).expect("render");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let pipeline = pipeline.clone();
            let expected = &expected;
            scope.spawn(move || {
                for _ in 0..10 {
                    let output = pipeline.render(&request()).expect("render");
                    assert_eq!(&output, expected);
                }
            });
        }
    });

    assert!(pipeline.engine().cache().stats().program_hits > 0);
}

const CONFIGURED_REQUEST: &str = r#"
componentType:
  name: web-service
  workloadType: deployment
  resources:
    - id: deployment
      template:
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: ${metadata.name}
        spec:
          template:
            spec:
              containers:
                - name: main
                  image: ${workload.containers.main.image}
                  envFrom: ${configurations.toContainerEnvFrom('main')}
                  volumeMounts: ${configurations.toContainerVolumeMounts('main')}
              volumes: ${configurations.toVolumes()}
    - id: env-config
      forEach: ${configurations.toConfigEnvsByContainer()}
      var: envConfig
      template:
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: ${envConfig.resourceName}
        data: "${envConfig.envs.transformMapEntry(i, e, {e.name: e.value})}"
    - id: file-config
      forEach: ${configurations.toConfigFileList()}
      var: file
      template:
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: ${file.resourceName}
        data: "${{file.name: file.value}}"
component:
  name: api
  namespace: shop
  project: store
workload:
  name: api
  containers:
    main:
      image: registry.example.com/api:1.0
      env:
        - key: LOG_LEVEL
          value: info
        - key: API_KEY
          secretRef: {key: prod/api}
      files:
        - key: app.yaml
          mountPath: /etc/app
          value: "a: 1"
environment: dev
metadata:
  name: api-dev
  namespace: shop-dev
  componentName: api
  environmentName: dev
  projectName: store
"#;

#[test]
fn configuration_helpers_wire_env_and_files_into_resources() {
    let req: RenderRequest = serde_yaml::from_str(CONFIGURED_REQUEST).expect("parse request");
    let output = Pipeline::new().expect("pipeline").render(&req).expect("render");
    assert_eq!(kinds(&output.resources), vec!["ConfigMap", "ConfigMap", "Deployment"]);

    let env_configs = keel_renderer::generate_name(&["api-dev", "main", "env-configs"]);
    let env_secrets = keel_renderer::generate_name(&["api-dev", "main", "env-secrets"]);
    let file_config = keel_renderer::generate_name(&["api-dev", "main", "config", "app-yaml"]);

    let deployment = output
        .resources
        .iter()
        .find(|r| r["kind"] == "Deployment")
        .expect("deployment");
    let pod = &deployment["spec"]["template"]["spec"];
    assert_eq!(
        pod["containers"][0]["envFrom"],
        json!([
            {"configMapRef": {"name": env_configs}},
            {"secretRef": {"name": env_secrets}},
        ])
    );
    let volume = format!("main-file-mount-{}", keel_renderer::fnv_hash("/etc/app/app.yaml"));
    assert_eq!(
        pod["containers"][0]["volumeMounts"],
        json!([{"name": volume, "mountPath": "/etc/app/app.yaml", "subPath": "app.yaml"}])
    );
    assert_eq!(
        pod["volumes"],
        json!([{"name": volume, "configMap": {"name": file_config}}])
    );

    let config_maps: Vec<&TemplateValue> = output
        .resources
        .iter()
        .filter(|r| r["kind"] == "ConfigMap")
        .collect();
    let by_name = |name: &str| -> Option<TemplateValue> {
        config_maps
            .iter()
            .find(|r| r["metadata"]["name"] == name)
            .map(|r| r["data"].clone())
    };
    assert_eq!(by_name(env_configs.as_str()), Some(json!({"LOG_LEVEL": "info"})));
    assert_eq!(by_name(file_config.as_str()), Some(json!({"app.yaml": "a: 1"})));
}
