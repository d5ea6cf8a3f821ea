//! Manifest loading error-message and happy-path integration tests.

use assert_fs::prelude::*;
use keel_core::{manifest, ManifestError, TemplateValue};
use predicates::prelude::predicate;

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
component:
  name: checkout
  project: shop
  parameters:
    replicas: 2
workload:
  name: checkout
  containers:
    main:
      image: ghcr.io/acme/checkout:1.4.0
  endpoints:
    http:
      type: HTTP
      port: 8080
environment: dev
metadata:
  name: checkout-dev-1a2b3c4d
  namespace: dp-shop-dev
  componentName: checkout
  environmentName: dev
  projectName: shop
"#;

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_request_returns_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let err = manifest::load_render_request(&dir.path().join("absent.yaml")).unwrap_err();
    assert!(matches!(err, ManifestError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("manifest not found"));
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("request.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = manifest::load_render_request(file.path()).unwrap_err();
    assert!(matches!(err, ManifestError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("request.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_inputs_rejects_non_mapping_document() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("inputs.yaml");
    file.write_str("- a\n- b\n").expect("write");

    let err = manifest::load_inputs(file.path()).unwrap_err();
    assert!(matches!(err, ManifestError::NotAMapping { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Happy paths
// ---------------------------------------------------------------------------

#[test]
fn load_render_request_reads_all_sections() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("request.yaml");
    file.write_str(REQUEST).expect("write");
    file.assert(predicate::path::is_file());

    let request = manifest::load_render_request(file.path()).expect("load");
    assert_eq!(request.component.name, "checkout");
    assert_eq!(request.component.parameters["replicas"], 2);
    assert_eq!(request.workload.endpoints["http"].port, 8080);
    assert_eq!(request.metadata.namespace, "dp-shop-dev");
    assert!(request.component_deployment.is_none());
    assert!(request.dataplane.is_none());
}

#[test]
fn load_inputs_accepts_json_documents() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("inputs.json");
    file.write_str(r#"{"spec": {"replicas": 3}, "name": "api"}"#)
        .expect("write");

    let inputs = manifest::load_inputs(file.path()).expect("load");
    assert_eq!(inputs["name"], TemplateValue::from("api"));
    assert_eq!(inputs["spec"]["replicas"], 3);
}

#[test]
fn empty_inputs_file_is_empty_mapping() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("inputs.yaml");
    file.write_str("").expect("write");
    assert!(manifest::load_inputs(file.path()).expect("load").is_empty());
}

#[test]
fn request_survives_yaml_roundtrip() {
    let request: keel_core::RenderRequest = serde_yaml::from_str(REQUEST).expect("parse");
    let yaml = manifest::to_yaml_string(&request).expect("serialize");
    let back: keel_core::RenderRequest = serde_yaml::from_str(&yaml).expect("reparse");
    assert_eq!(request, back);
}
