use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
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
        spec:
          replicas: ${parameters.replicas}
    - id: service
      includeWhen: "${size(workload.endpoints) > 0}"
      template:
        apiVersion: v1
        kind: Service
        metadata:
          name: ${metadata.name}
          namespace: ${metadata.namespace}
        spec:
          ports: ${workload.toServicePorts()}
    - id: hpa
      includeWhen: ${parameters.autoscaling.enabled}
      template:
        apiVersion: autoscaling/v2
        kind: HorizontalPodAutoscaler
        metadata:
          name: ${metadata.name}
component:
  name: api
  parameters:
    replicas: 2
workload:
  name: api
  endpoints:
    http:
      type: HTTP
      port: 8080
environment: dev
metadata:
  name: api-dev
  namespace: shop-dev
  componentName: api
  environmentName: dev
  projectName: store
"#;

/// Runs `keel` inside `dir` with a private config home so no user config leaks in.
fn keel_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("keel"));
    cmd.current_dir(dir)
        .env("HOME", dir)
        .env("XDG_CONFIG_HOME", dir.join(".config"))
        .env_remove("RUST_LOG");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).expect("write fixture");
    path
}

#[test]
fn render_prints_release_yaml_and_warnings() {
    let dir = TempDir::new().expect("tmp");
    write(dir.path(), "request.yaml", REQUEST);

    keel_cmd(dir.path())
        .args(["render", "request.yaml"])
        .assert()
        .success()
        .stdout(contains("name: api-dev"))
        .stdout(contains("id: deployment-api-dev"))
        .stdout(contains("id: service-api-dev"))
        .stdout(contains("keel.dev/component: api"))
        .stderr(contains("resource hpa skipped"));
}

#[test]
fn render_table_lists_resources() {
    let dir = TempDir::new().expect("tmp");
    write(dir.path(), "request.yaml", REQUEST);

    keel_cmd(dir.path())
        .args(["render", "request.yaml", "--format", "table"])
        .assert()
        .success()
        .stdout(contains("KIND"))
        .stdout(contains("deployment-api-dev"))
        .stdout(contains("Service"));
}

#[test]
fn render_json_output_is_parseable() {
    let dir = TempDir::new().expect("tmp");
    write(dir.path(), "request.yaml", REQUEST);

    let output = keel_cmd(dir.path())
        .args(["render", "request.yaml", "--format", "json"])
        .output()
        .expect("run keel");
    assert!(output.status.success());
    let release: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(release["environment"], "dev");
    assert_eq!(release["resources"].as_array().map(Vec::len), Some(2));
}

#[test]
fn render_output_writes_once_then_reports_unchanged() {
    let dir = TempDir::new().expect("tmp");
    write(dir.path(), "request.yaml", REQUEST);
    let release = dir.path().join("out").join("release.yaml");

    keel_cmd(dir.path())
        .args(["render", "request.yaml", "--output", "out/release.yaml", "--dry-run"])
        .assert()
        .success()
        .stdout(contains("[dry-run]"))
        .stdout(contains("~"));
    assert!(!release.exists(), "dry-run must not write");

    keel_cmd(dir.path())
        .args(["render", "request.yaml", "--output", "out/release.yaml"])
        .assert()
        .success()
        .stdout(contains("✎"));
    let written = fs::read_to_string(&release).expect("release written");
    assert!(written.contains("deployment-api-dev"));

    keel_cmd(dir.path())
        .args(["render", "request.yaml", "--output", "out/release.yaml"])
        .assert()
        .success()
        .stdout(contains("·"));
}

#[test]
fn render_error_exits_nonzero_with_context() {
    let dir = TempDir::new().expect("tmp");
    write(
        dir.path(),
        "request.yaml",
        &REQUEST.replace("${parameters.replicas}", "${parameters.replicas +}"),
    );

    keel_cmd(dir.path())
        .args(["render", "request.yaml"])
        .assert()
        .failure()
        .stderr(contains("failed to render 'api-dev'"))
        .stderr(contains("resource deployment"));
}

#[test]
fn missing_request_file_fails() {
    let dir = TempDir::new().expect("tmp");
    keel_cmd(dir.path())
        .args(["render", "nope.yaml"])
        .assert()
        .failure()
        .stderr(contains("nope.yaml"));
}

#[test]
fn local_config_adds_resource_labels() {
    let dir = TempDir::new().expect("tmp");
    write(dir.path(), "request.yaml", REQUEST);
    write(
        dir.path(),
        "keel.yaml",
        "render:\n  resourceLabels:\n    team: payments\n",
    );

    keel_cmd(dir.path())
        .args(["render", "request.yaml"])
        .assert()
        .success()
        .stdout(contains("team: payments"));
}

#[test]
fn explicit_config_must_exist() {
    let dir = TempDir::new().expect("tmp");
    write(dir.path(), "request.yaml", REQUEST);
    keel_cmd(dir.path())
        .args(["--config", "missing.yaml", "render", "request.yaml"])
        .assert()
        .failure()
        .stderr(contains("config file not found"));
}

#[test]
fn template_renders_with_inputs_and_set() {
    let dir = TempDir::new().expect("tmp");
    write(
        dir.path(),
        "template.yaml",
        "name: ${metadata.name}\nreplicas: ${parameters.replicas}\nimage: \"${parameters.image}:${parameters.tag}\"\n",
    );
    write(
        dir.path(),
        "inputs.yaml",
        "metadata:\n  name: api\nparameters:\n  replicas: 1\n  image: nginx\n  tag: \"1.25\"\n",
    );

    keel_cmd(dir.path())
        .args([
            "template",
            "template.yaml",
            "--inputs",
            "inputs.yaml",
            "--set",
            "parameters.replicas=4",
        ])
        .assert()
        .success()
        .stdout(contains("name: api"))
        .stdout(contains("replicas: 4"))
        .stdout(contains("nginx:1.25"));
}

#[test]
fn eval_prints_json_result() {
    let dir = TempDir::new().expect("tmp");
    keel_cmd(dir.path())
        .args([
            "eval",
            "[1, 2, 3].map(x, x * n)",
            "--set",
            "n=10",
            "--json",
        ])
        .assert()
        .success()
        .stdout(contains("30"));
}

#[test]
fn eval_missing_data_prints_hint() {
    let dir = TempDir::new().expect("tmp");
    keel_cmd(dir.path())
        .args(["eval", "parameters.missing", "--set", "parameters.present=1"])
        .assert()
        .failure()
        .stderr(contains("hint:"))
        .stderr(contains("parameters.missing"));
}
