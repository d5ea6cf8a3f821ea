//! Evaluation inputs for component and addon templates.
//!
//! | Variable              | Source                                                 |
//! |-----------------------|--------------------------------------------------------|
//! | `parameters`          | component parameters, deployment overrides merged over |
//! | `component`           | `{name, namespace, project}`                           |
//! | `componentType`       | `{name, workloadType}`                                 |
//! | `workload`            | the workload, as written                               |
//! | `configurations`      | per-container env and file entries, see [`configurations`] |
//! | `environment`         | environment name                                       |
//! | `componentDeployment` | `{name}`, when a deployment is given                   |
//! | `dataplane`           | the data-plane reference, when given                   |
//! | `addons`              | `[{name, instanceName}]`                               |
//! | `metadata`            | the precomputed [`MetadataContext`]                    |
//!
//! Addon templates see the same variables plus `addon`.

use serde_json::json;

use keel_core::{
    AddonInstance, Inputs, MetadataContext, RemoteRef, RenderRequest, TemplateValue, Workload,
};

use crate::error::PipelineError;

/// Recursively merge `overrides` into `base`. Nested maps merge key by key;
/// any other value (lists included) replaces what was there.
pub fn deep_merge(base: &mut Inputs, overrides: &Inputs) {
    for (key, value) in overrides {
        if let (Some(TemplateValue::Object(existing)), TemplateValue::Object(incoming)) =
            (base.get_mut(key), value)
        {
            deep_merge(existing, incoming);
            continue;
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Component parameters with the deployment's overrides applied.
pub fn effective_parameters(request: &RenderRequest) -> Inputs {
    let mut parameters = request.component.parameters.clone();
    if let Some(deployment) = &request.component_deployment {
        deep_merge(&mut parameters, &deployment.overrides);
    }
    parameters
}

/// Build the inputs every component template renders against.
pub fn component_context(request: &RenderRequest) -> Result<Inputs, PipelineError> {
    let mut ctx = Inputs::new();
    ctx.insert(
        "parameters".into(),
        TemplateValue::Object(effective_parameters(request)),
    );
    ctx.insert(
        "component".into(),
        json!({
            "name": request.component.name,
            "namespace": request.component.namespace,
            "project": request.component.project,
        }),
    );
    ctx.insert(
        "componentType".into(),
        json!({
            "name": request.component_type.name,
            "workloadType": request.component_type.workload_type,
        }),
    );
    ctx.insert("workload".into(), serde_json::to_value(&request.workload)?);
    ctx.insert("configurations".into(), configurations(&request.workload));
    ctx.insert(
        "environment".into(),
        TemplateValue::String(request.environment.clone()),
    );
    if let Some(deployment) = &request.component_deployment {
        ctx.insert("componentDeployment".into(), json!({ "name": deployment.name }));
    }
    if let Some(dataplane) = &request.dataplane {
        ctx.insert("dataplane".into(), serde_json::to_value(dataplane)?);
    }
    let addons: Vec<TemplateValue> = request
        .component
        .addons
        .iter()
        .map(|a| json!({"name": a.name, "instanceName": a.instance_name}))
        .collect();
    ctx.insert("addons".into(), TemplateValue::Array(addons));
    ctx.insert("metadata".into(), metadata_value(&request.metadata)?);
    Ok(ctx)
}

/// `base` plus `addon = {name, instanceName, config}`, where `config` is the
/// instance parameters with the deployment's per-instance overrides applied.
pub fn addon_context(
    base: &Inputs,
    instance: &AddonInstance,
    request: &RenderRequest,
) -> Inputs {
    let mut config = instance.parameters.clone();
    if let Some(overrides) = request
        .component_deployment
        .as_ref()
        .and_then(|d| d.addon_overrides.get(&instance.instance_name))
    {
        deep_merge(&mut config, overrides);
    }

    let mut ctx = base.clone();
    ctx.insert(
        "addon".into(),
        json!({
            "name": instance.name,
            "instanceName": instance.instance_name,
            "config": config,
        }),
    );
    ctx
}

/// Container name to `{configs: {envs, files}, secrets: {envs, files}}`.
///
/// Entries with an inline value go under `configs`; entries with a
/// `secretRef` go under `secrets` carrying a `remoteRef`. An entry with
/// neither is dropped.
pub fn configurations(workload: &Workload) -> TemplateValue {
    let mut out = Inputs::new();
    for (name, container) in &workload.containers {
        let mut config_envs = Vec::new();
        let mut secret_envs = Vec::new();
        for env in &container.env {
            if !env.value.is_empty() {
                config_envs.push(json!({"name": env.key, "value": env.value}));
            } else if let Some(remote) = &env.secret_ref {
                secret_envs.push(json!({"name": env.key, "remoteRef": remote_ref(remote)}));
            }
        }

        let mut config_files = Vec::new();
        let mut secret_files = Vec::new();
        for file in &container.files {
            if !file.value.is_empty() {
                config_files.push(json!({
                    "name": file.key,
                    "mountPath": file.mount_path,
                    "value": file.value,
                }));
            } else if let Some(remote) = &file.secret_ref {
                secret_files.push(json!({
                    "name": file.key,
                    "mountPath": file.mount_path,
                    "remoteRef": remote_ref(remote),
                }));
            }
        }

        out.insert(
            name.clone(),
            json!({
                "configs": {"envs": config_envs, "files": config_files},
                "secrets": {"envs": secret_envs, "files": secret_files},
            }),
        );
    }
    TemplateValue::Object(out)
}

fn remote_ref(remote: &RemoteRef) -> TemplateValue {
    if remote.property.is_empty() {
        json!({"key": remote.key})
    } else {
        json!({"key": remote.key, "property": remote.property})
    }
}

fn metadata_value(metadata: &MetadataContext) -> Result<TemplateValue, PipelineError> {
    Ok(serde_json::to_value(metadata)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
