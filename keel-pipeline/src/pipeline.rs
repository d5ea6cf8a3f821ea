//! The component rendering pipeline.
//!
//! ## `Pipeline::render` — steps
//!
//! 1. Validate the request.
//! 2. Build the component context (parameters merged with overrides).
//! 3. Render the component type's resource templates.
//! 4. Render each addon instance's templates.
//! 5. Add common labels and annotations.
//! 6. Validate the resource list (when enabled).
//! 7. Stable sort by kind, apiVersion, namespace, name.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use keel_core::{Addon, Inputs, RenderRequest, ResourceTemplate, TemplateValue};
use keel_renderer::{Engine, EngineOptions, Rendered};

use crate::context::{addon_context, component_context};
use crate::error::{kind_of, PipelineError};
use crate::ports;

pub const LABEL_COMPONENT: &str = "keel.dev/component";
pub const LABEL_ENVIRONMENT: &str = "keel.dev/environment";
pub const LABEL_PROJECT: &str = "keel.dev/project";

/// Variable a `forEach` item is bound to when the template names none.
const DEFAULT_ITEM_VAR: &str = "item";

// ---------------------------------------------------------------------------
// Options and output
// ---------------------------------------------------------------------------

/// Post-processing switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderOptions {
    /// Check every rendered resource for `apiVersion`, `kind` and `metadata.name`.
    pub enable_validation: bool,
    /// Extra labels added to every resource.
    pub resource_labels: BTreeMap<String, String>,
    /// Extra annotations added to every resource.
    pub resource_annotations: BTreeMap<String, String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            enable_validation: true,
            resource_labels: BTreeMap::new(),
            resource_annotations: BTreeMap::new(),
        }
    }
}

/// Counters and non-fatal warnings from one render.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderMetadata {
    pub resource_count: usize,
    pub base_resource_count: usize,
    pub addon_count: usize,
    pub addon_resource_count: usize,
    pub warnings: Vec<String>,
}

/// Rendered resources, sorted, plus what happened along the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderOutput {
    pub resources: Vec<TemplateValue>,
    pub metadata: RenderMetadata,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Renders components. Clones share one engine and its caches, so a single
/// pipeline can serve many concurrent renders.
#[derive(Debug, Clone)]
pub struct Pipeline {
    engine: Engine,
    options: RenderOptions,
}

impl Pipeline {
    /// A pipeline with unbounded caches and default options.
    pub fn new() -> Result<Self, PipelineError> {
        Self::with_options(&EngineOptions::default(), RenderOptions::default())
    }

    pub fn with_options(
        engine_options: &EngineOptions,
        options: RenderOptions,
    ) -> Result<Self, PipelineError> {
        let engine = Engine::with_extensions(engine_options, ports::extensions())?;
        Ok(Pipeline { engine, options })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render every resource of `request`. Fails on the first error.
    pub fn render(&self, request: &RenderRequest) -> Result<RenderOutput, PipelineError> {
        validate_input(request)?;
        let mut metadata = RenderMetadata::default();

        let context = component_context(request)?;
        let templates = request.component_type.resources.as_deref().unwrap_or_default();
        let mut resources = self.render_resources(templates, &context, &mut metadata.warnings)?;
        metadata.base_resource_count = resources.len();
        tracing::debug!(
            component = %request.component.name,
            count = resources.len(),
            "rendered base resources"
        );

        let addons: HashMap<&str, &Addon> =
            request.addons.iter().map(|a| (a.name.as_str(), a)).collect();
        for instance in &request.component.addons {
            let addon = addons
                .get(instance.name.as_str())
                .ok_or_else(|| PipelineError::UnknownAddon(instance.name.clone()))?;
            let addon_ctx = addon_context(&context, instance, request);
            let created = self.render_resources(&addon.creates, &addon_ctx, &mut metadata.warnings)?;
            tracing::debug!(
                addon = %instance.name,
                instance = %instance.instance_name,
                count = created.len(),
                "rendered addon resources"
            );
            metadata.addon_count += 1;
            metadata.addon_resource_count += created.len();
            resources.extend(created);
        }

        self.post_process(&mut resources, request)?;
        if self.options.enable_validation {
            validate_resources(&resources)?;
        }
        resources.sort_by(compare_resources);

        metadata.resource_count = resources.len();
        Ok(RenderOutput {
            resources,
            metadata,
        })
    }

    // -----------------------------------------------------------------------
    // Resource templates
    // -----------------------------------------------------------------------

    fn render_resources(
        &self,
        templates: &[ResourceTemplate],
        context: &Inputs,
        warnings: &mut Vec<String>,
    ) -> Result<Vec<TemplateValue>, PipelineError> {
        let mut out = Vec::with_capacity(templates.len());
        for tmpl in templates {
            if !self.should_include(tmpl, context, warnings)? {
                continue;
            }
            match &tmpl.for_each {
                Some(expr) => {
                    let items = self.for_each_items(tmpl, expr, context)?;
                    let var = tmpl.var.as_deref().unwrap_or(DEFAULT_ITEM_VAR);
                    for item in items {
                        let mut item_ctx = context.clone();
                        item_ctx.insert(var.to_owned(), item);
                        if let Some(resource) = self.render_single(tmpl, &item_ctx, warnings)? {
                            out.push(resource);
                        }
                    }
                }
                None => {
                    if let Some(resource) = self.render_single(tmpl, context, warnings)? {
                        out.push(resource);
                    }
                }
            }
        }
        Ok(out)
    }

    /// `true` when `includeWhen` is absent or true. Missing data counts as
    /// false and is reported as a warning.
    fn should_include(
        &self,
        tmpl: &ResourceTemplate,
        context: &Inputs,
        warnings: &mut Vec<String>,
    ) -> Result<bool, PipelineError> {
        let Some(expr) = &tmpl.include_when else {
            return Ok(true);
        };
        match self.engine.render(&TemplateValue::String(expr.clone()), context) {
            Ok(Rendered::Value(TemplateValue::Bool(b))) => Ok(b),
            Ok(Rendered::Value(other)) => Err(PipelineError::IncludeWhenNotBool {
                resource: tmpl.id.clone(),
                kind: kind_of(&other),
            }),
            Ok(Rendered::Omitted) => Err(PipelineError::IncludeWhenNotBool {
                resource: tmpl.id.clone(),
                kind: "omit",
            }),
            Err(e) if e.is_missing_data() => {
                tracing::warn!(resource = %tmpl.id, error = %e, "includeWhen references missing data; skipping");
                warnings.push(format!(
                    "resource {} skipped: includeWhen references missing data: {e}",
                    tmpl.id
                ));
                Ok(false)
            }
            Err(source) => Err(PipelineError::IncludeWhen {
                resource: tmpl.id.clone(),
                source,
            }),
        }
    }

    fn for_each_items(
        &self,
        tmpl: &ResourceTemplate,
        expr: &str,
        context: &Inputs,
    ) -> Result<Vec<TemplateValue>, PipelineError> {
        let rendered = self
            .engine
            .render(&TemplateValue::String(expr.to_owned()), context)
            .map_err(|source| PipelineError::ForEach {
                resource: tmpl.id.clone(),
                source,
            })?;
        match rendered {
            Rendered::Value(TemplateValue::Array(items)) => Ok(items),
            Rendered::Value(other) => Err(PipelineError::ForEachNotList {
                resource: tmpl.id.clone(),
                kind: kind_of(&other),
            }),
            Rendered::Omitted => Err(PipelineError::ForEachNotList {
                resource: tmpl.id.clone(),
                kind: "omit",
            }),
        }
    }

    /// Render one template body. `None` when the whole body was omitted.
    fn render_single(
        &self,
        tmpl: &ResourceTemplate,
        context: &Inputs,
        warnings: &mut Vec<String>,
    ) -> Result<Option<TemplateValue>, PipelineError> {
        let rendered = self
            .engine
            .render(&tmpl.template, context)
            .map_err(|source| PipelineError::Render {
                resource: tmpl.id.clone(),
                source,
            })?;
        let resource = match rendered {
            Rendered::Value(v @ TemplateValue::Object(_)) => v,
            Rendered::Value(other) => {
                return Err(PipelineError::NotAnObject {
                    resource: tmpl.id.clone(),
                    kind: kind_of(&other),
                })
            }
            Rendered::Omitted => {
                tracing::warn!(resource = %tmpl.id, "template omitted itself; dropping resource");
                warnings.push(format!("resource {} omitted by its template", tmpl.id));
                return Ok(None);
            }
        };
        check_required_fields(&resource, &tmpl.id)?;
        Ok(Some(resource))
    }

    // -----------------------------------------------------------------------
    // Post-processing
    // -----------------------------------------------------------------------

    fn post_process(
        &self,
        resources: &mut [TemplateValue],
        request: &RenderRequest,
    ) -> Result<(), PipelineError> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_COMPONENT.to_owned(), request.metadata.component_name.clone());
        labels.insert(LABEL_ENVIRONMENT.to_owned(), request.metadata.environment_name.clone());
        labels.insert(LABEL_PROJECT.to_owned(), request.metadata.project_name.clone());
        labels.extend(self.options.resource_labels.clone());

        for (index, resource) in resources.iter_mut().enumerate() {
            let Some(metadata) = resource.get_mut("metadata").and_then(TemplateValue::as_object_mut)
            else {
                return Err(PipelineError::Validation(format!(
                    "resource #{index} missing metadata"
                )));
            };
            merge_string_map(metadata, "labels", &labels);
            if !self.options.resource_annotations.is_empty() {
                merge_string_map(metadata, "annotations", &self.options.resource_annotations);
            }
        }
        Ok(())
    }
}

fn validate_input(request: &RenderRequest) -> Result<(), PipelineError> {
    if request.component_type.resources.is_none() {
        return Err(PipelineError::InvalidInput(
            "component type has no resources".into(),
        ));
    }
    if request.component.name.is_empty() {
        return Err(PipelineError::InvalidInput("component.name is required".into()));
    }
    if request.metadata.name.is_empty() {
        return Err(PipelineError::InvalidInput("metadata.name is required".into()));
    }
    if request.metadata.namespace.is_empty() {
        return Err(PipelineError::InvalidInput(
            "metadata.namespace is required".into(),
        ));
    }
    Ok(())
}

fn check_required_fields(resource: &TemplateValue, id: &str) -> Result<(), PipelineError> {
    let missing = |field| PipelineError::MissingField {
        resource: id.to_owned(),
        field,
    };
    if str_field(resource, "kind").is_empty() {
        return Err(missing("kind"));
    }
    if str_field(resource, "apiVersion").is_empty() {
        return Err(missing("apiVersion"));
    }
    let Some(metadata) = resource.get("metadata").filter(|m| m.is_object()) else {
        return Err(missing("metadata"));
    };
    if str_field(metadata, "name").is_empty() {
        return Err(missing("metadata.name"));
    }
    Ok(())
}

fn validate_resources(resources: &[TemplateValue]) -> Result<(), PipelineError> {
    for (i, resource) in resources.iter().enumerate() {
        let kind = str_field(resource, "kind");
        let id = if kind.is_empty() {
            format!("resource #{i}")
        } else {
            format!("resource #{i} ({kind})")
        };
        if str_field(resource, "apiVersion").is_empty() {
            return Err(PipelineError::Validation(format!("{id} missing apiVersion")));
        }
        if kind.is_empty() {
            return Err(PipelineError::Validation(format!("{id} missing kind")));
        }
        let name = resource
            .get("metadata")
            .map(|m| str_field(m, "name"))
            .unwrap_or_default();
        if name.is_empty() {
            return Err(PipelineError::Validation(format!("{id} missing metadata.name")));
        }
    }
    Ok(())
}

/// Insert `entries` into the string map at `metadata[field]`, creating it if
/// needed. Existing keys are overwritten.
fn merge_string_map(
    metadata: &mut serde_json::Map<String, TemplateValue>,
    field: &str,
    entries: &BTreeMap<String, String>,
) {
    let slot = metadata
        .entry(field.to_owned())
        .or_insert_with(|| TemplateValue::Object(Default::default()));
    if !slot.is_object() {
        *slot = TemplateValue::Object(Default::default());
    }
    if let TemplateValue::Object(map) = slot {
        for (k, v) in entries {
            map.insert(k.clone(), TemplateValue::String(v.clone()));
        }
    }
}

fn str_field<'a>(value: &'a TemplateValue, field: &str) -> &'a str {
    value.get(field).and_then(TemplateValue::as_str).unwrap_or("")
}

fn compare_resources(a: &TemplateValue, b: &TemplateValue) -> Ordering {
    let namespace = |v: &TemplateValue| {
        v.get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(TemplateValue::as_str)
            .unwrap_or("")
            .to_owned()
    };
    let name = |v: &TemplateValue| {
        v.get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(TemplateValue::as_str)
            .unwrap_or("")
            .to_owned()
    };
    str_field(a, "kind")
        .cmp(str_field(b, "kind"))
        .then_with(|| str_field(a, "apiVersion").cmp(str_field(b, "apiVersion")))
        .then_with(|| namespace(a).cmp(&namespace(b)))
        .then_with(|| name(a).cmp(&name(b)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
