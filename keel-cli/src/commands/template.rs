//! `keel template` — render one template document against inputs.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use keel_core::manifest;
use keel_renderer::Rendered;

use super::{build_engine, collect_inputs, print_value};
use crate::config::KeelConfig;

/// Arguments for `keel template`.
#[derive(Args, Debug)]
pub struct TemplateArgs {
    /// Template document (YAML or JSON) containing `${...}` expressions.
    pub template: PathBuf,

    /// Inputs file; its top-level keys become expression variables.
    #[arg(short, long)]
    pub inputs: Option<PathBuf>,

    /// Set an input value (`key.path=value`, value parsed as YAML). Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    pub sets: Vec<String>,

    /// Print JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

impl TemplateArgs {
    pub fn run(self, config: &KeelConfig) -> Result<()> {
        let template = manifest::load_template(&self.template)
            .with_context(|| format!("failed to load {}", self.template.display()))?;
        let inputs = collect_inputs(self.inputs.as_deref(), &self.sets)?;

        let engine = build_engine(config)?;
        let rendered = engine
            .render(&template, &inputs)
            .with_context(|| format!("failed to render {}", self.template.display()))?;

        match rendered {
            Rendered::Value(value) => print_value(&value, self.json),
            Rendered::Omitted => {
                eprintln!(
                    "{} template evaluated to omit(); nothing to print",
                    "warning:".yellow().bold()
                );
                Ok(())
            }
        }
    }
}
