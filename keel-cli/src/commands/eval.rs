//! `keel eval` — evaluate a single expression.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use keel_renderer::Rendered;

use super::{build_engine, collect_inputs, print_value};
use crate::config::KeelConfig;

/// Arguments for `keel eval`.
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// CEL expression, without the surrounding `${ }`.
    pub expression: String,

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

impl EvalArgs {
    pub fn run(self, config: &KeelConfig) -> Result<()> {
        let inputs = collect_inputs(self.inputs.as_deref(), &self.sets)?;
        let engine = build_engine(config)?;

        match engine.evaluate(&self.expression, &inputs) {
            Ok(Rendered::Value(value)) => print_value(&value, self.json),
            Ok(Rendered::Omitted) => {
                println!("{}", "<omitted>".dimmed());
                Ok(())
            }
            Err(err) => {
                if err.is_missing_data() {
                    eprintln!(
                        "{} the expression references data not present in the inputs",
                        "hint:".cyan().bold()
                    );
                }
                Err(err.into())
            }
        }
    }
}
