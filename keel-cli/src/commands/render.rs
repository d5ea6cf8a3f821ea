//! `keel render` — run a render request through the component pipeline.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use keel_core::{manifest, Release};
use keel_pipeline::{build_release, write_release, Pipeline, RenderMetadata, WriteResult};

use crate::config::KeelConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Yaml,
    Json,
    Table,
}

/// Arguments for `keel render`.
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Render request file (component type, component, workload, addons, metadata).
    pub request: PathBuf,

    /// Write the release to this file instead of printing it.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// With `--output`, report what would be written without writing.
    #[arg(long, requires = "output")]
    pub dry_run: bool,

    /// Stdout format when not writing to a file.
    #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
    pub format: OutputFormat,
}

impl RenderArgs {
    pub fn run(self, config: &KeelConfig) -> Result<()> {
        let request = manifest::load_render_request(&self.request)
            .with_context(|| format!("failed to load {}", self.request.display()))?;

        let pipeline = Pipeline::with_options(&config.engine, config.render.clone())
            .context("failed to build render pipeline")?;
        let output = pipeline
            .render(&request)
            .with_context(|| format!("failed to render '{}'", request.metadata.name))?;
        tracing::debug!(
            "rendered {} resources ({} from addons)",
            output.metadata.resource_count,
            output.metadata.addon_resource_count
        );
        print_warnings(&output.metadata);

        let release = build_release(&request, &output);
        match self.output {
            Some(path) => {
                let result = write_release(&path, &release, self.dry_run)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                print_write(&release, &result, self.dry_run);
            }
            None => print_release(&release, self.format)?,
        }
        Ok(())
    }
}

fn print_warnings(metadata: &RenderMetadata) {
    for warning in &metadata.warnings {
        eprintln!("{} {warning}", "warning:".yellow().bold());
    }
}

fn print_write(release: &Release, result: &WriteResult, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    println!(
        "{prefix}✓ '{}' rendered ({} resources)",
        release.name,
        release.resources.len()
    );
    match result {
        WriteResult::Written { path } => println!("  ✎  {}", path.display()),
        WriteResult::WouldWrite { path } => println!("  ~  {}", path.display()),
        WriteResult::Unchanged { path } => println!("  ·  {}", path.display()),
    }
}

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "NAMESPACE")]
    namespace: String,
}

fn print_release(release: &Release, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Yaml => print!("{}", manifest::to_yaml_string(release)?),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(release)?),
        OutputFormat::Table => {
            let rows: Vec<ResourceRow> = release
                .resources
                .iter()
                .map(|r| ResourceRow {
                    id: r.id.clone(),
                    kind: field(&r.object, &["kind"]),
                    name: field(&r.object, &["metadata", "name"]),
                    namespace: field(&r.object, &["metadata", "namespace"]),
                })
                .collect();
            println!("{}", release.name.bold());
            let mut table = Table::new(rows);
            table.with(Style::rounded());
            println!("{table}");
        }
    }
    Ok(())
}

fn field(object: &keel_core::TemplateValue, path: &[&str]) -> String {
    path.iter()
        .try_fold(object, |value, key| value.get(*key))
        .and_then(|v| v.as_str())
        .unwrap_or("-")
        .to_string()
}
