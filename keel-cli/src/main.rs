//! Keel — render component templates with embedded CEL expressions.
//!
//! # Usage
//!
//! ```text
//! keel render <request.yaml> [--output <release.yaml>] [--dry-run] [--format yaml|json|table]
//! keel template <template.yaml> [--inputs <inputs.yaml>] [--set key=value]... [--json]
//! keel eval <expression> [--inputs <inputs.yaml>] [--set key=value]... [--json]
//! ```
//!
//! Global flags: `--config <path>`, `-v` (debug logging; `RUST_LOG` wins).

mod commands;
mod config;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{eval::EvalArgs, render::RenderArgs, template::TemplateArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "keel",
    version,
    about = "Render component templates with embedded CEL expressions",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ./keel.yaml, then the user config directory).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a component render request into a release.
    Render(RenderArgs),

    /// Render a single template document against an inputs file.
    Template(TemplateArgs),

    /// Evaluate one expression against an inputs file.
    Eval(EvalArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing(verbose: u8) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose > 0 { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = config::load(cli.config.as_deref())?;
    match cli.command {
        Commands::Render(args) => args.run(&config),
        Commands::Template(args) => args.run(&config),
        Commands::Eval(args) => args.run(&config),
    }
}
