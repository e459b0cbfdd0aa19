//! flowtrial - install agentic workflows and trial them in sandboxes.
//!
//! Main entry point for the flowtrial CLI.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use console::Style;

mod commands;

use commands::{add, trial};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// flowtrial - install agentic workflows and trial them in disposable sandbox repositories
#[derive(Parser)]
#[command(name = "flowtrial")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Project directory (default: current directory)
    #[arg(long, global = true, env = "FLOWTRIAL_DIR")]
    pub dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install workflows into the current repository
    Add(add::AddArgs),

    /// Run workflows end-to-end in a sandbox repository
    Trial(trial::TrialArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "flowtrial=debug,flowtrial_workflow=debug,flowtrial_trial=debug,flowtrial_host=debug,flowtrial_config=debug,info"
    } else {
        "flowtrial=info,flowtrial_workflow=info,flowtrial_trial=info,flowtrial_host=info,warn"
    };

    let log_dir = flowtrial_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "flowtrial.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(cli.verbose)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "flowtrial=trace,flowtrial_workflow=trace,flowtrial_trial=trace,flowtrial_host=trace,flowtrial_config=trace,info",
                )),
        )
        .init();

    let project_dir = match cli.dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Cannot determine the current directory")?,
    };

    let loaded = flowtrial_config::load_config(Some(&project_dir))
        .context("Failed to load configuration")?;
    for warning in &loaded.warnings {
        eprintln!("{} {}", Style::new().yellow().apply_to("warning:"), warning);
    }
    for path in loaded.loaded_from() {
        tracing::debug!(path = %path.display(), "Loaded config");
    }

    let ctx = commands::Context {
        project_dir,
        config: loaded.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Add(args) => add::run(args, &ctx).await,
        Commands::Trial(args) => trial::run(args, &ctx).await,
    }
}
