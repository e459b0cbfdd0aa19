//! Trial command - run workflows in a disposable sandbox repository.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, style};
use flowtrial_trial::{
    AutoConfirm, Confirmer, TrialOptions, TrialOrchestrator, TrialOutcome, TrialReport,
};
use tokio_util::sync::CancellationToken;

use super::{Context, PromptConfirmer};

/// Arguments for the trial command.
#[derive(Args, Debug)]
pub struct TrialArgs {
    /// Workflow references to trial
    #[arg(required = true)]
    pub refs: Vec<String>,

    /// Sandbox repository (default: <you>/<trial.host_repo_name>)
    #[arg(long, value_name = "SLUG")]
    pub host_repo: Option<String>,

    /// Seed the sandbox with this repository's content
    #[arg(long, value_name = "SLUG")]
    pub clone_repo: Option<String>,

    /// Run as if the workflows were installed in this repository
    #[arg(long, value_name = "SLUG")]
    pub logical_repo: Option<String>,

    /// Delete and re-create the sandbox before starting
    #[arg(long)]
    pub force_delete_host_repo_before: bool,

    /// Delete the sandbox when done
    #[arg(long)]
    pub delete_host_repo_after: bool,

    /// Additional cycles after the first
    #[arg(long, value_name = "N", default_value = "0")]
    pub repeat: u32,

    /// Minutes to wait for each run
    #[arg(long, value_name = "MINUTES")]
    pub timeout: Option<u64>,

    /// Merge pull requests the run opens
    #[arg(long)]
    pub auto_merge_prs: bool,

    /// Engine whose secret is configured, overriding each workflow's own
    #[arg(long, value_name = "ID")]
    pub engine: Option<String>,

    /// Issue or pull request the run acts on (URL or #number)
    #[arg(long, value_name = "REF")]
    pub trigger_context: Option<String>,

    /// Do not security-scan workflow content
    #[arg(long)]
    pub disable_security_scanner: bool,

    /// Show what would happen without changing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Create the sandbox without asking
    #[arg(short, long)]
    pub yes: bool,
}

impl TrialArgs {
    fn options(&self, ctx: &Context) -> TrialOptions {
        let mut options = TrialOptions::from_config(&ctx.config);
        options.host_repo = self.host_repo.clone();
        options.clone_repo = self.clone_repo.clone();
        options.logical_repo = self.logical_repo.clone();
        options.force_delete_host_repo_before = self.force_delete_host_repo_before;
        options.delete_host_repo_after |= self.delete_host_repo_after;
        options.repeat_count = self.repeat;
        if let Some(minutes) = self.timeout {
            options.timeout = Duration::from_secs(minutes.saturating_mul(60));
        }
        options.auto_merge_prs |= self.auto_merge_prs;
        options.engine = self.engine.clone();
        options.trigger_context = self.trigger_context.clone();
        options.disable_security_scanner =
            self.disable_security_scanner || !ctx.config.scanner().enabled;
        options.dry_run = self.dry_run;
        options.results_dir = ctx.project_path(&options.results_dir);
        options
    }
}

/// Run the trial command.
pub async fn run(args: TrialArgs, ctx: &Context) -> Result<()> {
    let options = args.options(ctx);
    let host = ctx.host();
    let vcs = ctx.vcs();
    let current_repo = ctx.current_repo(&vcs).await;
    let resolved = ctx
        .resolve(host.clone(), &args.refs, current_repo.clone())
        .await?;

    let confirmer: Arc<dyn Confirmer> = if args.yes {
        Arc::new(AutoConfirm)
    } else {
        Arc::new(PromptConfirmer)
    };
    let orchestrator = TrialOrchestrator::new(
        host,
        vcs,
        ctx.compiler(),
        ctx.scanner(),
        confirmer,
    )
    .with_web_url(ctx.config.host().web_url);

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping before the next step");
            on_interrupt.cancel();
        }
    });

    let outcome = orchestrator
        .run(&resolved, &options, current_repo.as_deref(), &cancel)
        .await
        .context("Trial failed")?;

    match outcome {
        TrialOutcome::Planned(plan) => {
            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("{}", style("Trial plan (dry run)").bold());
                println!("{}", Style::new().dim().apply_to("─".repeat(50)));
                println!("{}", plan);
            }
        }
        TrialOutcome::Completed(report) => print_report(&report, ctx)?,
    }
    Ok(())
}

fn print_report(report: &TrialReport, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let cycles: Vec<_> = report
            .cycles
            .iter()
            .map(|c| {
                serde_json::json!({
                    "cycle": c.cycle,
                    "cycle_id": c.cycle_id,
                    "results": c.results,
                    "files": c.files,
                })
            })
            .collect();
        let value = serde_json::json!({
            "host_repo": report.host_repo,
            "mode": report.mode,
            "cycles": cycles,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let green = Style::new().green();
    let dim = Style::new().dim();
    println!("{}", style(format!("Trial complete in {}", report.host_repo)).bold());
    println!("{}", dim.apply_to(format!("Mode: {}", report.mode)));
    println!("{}", dim.apply_to("─".repeat(50)));
    for cycle in &report.cycles {
        println!("{}", style(format!("Cycle {} ({})", cycle.cycle, cycle.cycle_id)).bold());
        for result in &cycle.results {
            println!(
                "  {} {} {}",
                green.apply_to("✓"),
                result.workflow_name,
                dim.apply_to(&result.run_url)
            );
            println!(
                "    {}",
                dim.apply_to(format!(
                    "{} safe output fields, {} additional artifacts",
                    result.safe_outputs.len(),
                    result.additional_artifacts.len()
                ))
            );
        }
        for file in &cycle.files {
            println!("  {}", dim.apply_to(file.display()));
        }
    }
    Ok(())
}
