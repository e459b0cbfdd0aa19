//! Add command - install workflows into the current repository.

use anyhow::{Context as _, Result};
use clap::Args;
use console::{Style, Term, style};
use flowtrial_trial::{AddOptions, Confirmer, WorkflowInstaller};

use super::{Context, PromptConfirmer};

/// Arguments for the add command.
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Workflow references (owner/repo/name[@ref], owner/repo/path.md[@ref], URL, or ./local.md)
    #[arg(required = true)]
    pub refs: Vec<String>,

    /// Overwrite workflows that already exist
    #[arg(short, long)]
    pub force: bool,

    /// Skip compiling the installed workflows
    #[arg(long)]
    pub no_compile: bool,

    /// Stage and commit the installed files
    #[arg(long)]
    pub commit: bool,

    /// Do not ask before installing a wildcard batch
    #[arg(short, long)]
    pub yes: bool,
}

/// Run the add command.
pub async fn run(args: AddArgs, ctx: &Context) -> Result<()> {
    let host = ctx.host();
    let vcs = ctx.vcs();
    let current_repo = ctx.current_repo(&vcs).await;
    let resolved = ctx.resolve(host, &args.refs, current_repo).await?;

    if resolved.has_wildcard && !args.yes && Term::stderr().is_term() {
        let prompt = format!(
            "Install {} workflows ({}) into {}?",
            resolved.len(),
            resolved.names().join(", "),
            ctx.project_dir.display()
        );
        if !PromptConfirmer.confirm(&prompt) {
            println!("{}", Style::new().dim().apply_to("Nothing installed"));
            return Ok(());
        }
    }

    let mut installer = WorkflowInstaller::new(vcs);
    if !args.no_compile {
        installer = installer.with_compiler(ctx.compiler());
    }
    if ctx.config.scanner().enabled {
        installer = installer.with_scanner(ctx.scanner());
    }

    let options = AddOptions {
        force: args.force,
        commit: args.commit,
        workflows_dir: ctx.config.paths().workflows_dir,
    };
    let report = installer
        .add(&ctx.project_dir, &resolved, &options)
        .await
        .context("Failed to add workflows")?;

    if ctx.json_output {
        let value = serde_json::json!({
            "installed": report.installed,
            "skipped": report.skipped,
            "files": report.files,
            "committed": report.committed,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let green = Style::new().green();
    let yellow = Style::new().yellow();
    let dim = Style::new().dim();

    println!("{}", style("Added workflows").bold());
    println!("{}", dim.apply_to("─".repeat(50)));
    for name in &report.installed {
        println!("{} {}", green.apply_to("✓"), name);
    }
    for name in &report.skipped {
        println!("{} {} {}", yellow.apply_to("-"), name, dim.apply_to("(already exists)"));
    }
    if ctx.verbose {
        for file in &report.files {
            println!("  {}", dim.apply_to(file.display()));
        }
    }
    if report.committed {
        println!();
        println!("{}", dim.apply_to("Changes committed"));
    }
    Ok(())
}
