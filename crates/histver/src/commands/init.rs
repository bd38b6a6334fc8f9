//! Init command: record existing history into a fresh ledger.

use anyhow::Context;
use camino::Utf8Path;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use histver_core::Config;
use histver_core::engine::InitOutcome;

/// Arguments for the `init` subcommand.
#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Do not create the initial versioning commit
    #[arg(long)]
    pub no_commit: bool,
}

#[derive(Serialize)]
struct InitReport<'a> {
    ledger: &'a str,
    #[serde(flatten)]
    outcome: &'a InitOutcome,
}

/// Bootstrap the ledger for the project at `cwd`.
#[instrument(name = "cmd_init", skip_all, fields(json_output))]
pub fn cmd_init(
    args: InitArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    debug!(
        json_output = global_json,
        no_commit = args.no_commit,
        "executing init command"
    );

    let project = super::open_project(config, cwd)?;
    let mut reconciler = project.reconciler();
    if args.no_commit {
        reconciler = reconciler.with_commit(false);
    }
    let outcome = reconciler.init().context("failed to initialize ledger")?;

    if global_json {
        let report = InitReport {
            ledger: project.ledger_path().as_str(),
            outcome: &outcome,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} Initialized ledger at {}",
        "✓".green(),
        project.ledger_path().cyan()
    );
    println!("{}: {}", "Version".bold(), outcome.version.green().bold());
    println!("{}: {}", "Commits recorded".dimmed(), outcome.commits);
    if outcome.markers > 0 {
        println!("{}: {}", "Versions recovered".dimmed(), outcome.markers);
    }
    for id in &outcome.skipped_markers {
        println!(
            "  {} skipped versioning commit {} (no version in message)",
            "⚠".yellow(),
            id.dimmed()
        );
    }
    if outcome.committed {
        println!("  {} Initial commit created", "✓".green());
    }
    Ok(())
}
