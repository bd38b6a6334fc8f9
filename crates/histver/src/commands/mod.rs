//! Command implementations

pub mod init;

pub mod major;

pub mod update;

use anyhow::Context;
use camino::Utf8Path;
use owo_colors::OwoColorize;
use tracing::debug;

use histver_core::config::find_repository_root;
use histver_core::engine::{CommitSummary, CycleKind, ReconcileOutcome};
use histver_core::{Config, Project};

/// Flags shared by the `update` and `major` cycles.
#[derive(Debug, Clone, Copy, Default)]
pub struct CycleFlags {
    /// Plan only.
    pub dry_run: bool,
    /// Skip the versioning commit.
    pub no_commit: bool,
}

/// Open the project containing `cwd` with the loaded configuration.
///
/// The project root is the enclosing repository root, so commands behave the
/// same from any subdirectory. Outside a repository `cwd` itself is used.
pub fn open_project(config: &Config, cwd: &Utf8Path) -> anyhow::Result<Project> {
    let root = find_repository_root(cwd).unwrap_or_else(|| cwd.to_path_buf());
    debug!(%root, "project root resolved");
    Project::open(root, config).context("invalid manifest configuration")
}

/// Plan and, unless dry-running, execute one cycle; then print the outcome.
pub fn run_cycle(
    kind: CycleKind,
    flags: CycleFlags,
    json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let project = open_project(config, cwd)?;
    let mut reconciler = project.reconciler();
    if flags.no_commit {
        reconciler = reconciler.with_commit(false);
    }

    let plan = match kind {
        CycleKind::Update => reconciler.plan_update(),
        CycleKind::Release => reconciler.plan_release(),
    }
    .context("failed to plan version change")?;
    debug!(
        ?kind,
        dry_run = flags.dry_run,
        changes = plan.has_changes(),
        "cycle planned"
    );

    let outcome = if flags.dry_run {
        plan.preview()
    } else {
        reconciler
            .execute(plan)
            .context("failed to apply version change")?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }
    Ok(())
}

fn print_outcome(outcome: &ReconcileOutcome) {
    let nothing_new =
        outcome.added.is_empty() && outcome.removed.is_empty() && !outcome.version_changed;
    if nothing_new {
        println!(
            "{} Already up to date at {}",
            "✓".green(),
            outcome.version.bold()
        );
        return;
    }

    if outcome.version_changed {
        let breaking = if outcome.breaking {
            format!(" {}", "(breaking)".red().bold())
        } else {
            String::new()
        };
        println!(
            "{}: {} → {}{breaking}",
            "Version".bold(),
            outcome.previous_version.dimmed(),
            outcome.version.green().bold()
        );
    } else {
        println!(
            "{}: {} {}",
            "Version".bold(),
            outcome.version.bold(),
            "(unchanged)".dimmed()
        );
    }

    for commit in &outcome.removed {
        print_commit("-".red().to_string(), commit);
    }
    for commit in &outcome.added {
        print_commit("+".green().to_string(), commit);
    }

    if outcome.dry_run {
        println!();
        println!("{}", "Dry run: no changes made.".yellow());
        return;
    }

    println!();
    if outcome.manifest_written {
        println!("  {} Manifest updated", "✓".green());
    }
    if outcome.ledger_saved {
        println!("  {} Ledger saved", "✓".green());
    }
    if outcome.changelog_written {
        println!("  {} Changelog written", "✓".green());
    }
    if outcome.committed {
        println!("  {} Versioning commit created", "✓".green());
    }
}

fn print_commit(sign: String, commit: &CommitSummary) {
    println!("  {sign} {} {}", commit.id.dimmed(), commit.message);
}
