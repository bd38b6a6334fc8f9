//! Maintenance tasks for the histver workspace.
//!
//! - `completions` writes shell completion scripts
//! - `man` writes roff man pages for `histver` and each subcommand
//! - `dist` does both into the default `dist/share` tree
//!
//! Run `cargo xtask --help` to see available commands.

#![deny(unsafe_code)]

mod commands;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

/// Installed binary name.
pub const BIN_NAME: &str = "histver";

#[derive(Parser, Debug)]
#[command(name = "xtask")]
#[command(about = "Project maintenance tasks")]
struct Xtask {
    #[command(subcommand)]
    command: Task,
}

#[derive(Subcommand, Debug)]
enum Task {
    /// Generate shell completions for the histver CLI.
    Completions(commands::completions::CompletionsArgs),

    /// Generate man pages for the histver CLI.
    Man(commands::man::ManArgs),

    /// Generate completions and man pages with default locations.
    Dist,
}

fn main() -> Result<(), String> {
    match Xtask::parse().command {
        Task::Completions(args) => commands::completions::cmd_completions(args),
        Task::Man(args) => commands::man::cmd_man(args),
        Task::Dist => {
            let completions = commands::completions::CompletionsArgs::default();
            commands::completions::cmd_completions(completions)?;
            commands::man::cmd_man(commands::man::ManArgs::default())
        }
    }
}

/// Workspace root, one level above this crate.
pub fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir.parent().unwrap_or(&manifest_dir).to_path_buf()
}

/// Resolve `dir` against the workspace root and make sure it exists.
pub fn prepare_out_dir(dir: &Path) -> Result<PathBuf, String> {
    let out_dir = workspace_root().join(dir);
    std::fs::create_dir_all(&out_dir).map_err(|e| format!("{}: {e}", out_dir.display()))?;
    Ok(out_dir)
}
