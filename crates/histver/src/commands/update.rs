//! Update command: fold new, amended or dropped commits into the version.

use camino::Utf8Path;
use clap::Args;
use tracing::{debug, instrument};

use histver_core::Config;
use histver_core::engine::CycleKind;

use super::CycleFlags;

/// Arguments for the `update` subcommand.
#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Show what would change without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not create a versioning commit
    #[arg(long)]
    pub no_commit: bool,
}

/// Run an update cycle for the project at `cwd`.
#[instrument(name = "cmd_update", skip_all, fields(json_output, dry_run))]
pub fn cmd_update(
    args: UpdateArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    debug!(
        json_output = global_json,
        dry_run = args.dry_run,
        "executing update command"
    );
    let flags = CycleFlags {
        dry_run: args.dry_run,
        no_commit: args.no_commit,
    };
    super::run_cycle(CycleKind::Update, flags, global_json, config, cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn update_requires_repository() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        assert!(cmd_update(UpdateArgs::default(), true, &Config::default(), &cwd).is_err());
    }
}
