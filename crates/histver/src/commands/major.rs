//! Major command: cut a breaking release.

use camino::Utf8Path;
use clap::Args;
use tracing::{debug, instrument};

use histver_core::Config;
use histver_core::engine::CycleKind;

use super::CycleFlags;

/// Arguments for the `major` subcommand.
#[derive(Args, Debug, Default)]
pub struct MajorArgs {
    /// Show the release version without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Do not create a versioning commit
    #[arg(long)]
    pub no_commit: bool,
}

/// Bump the major version of the project at `cwd`.
///
/// Commits not yet folded in by `update` stay pending and are applied on
/// top of the new major version by the next update.
#[instrument(name = "cmd_major", skip_all, fields(json_output, dry_run))]
pub fn cmd_major(
    args: MajorArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    debug!(
        json_output = global_json,
        dry_run = args.dry_run,
        "executing major command"
    );
    let flags = CycleFlags {
        dry_run: args.dry_run,
        no_commit: args.no_commit,
    };
    super::run_cycle(CycleKind::Release, flags, global_json, config, cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn major_requires_ledger() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cwd = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        std::fs::write(cwd.join("Cargo.toml"), "[package]\nversion = \"0.2.0\"\n").unwrap();
        let err = cmd_major(MajorArgs::default(), false, &Config::default(), &cwd).unwrap_err();
        assert!(format!("{err:#}").contains("not initialized"), "{err:#}");
    }
}
