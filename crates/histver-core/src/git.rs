//! Version-control access.
//!
//! The engine sees history through [`Repository`]. [`GitCli`] shells out to
//! `git` inside the project root, so the user's hooks, signing and identity
//! configuration all apply to the commits histver creates.

use std::process::{Command, Output};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::classify::{initial_message, versioning_message};
use crate::ledger::Commit;

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "log").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,

    /// `git log` produced a line we could not parse.
    #[error("unexpected git log output: {0}")]
    UnexpectedOutput(String),
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// The history and commit operations the engine needs.
pub trait Repository {
    /// Whether the project is under version control at all.
    fn has_vcs_support(&self) -> bool;

    /// Name of the checked-out branch, or `HEAD` when detached.
    fn active_branch(&self) -> GitResult<String>;

    /// Commits reachable from `branch`, newest first. Empty for a repo with
    /// no commits yet.
    fn list_commits(&self, branch: &str) -> GitResult<Vec<Commit>>;

    /// Commit histver's changed files as `versioning: Set version to X`.
    ///
    /// Returns `false` when nothing changed.
    fn add_versioning_commit(&self, version: &str) -> GitResult<bool>;

    /// Commit the new ledger as `versioning: Init histver with version X`.
    ///
    /// Returns `false` when nothing changed.
    fn add_initial_commit(&self, version: &str) -> GitResult<bool>;
}

/// Field separator in the `git log` format (ASCII unit separator).
const FIELD_SEP: char = '\u{1f}';

/// [`Repository`] backed by the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: Utf8PathBuf,
    ledger_file: Utf8PathBuf,
    tracked: Vec<Utf8PathBuf>,
}

impl GitCli {
    /// Repository rooted at `root`, whose ledger lives at `ledger_file`.
    ///
    /// Paths are interpreted relative to `root`.
    pub fn new(root: impl Into<Utf8PathBuf>, ledger_file: impl Into<Utf8PathBuf>) -> Self {
        Self {
            root: root.into(),
            ledger_file: ledger_file.into(),
            tracked: Vec::new(),
        }
    }

    /// Also include `path` in versioning commits (manifest, changelog).
    pub fn track(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.tracked.push(path.into());
        self
    }

    /// Project root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Commit whichever of `files` changed. Returns whether a commit was made.
    fn commit_files(&self, files: &[&Utf8Path], message: &str) -> GitResult<bool> {
        let present: Vec<&str> = files
            .iter()
            .filter(|path| self.root.join(path).exists())
            .map(|path| path.as_str())
            .collect();
        if present.is_empty() {
            debug!("no histver files present, skipping commit");
            return Ok(false);
        }

        let mut status = vec!["status", "--porcelain", "--"];
        status.extend(&present);
        let changed = self.git(&status)?;
        if changed.trim().is_empty() {
            debug!("histver files unchanged, skipping commit");
            return Ok(false);
        }

        let mut add = vec!["add", "--"];
        add.extend(&present);
        self.git(&add)?;

        let mut commit = vec!["commit", "--quiet", "-m", message, "--"];
        commit.extend(&present);
        self.git(&commit)?;

        info!(%message, files = ?present, "versioning commit created");
        Ok(true)
    }

    /// Run a git command in the project root and return its stdout.
    fn git(&self, args: &[&str]) -> GitResult<String> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(failure(args, &output))
        }
    }

    /// Like [`Self::git`], for `--quiet` queries that answer "no" by exiting
    /// non-zero with nothing on stderr. That answer maps to `None`; any
    /// failure git explains on stderr is still an error.
    fn git_quiet(&self, args: &[&str]) -> GitResult<Option<String>> {
        let output = self.run(args)?;
        if output.status.success() {
            return Ok(Some(String::from_utf8_lossy(&output.stdout).to_string()));
        }
        if output.stderr.iter().all(u8::is_ascii_whitespace) && output.status.code() == Some(1) {
            return Ok(None);
        }
        Err(failure(args, &output))
    }

    fn run(&self, args: &[&str]) -> GitResult<Output> {
        Ok(Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()?)
    }
}

/// Map a failed git invocation to a [`GitError`].
fn failure(args: &[&str], output: &Output) -> GitError {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if stderr.contains("not a git repository") {
        return GitError::NotARepo;
    }

    GitError::Command {
        command: args.first().unwrap_or(&"").to_string(),
        stderr,
    }
}

impl Repository for GitCli {
    fn has_vcs_support(&self) -> bool {
        self.root.join(".git").exists()
    }

    #[instrument(skip(self), fields(root = %self.root))]
    fn active_branch(&self) -> GitResult<String> {
        match self.git_quiet(&["symbolic-ref", "--quiet", "--short", "HEAD"])? {
            Some(out) => {
                let branch = out.trim().to_string();
                debug!(%branch, "active branch");
                Ok(branch)
            }
            None => {
                debug!("detached HEAD");
                Ok("HEAD".to_string())
            }
        }
    }

    #[instrument(skip(self), fields(root = %self.root))]
    fn list_commits(&self, branch: &str) -> GitResult<Vec<Commit>> {
        if self
            .git_quiet(&["rev-parse", "--verify", "--quiet", "HEAD"])?
            .is_none()
        {
            debug!("repository has no commits yet");
            return Ok(Vec::new());
        }

        let output = self.git(&["log", branch, "--format=%H%x1f%cI%x1f%s", "--"])?;
        let commits = output
            .lines()
            .filter(|line| !line.is_empty())
            .map(parse_log_line)
            .collect::<GitResult<Vec<_>>>()?;

        debug!(count = commits.len(), "commits listed");
        Ok(commits)
    }

    #[instrument(skip(self), fields(root = %self.root))]
    fn add_versioning_commit(&self, version: &str) -> GitResult<bool> {
        let mut files: Vec<&Utf8Path> = self.tracked.iter().map(Utf8PathBuf::as_path).collect();
        files.push(self.ledger_file.as_path());
        self.commit_files(&files, &versioning_message(version))
    }

    #[instrument(skip(self), fields(root = %self.root))]
    fn add_initial_commit(&self, version: &str) -> GitResult<bool> {
        self.commit_files(&[self.ledger_file.as_path()], &initial_message(version))
    }
}

/// Parse one `%H<US>%cI<US>%s` line.
fn parse_log_line(line: &str) -> GitResult<Commit> {
    let mut fields = line.splitn(3, FIELD_SEP);
    let (Some(id), Some(date), Some(subject)) = (fields.next(), fields.next(), fields.next())
    else {
        return Err(GitError::UnexpectedOutput(line.to_string()));
    };
    let date = DateTime::parse_from_rfc3339(date)
        .map_err(|_| GitError::UnexpectedOutput(line.to_string()))?
        .with_timezone(&Utc);
    Ok(Commit::new(id, subject, date))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn run(dir: &Utf8Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(status.status.success(), "git {args:?} failed: {status:?}");
    }

    fn init_repo() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        run(&root, &["init", "--quiet"]);
        run(&root, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        run(&root, &["config", "user.name", "Histver Test"]);
        run(&root, &["config", "user.email", "test@example.com"]);
        run(&root, &["config", "commit.gpgsign", "false"]);
        (tmp, root)
    }

    fn commit_file(root: &Utf8Path, name: &str, message: &str) {
        fs::write(root.join(name), message).unwrap();
        run(root, &["add", name]);
        run(root, &["commit", "--quiet", "-m", message]);
    }

    #[test]
    fn parses_log_line() {
        let line = "0123abcd\u{1f}2024-02-03T10:00:00+01:00\u{1f}feat: a: b";
        let commit = parse_log_line(line).unwrap();
        assert_eq!(commit.id, "0123abcd");
        assert_eq!(commit.message, "feat: a: b");
        assert_eq!(commit.date.to_rfc3339(), "2024-02-03T09:00:00+00:00");
    }

    #[test]
    fn rejects_malformed_log_line() {
        assert!(matches!(
            parse_log_line("just a hash"),
            Err(GitError::UnexpectedOutput(_))
        ));
        assert!(matches!(
            parse_log_line("abc\u{1f}yesterday\u{1f}fix: x"),
            Err(GitError::UnexpectedOutput(_))
        ));
    }

    #[test]
    fn vcs_support_requires_git_dir() {
        let tmp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        assert!(!GitCli::new(&root, ".histver-ledger.json").has_vcs_support());

        let (_tmp, root) = init_repo();
        assert!(GitCli::new(&root, ".histver-ledger.json").has_vcs_support());
    }

    #[test]
    fn empty_repo_lists_nothing() {
        let (_tmp, root) = init_repo();
        let repo = GitCli::new(&root, ".histver-ledger.json");
        assert_eq!(repo.active_branch().unwrap(), "main");
        assert!(repo.list_commits("main").unwrap().is_empty());
    }

    #[test]
    fn lists_commits_newest_first() {
        let (_tmp, root) = init_repo();
        commit_file(&root, "a.txt", "Initial commit");
        commit_file(&root, "b.txt", "feat: add b");

        let repo = GitCli::new(&root, ".histver-ledger.json");
        let commits = repo.list_commits("main").unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].message, "feat: add b");
        assert_eq!(commits[1].message, "Initial commit");
        assert_eq!(commits[0].id.len(), 40);
    }

    #[test]
    fn detached_head_reports_head() {
        let (_tmp, root) = init_repo();
        commit_file(&root, "a.txt", "Initial commit");
        run(&root, &["checkout", "--quiet", "--detach"]);
        let repo = GitCli::new(&root, ".histver-ledger.json");
        assert_eq!(repo.active_branch().unwrap(), "HEAD");
        assert_eq!(repo.list_commits("HEAD").unwrap().len(), 1);
    }

    #[test]
    fn broken_repository_is_not_an_empty_history() {
        let (_tmp, root) = init_repo();
        commit_file(&root, "a.txt", "Initial commit");
        fs::write(root.join(".git/HEAD"), "garbage\n").unwrap();

        let repo = GitCli::new(&root, ".histver-ledger.json");
        assert!(repo.active_branch().is_err());
        assert!(repo.list_commits("main").is_err());
    }

    #[test]
    fn unknown_branch_is_an_error() {
        let (_tmp, root) = init_repo();
        commit_file(&root, "a.txt", "Initial commit");
        let repo = GitCli::new(&root, ".histver-ledger.json");
        assert!(matches!(
            repo.list_commits("no-such-branch"),
            Err(GitError::Command { .. })
        ));
    }

    #[test]
    fn versioning_commit_only_includes_histver_files() {
        let (_tmp, root) = init_repo();
        commit_file(&root, "Cargo.toml", "version = \"0.0.0\"\n");

        fs::write(root.join("Cargo.toml"), "version = \"0.1.0\"\n").unwrap();
        fs::write(root.join(".histver-ledger.json"), "{}").unwrap();
        fs::write(root.join("unrelated.txt"), "keep me out").unwrap();

        let repo = GitCli::new(&root, ".histver-ledger.json")
            .track("Cargo.toml")
            .track("CHANGELOG.md");
        assert!(repo.add_versioning_commit("0.1.0").unwrap());

        let commits = repo.list_commits("main").unwrap();
        assert_eq!(commits[0].message, "versioning: Set version to 0.1.0");
        let status = repo.git(&["status", "--porcelain"]).unwrap();
        assert!(status.contains("unrelated.txt"));
        assert!(!status.contains("Cargo.toml"));

        // Nothing left to commit.
        assert!(!repo.add_versioning_commit("0.1.0").unwrap());
    }

    #[test]
    fn initial_commit_adds_ledger() {
        let (_tmp, root) = init_repo();
        commit_file(&root, "a.txt", "Initial commit");
        fs::write(root.join(".histver-ledger.json"), "{}").unwrap();

        let repo = GitCli::new(&root, ".histver-ledger.json");
        assert!(repo.add_initial_commit("0.0.0").unwrap());
        let commits = repo.list_commits("main").unwrap();
        assert_eq!(commits[0].message, "versioning: Init histver with version 0.0.0");
    }

    #[test]
    fn git_error_on_bad_command() {
        let (_tmp, root) = init_repo();
        let repo = GitCli::new(&root, ".histver-ledger.json");
        assert!(matches!(
            repo.git(&["not-a-real-subcommand"]),
            Err(GitError::Command { .. })
        ));
    }
}
