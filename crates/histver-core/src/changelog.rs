//! Changelog rendering.
//!
//! The changelog is regenerated from the whole ledger on every cycle, newest
//! entry first. There is no incremental editing: hand edits to the output
//! file are overwritten.

use std::fmt::Write as _;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::ledger::{Commit, Ledger, LedgerEntry, write_atomic};
use crate::version::Version;

/// Errors from changelog output.
#[derive(Error, Debug)]
pub enum ChangelogError {
    /// Writing the changelog failed.
    #[error("failed to write changelog {path}: {source}")]
    Write {
        /// Changelog path.
        path: Utf8PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// Result type alias using [`ChangelogError`].
pub type ChangelogResult<T> = Result<T, ChangelogError>;

/// Something that turns a ledger into a changelog.
pub trait ChangelogWriter {
    /// Render the full ledger, replacing any previous output.
    fn render(&self, ledger: &Ledger) -> ChangelogResult<()>;
}

/// Render the ledger as Markdown.
///
/// Version markers become `## X.Y.Z (date)` headings; commits become bullets
/// with their type in bold when the message has a `type:` header.
pub fn render_markdown(ledger: &Ledger, repository_url: Option<&str>) -> String {
    let mut out = String::from("# Changelog\n\n");
    out.push_str("All notable changes to this project will be documented in this file.");
    if let Some(url) = repository_url {
        let _ = write!(out, " See [histver]({url}) for commit guidelines.");
    }
    out.push('\n');

    for entry in ledger.entries() {
        match entry {
            LedgerEntry::VersionMarker(version) => push_version(&mut out, version),
            LedgerEntry::CommitRef(commit) => push_commit(&mut out, commit),
        }
    }
    out
}

fn push_version(out: &mut String, version: &Version) {
    let _ = write!(out, "\n## {version}");
    if version.is_major_bump() {
        out.push_str(" ⚠ BREAKING CHANGES");
    }
    if let Some(date) = version.date_string() {
        let _ = write!(out, " ({date})");
    }
    out.push('\n');
}

fn push_commit(out: &mut String, commit: &Commit) {
    let date = commit.date.format("%Y-%m-%d");
    match commit.message.split_once(':') {
        Some((kind, description)) => {
            let _ = writeln!(out, "- **{kind}**: {} ({date})", description.trim());
        }
        None => {
            let _ = writeln!(out, "- {} ({date})", commit.message);
        }
    }
}

/// Markdown file writer.
#[derive(Debug, Clone)]
pub struct MarkdownChangelog {
    path: Utf8PathBuf,
    repository_url: Option<String>,
}

impl MarkdownChangelog {
    /// Writer targeting `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            repository_url: None,
        }
    }

    /// Link the header to a repository.
    pub fn with_repository_url(mut self, url: impl Into<String>) -> Self {
        self.repository_url = Some(url.into());
        self
    }

    /// Output path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl ChangelogWriter for MarkdownChangelog {
    #[instrument(skip(self, ledger), fields(path = %self.path, entries = ledger.len()))]
    fn render(&self, ledger: &Ledger) -> ChangelogResult<()> {
        let text = render_markdown(ledger, self.repository_url.as_deref());
        write_atomic(&self.path, text.as_bytes()).map_err(|source| ChangelogError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!(bytes = text.len(), "changelog written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    fn commit(id: &str, message: &str, day: u32) -> Commit {
        Commit::new(id, message, Utc.with_ymd_and_hms(2024, 5, day, 9, 30, 0).unwrap())
    }

    #[test]
    fn header_without_repository() {
        let text = render_markdown(&Ledger::new(), None);
        assert_eq!(
            text,
            "# Changelog\n\nAll notable changes to this project will be documented in this file.\n"
        );
    }

    #[test]
    fn header_links_repository() {
        let text = render_markdown(&Ledger::new(), Some("https://github.com/acme/widget"));
        assert!(
            text.contains("See [histver](https://github.com/acme/widget) for commit guidelines.")
        );
    }

    #[test]
    fn renders_small_ledger_newest_first() {
        let mut ledger = Ledger::new();
        ledger.insert_version(Version::from_parts(0, 0, 0));
        ledger.insert_commit(commit("a1", "Initial commit", 1));
        ledger.insert_commit(commit("b2", "feat(cli): add --json flag", 2));
        ledger.insert_commit(commit("c3", "fix: handle empty repo", 3));

        let text = render_markdown(&ledger, None);
        let body: Vec<&str> = text.lines().skip(3).collect();
        assert_eq!(
            body,
            [
                "- **fix**: handle empty repo (2024-05-03)",
                "- **feat(cli)**: add --json flag (2024-05-02)",
                "- Initial commit (2024-05-01)",
                "",
                "## 0.0.0",
            ]
        );
    }

    #[test]
    fn versions_carry_date_and_breaking_flag() {
        let mut minor = Version::from_parts(0, 1, 0);
        minor.increase_patch();
        minor.commit();
        let mut major = Version::copy_of(&minor);
        major.increase_major();
        major.commit();

        let mut ledger = Ledger::new();
        ledger.insert_version(minor);
        ledger.insert_version(major);

        let text = render_markdown(&ledger, None);
        let today = Utc::now().format("%Y-%m-%d").to_string();
        assert!(text.contains(&format!("## 1.0.0 ⚠ BREAKING CHANGES ({today})\n")));
        assert!(text.contains(&format!("## 0.1.1 ({today})\n")));
        assert!(text.find("## 1.0.0").unwrap() < text.find("## 0.1.1").unwrap());
    }

    #[test]
    fn writer_overwrites_file() {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("CHANGELOG.md")).unwrap();
        fs::write(&path, "stale hand edits\n").unwrap();

        let mut ledger = Ledger::new();
        ledger.insert_commit(commit("a1", "docs: readme", 4));
        MarkdownChangelog::new(&path).render(&ledger).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("stale"));
        assert!(text.ends_with("- **docs**: readme (2024-05-04)\n"));
    }
}
