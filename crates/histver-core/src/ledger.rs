//! The ledger: histver's durable record of history.
//!
//! A newest-first list of [`LedgerEntry`] values. Commit references mirror the
//! commits already folded into the version; version markers record each
//! version that was actually produced. Inserts always go to the head.
//!
//! Persistence is behind [`LedgerStore`]. [`FileLedgerStore`] writes
//! `{"format": 1, "entries": [...]}` JSON atomically; [`MemoryLedgerStore`]
//! backs tests.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::version::Version;

/// On-disk format revision written by this crate.
pub const LEDGER_FORMAT: u32 = 1;

/// Errors from loading or saving a ledger.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// No ledger exists yet; `histver init` has not run.
    #[error("no ledger at {path}; run `histver init` first")]
    NotInitialized {
        /// Where the ledger was expected.
        path: Utf8PathBuf,
    },

    /// Reading or writing the ledger file failed.
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        /// Ledger path.
        path: Utf8PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// The ledger file is not valid ledger JSON.
    #[error("ledger at {path} is not valid JSON: {source}")]
    Json {
        /// Ledger path.
        path: Utf8PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },

    /// The ledger parsed, but its contents are unusable.
    #[error("ledger at {path} is corrupt: {reason}")]
    CorruptFormat {
        /// Ledger path.
        path: Utf8PathBuf,
        /// What is wrong.
        reason: String,
    },
}

/// Result type alias using [`LedgerError`].
pub type LedgerResult<T> = Result<T, LedgerError>;

/// A commit as seen by histver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// Full commit hash.
    pub id: String,
    /// Subject line.
    pub message: String,
    /// Committer date.
    pub date: DateTime<Utc>,
}

impl Commit {
    /// Build a commit record.
    pub fn new(id: impl Into<String>, message: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            date,
        }
    }

    /// Abbreviated hash for display.
    pub fn short_id(&self) -> &str {
        self.id.get(..7).unwrap_or(&self.id)
    }
}

/// One ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum LedgerEntry {
    /// A version that was produced.
    #[serde(rename = "version")]
    VersionMarker(Version),
    /// A commit already folded into the version.
    #[serde(rename = "commit")]
    CommitRef(Commit),
}

/// Newest-first history record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    entries: Vec<LedgerEntry>,
}

impl Ledger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from entries already in newest-first order.
    pub const fn from_entries(entries: Vec<LedgerEntry>) -> Self {
        Self { entries }
    }

    /// Entries, newest first.
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the ledger holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record a version at the head.
    pub fn insert_version(&mut self, version: Version) {
        self.entries.insert(0, LedgerEntry::VersionMarker(version));
    }

    /// Record a commit at the head.
    pub fn insert_commit(&mut self, commit: Commit) {
        self.entries.insert(0, LedgerEntry::CommitRef(commit));
    }

    /// Drop the commit reference with the given id. Returns whether one existed.
    pub fn remove_commit(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries
            .retain(|entry| !matches!(entry, LedgerEntry::CommitRef(c) if c.id == id));
        self.entries.len() != before
    }

    /// The newest version marker.
    pub fn last_version(&self) -> Option<&Version> {
        self.entries.iter().find_map(|entry| match entry {
            LedgerEntry::VersionMarker(v) => Some(v),
            LedgerEntry::CommitRef(_) => None,
        })
    }

    /// Commit references, newest first.
    pub fn commits(&self) -> impl Iterator<Item = &Commit> {
        self.entries.iter().filter_map(|entry| match entry {
            LedgerEntry::CommitRef(c) => Some(c),
            LedgerEntry::VersionMarker(_) => None,
        })
    }

    /// Ids of every referenced commit.
    pub fn commit_ids(&self) -> HashSet<&str> {
        self.commits().map(|c| c.id.as_str()).collect()
    }
}

/// Serialized ledger document.
#[derive(Serialize, Deserialize)]
struct LedgerDocument {
    format: u32,
    entries: Vec<LedgerEntry>,
}

/// Where a ledger is persisted.
pub trait LedgerStore {
    /// Whether a ledger has been saved before.
    fn is_initialized(&self) -> bool;

    /// Load the ledger. Fails with [`LedgerError::NotInitialized`] when none exists.
    fn load(&self) -> LedgerResult<Ledger>;

    /// Replace the persisted ledger.
    fn save(&self, ledger: &Ledger) -> LedgerResult<()>;
}

/// JSON file store.
#[derive(Debug, Clone)]
pub struct FileLedgerStore {
    path: Utf8PathBuf,
}

impl FileLedgerStore {
    /// Store at `path`.
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The ledger file path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerStore for FileLedgerStore {
    fn is_initialized(&self) -> bool {
        self.path.is_file()
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn load(&self) -> LedgerResult<Ledger> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(LedgerError::NotInitialized {
                    path: self.path.clone(),
                });
            }
            Err(e) => return Err(self.io_error(e)),
        };

        let doc: LedgerDocument = serde_json::from_str(&raw).map_err(|source| LedgerError::Json {
            path: self.path.clone(),
            source,
        })?;
        if doc.format != LEDGER_FORMAT {
            return Err(LedgerError::CorruptFormat {
                path: self.path.clone(),
                reason: format!(
                    "unsupported format {} (expected {LEDGER_FORMAT})",
                    doc.format
                ),
            });
        }

        debug!(entries = doc.entries.len(), "ledger loaded");
        Ok(Ledger::from_entries(doc.entries))
    }

    #[instrument(skip(self, ledger), fields(path = %self.path, entries = ledger.len()))]
    fn save(&self, ledger: &Ledger) -> LedgerResult<()> {
        let doc = LedgerDocument {
            format: LEDGER_FORMAT,
            entries: ledger.entries().to_vec(),
        };
        let mut json = serde_json::to_string_pretty(&doc).map_err(|source| LedgerError::Json {
            path: self.path.clone(),
            source,
        })?;
        json.push('\n');

        write_atomic(&self.path, json.as_bytes()).map_err(|e| self.io_error(e))?;
        debug!("ledger saved");
        Ok(())
    }
}

/// Replace `path` with `contents` via a temp file in the same directory.
pub(crate) fn write_atomic(path: &Utf8Path, contents: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// In-memory store, mostly for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    ledger: RefCell<Option<Ledger>>,
}

impl MemoryLedgerStore {
    /// An uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store already holding `ledger`.
    pub fn with_ledger(ledger: Ledger) -> Self {
        Self {
            ledger: RefCell::new(Some(ledger)),
        }
    }

    /// Copy of the stored ledger, if any.
    pub fn snapshot(&self) -> Option<Ledger> {
        self.ledger.borrow().clone()
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn is_initialized(&self) -> bool {
        self.ledger.borrow().is_some()
    }

    fn load(&self) -> LedgerResult<Ledger> {
        self.ledger
            .borrow()
            .clone()
            .ok_or_else(|| LedgerError::NotInitialized {
                path: Utf8PathBuf::from("<memory>"),
            })
    }

    fn save(&self, ledger: &Ledger) -> LedgerResult<()> {
        *self.ledger.borrow_mut() = Some(ledger.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn commit(id: &str, message: &str) -> Commit {
        Commit::new(id, message, Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap())
    }

    fn store_in(dir: &TempDir) -> FileLedgerStore {
        let path = Utf8PathBuf::try_from(dir.path().join(".histver-ledger.json")).unwrap();
        FileLedgerStore::new(path)
    }

    #[test]
    fn inserts_go_to_head() {
        let mut ledger = Ledger::new();
        ledger.insert_commit(commit("a", "feat: a"));
        ledger.insert_version(Version::from_parts(0, 1, 0));
        ledger.insert_commit(commit("b", "fix: b"));

        assert!(matches!(&ledger.entries()[0], LedgerEntry::CommitRef(c) if c.id == "b"));
        assert!(matches!(&ledger.entries()[2], LedgerEntry::CommitRef(c) if c.id == "a"));
        assert_eq!(ledger.last_version().unwrap().to_literal(), "0.1.0");
    }

    #[test]
    fn last_version_is_newest_marker() {
        let mut ledger = Ledger::new();
        assert!(ledger.last_version().is_none());
        ledger.insert_version(Version::from_parts(0, 1, 0));
        ledger.insert_version(Version::from_parts(0, 2, 0));
        assert_eq!(ledger.last_version().unwrap().to_literal(), "0.2.0");
    }

    #[test]
    fn remove_commit_only_touches_matching_refs() {
        let mut ledger = Ledger::new();
        ledger.insert_commit(commit("a", "feat: a"));
        ledger.insert_commit(commit("b", "fix: b"));
        ledger.insert_version(Version::from_parts(0, 1, 1));

        assert!(ledger.remove_commit("a"));
        assert!(!ledger.remove_commit("missing"));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.commit_ids(), HashSet::from(["b"]));
    }

    #[test]
    fn missing_file_is_not_initialized() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        assert!(!store.is_initialized());
        assert!(matches!(
            store.load(),
            Err(LedgerError::NotInitialized { .. })
        ));
    }

    #[test]
    fn save_then_load_preserves_entries() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let mut marker = Version::from_parts(0, 0, 0);
        marker.increase_minor();
        marker.commit();

        let mut ledger = Ledger::new();
        ledger.insert_version(Version::from_parts(0, 0, 0));
        ledger.insert_commit(commit("abc1234def", "feat: first"));
        ledger.insert_version(marker);

        store.save(&ledger).unwrap();
        assert!(store.is_initialized());
        assert_eq!(store.load().unwrap(), ledger);
    }

    #[test]
    fn file_format_is_tagged_json() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let mut ledger = Ledger::new();
        ledger.insert_version(Version::from_parts(1, 2, 3));
        ledger.insert_commit(commit("abc", "fix: x"));
        store.save(&ledger).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["format"], 1);
        assert_eq!(value["entries"][0]["kind"], "commit");
        assert_eq!(value["entries"][0]["id"], "abc");
        assert_eq!(value["entries"][1]["kind"], "version");
        assert_eq!(value["entries"][1]["major"], 1);
        assert!(value["entries"][1].get("timestamp").is_none());
    }

    #[test]
    fn unknown_format_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        fs::write(store.path(), r#"{"format": 9, "entries": []}"#).unwrap();
        assert!(matches!(
            store.load(),
            Err(LedgerError::CorruptFormat { .. })
        ));
    }

    #[test]
    fn garbage_is_json_error() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);
        fs::write(store.path(), "not json").unwrap();
        assert!(matches!(store.load(), Err(LedgerError::Json { .. })));
    }

    #[test]
    fn save_overwrites_previous_ledger() {
        let tmp = TempDir::new().unwrap();
        let store = store_in(&tmp);

        let mut ledger = Ledger::new();
        ledger.insert_version(Version::from_parts(0, 1, 0));
        store.save(&ledger).unwrap();

        ledger.insert_version(Version::from_parts(0, 2, 0));
        store.save(&ledger).unwrap();

        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryLedgerStore::new();
        assert!(!store.is_initialized());
        assert!(store.load().is_err());

        let mut ledger = Ledger::new();
        ledger.insert_version(Version::from_parts(0, 0, 1));
        store.save(&ledger).unwrap();
        assert!(store.is_initialized());
        assert_eq!(store.snapshot().unwrap(), ledger);
    }

    #[test]
    fn short_id_truncates() {
        assert_eq!(commit("0123456789", "x").short_id(), "0123456");
        assert_eq!(commit("abc", "x").short_id(), "abc");
    }
}
