//! Reading and writing the version string in a project manifest.
//!
//! [`RegexManifest`] treats the manifest as plain text: a regex with three
//! capture groups (prefix, version, suffix) locates the version string and
//! only the middle group is rewritten. Only the first match is ever touched,
//! so later `version = ...` lines (dependency tables, for instance) survive.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::ledger::write_atomic;
use crate::version::{Triple, Version, VersionError};

/// Matches the first `version = "x.y.z"` line, e.g. in `Cargo.toml` or
/// `pyproject.toml`.
pub const DEFAULT_VERSION_PATTERN: &str = r#"(?m)^(\s*version\s*=\s*["'])([^"']*)(["'])"#;

/// Errors from manifest access.
#[derive(Error, Debug)]
pub enum ManifestError {
    /// The manifest file does not exist.
    #[error("manifest not found: {0}")]
    NotFound(Utf8PathBuf),

    /// The pattern matched nothing.
    #[error("no version string found in {0}")]
    MissingVersion(Utf8PathBuf),

    /// The matched text is not a version.
    #[error("version string in {path} is invalid: {source}")]
    InvalidVersion {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Parse error.
        source: VersionError,
    },

    /// The configured pattern is unusable.
    #[error("invalid manifest pattern: {0}")]
    Pattern(String),

    /// Reading or writing failed.
    #[error("manifest I/O error at {path}: {source}")]
    Io {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// Result type alias using [`ManifestError`].
pub type ManifestResult<T> = Result<T, ManifestError>;

/// Holder of the externally visible version string.
pub trait VersionManifest {
    /// Read the current version.
    fn read_version_triple(&self) -> ManifestResult<Triple>;

    /// Overwrite the version.
    fn write_version_triple(&self, major: u64, minor: u64, patch: u64) -> ManifestResult<()>;
}

/// Text-substitution manifest.
#[derive(Debug, Clone)]
pub struct RegexManifest {
    path: Utf8PathBuf,
    pattern: Regex,
}

impl RegexManifest {
    /// Manifest at `path` using [`DEFAULT_VERSION_PATTERN`].
    pub fn new(path: impl Into<Utf8PathBuf>) -> ManifestResult<Self> {
        Self::with_pattern(path, DEFAULT_VERSION_PATTERN)
    }

    /// Manifest at `path` using a custom three-group pattern.
    pub fn with_pattern(path: impl Into<Utf8PathBuf>, pattern: &str) -> ManifestResult<Self> {
        let pattern = Regex::new(pattern).map_err(|e| ManifestError::Pattern(e.to_string()))?;
        // Group 0 is the whole match.
        if pattern.captures_len() != 4 {
            return Err(ManifestError::Pattern(format!(
                "expected 3 capture groups (prefix, version, suffix), found {}",
                pattern.captures_len() - 1
            )));
        }
        Ok(Self {
            path: path.into(),
            pattern,
        })
    }

    /// The manifest file path.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    fn read(&self) -> ManifestResult<String> {
        fs::read_to_string(&self.path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                ManifestError::NotFound(self.path.clone())
            } else {
                ManifestError::Io {
                    path: self.path.clone(),
                    source,
                }
            }
        })
    }
}

impl VersionManifest for RegexManifest {
    #[instrument(skip(self), fields(path = %self.path))]
    fn read_version_triple(&self) -> ManifestResult<Triple> {
        let text = self.read()?;
        let caps = self
            .pattern
            .captures(&text)
            .ok_or_else(|| ManifestError::MissingVersion(self.path.clone()))?;
        let literal = caps.get(2).map_or("", |m| m.as_str());
        let version =
            Version::from_literal(literal).map_err(|source| ManifestError::InvalidVersion {
                path: self.path.clone(),
                source,
            })?;
        debug!(version = %version, "manifest version read");
        Ok(version.triple())
    }

    #[instrument(skip(self), fields(path = %self.path))]
    fn write_version_triple(&self, major: u64, minor: u64, patch: u64) -> ManifestResult<()> {
        let text = self.read()?;
        if !self.pattern.is_match(&text) {
            return Err(ManifestError::MissingVersion(self.path.clone()));
        }

        let literal = Triple::new(major, minor, patch).to_string();
        let updated = self.pattern.replacen(&text, 1, |caps: &regex::Captures<'_>| {
            format!(
                "{}{literal}{}",
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(3).map_or("", |m| m.as_str()),
            )
        });

        write_atomic(&self.path, updated.as_bytes()).map_err(|source| ManifestError::Io {
            path: self.path.clone(),
            source,
        })?;
        debug!(version = %literal, "manifest version written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CARGO: &str = r#"[package]
name = "widget"
version = "0.3.1"
edition = "2024"

[dependencies]
serde = { version = "1.0.200" }

[dependencies.regex]
version = "1.10.0"
"#;

    fn manifest_with(dir: &TempDir, body: &str) -> RegexManifest {
        let path = Utf8PathBuf::try_from(dir.path().join("Cargo.toml")).unwrap();
        fs::write(&path, body).unwrap();
        RegexManifest::new(path).unwrap()
    }

    #[test]
    fn reads_first_version() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_with(&tmp, CARGO);
        assert_eq!(manifest.read_version_triple().unwrap(), Triple::new(0, 3, 1));
    }

    #[test]
    fn write_touches_only_first_match() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_with(&tmp, CARGO);
        manifest.write_version_triple(0, 4, 0).unwrap();

        let text = fs::read_to_string(manifest.path()).unwrap();
        assert_eq!(text, CARGO.replacen("0.3.1", "0.4.0", 1));
        assert!(text.contains(r#"version = "1.10.0""#));
        assert_eq!(manifest.read_version_triple().unwrap(), Triple::new(0, 4, 0));
    }

    #[test]
    fn single_quotes_are_preserved() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_with(&tmp, "version = '1.0.0'\n");
        manifest.write_version_triple(2, 0, 0).unwrap();
        assert_eq!(
            fs::read_to_string(manifest.path()).unwrap(),
            "version = '2.0.0'\n"
        );
    }

    #[test]
    fn missing_file() {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("nope.toml")).unwrap();
        let manifest = RegexManifest::new(path).unwrap();
        assert!(matches!(
            manifest.read_version_triple(),
            Err(ManifestError::NotFound(_))
        ));
    }

    #[test]
    fn missing_version() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_with(&tmp, "[package]\nname = \"widget\"\n");
        assert!(matches!(
            manifest.read_version_triple(),
            Err(ManifestError::MissingVersion(_))
        ));
        assert!(matches!(
            manifest.write_version_triple(1, 0, 0),
            Err(ManifestError::MissingVersion(_))
        ));
    }

    #[test]
    fn invalid_version() {
        let tmp = TempDir::new().unwrap();
        let manifest = manifest_with(&tmp, "version = \"banana\"\n");
        assert!(matches!(
            manifest.read_version_triple(),
            Err(ManifestError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn custom_pattern() {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().join("package.json")).unwrap();
        fs::write(&path, "{\n  \"name\": \"w\",\n  \"version\": \"2.1.0\"\n}\n").unwrap();

        let manifest =
            RegexManifest::with_pattern(&path, r#"("version":\s*")([^"]+)(")"#).unwrap();
        assert_eq!(manifest.read_version_triple().unwrap(), Triple::new(2, 1, 0));
        manifest.write_version_triple(2, 2, 0).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains(r#""version": "2.2.0""#));
    }

    #[test]
    fn pattern_needs_three_groups() {
        assert!(matches!(
            RegexManifest::with_pattern("Cargo.toml", r#"version = "([^"]+)""#),
            Err(ManifestError::Pattern(_))
        ));
        assert!(matches!(
            RegexManifest::with_pattern("Cargo.toml", "(unclosed"),
            Err(ManifestError::Pattern(_))
        ));
    }
}
