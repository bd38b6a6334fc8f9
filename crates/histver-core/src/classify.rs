//! Commit message classification.
//!
//! Maps the header token of a commit message (`feat:`, `fix(cli):`, ...) to a
//! [`ChangeCategory`]. Matching is case-sensitive against a fixed tag table;
//! anything unrecognised is [`ChangeCategory::None`].

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::Version;

/// Semantic-change category derived from a commit message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeCategory {
    /// New functionality (`feat`).
    Feature,
    /// Bug fix (`fix`).
    Fix,
    /// Code restructuring (`refactor`).
    Refactor,
    /// Documentation (`docs`).
    Docs,
    /// Tests (`test`).
    Test,
    /// Formatting and style (`style`).
    Style,
    /// Maintenance (`chore`).
    Chore,
    /// Performance work (`perf`).
    Performance,
    /// Explicit release (`release`).
    Release,
    /// Commits created by histver itself (`versioning`).
    Versioning,
    /// No recognised prefix.
    None,
}

/// Which component of the version a category moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BumpLevel {
    /// Patch release (x.y.Z).
    Patch,
    /// Minor release (x.Y.0).
    Minor,
}

impl fmt::Display for BumpLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => write!(f, "patch"),
            Self::Minor => write!(f, "minor"),
        }
    }
}

/// Tag table, checked in order. No tag is a prefix of another.
const TAGS: &[(&str, ChangeCategory)] = &[
    ("feat", ChangeCategory::Feature),
    ("fix", ChangeCategory::Fix),
    ("refactor", ChangeCategory::Refactor),
    ("docs", ChangeCategory::Docs),
    ("test", ChangeCategory::Test),
    ("style", ChangeCategory::Style),
    ("chore", ChangeCategory::Chore),
    ("perf", ChangeCategory::Performance),
    ("release", ChangeCategory::Release),
    ("versioning", ChangeCategory::Versioning),
];

static EMBEDDED_VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\.\d+\.\d+").expect("embedded version regex is valid"));

impl ChangeCategory {
    /// The commit-message tag for this category, or `None` for [`ChangeCategory::None`].
    pub fn tag(self) -> Option<&'static str> {
        TAGS.iter()
            .find(|(_, category)| *category == self)
            .map(|(tag, _)| *tag)
    }

    /// The version bump an added commit of this category implies.
    pub const fn bump(self) -> Option<BumpLevel> {
        match self {
            Self::Feature => Some(BumpLevel::Minor),
            Self::Fix
            | Self::Refactor
            | Self::Docs
            | Self::Test
            | Self::Style
            | Self::Chore
            | Self::Performance => Some(BumpLevel::Patch),
            Self::Release | Self::Versioning | Self::None => None,
        }
    }
}

impl fmt::Display for ChangeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().unwrap_or("none"))
    }
}

/// Classify a commit message.
///
/// The header token is everything before the first `:`. A conventional
/// `(scope)` and a trailing `!` are accepted on the token, so `feat(cli)!: x`
/// is a [`ChangeCategory::Feature`]. Messages without a colon are unclassified.
pub fn classify(message: &str) -> ChangeCategory {
    let Some((header, _)) = message.split_once(':') else {
        return ChangeCategory::None;
    };

    let header = header.strip_suffix('!').unwrap_or(header);
    let token = match header.split_once('(') {
        Some((token, scope)) if scope.ends_with(')') => token,
        Some(_) => return ChangeCategory::None,
        None => header,
    };

    TAGS.iter()
        .find(|(tag, _)| *tag == token)
        .map_or(ChangeCategory::None, |(_, category)| *category)
}

/// Whether the message is a histver versioning commit.
pub fn is_versioning_marker(message: &str) -> bool {
    classify(message) == ChangeCategory::Versioning
}

/// Whether the message marks an explicit release.
pub fn is_release_marker(message: &str) -> bool {
    classify(message) == ChangeCategory::Release
}

/// Find the first `M.m.p` substring in a message and parse it.
///
/// Returns `None` when nothing matches or the match does not parse.
pub fn extract_embedded_version(message: &str) -> Option<Version> {
    let found = EMBEDDED_VERSION.find(message)?;
    Version::from_literal(found.as_str()).ok()
}

/// Message for the commit that records a new version.
pub fn versioning_message(version: &str) -> String {
    format!("versioning: Set version to {version}")
}

/// Message for the commit that bootstraps the ledger.
pub fn initial_message(version: &str) -> String {
    format!("versioning: Init histver with version {version}")
}
