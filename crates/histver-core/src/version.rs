//! Version state: a committed triple plus a staged (pending) triple.
//!
//! Bump operations only touch the pending triple, which is kept signed so
//! retractions and bumps net out in any order. [`Version::commit`] clamps the
//! net result at zero, folds it into the committed triple, and only stamps
//! the version when the number actually changed. A batch of additions and
//! removals that cancels out therefore leaves the version untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Errors from version parsing.
#[derive(Error, Debug)]
pub enum VersionError {
    /// The literal is not a `M.m.p` semver string.
    #[error("invalid version '{literal}': {source}")]
    InvalidLiteral {
        /// The rejected input.
        literal: String,
        /// Parser error.
        source: semver::Error,
    },

    /// Pre-release or build metadata is not tracked.
    #[error("version '{0}' carries pre-release or build metadata")]
    Unsupported(String),
}

/// Result alias for version operations.
pub type VersionResult<T> = Result<T, VersionError>;

/// A plain `major.minor.patch` triple.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Triple {
    /// Major component.
    pub major: u64,
    /// Minor component.
    pub minor: u64,
    /// Patch component.
    pub patch: u64,
}

impl Triple {
    /// Build a triple.
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Staged components; may dip below zero until [`Version::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Staged {
    major: i64,
    minor: i64,
    patch: i64,
}

impl Staged {
    const fn of(triple: Triple) -> Self {
        Self {
            major: saturating_signed(triple.major),
            minor: saturating_signed(triple.minor),
            patch: saturating_signed(triple.patch),
        }
    }

    const fn underflows(&self) -> bool {
        self.major < 0 || self.minor < 0 || self.patch < 0
    }

    fn clamped(&self) -> Triple {
        let floor = |n: i64| u64::try_from(n).unwrap_or(0);
        Triple::new(floor(self.major), floor(self.minor), floor(self.patch))
    }
}

const fn saturating_signed(n: u64) -> i64 {
    if n > i64::MAX as u64 { i64::MAX } else { n as i64 }
}

/// A version number with a staged delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredVersion", into = "StoredVersion")]
pub struct Version {
    current: Triple,
    pending: Staged,
    is_major_bump: bool,
    timestamp: Option<DateTime<Utc>>,
}

/// On-disk shape: the pending triple is never persisted.
#[derive(Serialize, Deserialize)]
struct StoredVersion {
    major: u64,
    minor: u64,
    patch: u64,
    #[serde(default)]
    is_major_bump: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<DateTime<Utc>>,
}

impl From<StoredVersion> for Version {
    fn from(stored: StoredVersion) -> Self {
        let triple = Triple::new(stored.major, stored.minor, stored.patch);
        Self {
            current: triple,
            pending: Staged::of(triple),
            is_major_bump: stored.is_major_bump,
            timestamp: stored.timestamp,
        }
    }
}

impl From<Version> for StoredVersion {
    fn from(version: Version) -> Self {
        Self {
            major: version.current.major,
            minor: version.current.minor,
            patch: version.current.patch,
            is_major_bump: version.is_major_bump,
            timestamp: version.timestamp,
        }
    }
}

impl Version {
    /// Create a version from its three components.
    pub const fn from_parts(major: u64, minor: u64, patch: u64) -> Self {
        let triple = Triple::new(major, minor, patch);
        Self {
            current: triple,
            pending: Staged::of(triple),
            is_major_bump: false,
            timestamp: None,
        }
    }

    /// Parse a `M.m.p` literal.
    pub fn from_literal(literal: &str) -> VersionResult<Self> {
        let parsed =
            semver::Version::parse(literal.trim()).map_err(|source| VersionError::InvalidLiteral {
                literal: literal.to_string(),
                source,
            })?;
        if !parsed.pre.is_empty() || !parsed.build.is_empty() {
            return Err(VersionError::Unsupported(literal.to_string()));
        }
        Ok(Self::from_parts(parsed.major, parsed.minor, parsed.patch))
    }

    /// Independent copy of another version's recorded state.
    ///
    /// The copy's pending triple starts equal to the committed one, so staged
    /// changes on either side never leak into the other.
    pub fn copy_of(other: &Self) -> Self {
        Self {
            current: other.current,
            pending: Staged::of(other.current),
            is_major_bump: other.is_major_bump,
            timestamp: other.timestamp,
        }
    }

    /// Committed major component.
    pub const fn major(&self) -> u64 {
        self.current.major
    }

    /// Committed minor component.
    pub const fn minor(&self) -> u64 {
        self.current.minor
    }

    /// Committed patch component.
    pub const fn patch(&self) -> u64 {
        self.current.patch
    }

    /// The committed triple.
    pub const fn triple(&self) -> Triple {
        self.current
    }

    /// The staged triple, floored at zero.
    pub fn pending(&self) -> Triple {
        self.pending.clamped()
    }

    /// Whether the last effective commit increased the major component.
    pub const fn is_major_bump(&self) -> bool {
        self.is_major_bump
    }

    /// When the last effective commit happened.
    pub const fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Stage a minor bump: minor + 1, patch reset.
    pub const fn increase_minor(&mut self) {
        self.pending.minor += 1;
        self.pending.patch = 0;
    }

    /// Stage a major bump: major + 1, minor and patch reset.
    pub const fn increase_major(&mut self) {
        self.pending.major += 1;
        self.pending.minor = 0;
        self.pending.patch = 0;
    }

    /// Stage a patch bump.
    pub const fn increase_patch(&mut self) {
        self.pending.patch += 1;
    }

    /// Retract one minor bump.
    ///
    /// The staged minor may go negative; [`Version::commit`] floors it.
    pub const fn decrease_minor(&mut self) {
        self.pending.minor -= 1;
    }

    /// Retract one patch bump. Floored at commit, like [`Version::decrease_minor`].
    pub const fn decrease_patch(&mut self) {
        self.pending.patch -= 1;
    }

    /// Whether the staged triple differs from the committed one.
    pub fn has_pending_changes(&self) -> bool {
        self.pending.clamped() != self.current
    }

    /// Fold the staged triple into the committed one.
    ///
    /// Components that went negative are clamped to zero here, once, on the
    /// net result. Returns `false`, leaving the timestamp and major flag
    /// alone, when nothing changed.
    pub fn commit(&mut self) -> bool {
        if self.pending.underflows() {
            warn!(
                major = self.pending.major,
                minor = self.pending.minor,
                patch = self.pending.patch,
                "retractions exceed recorded bumps, clamped at zero"
            );
        }
        let target = self.pending.clamped();
        self.pending = Staged::of(target);
        if target == self.current {
            return false;
        }
        self.is_major_bump = self.current.major < target.major;
        self.current = target;
        self.timestamp = Some(Utc::now());
        true
    }

    /// `M.m.p` rendering of the committed triple.
    pub fn to_literal(&self) -> String {
        self.current.to_string()
    }

    /// `YYYY-MM-DD` of the last effective commit.
    pub fn date_string(&self) -> Option<String> {
        self.timestamp.map(|ts| ts.format("%Y-%m-%d").to_string())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.current.fmt(f)
    }
}

impl From<&Version> for semver::Version {
    fn from(version: &Version) -> Self {
        Self::new(version.major(), version.minor(), version.patch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_round_trip() {
        assert_eq!(Version::from_literal("2.1.4").unwrap().to_literal(), "2.1.4");
    }

    #[test]
    fn rejects_bad_literals() {
        assert!(matches!(
            Version::from_literal("1.2"),
            Err(VersionError::InvalidLiteral { .. })
        ));
        assert!(matches!(
            Version::from_literal("1.2.3-rc.1"),
            Err(VersionError::Unsupported(_))
        ));
    }

    #[test]
    fn bumps_only_touch_pending() {
        let mut v = Version::from_parts(1, 2, 3);
        v.increase_minor();
        assert_eq!(v.to_literal(), "1.2.3");
        assert_eq!(v.pending(), Triple::new(1, 3, 0));
        assert!(v.has_pending_changes());
    }

    #[test]
    fn major_resets_lower_components() {
        let mut v = Version::from_parts(1, 2, 3);
        v.increase_major();
        assert!(v.commit());
        assert_eq!(v.to_literal(), "2.0.0");
        assert!(v.is_major_bump());
    }

    #[test]
    fn decrease_undoes_increase() {
        let mut v = Version::from_parts(0, 4, 0);
        v.increase_patch();
        v.decrease_patch();
        v.increase_minor();
        v.decrease_minor();
        assert_eq!(v.pending(), Triple::new(0, 4, 0));
        assert!(!v.commit());
    }

    #[test]
    fn commit_clamps_net_underflow_at_zero() {
        let mut v = Version::from_parts(0, 1, 0);
        v.decrease_minor();
        v.decrease_minor();
        v.decrease_patch();
        assert_eq!(v.pending(), Triple::new(0, 0, 0));
        assert!(v.commit());
        assert_eq!(v.to_literal(), "0.0.0");
        assert!(!v.has_pending_changes());
    }

    #[test]
    fn retractions_net_against_later_bumps() {
        // Floored per step this would end at 0.0.2.
        let mut v = Version::from_parts(0, 0, 1);
        v.decrease_patch();
        v.decrease_patch();
        v.increase_patch();
        v.increase_patch();
        assert!(!v.commit());
        assert_eq!(v.to_literal(), "0.0.1");
    }

    #[test]
    fn noop_commit_leaves_stamp_alone() {
        let mut v = Version::from_parts(0, 1, 0);
        assert!(!v.commit());
        assert!(v.timestamp().is_none());
        assert!(v.date_string().is_none());
        assert!(!v.is_major_bump());
    }

    #[test]
    fn effective_commit_stamps_date() {
        let mut v = Version::from_parts(0, 1, 0);
        v.increase_patch();
        assert!(v.commit());
        assert_eq!(v.to_literal(), "0.1.1");
        assert!(!v.is_major_bump());
        let date = v.date_string().unwrap();
        assert_eq!(date.len(), 10);
        assert_eq!(&date[4..5], "-");
    }

    #[test]
    fn copy_does_not_share_staged_state() {
        let mut original = Version::from_parts(0, 1, 0);
        original.increase_patch();
        let mut copy = Version::copy_of(&original);
        assert_eq!(copy.pending(), Triple::new(0, 1, 0));

        copy.increase_minor();
        assert_eq!(original.pending(), Triple::new(0, 1, 1));
    }

    #[test]
    fn serialization_drops_pending() {
        let mut v = Version::from_parts(1, 0, 0);
        v.increase_patch();
        let json = serde_json::to_string(&v).unwrap();
        let back: Version = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pending(), Triple::new(1, 0, 0));
        assert!(!back.has_pending_changes());
    }

    #[test]
    fn converts_to_semver() {
        let v = Version::from_parts(3, 2, 1);
        assert_eq!(semver::Version::from(&v), semver::Version::new(3, 2, 1));
    }
}
