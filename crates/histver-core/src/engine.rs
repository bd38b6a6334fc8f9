//! History reconciliation.
//!
//! One cycle diffs the live commit list against the ledger, replays the
//! difference onto the last recorded version (removals first, then
//! additions), and writes the result out: manifest, ledger, changelog,
//! versioning commit, in that order.
//!
//! The version is always recomputed from the ledger. If a cycle dies after
//! the manifest write but before the ledger save, the next cycle sees the same
//! diff, computes the same version and rewrites the manifest.
//!
//! Planning is separate from execution so callers can preview a cycle:
//!
//! ```no_run
//! # use histver_core::engine::Reconciler;
//! # fn demo(reconciler: &Reconciler<'_>) -> Result<(), histver_core::engine::ReconcileError> {
//! let plan = reconciler.plan_update()?;
//! println!("{} -> {}", plan.previous, plan.version);
//! if plan.has_changes() {
//!     reconciler.execute(plan)?;
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::changelog::{ChangelogError, ChangelogWriter};
use crate::classify::{
    BumpLevel, ChangeCategory, classify, extract_embedded_version, is_release_marker,
    is_versioning_marker,
};
use crate::git::{GitError, Repository};
use crate::ledger::{Commit, Ledger, LedgerError, LedgerStore};
use crate::manifest::{ManifestError, VersionManifest};
use crate::version::Version;

/// Errors that abort a reconciliation cycle.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// No ledger yet.
    #[error("histver is not initialized; run `histver init` first")]
    NotInitialized,

    /// `init` ran against an existing ledger.
    #[error("histver is already initialized")]
    AlreadyInitialized,

    /// The project is not under version control.
    #[error("this project has no git repository")]
    NoVersionControl,

    /// The ledger loaded but contradicts itself.
    #[error("ledger is corrupt: {0}")]
    CorruptLedger(String),

    /// Ledger storage failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Manifest access failed.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Changelog output failed.
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// A git operation failed.
    #[error(transparent)]
    Git(#[from] GitError),
}

/// Result alias for reconciliation.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Commits that appeared in or vanished from history since the last cycle.
///
/// Both lists are oldest first. Versioning commits never appear in either.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitDiff {
    /// Live commits the ledger does not know.
    pub added: Vec<Commit>,
    /// Ledger commits no longer in live history.
    pub removed: Vec<Commit>,
}

impl CommitDiff {
    /// Diff `live` (newest first, as git lists it) against the ledger.
    pub fn compute(live: &[Commit], ledger: &Ledger) -> Self {
        let recorded = ledger.commit_ids();
        let live_ids: HashSet<&str> = live.iter().map(|c| c.id.as_str()).collect();

        let added = live
            .iter()
            .rev()
            .filter(|c| !recorded.contains(c.id.as_str()))
            .filter(|c| !is_versioning_marker(&c.message))
            .cloned()
            .collect();
        let mut removed: Vec<Commit> = ledger
            .commits()
            .filter(|c| !live_ids.contains(c.id.as_str()))
            .filter(|c| !is_versioning_marker(&c.message))
            .cloned()
            .collect();
        removed.reverse();

        Self { added, removed }
    }

    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Retractions still owed, per bump level.
#[derive(Debug, Default)]
struct Retractions {
    minor: usize,
    patch: usize,
}

impl Retractions {
    fn of<'c>(commits: impl IntoIterator<Item = &'c Commit>) -> Self {
        let mut owed = Self::default();
        for commit in commits {
            match classify(&commit.message).bump() {
                Some(BumpLevel::Minor) => owed.minor += 1,
                Some(BumpLevel::Patch) => owed.patch += 1,
                None => {}
            }
        }
        owed
    }

    /// Settle one addition of `level` against an owed retraction.
    const fn settle(&mut self, level: BumpLevel) -> bool {
        let owed = match level {
            BumpLevel::Minor => &mut self.minor,
            BumpLevel::Patch => &mut self.patch,
        };
        if *owed == 0 {
            return false;
        }
        *owed -= 1;
        true
    }
}

/// Replay a diff onto `baseline`, returning the working version with the
/// result staged but not yet committed.
///
/// A removed release or versioning commit re-baselines: removals before it
/// no longer count. Each addition that classifies at the same bump level as
/// a remaining removal cancels against it, so a rewritten commit leaves the
/// version alone. What is left is retracted first, then applied.
pub fn apply_diff(baseline: &Version, diff: &CommitDiff) -> Version {
    let rebase_at = diff
        .removed
        .iter()
        .rposition(|c| is_release_marker(&c.message) || is_versioning_marker(&c.message));
    let removed = match rebase_at {
        Some(at) => {
            debug!(id = diff.removed[at].short_id(), "re-baselining after removal");
            &diff.removed[at + 1..]
        }
        None => &diff.removed[..],
    };

    let mut owed = Retractions::of(removed);
    let mut bumps = Vec::new();
    for commit in &diff.added {
        match classify(&commit.message).bump() {
            Some(level) if owed.settle(level) => {
                debug!(id = commit.short_id(), ?level, "addition cancels a removal");
            }
            Some(level) => bumps.push(level),
            None => {}
        }
    }

    let mut working = Version::copy_of(baseline);
    for _ in 0..owed.minor {
        working.decrease_minor();
    }
    for _ in 0..owed.patch {
        working.decrease_patch();
    }
    for level in bumps {
        match level {
            BumpLevel::Minor => working.increase_minor(),
            BumpLevel::Patch => working.increase_patch(),
        }
    }
    working
}

/// What kind of cycle a plan describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleKind {
    /// Commit-driven reconciliation.
    Update,
    /// Manual major release.
    Release,
}

/// A computed but not yet persisted cycle.
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    /// Update or release.
    pub kind: CycleKind,
    /// The version the cycle started from.
    pub previous: Version,
    /// The version after the cycle.
    pub version: Version,
    /// The commit difference (empty for releases).
    pub diff: CommitDiff,
    /// The ledger to persist.
    pub ledger: Ledger,
    /// Whether the version number moved.
    pub version_changed: bool,
}

impl ReconcilePlan {
    /// Whether executing the plan would write anything.
    pub fn has_changes(&self) -> bool {
        self.version_changed || !self.diff.is_empty()
    }

    /// Describe the plan without executing it.
    pub fn preview(&self) -> ReconcileOutcome {
        ReconcileOutcome::from_plan(self, true)
    }
}

/// A commit as reported in an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    /// Abbreviated hash.
    pub id: String,
    /// Subject line.
    pub message: String,
    /// Classified category.
    pub category: ChangeCategory,
}

impl From<&Commit> for CommitSummary {
    fn from(commit: &Commit) -> Self {
        Self {
            id: commit.short_id().to_string(),
            message: commit.message.clone(),
            category: classify(&commit.message),
        }
    }
}

/// Result of a cycle, suitable for `--json` output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    /// Update or release.
    pub kind: CycleKind,
    /// Version before the cycle.
    pub previous_version: String,
    /// Version after the cycle.
    pub version: String,
    /// Whether the version number moved.
    pub version_changed: bool,
    /// Whether the release was breaking.
    pub breaking: bool,
    /// Commits folded in.
    pub added: Vec<CommitSummary>,
    /// Commits retracted.
    pub removed: Vec<CommitSummary>,
    /// Whether nothing was written because this was a preview.
    pub dry_run: bool,
    /// Whether the manifest was rewritten.
    pub manifest_written: bool,
    /// Whether the ledger was saved.
    pub ledger_saved: bool,
    /// Whether the changelog was regenerated.
    pub changelog_written: bool,
    /// Whether a versioning commit was created.
    pub committed: bool,
}

impl ReconcileOutcome {
    fn from_plan(plan: &ReconcilePlan, dry_run: bool) -> Self {
        Self {
            kind: plan.kind,
            previous_version: plan.previous.to_literal(),
            version: plan.version.to_literal(),
            version_changed: plan.version_changed,
            breaking: plan.version_changed && plan.version.is_major_bump(),
            added: plan.diff.added.iter().map(CommitSummary::from).collect(),
            removed: plan.diff.removed.iter().map(CommitSummary::from).collect(),
            dry_run,
            manifest_written: false,
            ledger_saved: false,
            changelog_written: false,
            committed: false,
        }
    }
}

/// Result of bootstrapping a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitOutcome {
    /// Version taken from the manifest.
    pub version: String,
    /// Commit references recorded.
    pub commits: usize,
    /// Version markers recovered from existing versioning commits.
    pub markers: usize,
    /// Versioning commits whose message carried no usable version.
    pub skipped_markers: Vec<String>,
    /// Whether the initial commit was created.
    pub committed: bool,
}

/// Behavior switches for a [`Reconciler`].
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Create versioning commits.
    pub commit: bool,
    /// Branch to read; `None` means the active branch.
    pub branch: Option<String>,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            commit: true,
            branch: None,
        }
    }
}

/// Drives reconciliation cycles against injected collaborators.
pub struct Reconciler<'a> {
    store: &'a dyn LedgerStore,
    manifest: &'a dyn VersionManifest,
    repo: &'a dyn Repository,
    changelog: Option<&'a dyn ChangelogWriter>,
    options: ReconcileOptions,
}

impl<'a> Reconciler<'a> {
    /// Reconciler without a changelog writer and with default options.
    pub fn new(
        store: &'a dyn LedgerStore,
        manifest: &'a dyn VersionManifest,
        repo: &'a dyn Repository,
    ) -> Self {
        Self {
            store,
            manifest,
            repo,
            changelog: None,
            options: ReconcileOptions::default(),
        }
    }

    /// Regenerate a changelog on every effective cycle.
    pub fn with_changelog(mut self, changelog: &'a dyn ChangelogWriter) -> Self {
        self.changelog = Some(changelog);
        self
    }

    /// Replace the options.
    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    /// Toggle versioning commits.
    pub const fn with_commit(mut self, commit: bool) -> Self {
        self.options.commit = commit;
        self
    }

    /// Compute a commit-driven cycle.
    #[instrument(name = "plan_update", skip_all)]
    pub fn plan_update(&self) -> ReconcileResult<ReconcilePlan> {
        let ledger = self.load_ledger()?;
        let previous = self.baseline(&ledger)?;

        if !self.repo.has_vcs_support() {
            return Err(ReconcileError::NoVersionControl);
        }
        let branch = self.branch()?;
        let live = self.repo.list_commits(&branch)?;
        let diff = CommitDiff::compute(&live, &ledger);
        debug!(
            %branch,
            live = live.len(),
            added = diff.added.len(),
            removed = diff.removed.len(),
            "history diffed"
        );

        let mut version = apply_diff(&previous, &diff);
        let version_changed = version.commit();

        let mut next = ledger;
        for commit in &diff.removed {
            next.remove_commit(&commit.id);
        }
        for commit in &diff.added {
            next.insert_commit(commit.clone());
        }
        if version_changed {
            next.insert_version(version.clone());
        }

        Ok(ReconcilePlan {
            kind: CycleKind::Update,
            previous,
            version,
            diff,
            ledger: next,
            version_changed,
        })
    }

    /// Compute a manual major release.
    #[instrument(name = "plan_release", skip_all)]
    pub fn plan_release(&self) -> ReconcileResult<ReconcilePlan> {
        let mut ledger = self.load_ledger()?;
        let previous = self.baseline(&ledger)?;

        let mut version = Version::copy_of(&previous);
        version.increase_major();
        let version_changed = version.commit();
        ledger.insert_version(version.clone());

        Ok(ReconcilePlan {
            kind: CycleKind::Release,
            previous,
            version,
            diff: CommitDiff::default(),
            ledger,
            version_changed,
        })
    }

    /// Persist a plan: manifest, ledger, changelog, commit.
    #[instrument(name = "execute", skip_all, fields(kind = ?plan.kind, version = %plan.version))]
    pub fn execute(&self, plan: ReconcilePlan) -> ReconcileResult<ReconcileOutcome> {
        let mut outcome = ReconcileOutcome::from_plan(&plan, false);
        if !plan.has_changes() {
            debug!("nothing to reconcile");
            return Ok(outcome);
        }

        let triple = plan.version.triple();
        if plan.version_changed {
            self.manifest
                .write_version_triple(triple.major, triple.minor, triple.patch)?;
            outcome.manifest_written = true;
        }

        self.store.save(&plan.ledger)?;
        outcome.ledger_saved = true;

        if let Some(changelog) = self.changelog {
            changelog.render(&plan.ledger)?;
            outcome.changelog_written = true;
        }

        if self.options.commit {
            outcome.committed = self.repo.add_versioning_commit(&outcome.version)?;
        }

        info!(
            previous = %outcome.previous_version,
            version = %outcome.version,
            changed = outcome.version_changed,
            committed = outcome.committed,
            "version reconciled"
        );
        Ok(outcome)
    }

    /// Plan and execute a commit-driven cycle.
    pub fn update(&self) -> ReconcileResult<ReconcileOutcome> {
        let plan = self.plan_update()?;
        self.execute(plan)
    }

    /// Plan and execute a manual major release.
    pub fn release(&self) -> ReconcileResult<ReconcileOutcome> {
        let plan = self.plan_release()?;
        self.execute(plan)
    }

    /// Bootstrap a ledger from the full commit history.
    #[instrument(name = "init", skip_all)]
    pub fn init(&self) -> ReconcileResult<InitOutcome> {
        if !self.repo.has_vcs_support() {
            return Err(ReconcileError::NoVersionControl);
        }
        if self.store.is_initialized() {
            return Err(ReconcileError::AlreadyInitialized);
        }

        let branch = self.branch()?;
        let live = self.repo.list_commits(&branch)?;

        let mut ledger = Ledger::new();
        let mut commits = 0;
        let mut markers = 0;
        let mut skipped_markers = Vec::new();
        for commit in live.iter().rev() {
            if !is_versioning_marker(&commit.message) {
                ledger.insert_commit(commit.clone());
                commits += 1;
                continue;
            }
            match extract_embedded_version(&commit.message) {
                Some(version) => {
                    ledger.insert_version(version);
                    markers += 1;
                }
                None => {
                    warn!(
                        id = commit.short_id(),
                        message = %commit.message,
                        "versioning commit carries no version, skipped"
                    );
                    skipped_markers.push(commit.id.clone());
                }
            }
        }

        let triple = self.manifest.read_version_triple()?;
        let initial = Version::from_parts(triple.major, triple.minor, triple.patch);
        ledger.insert_version(initial.clone());
        self.store.save(&ledger)?;

        let version = initial.to_literal();
        let committed = if self.options.commit {
            self.repo.add_initial_commit(&version)?
        } else {
            false
        };

        info!(%version, commits, markers, skipped = skipped_markers.len(), "ledger initialized");
        Ok(InitOutcome {
            version,
            commits,
            markers,
            skipped_markers,
            committed,
        })
    }

    fn load_ledger(&self) -> ReconcileResult<Ledger> {
        let ledger = match self.store.load() {
            Ok(ledger) => ledger,
            Err(LedgerError::NotInitialized { .. }) => return Err(ReconcileError::NotInitialized),
            Err(e) => return Err(e.into()),
        };

        let mut seen = HashSet::new();
        if let Some(dup) = ledger.commits().find(|c| !seen.insert(c.id.as_str())) {
            return Err(ReconcileError::CorruptLedger(format!(
                "commit {} is recorded twice",
                dup.id
            )));
        }
        Ok(ledger)
    }

    /// The newest recorded version, or the manifest's when none is recorded.
    fn baseline(&self, ledger: &Ledger) -> ReconcileResult<Version> {
        if let Some(version) = ledger.last_version() {
            return Ok(Version::copy_of(version));
        }
        debug!("ledger has no version marker, reading manifest");
        let triple = self.manifest.read_version_triple()?;
        Ok(Version::from_parts(triple.major, triple.minor, triple.patch))
    }

    fn branch(&self) -> ReconcileResult<String> {
        match &self.options.branch {
            Some(branch) => Ok(branch.clone()),
            None => Ok(self.repo.active_branch()?),
        }
    }
}
