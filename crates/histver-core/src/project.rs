//! Concrete wiring for one project directory.
//!
//! [`Project`] owns the file-backed collaborators described by a [`Config`]
//! and hands out [`Reconciler`]s that borrow them.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::changelog::MarkdownChangelog;
use crate::config::Config;
use crate::engine::{ReconcileOptions, Reconciler};
use crate::git::GitCli;
use crate::ledger::FileLedgerStore;
use crate::manifest::{ManifestResult, RegexManifest};

/// A project root with its ledger, manifest, changelog and repository.
#[derive(Debug)]
pub struct Project {
    root: Utf8PathBuf,
    store: FileLedgerStore,
    manifest: RegexManifest,
    changelog: Option<MarkdownChangelog>,
    repo: GitCli,
    options: ReconcileOptions,
}

impl Project {
    /// Wire up the project at `root`.
    ///
    /// Relative paths in `config` are resolved against `root`. Fails only when
    /// the configured manifest pattern is unusable.
    pub fn open(root: impl Into<Utf8PathBuf>, config: &Config) -> ManifestResult<Self> {
        let root = root.into();

        let store = FileLedgerStore::new(root.join(&config.ledger.path));
        let manifest = match &config.manifest.pattern {
            Some(pattern) => {
                RegexManifest::with_pattern(root.join(&config.manifest.path), pattern)?
            }
            None => RegexManifest::new(root.join(&config.manifest.path))?,
        };

        let mut repo = GitCli::new(&root, &config.ledger.path).track(&config.manifest.path);
        let changelog = if config.changelog.enabled {
            repo = repo.track(&config.changelog.path);
            let writer = MarkdownChangelog::new(root.join(&config.changelog.path));
            Some(match &config.changelog.repository_url {
                Some(url) => writer.with_repository_url(url),
                None => writer,
            })
        } else {
            None
        };

        let options = ReconcileOptions {
            commit: config.git.commit,
            branch: config.git.branch.clone(),
        };

        debug!(
            %root,
            ledger = %store.path(),
            manifest = %manifest.path(),
            changelog = changelog.is_some(),
            "project opened"
        );
        Ok(Self {
            root,
            store,
            manifest,
            changelog,
            repo,
            options,
        })
    }

    /// Project root.
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Absolute ledger path.
    pub fn ledger_path(&self) -> &Utf8Path {
        self.store.path()
    }

    /// Absolute manifest path.
    pub fn manifest_path(&self) -> &Utf8Path {
        self.manifest.path()
    }

    /// Absolute changelog path, when the changelog is enabled.
    pub fn changelog_path(&self) -> Option<&Utf8Path> {
        self.changelog.as_ref().map(MarkdownChangelog::path)
    }

    /// A reconciler over this project's collaborators.
    pub fn reconciler(&self) -> Reconciler<'_> {
        let reconciler = Reconciler::new(&self.store, &self.manifest, &self.repo)
            .with_options(self.options.clone());
        match &self.changelog {
            Some(changelog) => reconciler.with_changelog(changelog),
            None => reconciler,
        }
    }
}
