//! Core library for histver.
//!
//! histver derives a project's semantic version from its commit history. A
//! ledger records which commits have already been folded into the version;
//! each reconciliation cycle diffs live history against it, so rebased or
//! amended commits are retracted as well as new ones applied.
//!
//! # Modules
//!
//! - [`classify`] - Commit message classification
//! - [`version`] - Version state with staged bumps
//! - [`ledger`] - The persisted history record
//! - [`engine`] - Reconciliation cycles
//! - [`git`] - Git history access and versioning commits
//! - [`manifest`] - Version string substitution in project files
//! - [`changelog`] - Changelog rendering
//! - [`project`] - Wiring of the above for one project directory
//! - [`config`] - Configuration loading and management
//! - [`error`] - Configuration error types
//!
//! # Quick Start
//!
//! ```no_run
//! use histver_core::{ConfigLoader, Project};
//!
//! let config = ConfigLoader::new().load().expect("Failed to load configuration");
//! let project = Project::open(".", &config).expect("Invalid manifest pattern");
//! let outcome = project.reconciler().update().expect("Reconciliation failed");
//! println!("{} -> {}", outcome.previous_version, outcome.version);
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod classify;

pub mod config;

pub mod engine;

pub mod error;

pub mod git;

pub mod ledger;

pub mod manifest;

pub mod project;

pub mod version;

pub use config::{Config, ConfigLoader, LogLevel};

pub use engine::{ReconcileError, ReconcileOutcome, Reconciler};

pub use error::{ConfigError, ConfigResult};

pub use project::Project;

pub use version::Version;

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;
