//! Configuration loading and discovery.
//!
//! Sources are merged with figment, lowest precedence first:
//! 1. Built-in defaults
//! 2. `~/.config/histver/config.<ext>` (user config)
//! 3. `.histver.<ext>` or `histver.<ext>` in the current directory or a parent,
//!    stopping at the repository root (`.git`)
//! 4. Files passed explicitly, e.g. `--config`
//!
//! Where `<ext>` is one of: `toml`, `yaml`, `yml`, `json`
//!
//! # Example
//! ```no_run
//! use camino::Utf8PathBuf;
//! use histver_core::config::ConfigLoader;
//!
//! let cwd = std::env::current_dir().unwrap();
//! let cwd = Utf8PathBuf::try_from(cwd).expect("current directory is not valid UTF-8");
//! let config = ConfigLoader::new()
//!     .with_project_search(&cwd)
//!     .load()
//!     .unwrap();
//! assert!(config.git.commit);
//! ```
//!
//! A typical project file:
//!
//! ```toml
//! [manifest]
//! path = "pyproject.toml"
//!
//! [changelog]
//! repository_url = "https://github.com/acme/widget"
//!
//! [git]
//! branch = "main"
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use figment::Figment;
use figment::providers::{Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// The configuration for histver.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Log level for the application (e.g., "debug", "info", "warn", "error").
    pub log_level: LogLevel,
    /// Directory for JSONL log files (falls back to platform defaults if unset).
    pub log_dir: Option<Utf8PathBuf>,
    /// Where the ledger lives.
    pub ledger: LedgerConfig,
    /// Which file carries the version string.
    pub manifest: ManifestConfig,
    /// Changelog output.
    pub changelog: ChangelogConfig,
    /// Version-control behavior.
    pub git: GitConfig,
}

/// Ledger location.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Path of the ledger file, relative to the project root.
    pub path: Utf8PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            path: Utf8PathBuf::from(DEFAULT_LEDGER_FILE),
        }
    }
}

/// Manifest substitution settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManifestConfig {
    /// Path of the manifest, relative to the project root.
    pub path: Utf8PathBuf,
    /// Regex with exactly three capture groups: prefix, version, suffix.
    ///
    /// When unset, the first `version = "x.y.z"` line is used.
    pub pattern: Option<String>,
}

impl Default for ManifestConfig {
    fn default() -> Self {
        Self {
            path: Utf8PathBuf::from(DEFAULT_MANIFEST_FILE),
            pattern: None,
        }
    }
}

/// Changelog settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChangelogConfig {
    /// Whether to regenerate the changelog at all (default: `true`).
    pub enabled: bool,
    /// Path of the changelog, relative to the project root.
    pub path: Utf8PathBuf,
    /// Repository URL linked from the changelog header.
    pub repository_url: Option<String>,
}

impl Default for ChangelogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Utf8PathBuf::from(DEFAULT_CHANGELOG_FILE),
            repository_url: None,
        }
    }
}

/// Version-control settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GitConfig {
    /// Branch whose history is reconciled (default: the checked-out branch).
    pub branch: Option<String>,
    /// Whether to record each new version as a commit (default: `true`).
    pub commit: bool,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            branch: None,
            commit: true,
        }
    }
}

/// Log level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Verbose output for debugging and development.
    Debug,
    /// Standard operational information (default).
    #[default]
    Info,
    /// Warnings about potential issues.
    Warn,
    /// Errors that indicate failures.
    Error,
}

impl LogLevel {
    /// Returns the log level as a lowercase string slice.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl Config {
    /// Reject values that deserialize fine but cannot be used.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.ledger.path.as_str().trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "ledger.path",
                reason: "must not be empty".into(),
            });
        }
        if self.manifest.path.as_str().trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "manifest.path",
                reason: "must not be empty".into(),
            });
        }
        if self.changelog.enabled && self.changelog.path.as_str().trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "changelog.path",
                reason: "must not be empty while the changelog is enabled".into(),
            });
        }
        if let Some(branch) = &self.git.branch
            && branch.trim().is_empty()
        {
            return Err(ConfigError::InvalidValue {
                key: "git.branch",
                reason: "must name a branch; remove the key to use the current one".into(),
            });
        }
        Ok(())
    }
}

/// Default ledger file name.
pub const DEFAULT_LEDGER_FILE: &str = ".histver-ledger.json";

/// Default manifest file name.
pub const DEFAULT_MANIFEST_FILE: &str = "Cargo.toml";

/// Default changelog file name.
pub const DEFAULT_CHANGELOG_FILE: &str = "CHANGELOG.md";

/// Supported configuration file extensions (in order of preference).
const CONFIG_EXTENSIONS: &[&str] = &["toml", "yaml", "yml", "json"];

/// Application name for XDG directory lookup and config file names.
const APP_NAME: &str = "histver";

/// Entry marking a repository root; discovery does not walk past it.
const REPOSITORY_MARKER: &str = ".git";

/// Builder for loading configuration from multiple sources.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Starting directory for project config search.
    project_search_root: Option<Utf8PathBuf>,
    /// Whether to include user config from XDG directory.
    include_user_config: bool,
    /// Explicit config files to load (for testing or programmatic use).
    explicit_files: Vec<Utf8PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default settings.
    pub fn new() -> Self {
        Self {
            project_search_root: None,
            include_user_config: true,
            explicit_files: Vec::new(),
        }
    }

    /// Set the starting directory for project config search.
    pub fn with_project_search<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.project_search_root = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set whether to include user config from `~/.config/histver/`.
    pub const fn with_user_config(mut self, include: bool) -> Self {
        self.include_user_config = include;
        self
    }

    /// Add an explicit config file to load.
    ///
    /// Files are loaded in order, with later files taking precedence.
    /// Explicit files are loaded after discovered files.
    pub fn with_file<P: AsRef<Utf8Path>>(mut self, path: P) -> Self {
        self.explicit_files.push(path.as_ref().to_path_buf());
        self
    }

    /// Load configuration, merging all discovered sources.
    #[tracing::instrument(skip(self), fields(search_root = ?self.project_search_root))]
    pub fn load(self) -> ConfigResult<Config> {
        tracing::debug!("loading configuration");
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if self.include_user_config
            && let Some(user_config) = self.find_user_config()
        {
            tracing::debug!(path = %user_config, "merging user config");
            figment = Self::merge_file(figment, &user_config);
        }

        if let Some(ref root) = self.project_search_root
            && let Some(project_config) = Self::find_project_config(root)
        {
            tracing::debug!(path = %project_config, "merging project config");
            figment = Self::merge_file(figment, &project_config);
        }

        for file in &self.explicit_files {
            figment = Self::merge_file(figment, file);
        }

        let config: Config = figment
            .extract()
            .map_err(|e| ConfigError::Deserialize(Box::new(e)))?;
        config.validate()?;
        tracing::info!(
            log_level = config.log_level.as_str(),
            ledger = %config.ledger.path,
            manifest = %config.manifest.path,
            "configuration loaded"
        );
        Ok(config)
    }

    fn find_project_config(start: &Utf8Path) -> Option<Utf8PathBuf> {
        let mut current = Some(start.to_path_buf());

        while let Some(dir) = current {
            let found = CONFIG_EXTENSIONS.iter().find_map(|ext| {
                [format!(".{APP_NAME}.{ext}"), format!("{APP_NAME}.{ext}")]
                    .into_iter()
                    .map(|name| dir.join(name))
                    .find(|path| path.is_file())
            });
            if found.is_some() {
                return found;
            }

            // The repository root is searched, its parents are not.
            if dir.join(REPOSITORY_MARKER).exists() {
                break;
            }
            current = dir.parent().map(Utf8Path::to_path_buf);
        }

        None
    }

    fn find_user_config(&self) -> Option<Utf8PathBuf> {
        let config_dir = user_config_dir()?;
        CONFIG_EXTENSIONS
            .iter()
            .map(|ext| config_dir.join(format!("config.{ext}")))
            .find(|path| path.is_file())
    }

    /// Merge a config file into the figment, detecting format from extension.
    fn merge_file(figment: Figment, path: &Utf8Path) -> Figment {
        match path.extension() {
            Some("yaml" | "yml") => figment.merge(Yaml::file_exact(path.as_str())),
            Some("json") => figment.merge(Json::file_exact(path.as_str())),
            _ => figment.merge(Toml::file_exact(path.as_str())),
        }
    }
}

/// The nearest directory at or above `start` that holds a `.git` entry.
pub fn find_repository_root(start: &Utf8Path) -> Option<Utf8PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(REPOSITORY_MARKER).exists())
        .map(Utf8Path::to_path_buf)
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", APP_NAME)
}

/// Get the user config directory path.
///
/// Returns `~/.config/histver/` on Linux, `~/Library/Application Support/histver/`
/// on macOS, and equivalent on other platforms.
pub fn user_config_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.config_dir().to_path_buf()).ok()
}

/// Get the local data directory path (machine-specific, not synced).
///
/// Log files default to a `logs/` directory beneath it.
pub fn user_data_local_dir() -> Option<Utf8PathBuf> {
    let proj_dirs = project_dirs()?;
    Utf8PathBuf::from_path_buf(proj_dirs.data_local_dir().to_path_buf()).ok()
}
