//! Structured logging setup.
//!
//! stdout carries command output (including `--json` documents), so log
//! records only ever go to a JSONL file or, failing that, stderr.

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::OpenOptions;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const ENV_LOG_PATH: &str = "HISTVER_LOG_PATH";
const ENV_LOG_DIR: &str = "HISTVER_LOG_DIR";
const DEFAULT_LOG_DIR_UNIX: &str = "/var/log";
const LOG_FILE_SUFFIX: &str = ".jsonl";

/// Where and under which name log records are written.
#[derive(Clone, Debug)]
pub struct ObservabilityConfig {
    /// Service name; also the log file stem.
    pub service: String,
    /// Directory from the loaded configuration, if any.
    pub log_dir: Option<Utf8PathBuf>,
}

impl ObservabilityConfig {
    /// Config for this binary, with the configured log directory (if any).
    pub fn new(log_dir: Option<Utf8PathBuf>) -> Self {
        Self {
            service: env!("CARGO_PKG_NAME").to_string(),
            log_dir,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct LogTarget {
    dir: Utf8PathBuf,
    file_name: String,
}

/// Keeps the background log writer alive; drop it last.
pub struct ObservabilityGuard {
    _log_guard: WorkerGuard,
}

/// Install the global subscriber.
///
/// # Errors
///
/// Currently infallible; an unwritable log location degrades to stderr.
pub fn init_observability(
    cfg: &ObservabilityConfig,
    env_filter: EnvFilter,
) -> Result<ObservabilityGuard> {
    let (writer, log_guard) = match build_log_writer(&cfg.service, cfg.log_dir.as_deref()) {
        Ok(pair) => pair,
        Err(err) => {
            eprintln!("Warning: {err}. Falling back to stderr logging.");
            tracing_appender::non_blocking(std::io::stderr())
        }
    };

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();

    tracing::debug!(service = %cfg.service, "observability initialized");

    Ok(ObservabilityGuard {
        _log_guard: log_guard,
    })
}

/// Build an `EnvFilter` from CLI flags and environment.
///
/// Priority: `--quiet` > `--verbose` > `RUST_LOG` > configured level.
pub fn env_filter(quiet: bool, verbose: u8, default_level: &str) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }

    match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    }
}

// ============================================================================
// Log Target Resolution
// ============================================================================

fn build_log_writer(
    service: &str,
    config_log_dir: Option<&Utf8Path>,
) -> Result<(NonBlocking, WorkerGuard)> {
    let target = resolve_log_target(service, config_log_dir).map_err(|e| anyhow::anyhow!("{e}"))?;
    let appender = tracing_appender::rolling::daily(&target.dir, &target.file_name);
    Ok(tracing_appender::non_blocking(appender))
}

fn resolve_log_target(
    service: &str,
    config_log_dir: Option<&Utf8Path>,
) -> Result<LogTarget, String> {
    resolve_log_target_with(
        service,
        env_path(ENV_LOG_PATH)?,
        env_path(ENV_LOG_DIR)?,
        config_log_dir.map(Utf8Path::to_path_buf),
    )
}

fn env_path(var: &str) -> Result<Option<Utf8PathBuf>, String> {
    match std::env::var(var) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(Utf8PathBuf::from(value))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(format!("{var} must be valid UTF-8")),
    }
}

fn resolve_log_target_with(
    service: &str,
    path_override: Option<Utf8PathBuf>,
    dir_override: Option<Utf8PathBuf>,
    config_dir: Option<Utf8PathBuf>,
) -> Result<LogTarget, String> {
    if let Some(path) = path_override {
        return log_target_from_path(&path);
    }
    if let Some(dir) = dir_override.or(config_dir) {
        return log_target_from_dir(dir, service);
    }

    let file_name = format!("{service}{LOG_FILE_SUFFIX}");
    default_log_dirs()
        .into_iter()
        .find(|dir| ensure_writable(dir, &file_name).is_ok())
        .map(|dir| LogTarget { dir, file_name })
        .ok_or_else(|| "No writable log directory found".to_string())
}

fn default_log_dirs() -> Vec<Utf8PathBuf> {
    let mut candidates = Vec::new();
    if cfg!(unix) {
        candidates.push(Utf8PathBuf::from(DEFAULT_LOG_DIR_UNIX));
    }
    if let Some(dir) = histver_core::config::user_data_local_dir() {
        candidates.push(dir.join("logs"));
    }
    if let Some(dir) = std::env::current_dir()
        .ok()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
    {
        candidates.push(dir);
    }
    candidates
}

fn log_target_from_dir(dir: Utf8PathBuf, service: &str) -> Result<LogTarget, String> {
    let file_name = format!("{service}{LOG_FILE_SUFFIX}");
    ensure_writable(&dir, &file_name)?;
    Ok(LogTarget { dir, file_name })
}

fn log_target_from_path(path: &Utf8Path) -> Result<LogTarget, String> {
    let file_name = path
        .file_name()
        .ok_or_else(|| format!("{ENV_LOG_PATH} must include a file name"))?
        .to_string();
    let dir = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
        _ => Utf8PathBuf::from("."),
    };
    ensure_writable(&dir, &file_name)?;
    Ok(LogTarget { dir, file_name })
}

fn ensure_writable(dir: &Utf8Path, file_name: &str) -> Result<(), String> {
    std::fs::create_dir_all(dir)
        .map_err(|e| format!("Failed to create log directory {dir}: {e}"))?;

    let path = dir.join(file_name);
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| format!("Failed to open log file {path}: {e}"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_dir() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        (tmp, path)
    }

    #[test]
    fn env_filter_quiet_overrides_verbose() {
        assert_eq!(env_filter(true, 2, "info").to_string(), "error");
    }

    #[test]
    fn env_filter_verbose_maps_to_debug_and_trace() {
        assert_eq!(env_filter(false, 1, "info").to_string(), "debug");
        assert_eq!(env_filter(false, 3, "info").to_string(), "trace");
    }

    #[test]
    fn path_override_splits_dir_and_file() {
        let (_tmp, dir) = temp_dir();
        let file = dir.join("nested").join("custom.jsonl");

        let target = resolve_log_target_with("histver", Some(file.clone()), None, None).unwrap();
        assert_eq!(target.dir, dir.join("nested"));
        assert_eq!(target.file_name, "custom.jsonl");
        assert!(file.exists());
    }

    #[test]
    fn dir_override_wins_over_config_dir() {
        let (_a, env_dir) = temp_dir();
        let (_b, config_dir) = temp_dir();

        let target =
            resolve_log_target_with("histver", None, Some(env_dir.clone()), Some(config_dir))
                .unwrap();
        assert_eq!(target.dir, env_dir);
        assert_eq!(target.file_name, "histver.jsonl");
    }

    #[test]
    fn config_dir_used_without_overrides() {
        let (_tmp, dir) = temp_dir();
        let target = resolve_log_target_with("demo", None, None, Some(dir.clone())).unwrap();
        assert_eq!(
            target,
            LogTarget {
                dir,
                file_name: format!("demo{LOG_FILE_SUFFIX}"),
            }
        );
    }

    #[test]
    fn bare_file_name_lands_in_current_dir() {
        let target = log_target_from_path(Utf8Path::new("histver-test-bare.jsonl")).unwrap();
        assert_eq!(target.dir.as_str(), ".");
        let _ = std::fs::remove_file("histver-test-bare.jsonl");
    }
}
