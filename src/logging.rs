//! Tracing subscriber setup.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub(crate) const LOG_ENV: &str = "LICENSE_DESK_LOG";

/// Where log lines go. The TUI owns the terminal, so it always logs to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogTarget {
    Stderr,
    File(PathBuf),
}

pub(crate) fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("license-desk").join("license-desk.log"))
}

fn filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive))
}

pub(crate) fn init(target: &LogTarget, default_directive: &str) -> Result<()> {
    let installed = match target {
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(filter(default_directive))
            .with_target(false)
            .compact()
            .with_writer(std::io::stderr)
            .try_init(),
        LogTarget::File(path) => {
            let file = open_log_file(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter(default_directive))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
    };
    installed.map_err(|e| anyhow::anyhow!("install log subscriber: {e}"))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_path_ends_with_app_log() {
        if let Some(path) = default_log_path() {
            assert!(path.ends_with("license-desk/license-desk.log"));
        }
    }

    #[test]
    fn log_file_and_parents_are_created() {
        let dir = std::env::temp_dir().join(format!("license-desk-log-{}", std::process::id()));
        let path = dir.join("nested").join("app.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
