//! Startup checks module for dropcoder
//!
//! Preflight checks that must pass before anything is watched:
//! - The watch root is configured, exists and is a directory
//! - The encoder answers `--version`
//! - The prober answers `-version`
//!
//! Any failure is fatal; the process exits non-zero.

use crate::config::Config;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("No watch directory configured (use --watch or [watch] root)")]
    WatchRootNotConfigured,

    #[error("Watch directory does not exist: {0}")]
    WatchRootNotFound(PathBuf),

    #[error("Watch path is not a directory: {0}")]
    WatchRootNotDirectory(PathBuf),

    #[error("Encoder not available: {0}")]
    EncoderUnavailable(String),

    #[error("Prober not available: {0}")]
    ProberUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Validate the watch root and return its canonical path.
pub fn check_watch_root(root: Option<&Path>) -> Result<PathBuf, StartupError> {
    let root = root.ok_or(StartupError::WatchRootNotConfigured)?;

    if !root.exists() {
        return Err(StartupError::WatchRootNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(StartupError::WatchRootNotDirectory(root.to_path_buf()));
    }

    Ok(root.canonicalize()?)
}

/// Run `program flag` and return the first non-empty output line.
fn probe_tool(program: &Path, flag: &str) -> Result<String, String> {
    let output = Command::new(program)
        .arg(flag)
        .output()
        .map_err(|e| format!("{} {} could not run: {}", program.display(), flag, e))?;

    if !output.status.success() {
        return Err(format!(
            "{} {} exited with {}",
            program.display(),
            flag,
            output.status
        ));
    }

    Ok(first_line(&output.stdout)
        .or_else(|| first_line(&output.stderr))
        .unwrap_or_default())
}

fn first_line(bytes: &[u8]) -> Option<String> {
    String::from_utf8_lossy(bytes)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(String::from)
}

/// Check the encoder by running `<encoder> --version`
///
/// Returns the first line of its version output.
pub fn check_encoder_available(encoder: &Path) -> Result<String, StartupError> {
    probe_tool(encoder, "--version").map_err(|msg| {
        StartupError::EncoderUnavailable(format!("{}; is HandBrakeCLI installed and in PATH?", msg))
    })
}

/// Check the prober by running `<prober> -version`
pub fn check_prober_available(prober: &Path) -> Result<String, StartupError> {
    probe_tool(prober, "-version").map_err(|msg| {
        StartupError::ProberUnavailable(format!("{}; is ffprobe installed and in PATH?", msg))
    })
}

/// Run all startup checks in order
///
/// 1. Watch root
/// 2. Encoder availability
/// 3. Prober availability
///
/// # Returns
/// The canonical watch root on success
pub fn run_startup_checks(cfg: &Config) -> Result<PathBuf, StartupError> {
    let root = check_watch_root(cfg.watch.root.as_deref())?;

    let encoder_version = check_encoder_available(&cfg.tools.encoder)?;
    tracing::info!(encoder = %cfg.tools.encoder.display(), version = %encoder_version, "Encoder available");

    let prober_version = check_prober_available(&cfg.tools.prober)?;
    tracing::info!(prober = %cfg.tools.prober.display(), version = %prober_version, "Prober available");

    Ok(root)
}
