//! The encoder and prober collaborators behind one trait.
//!
//! [`ExternalTools`] spawns the real binaries. Tests substitute a fake
//! implementation so job scenarios run without HandBrake or ffprobe.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::encode::{
    build_handbrake_command, run_captured, run_encoder, EncodeError, HandBrakeParams, ToolExit,
};
use crate::probe::{build_probe_command, parse_probe_output};

#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Pixel height of the first video stream, or `None` when it cannot be determined.
    async fn probe_height(&self, input: &Path) -> Option<u32>;

    /// Run one encode to completion. Dropping the future stops the encode.
    async fn encode(&self, params: &HandBrakeParams) -> Result<ToolExit, EncodeError>;
}

/// Real HandBrakeCLI + ffprobe executables.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    pub encoder: PathBuf,
    pub prober: PathBuf,
}

impl ExternalTools {
    pub fn new(encoder: impl Into<PathBuf>, prober: impl Into<PathBuf>) -> Self {
        Self {
            encoder: encoder.into(),
            prober: prober.into(),
        }
    }
}

#[async_trait]
impl Toolchain for ExternalTools {
    async fn probe_height(&self, input: &Path) -> Option<u32> {
        let cmd = build_probe_command(&self.prober, input);
        match run_captured(cmd).await {
            Ok(exit) if exit.success => {
                let height = parse_probe_output(&exit.stdout);
                if height.is_none() {
                    debug!(path = %input.display(), output = %exit.stdout.trim(), "Unparsable probe output");
                }
                height
            }
            Ok(exit) => {
                warn!(path = %input.display(), reason = %exit.failure_reason(), "Probe failed");
                None
            }
            Err(e) => {
                warn!(path = %input.display(), error = %e, "Probe could not run");
                None
            }
        }
    }

    async fn encode(&self, params: &HandBrakeParams) -> Result<ToolExit, EncodeError> {
        let cmd = build_handbrake_command(&self.encoder, params);
        debug!(encoder_cmd = ?cmd.as_std(), "Starting encoder");
        run_encoder(cmd).await
    }
}
