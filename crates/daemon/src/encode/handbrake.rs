//! HandBrakeCLI command construction
//!
//! The encoding policy is fixed: NVENC H.265 at constant quality 22, every
//! audio and subtitle track kept, timestamps copied, display aspect kept and
//! anamorphic handling off. Only the height constraint varies per file.

use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Hardware H.265 encoder identifier
pub const ENCODER_ID: &str = "nvenc_h265";

/// Constant quality value
pub const QUALITY: &str = "22";

/// Default language tag for audio/subtitle selection
pub const NATIVE_LANGUAGE: &str = "eng";

/// Parameters for one HandBrakeCLI run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandBrakeParams {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Maximum output height; `None` keeps the source height.
    pub target_height: Option<u32>,
}

impl HandBrakeParams {
    pub fn new(input_path: PathBuf, output_path: PathBuf, target_height: Option<u32>) -> Self {
        Self {
            input_path,
            output_path,
            target_height,
        }
    }
}

/// Build a HandBrakeCLI command with the fixed encoding flags
///
/// # Arguments
/// * `encoder` - Path or name of the HandBrakeCLI executable
/// * `params` - Input, output and optional height constraint
///
/// # Returns
/// A configured Command ready for execution
pub fn build_handbrake_command(encoder: &Path, params: &HandBrakeParams) -> Command {
    let mut cmd = Command::new(encoder);

    cmd.arg("-i").arg(&params.input_path);
    cmd.arg("-o").arg(&params.output_path);

    // Ignore presets from the user's HandBrake profile
    cmd.arg("--preset-import-file").arg("none");

    cmd.arg("-e").arg(ENCODER_ID);
    cmd.arg("-q").arg(QUALITY);

    if let Some(height) = params.target_height {
        cmd.arg("--height").arg(height.to_string());
    }

    #[rustfmt::skip]
    cmd.args([
        "--keep-display-aspect",
        "-O",
        "--all-audio",
        "--all-subtitles",
        "--copy-timestamps",
        "--native-language", NATIVE_LANGUAGE,
        "--non-anamorphic",
    ]);

    cmd
}
