//! Source resolution probing with ffprobe.

use std::path::Path;
use tokio::process::Command;

/// Build the ffprobe command that prints the first video stream's height.
pub fn build_probe_command(prober: &Path, input: &Path) -> Command {
    let mut cmd = Command::new(prober);

    #[rustfmt::skip]
    cmd.args([
        "-v", "error",
        "-select_streams", "v:0",
        "-show_entries", "stream=height",
        "-of", "csv=p=0",
    ]);
    cmd.arg(input);

    cmd
}

/// Parse the pixel height from ffprobe output.
///
/// Uses the first non-empty line. Some ffprobe builds append a trailing
/// separator (`1080,`), which is tolerated. Anything else is `None`.
pub fn parse_probe_output(output: &str) -> Option<u32> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let value = line.trim_end_matches(|c: char| c == ',' || c.is_whitespace());
    value.parse::<u32>().ok().filter(|h| *h > 0)
}
