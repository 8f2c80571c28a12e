//! External tool invocation for dropcoder
//!
//! Tools are always spawned from an argument list, never a shell string.

pub mod handbrake;

pub use handbrake::{build_handbrake_command, HandBrakeParams};

use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Maximum number of characters of stderr kept as a failure reason.
pub const STDERR_TAIL_CHARS: usize = 2000;

/// Stderr held in memory by [`run_encoder`] is cut back once it grows past this.
const STDERR_BUFFER_CHARS: usize = 4 * STDERR_TAIL_CHARS;

/// Error type for spawning and awaiting external tools
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The tool could not be started (missing binary, permissions)
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Waiting on the child process failed
    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Exit information of a finished tool run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolExit {
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Empty for [`run_encoder`], which discards stdout.
    pub stdout: String,
    pub stderr: String,
}

impl ToolExit {
    /// Human-readable failure reason: the stderr tail, or the exit status when stderr is empty.
    pub fn failure_reason(&self) -> String {
        let tail = stderr_tail(&self.stderr, STDERR_TAIL_CHARS);
        if !tail.is_empty() {
            return tail;
        }
        match self.code {
            Some(code) => format!("exited with code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs `cmd` to completion, capturing stdout and stderr.
///
/// The child is killed if the returned future is dropped before it resolves,
/// which is how timeouts and shutdown stop an in-flight encode.
pub async fn run_captured(mut cmd: Command) -> Result<ToolExit, EncodeError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| EncodeError::Spawn {
        program: program.clone(),
        source,
    })?;

    let output = child
        .wait_with_output()
        .await
        .map_err(|source| EncodeError::Wait { program, source })?;

    Ok(ToolExit {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Runs a long-lived encoder to completion.
///
/// Stdout (progress output) is discarded. Stderr is read as it arrives and
/// only its most recent part is kept, so memory stays bounded however long
/// the encode runs. Like [`run_captured`], dropping the future kills the child.
pub async fn run_encoder(mut cmd: Command) -> Result<ToolExit, EncodeError> {
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| EncodeError::Spawn {
        program: program.clone(),
        source,
    })?;

    let stderr = child.stderr.take();
    let collect_tail = async move {
        let mut tail = String::new();
        let Some(stderr) = stderr else {
            return tail;
        };
        let mut reader = BufReader::new(stderr);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    tail.push_str(&String::from_utf8_lossy(&line));
                    if tail.len() > STDERR_BUFFER_CHARS {
                        tail = last_chars(&tail, STDERR_TAIL_CHARS);
                    }
                }
            }
        }
        tail
    };

    let (status, stderr) = tokio::join!(child.wait(), collect_tail);
    let status = status.map_err(|source| EncodeError::Wait { program, source })?;

    Ok(ToolExit {
        success: status.success(),
        code: status.code(),
        stdout: String::new(),
        stderr,
    })
}

fn last_chars(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max_chars)).collect()
}

/// Last `max_chars` characters of the trimmed text.
pub fn stderr_tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}
