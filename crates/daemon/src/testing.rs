//! Test doubles shared by the job runner and orchestrator tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::encode::{EncodeError, HandBrakeParams, ToolExit};
use crate::toolchain::Toolchain;

/// What the fake encoder does when invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeMode {
    /// Exit 0 and write the output file.
    CreateOutput,
    /// Exit 1 with a stderr message.
    Fail,
    /// Never finish.
    Hang,
    /// Exit 0 without writing the output file.
    OmitOutput,
}

pub const FAKE_OUTPUT_BYTES: &[u8] = b"encoded";
pub const FAKE_FAILURE_STDERR: &str = "Encode failed: unsupported stream";

/// Scriptable [`Toolchain`] that records every call.
#[derive(Debug)]
pub struct FakeToolchain {
    mode: FakeMode,
    height: Option<u32>,
    delay: Duration,
    probe_delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
    encodes: Mutex<Vec<HandBrakeParams>>,
    probes: Mutex<Vec<PathBuf>>,
}

impl FakeToolchain {
    pub fn new(mode: FakeMode) -> Self {
        Self {
            mode,
            height: Some(1080),
            delay: Duration::ZERO,
            probe_delay: Duration::ZERO,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            encodes: Mutex::new(Vec::new()),
            probes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_height(mut self, height: Option<u32>) -> Self {
        self.height = height;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = delay;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn encode_calls(&self) -> Vec<HandBrakeParams> {
        self.encodes.lock().unwrap().clone()
    }

    pub fn probe_calls(&self) -> Vec<PathBuf> {
        self.probes.lock().unwrap().clone()
    }

    /// Highest number of encodes observed running at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// Decrements the active counter even when the encode future is dropped.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Toolchain for FakeToolchain {
    async fn probe_height(&self, input: &Path) -> Option<u32> {
        self.probes.lock().unwrap().push(input.to_path_buf());
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.height
    }

    async fn encode(&self, params: &HandBrakeParams) -> Result<ToolExit, EncodeError> {
        self.encodes.lock().unwrap().push(params.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let success = ToolExit {
            success: true,
            code: Some(0),
            stdout: String::new(),
            stderr: String::new(),
        };

        match self.mode {
            FakeMode::CreateOutput => {
                std::fs::write(&params.output_path, FAKE_OUTPUT_BYTES).map_err(|source| {
                    EncodeError::Wait {
                        program: "fake".to_string(),
                        source,
                    }
                })?;
                Ok(success)
            }
            FakeMode::OmitOutput => Ok(success),
            FakeMode::Fail => Ok(ToolExit {
                success: false,
                code: Some(1),
                stdout: String::new(),
                stderr: format!("{}\n", FAKE_FAILURE_STDERR),
            }),
            FakeMode::Hang => {
                std::future::pending::<()>().await;
                Ok(success)
            }
        }
    }
}
