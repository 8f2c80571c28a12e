//! Job runner for dropcoder
//!
//! Runs one queued file end to end: dequeue, overwrite check, probe, encode
//! with synthetic progress heartbeats, then a completed or error record.
//! The CurrentJob slot is cleared on every exit path.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tracing::{error, info, warn};

use crate::config::ToolsConfig;
use crate::encode::{EncodeError, HandBrakeParams, ToolExit};
use crate::path_matcher::PathMatcher;
use crate::resolution::decide;
use crate::shutdown::Shutdown;
use crate::state_store::{
    CompletedRecord, CurrentJob, ErrorKind, ErrorRecord, StateError, StateStore,
};
use crate::toolchain::Toolchain;

pub const ETA_UNKNOWN: &str = "Unknown";
pub const ETA_CALCULATING: &str = "Calculating...";
pub const ETA_PROCESSING: &str = "Processing...";
pub const ETA_FINALIZING: &str = "Finalizing...";

/// Synthetic progress once the encoder has been started.
pub const PROGRESS_STARTED: u8 = 10;
/// Increment per heartbeat.
pub const PROGRESS_STEP: u8 = 10;
/// Heartbeats never go past this value.
pub const PROGRESS_CAP: u8 = 90;
/// Published after the encoder exits 0.
pub const PROGRESS_FINALIZING: u8 = 95;

/// Longest a resolution probe may run before the height is treated as unknown.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Next synthetic progress value after one heartbeat. Never decreases.
pub fn next_heartbeat(progress: u8) -> u8 {
    progress
        .saturating_add(PROGRESS_STEP)
        .min(PROGRESS_CAP)
        .max(progress)
}

/// How a single job concluded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success {
        output: PathBuf,
        original_size: u64,
        compressed_size: u64,
    },
    /// The derived output path was already taken; the encoder was not run.
    OutputAlreadyExists { output: PathBuf },
    /// Non-zero exit, or the encoder could not be started.
    ToolFailed { reason: String },
    /// The encode exceeded the configured timeout and was killed.
    TimedOut { after: Duration },
    /// The encoder exited 0 but produced no output file.
    OutputMissing { output: PathBuf },
    /// Shutdown was requested while the encoder ran; the child was killed.
    Interrupted,
    Unexpected(String),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }

    /// Error category, or `None` for [`JobOutcome::Success`].
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            JobOutcome::Success { .. } => None,
            JobOutcome::OutputAlreadyExists { .. } => Some(ErrorKind::OutputAlreadyExists),
            JobOutcome::ToolFailed { .. } => Some(ErrorKind::ToolFailed),
            JobOutcome::TimedOut { .. } => Some(ErrorKind::ToolTimedOut),
            JobOutcome::OutputMissing { .. } => Some(ErrorKind::OutputMissing),
            JobOutcome::Interrupted => Some(ErrorKind::Interrupted),
            JobOutcome::Unexpected(_) => Some(ErrorKind::Unexpected),
        }
    }

    /// Reason string stored in the error record.
    pub fn reason(&self) -> String {
        match self {
            JobOutcome::Success { .. } => "completed".to_string(),
            JobOutcome::OutputAlreadyExists { .. } => "output already exists".to_string(),
            JobOutcome::ToolFailed { reason } => format!("encoder failed: {}", reason),
            JobOutcome::TimedOut { after } => {
                format!("encoder timed out after {}s", after.as_secs())
            }
            JobOutcome::OutputMissing { .. } => "output missing after encode".to_string(),
            JobOutcome::Interrupted => "interrupted by shutdown".to_string(),
            JobOutcome::Unexpected(msg) => format!("unexpected failure: {}", msg),
        }
    }
}

/// Timing knobs of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    pub heartbeat: Duration,
    /// `None` disables the encode timeout.
    pub encode_timeout: Option<Duration>,
    pub probe_timeout: Duration,
}

impl JobSettings {
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            heartbeat: Duration::from_secs(tools.heartbeat_secs.max(1)),
            encode_timeout: match tools.encode_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

enum ProbeEnd {
    Height(Option<u32>),
    Interrupted,
}

enum EncodeEnd {
    Finished(Result<ToolExit, EncodeError>),
    TimedOut(Duration),
    Interrupted,
}

/// Executes jobs one at a time against a [`Toolchain`].
pub struct JobRunner {
    tools: Arc<dyn Toolchain>,
    store: Arc<StateStore>,
    matcher: PathMatcher,
    settings: JobSettings,
    shutdown: Shutdown,
}

impl JobRunner {
    pub fn new(
        tools: Arc<dyn Toolchain>,
        store: Arc<StateStore>,
        matcher: PathMatcher,
        settings: JobSettings,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            tools,
            store,
            matcher,
            settings,
            shutdown,
        }
    }

    /// Run the job for `input`.
    ///
    /// Per-file failures are returned as [`JobOutcome`] values and recorded in
    /// the error collection. `Err` means the state store itself failed.
    pub async fn run(&self, input: &Path) -> Result<JobOutcome, StateError> {
        self.store.dequeue(input)?;

        let mut current = CurrentJob {
            path: input.to_path_buf(),
            synthetic_progress: 0,
            eta: ETA_UNKNOWN.to_string(),
            started: Utc::now(),
        };
        self.store.set_current(Some(&current))?;
        info!(path = %input.display(), "Job started");

        let outcome = self.execute(input, &mut current).await;

        let cleared = self.store.set_current(None);
        let recorded = self.record(input, &outcome);
        cleared?;
        recorded?;

        Ok(outcome)
    }

    async fn execute(&self, input: &Path, current: &mut CurrentJob) -> JobOutcome {
        let Some(output) = self.matcher.output_path(input) else {
            return JobOutcome::Unexpected("input has no usable file name".to_string());
        };

        match output.try_exists() {
            Ok(true) => return JobOutcome::OutputAlreadyExists { output },
            Ok(false) => {}
            Err(e) => return JobOutcome::Unexpected(format!("cannot check output path: {}", e)),
        }

        let original_size = match std::fs::metadata(input) {
            Ok(metadata) => metadata.len(),
            Err(e) => return JobOutcome::Unexpected(format!("cannot read input: {}", e)),
        };

        let height = match self.probe_with_limits(input).await {
            ProbeEnd::Height(height) => height,
            ProbeEnd::Interrupted => return JobOutcome::Interrupted,
        };
        let decision = decide(height);
        info!(
            path = %input.display(),
            height = ?height,
            target_height = ?decision.target_height,
            "Resolution decided"
        );

        let params = HandBrakeParams::new(input.to_path_buf(), output.clone(), decision.target_height);
        self.publish(current, PROGRESS_STARTED, ETA_CALCULATING);

        let exit = match self.encode_with_heartbeat(&params, current).await {
            EncodeEnd::Finished(Ok(exit)) => exit,
            EncodeEnd::Finished(Err(e)) => {
                return JobOutcome::ToolFailed {
                    reason: e.to_string(),
                }
            }
            EncodeEnd::TimedOut(after) => return JobOutcome::TimedOut { after },
            EncodeEnd::Interrupted => return JobOutcome::Interrupted,
        };

        if !exit.success {
            return JobOutcome::ToolFailed {
                reason: exit.failure_reason(),
            };
        }

        self.publish(current, PROGRESS_FINALIZING, ETA_FINALIZING);

        match std::fs::metadata(&output) {
            Ok(metadata) => JobOutcome::Success {
                output,
                original_size,
                compressed_size: metadata.len(),
            },
            Err(_) => JobOutcome::OutputMissing { output },
        }
    }

    /// Probe the source height, giving up on shutdown or after the probe timeout.
    ///
    /// A timed-out probe counts as unknown height. Dropping the probe future
    /// kills the prober.
    async fn probe_with_limits(&self, input: &Path) -> ProbeEnd {
        let mut shutdown = self.shutdown.clone();
        let limit = self.settings.probe_timeout;

        tokio::select! {
            probed = tokio::time::timeout(limit, self.tools.probe_height(input)) => match probed {
                Ok(height) => ProbeEnd::Height(height),
                Err(_) => {
                    warn!(path = %input.display(), limit_secs = limit.as_secs_f64(), "Probe timed out");
                    ProbeEnd::Height(None)
                }
            },
            _ = shutdown.wait() => {
                warn!(path = %input.display(), "Shutdown requested, killing prober");
                ProbeEnd::Interrupted
            }
        }
    }

    /// Await the encode while publishing heartbeats, honoring timeout and shutdown.
    ///
    /// Returning early drops the encode future, which kills the child.
    async fn encode_with_heartbeat(
        &self,
        params: &HandBrakeParams,
        current: &mut CurrentJob,
    ) -> EncodeEnd {
        let encode = self.tools.encode(params);
        tokio::pin!(encode);

        let heartbeat = self.settings.heartbeat;
        let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);

        let limit = self.settings.encode_timeout;
        let deadline = async move {
            match limit {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut shutdown = self.shutdown.clone();

        loop {
            tokio::select! {
                result = &mut encode => return EncodeEnd::Finished(result),
                _ = ticker.tick() => {
                    let next = next_heartbeat(current.synthetic_progress);
                    self.publish(current, next, ETA_PROCESSING);
                }
                _ = &mut deadline => {
                    warn!(path = %params.input_path.display(), "Encode timed out, killing encoder");
                    return EncodeEnd::TimedOut(limit.unwrap_or_default());
                }
                _ = shutdown.wait() => {
                    warn!(path = %params.input_path.display(), "Shutdown requested, killing encoder");
                    return EncodeEnd::Interrupted;
                }
            }
        }
    }

    /// Publish synthetic progress. Failures only affect the dashboard, so they are logged.
    fn publish(&self, current: &mut CurrentJob, progress: u8, eta: &str) {
        current.synthetic_progress = progress.max(current.synthetic_progress);
        current.eta = eta.to_string();
        if let Err(e) = self.store.set_current(Some(current)) {
            warn!(path = %current.path.display(), error = %e, "Failed to publish progress");
        }
    }

    fn record(&self, input: &Path, outcome: &JobOutcome) -> Result<(), StateError> {
        match outcome {
            JobOutcome::Success {
                output,
                original_size,
                compressed_size,
            } => {
                info!(
                    path = %input.display(),
                    output = %output.display(),
                    original_size,
                    compressed_size,
                    "Job completed"
                );
                self.store.append_completed(CompletedRecord {
                    input: input.to_path_buf(),
                    output: output.clone(),
                    original_size_bytes: *original_size,
                    compressed_size_bytes: *compressed_size,
                    completed_at: Utc::now(),
                })
            }
            failed => {
                let kind = failed.error_kind().unwrap_or(ErrorKind::Unexpected);
                let reason = failed.reason();
                error!(path = %input.display(), kind = %kind, reason = %reason, "Job failed");
                self.store
                    .append_error(ErrorRecord::new(input, kind, reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown;
    use crate::state_store::QueueEntry;
    use crate::testing::{FakeMode, FakeToolchain, FAKE_FAILURE_STDERR, FAKE_OUTPUT_BYTES};
    use proptest::prelude::*;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        _temp_dir: TempDir,
        folder: PathBuf,
        store: Arc<StateStore>,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let folder = temp_dir.path().join("watch/Drop1");
        fs::create_dir_all(&folder).unwrap();
        let store = Arc::new(StateStore::open(temp_dir.path().join("state")).unwrap());
        Fixture {
            _temp_dir: temp_dir,
            folder,
            store,
        }
    }

    fn fast_settings() -> JobSettings {
        JobSettings {
            heartbeat: Duration::from_millis(20),
            encode_timeout: None,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    fn runner(fx: &Fixture, tools: Arc<FakeToolchain>, settings: JobSettings, shutdown: Shutdown) -> JobRunner {
        JobRunner::new(tools, Arc::clone(&fx.store), PathMatcher::default(), settings, shutdown)
    }

    fn queued_input(fx: &Fixture, name: &str, bytes: usize) -> PathBuf {
        let input = fx.folder.join(name);
        fs::write(&input, vec![0u8; bytes]).unwrap();
        fx.store.enqueue(QueueEntry::new(&input)).unwrap();
        input
    }

    #[tokio::test]
    async fn test_success_records_sizes_and_clears_current() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput).shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "Show s01e01 xx.mp4", 100);

        let outcome = runner(&fx, tools.clone(), fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();

        let output = fx.folder.join("Show s01e01.mp4");
        assert_eq!(
            outcome,
            JobOutcome::Success {
                output: output.clone(),
                original_size: 100,
                compressed_size: FAKE_OUTPUT_BYTES.len() as u64,
            }
        );

        let snapshot = fx.store.snapshot().unwrap();
        assert!(snapshot.queue.is_empty());
        assert!(snapshot.current.is_none());
        assert!(snapshot.errors.is_empty());
        assert_eq!(snapshot.completed.len(), 1);
        assert_eq!(snapshot.completed[0].input, input);
        assert_eq!(snapshot.completed[0].output, output);

        let calls = tools.encode_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target_height, Some(480));
    }

    #[tokio::test]
    async fn test_low_resolution_source_keeps_height() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput)
            .with_height(Some(360))
            .shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "old  XX.avi", 10);

        runner(&fx, tools.clone(), fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();
        assert_eq!(tools.encode_calls()[0].target_height, None);
        assert_eq!(tools.encode_calls()[0].output_path, fx.folder.join("old.mp4"));
    }

    #[tokio::test]
    async fn test_unknown_height_downscales() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput)
            .with_height(None)
            .shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "mystery xx.mkv", 10);

        runner(&fx, tools.clone(), fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();
        assert_eq!(tools.encode_calls()[0].target_height, Some(480));
    }

    #[tokio::test]
    async fn test_existing_output_is_never_overwritten() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput).shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "Show s01e01 xx.mp4", 100);
        let output = fx.folder.join("Show s01e01.mp4");
        fs::write(&output, b"keep me").unwrap();

        let outcome = runner(&fx, tools.clone(), fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::OutputAlreadyExists { output: output.clone() });
        assert!(tools.encode_calls().is_empty());
        assert!(tools.probe_calls().is_empty());
        assert_eq!(fs::read(&output).unwrap(), b"keep me");

        let snapshot = fx.store.snapshot().unwrap();
        assert!(snapshot.current.is_none());
        assert!(snapshot.queue.is_empty());
        assert_eq!(snapshot.errors.len(), 1);
        assert_eq!(snapshot.errors[0].kind, ErrorKind::OutputAlreadyExists);
        assert_eq!(snapshot.errors[0].reason, "output already exists");
        assert_eq!(snapshot.errors[0].path, input);
    }

    #[tokio::test]
    async fn test_tool_failure_captures_stderr() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::Fail).shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "broken xx.mp4", 10);

        let outcome = runner(&fx, tools, fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            JobOutcome::ToolFailed {
                reason: FAKE_FAILURE_STDERR.to_string()
            }
        );
        let errors = fx.store.errors().unwrap();
        assert_eq!(errors[0].kind, ErrorKind::ToolFailed);
        assert!(errors[0].reason.contains(FAKE_FAILURE_STDERR));
        assert!(fx.store.current().unwrap().is_none());
        assert!(fx.store.completed().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_zero_exit_without_output_is_output_missing() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::OmitOutput).shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "ghost xx.wmv", 10);

        let outcome = runner(&fx, tools, fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            JobOutcome::OutputMissing {
                output: fx.folder.join("ghost.mp4")
            }
        );
        assert_eq!(fx.store.errors().unwrap()[0].kind, ErrorKind::OutputMissing);
        assert!(fx.store.current().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_input_is_unexpected() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput).shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = fx.folder.join("vanished xx.mp4");
        fx.store.enqueue(QueueEntry::new(&input)).unwrap();

        let outcome = runner(&fx, tools.clone(), fast_settings(), shutdown)
            .run(&input)
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Unexpected(_)));
        assert!(tools.encode_calls().is_empty());
        assert_eq!(fx.store.errors().unwrap()[0].kind, ErrorKind::Unexpected);
        assert!(fx.store.queue().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kills_encode() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::Hang).shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "slow xx.mp4", 10);
        let settings = JobSettings {
            heartbeat: Duration::from_millis(10),
            encode_timeout: Some(Duration::from_millis(60)),
            probe_timeout: PROBE_TIMEOUT,
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            runner(&fx, tools.clone(), settings, shutdown).run(&input),
        )
        .await
        .expect("timeout should end the job")
        .unwrap();

        assert_eq!(
            outcome,
            JobOutcome::TimedOut {
                after: Duration::from_millis(60)
            }
        );
        assert_eq!(fx.store.errors().unwrap()[0].kind, ErrorKind::ToolTimedOut);
        assert!(fx.store.current().unwrap().is_none());
        assert_eq!(tools.max_active(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_running_encode() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::Hang).shared();
        let (trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "long xx.mkv", 10);

        let job_runner = runner(&fx, tools, fast_settings(), shutdown);
        let store = Arc::clone(&fx.store);
        let job_input = input.clone();
        let handle = tokio::spawn(async move { job_runner.run(&job_input).await });

        // Wait until the encoder has been started
        let started = async {
            loop {
                if let Ok(Some(current)) = store.current() {
                    if current.synthetic_progress >= PROGRESS_STARTED {
                        return current;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        let current = tokio::time::timeout(Duration::from_secs(5), started)
            .await
            .expect("job should start");
        assert_eq!(current.path, input);

        trigger.trigger();
        let outcome = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("shutdown should stop the job")
            .unwrap()
            .unwrap();

        assert_eq!(outcome, JobOutcome::Interrupted);
        assert!(fx.store.current().unwrap().is_none());
        assert_eq!(fx.store.errors().unwrap()[0].kind, ErrorKind::Interrupted);
    }

    #[tokio::test]
    async fn test_slow_probe_counts_as_unknown_height() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput)
            .with_height(Some(360))
            .with_probe_delay(Duration::from_secs(30))
            .shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "stalled xx.mp4", 10);
        let settings = JobSettings {
            probe_timeout: Duration::from_millis(50),
            ..fast_settings()
        };

        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            runner(&fx, tools.clone(), settings, shutdown).run(&input),
        )
        .await
        .expect("probe timeout should not stall the job")
        .unwrap();

        assert!(outcome.is_success());
        assert_eq!(tools.probe_calls().len(), 1);
        assert_eq!(tools.encode_calls()[0].target_height, Some(480));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_interrupts_hanging_prober() {
        use std::os::unix::fs::PermissionsExt;

        let fx = fixture();
        let prober = fx.folder.parent().unwrap().join("slow-ffprobe.sh");
        fs::write(&prober, "#!/bin/sh\nsleep 20\n").unwrap();
        fs::set_permissions(&prober, fs::Permissions::from_mode(0o755)).unwrap();

        let tools = Arc::new(crate::toolchain::ExternalTools::new("true", &prober));
        let (trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "network xx.mkv", 10);

        let job_runner = JobRunner::new(
            tools,
            Arc::clone(&fx.store),
            PathMatcher::default(),
            fast_settings(),
            shutdown,
        );
        let job_input = input.clone();
        let handle = tokio::spawn(async move { job_runner.run(&job_input).await });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_finished());
        trigger.trigger();

        let outcome = tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("shutdown should stop a job stuck in the probe")
            .unwrap()
            .unwrap();

        assert_eq!(outcome, JobOutcome::Interrupted);
        let snapshot = fx.store.snapshot().unwrap();
        assert!(snapshot.current.is_none());
        assert_eq!(snapshot.errors[0].kind, ErrorKind::Interrupted);
        assert_eq!(snapshot.errors[0].path, input);
    }

    #[tokio::test]
    async fn test_heartbeats_are_monotonic() {
        let fx = fixture();
        let tools = FakeToolchain::new(FakeMode::CreateOutput)
            .with_delay(Duration::from_millis(300))
            .shared();
        let (_trigger, shutdown) = shutdown::channel();
        let input = queued_input(&fx, "beat xx.mp4", 10);

        let job_runner = runner(&fx, tools, fast_settings(), shutdown);
        let handle = tokio::spawn(async move { job_runner.run(&input).await });

        let mut observed = Vec::new();
        while !handle.is_finished() {
            if let Ok(Some(current)) = fx.store.current() {
                observed.push(current.synthetic_progress);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let outcome = handle.await.unwrap().unwrap();
        assert!(outcome.is_success());

        assert!(observed.windows(2).all(|w| w[0] <= w[1]), "{:?}", observed);
        assert!(observed.iter().any(|p| *p > PROGRESS_STARTED), "{:?}", observed);
        assert!(observed.iter().all(|p| *p <= PROGRESS_FINALIZING));
    }

    #[test]
    fn test_settings_from_config() {
        let tools = ToolsConfig {
            encode_timeout_secs: 0,
            heartbeat_secs: 0,
            ..ToolsConfig::default()
        };
        let settings = JobSettings::from_config(&tools);
        assert_eq!(settings.encode_timeout, None);
        assert_eq!(settings.heartbeat, Duration::from_secs(1));

        let defaults = JobSettings::default();
        assert_eq!(defaults.encode_timeout, Some(Duration::from_secs(21600)));
        assert_eq!(defaults.heartbeat, Duration::from_secs(5));
        assert_eq!(defaults.probe_timeout, PROBE_TIMEOUT);
    }

    #[test]
    fn test_outcome_reasons() {
        assert_eq!(
            JobOutcome::OutputAlreadyExists {
                output: PathBuf::from("x.mp4")
            }
            .reason(),
            "output already exists"
        );
        assert_eq!(
            JobOutcome::TimedOut {
                after: Duration::from_secs(90)
            }
            .reason(),
            "encoder timed out after 90s"
        );
        assert_eq!(JobOutcome::Interrupted.error_kind(), Some(ErrorKind::Interrupted));
        assert_eq!(
            JobOutcome::Success {
                output: PathBuf::from("x.mp4"),
                original_size: 1,
                compressed_size: 1
            }
            .error_kind(),
            None
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_heartbeat_never_decreases_and_respects_cap(progress in 0u8..=100) {
            let next = next_heartbeat(progress);
            prop_assert!(next >= progress);
            prop_assert!(next <= progress.max(PROGRESS_CAP));
        }
    }

    #[test]
    fn test_heartbeat_schedule() {
        let mut progress = PROGRESS_STARTED;
        let mut schedule = vec![progress];
        for _ in 0..10 {
            progress = next_heartbeat(progress);
            schedule.push(progress);
        }
        assert_eq!(schedule, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 90, 90]);
    }
}
