//! Orchestrator: turns folder notices into queue entries and runs them.
//!
//! A single worker owns the orchestrator and processes one folder notice at a
//! time. Jobs run strictly one after another; the queue is global and FIFO,
//! so draining after a folder also finishes entries left by earlier folders.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::job_runner::{JobOutcome, JobRunner};
use crate::path_matcher::PathMatcher;
use crate::scan::walk_folder;
use crate::shutdown::Shutdown;
use crate::state_store::{ErrorKind, ErrorRecord, QueueEntry, StateError, StateStore};
use crate::watcher::FolderNotice;

pub const REASON_MISSING_SUFFIX: &str = "missing required suffix pattern";
pub const REASON_NO_ELIGIBLE_FILES: &str = "no eligible files";
pub const REASON_INTERRUPTED_BY_RESTART: &str = "interrupted: daemon stopped while encoding";

/// What happened to a folder handed to [`Orchestrator::process_folder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderStatus {
    /// Already handled earlier in this process lifetime; nothing was done.
    AlreadyProcessed,
    /// No file passed validation; one folder error was recorded.
    NoEligibleFiles,
    /// Eligible files were found (possibly all skipped as already done).
    Processed,
}

/// Outcomes of draining the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub outcomes: Vec<(PathBuf, JobOutcome)>,
    pub stopped_by_shutdown: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderReport {
    pub folder: PathBuf,
    pub status: FolderStatus,
    pub enqueued: Vec<PathBuf>,
    pub near_misses: Vec<PathBuf>,
    /// Eligible files already completed or already queued.
    pub skipped: Vec<PathBuf>,
    pub drain: DrainReport,
}

impl FolderReport {
    fn new(folder: &Path, status: FolderStatus) -> Self {
        Self {
            folder: folder.to_path_buf(),
            status,
            enqueued: Vec::new(),
            near_misses: Vec::new(),
            skipped: Vec::new(),
            drain: DrainReport::default(),
        }
    }
}

/// Result of [`recover_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovery {
    /// Path of the job that was in flight when the previous run stopped.
    pub interrupted: Option<PathBuf>,
    /// Queue entries carried over from the previous run.
    pub pending: usize,
}

/// Settle state left by a previous run that did not shut down cleanly.
///
/// A stale CurrentJob is recorded as interrupted and cleared. Queue entries
/// are kept; the worker drains them before handling new folders.
pub fn recover_state(store: &StateStore) -> Result<Recovery, StateError> {
    let interrupted = match store.current()? {
        Some(stale) => {
            warn!(path = %stale.path.display(), "Recovering job interrupted by previous run");
            store.append_error(ErrorRecord::new(
                &stale.path,
                ErrorKind::Interrupted,
                REASON_INTERRUPTED_BY_RESTART,
            ))?;
            store.set_current(None)?;
            Some(stale.path)
        }
        None => None,
    };

    let pending = store.queue()?.len();
    if pending > 0 {
        info!(pending, "Queue entries carried over from previous run");
    }

    Ok(Recovery {
        interrupted,
        pending,
    })
}

pub struct Orchestrator {
    store: Arc<StateStore>,
    runner: JobRunner,
    matcher: PathMatcher,
    processed: HashSet<PathBuf>,
    shutdown: Shutdown,
}

impl Orchestrator {
    pub fn new(
        store: Arc<StateStore>,
        runner: JobRunner,
        matcher: PathMatcher,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            store,
            runner,
            matcher,
            processed: HashSet::new(),
            shutdown,
        }
    }

    /// Walk `folder`, record near-misses, enqueue eligible files and drain the queue.
    pub async fn process_folder(&mut self, folder: &Path) -> Result<FolderReport, StateError> {
        if !self.processed.insert(folder.to_path_buf()) {
            info!(folder = %folder.display(), "Folder already processed, skipping");
            return Ok(FolderReport::new(folder, FolderStatus::AlreadyProcessed));
        }

        info!(folder = %folder.display(), "Processing folder");
        let scan = walk_folder(folder, &self.matcher);

        let mut report = FolderReport::new(folder, FolderStatus::Processed);

        for path in &scan.near_misses {
            warn!(path = %path.display(), "Media file without the required suffix");
            self.store.append_error(ErrorRecord::new(
                path,
                ErrorKind::MissingSuffix,
                REASON_MISSING_SUFFIX,
            ))?;
        }
        report.near_misses = scan.near_misses;

        if scan.eligible.is_empty() {
            warn!(folder = %folder.display(), "No eligible files in folder");
            self.store.append_error(ErrorRecord::new(
                folder,
                ErrorKind::NoEligibleFiles,
                REASON_NO_ELIGIBLE_FILES,
            ))?;
            report.status = FolderStatus::NoEligibleFiles;
            return Ok(report);
        }

        let completed: HashSet<PathBuf> = self
            .store
            .completed()?
            .into_iter()
            .map(|record| record.input)
            .collect();
        let queued: HashSet<PathBuf> = self
            .store
            .queue()?
            .into_iter()
            .map(|entry| entry.path)
            .collect();

        for path in scan.eligible {
            if completed.contains(&path) || queued.contains(&path) {
                info!(path = %path.display(), "Already completed or queued, skipping");
                report.skipped.push(path);
                continue;
            }
            self.store.enqueue(QueueEntry::new(&path))?;
            info!(path = %path.display(), "Queued");
            report.enqueued.push(path);
        }

        report.drain = self.drain_queue().await?;
        Ok(report)
    }

    /// Run queued jobs in FIFO order until the queue is empty or shutdown is requested.
    pub async fn drain_queue(&mut self) -> Result<DrainReport, StateError> {
        let mut report = DrainReport::default();

        loop {
            if self.shutdown.is_triggered() {
                report.stopped_by_shutdown = true;
                break;
            }

            let Some(next) = self.store.queue()?.into_iter().next() else {
                break;
            };

            let outcome = self.runner.run(&next.path).await?;
            let interrupted = outcome == JobOutcome::Interrupted;
            report.outcomes.push((next.path, outcome));
            if interrupted {
                report.stopped_by_shutdown = true;
                break;
            }
        }

        Ok(report)
    }

    /// Worker loop: drain leftovers, then handle folder notices until shutdown.
    ///
    /// Store failures are logged and the worker keeps going with the next notice.
    pub async fn run(mut self, mut rx: mpsc::Receiver<FolderNotice>, mut shutdown: Shutdown) {
        if let Err(e) = self.drain_queue().await {
            error!(error = %e, "Failed to drain carried-over queue");
        }

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                notice = rx.recv() => {
                    let Some(notice) = notice else { break };
                    match self.process_folder(&notice.folder).await {
                        Ok(report) => info!(
                            folder = %report.folder.display(),
                            status = ?report.status,
                            enqueued = report.enqueued.len(),
                            completed_jobs = report.drain.outcomes.iter().filter(|(_, o)| o.is_success()).count(),
                            "Folder done"
                        ),
                        Err(e) => error!(folder = %notice.folder.display(), error = %e, "Folder processing failed"),
                    }
                }
            }
        }

        info!("Orchestrator worker stopped");
    }
}
