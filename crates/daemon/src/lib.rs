//! dropcoder
//!
//! Watches a drop folder for delivery units, queues files carrying the
//! ` xx` marker and transcodes them one at a time with HandBrakeCLI. Queue,
//! current job, completed and error records are persisted as JSON for a
//! dashboard.

pub mod daemon;
pub mod encode;
pub mod job_runner;
pub mod logging;
pub mod orchestrator;
pub mod path_matcher;
pub mod probe;
pub mod resolution;
pub mod scan;
pub mod shutdown;
pub mod startup;
pub mod state_store;
pub mod status_server;
pub mod toolchain;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use dropcoder_config as config;
pub use dropcoder_config::Config;
pub use daemon::{Daemon, DaemonError};
pub use encode::{build_handbrake_command, EncodeError, HandBrakeParams, ToolExit};
pub use job_runner::{JobOutcome, JobRunner, JobSettings};
pub use logging::init_logging;
pub use orchestrator::{recover_state, FolderReport, FolderStatus, Orchestrator, Recovery};
pub use path_matcher::{derive_output_name, is_eligible, FileClass, PathMatcher};
pub use resolution::{decide, ScaleDecision};
pub use startup::{
    check_encoder_available, check_prober_available, check_watch_root, run_startup_checks,
    StartupError,
};
pub use state_store::{
    CompletedRecord, CurrentJob, ErrorKind, ErrorRecord, QueueEntry, StateError, StateSnapshot,
    StateStore,
};
pub use status_server::{create_status_router, run_status_server, ServerError};
pub use toolchain::{ExternalTools, Toolchain};
pub use watcher::{FolderNotice, FolderWatcher, NoticeOrigin, WatchError};
