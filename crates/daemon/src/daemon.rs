//! Daemon startup and main loop for dropcoder
//!
//! Wires the state store, orchestrator worker, folder watcher and optional
//! status server together, and owns the shutdown sequence.

use crate::config::{Config, ConfigError};
use crate::job_runner::{JobRunner, JobSettings};
use crate::orchestrator::{recover_state, Orchestrator, Recovery};
use crate::path_matcher::PathMatcher;
use crate::shutdown;
use crate::startup::{check_watch_root, run_startup_checks, StartupError};
use crate::state_store::{StateError, StateStore};
use crate::status_server::{run_status_server, ServerError};
use crate::toolchain::{ExternalTools, Toolchain};
use crate::watcher::{FolderWatcher, WatchError};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Error type for daemon operations
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Startup check failed
    #[error("Startup check failed: {0}")]
    Startup(#[from] StartupError),

    /// State store failure
    #[error("State store error: {0}")]
    State(#[from] StateError),

    /// Folder watcher failure
    #[error("Watcher error: {0}")]
    Watch(#[from] WatchError),

    /// Status server failure
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// A background task panicked or was cancelled
    #[error("Task failed: {0}")]
    Task(String),
}

/// Daemon state containing all runtime components
pub struct Daemon {
    /// Effective configuration
    pub config: Config,
    root: PathBuf,
    store: Arc<StateStore>,
    tools: Arc<dyn Toolchain>,
    recovery: Recovery,
}

impl Daemon {
    /// Initialize the daemon
    ///
    /// This performs the full startup sequence:
    /// 1. Run startup checks (watch root, encoder, prober)
    /// 2. Open the state store
    /// 3. Recover state left by a previous run
    ///
    /// # Returns
    /// * `Ok(Daemon)` - Daemon initialized successfully
    /// * `Err(DaemonError)` - A startup-fatal condition
    pub fn new(config: Config) -> Result<Self, DaemonError> {
        let root = run_startup_checks(&config)?;
        let tools = Arc::new(ExternalTools::new(&config.tools.encoder, &config.tools.prober));
        Self::with_toolchain(config, root, tools)
    }

    /// Initialize the daemon without probing the external tools
    ///
    /// The watch root is still validated.
    pub fn new_without_checks(config: Config) -> Result<Self, DaemonError> {
        let root = check_watch_root(config.watch.root.as_deref())?;
        let tools = Arc::new(ExternalTools::new(&config.tools.encoder, &config.tools.prober));
        Self::with_toolchain(config, root, tools)
    }

    /// Initialize the daemon with an explicit toolchain
    pub fn with_toolchain(
        config: Config,
        root: PathBuf,
        tools: Arc<dyn Toolchain>,
    ) -> Result<Self, DaemonError> {
        let store = Arc::new(StateStore::open(&config.state.dir)?);
        let recovery = recover_state(&store)?;

        Ok(Self {
            config,
            root,
            store,
            tools,
            recovery,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// What crash recovery found at startup
    pub fn recovery(&self) -> &Recovery {
        &self.recovery
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<(), DaemonError> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `stop` resolves or the watcher fails
    ///
    /// On stop: the watcher stops, an in-flight encode is killed and recorded
    /// as interrupted, the worker exits, and the state is cleared when
    /// `state.clear_on_shutdown` is set.
    pub async fn run_until<F>(self, stop: F) -> Result<(), DaemonError>
    where
        F: Future<Output = ()>,
    {
        let (trigger, _) = shutdown::channel();
        let (tx, rx) = mpsc::channel(self.config.watch.queue_capacity.max(1));
        let matcher = PathMatcher::new(self.config.matcher.accept_mpg);

        let runner = JobRunner::new(
            Arc::clone(&self.tools),
            Arc::clone(&self.store),
            matcher.clone(),
            JobSettings::from_config(&self.config.tools),
            trigger.subscribe(),
        );
        let orchestrator =
            Orchestrator::new(Arc::clone(&self.store), runner, matcher, trigger.subscribe());
        let worker = tokio::spawn(orchestrator.run(rx, trigger.subscribe()));

        let watcher = FolderWatcher::new(
            &self.root,
            Duration::from_secs(self.config.watch.settle_secs),
            tx,
        );
        let mut watcher_task = tokio::spawn(watcher.run(trigger.subscribe()));

        let server = if self.config.status.enabled {
            let store = Arc::clone(&self.store);
            let bind = self.config.status.bind.clone();
            let server_shutdown = trigger.subscribe();
            Some(tokio::spawn(async move {
                run_status_server(store, &bind, server_shutdown).await
            }))
        } else {
            None
        };

        info!(root = %self.root.display(), state_dir = %self.store.dir().display(), "Daemon running");

        tokio::pin!(stop);
        let early_exit = tokio::select! {
            _ = &mut stop => {
                info!("Shutdown requested");
                None
            }
            finished = &mut watcher_task => Some(finished),
        };

        trigger.trigger();

        let watch_result = match early_exit {
            Some(finished) => finished,
            None => watcher_task.await,
        };

        if let Err(e) = worker.await {
            error!(error = %e, "Orchestrator worker failed");
        }

        if let Some(server) = server {
            match server.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "Status server stopped with error"),
                Err(e) => warn!(error = %e, "Status server task failed"),
            }
        }

        if self.config.state.clear_on_shutdown {
            self.store.clear_all()?;
            info!("State cleared");
        }

        match watch_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(e) => Err(DaemonError::Task(e.to_string())),
        }
    }
}
