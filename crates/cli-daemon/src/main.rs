//! CLI entry point for dropcoder
//!
//! Loads configuration, applies command line overrides and runs the daemon
//! until Ctrl-C.

use clap::Parser;
use dropcoder::logging::init_logging;
use dropcoder::{Config, Daemon};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// dropcoder - watch a drop folder and transcode marked files with HandBrakeCLI
#[derive(Parser, Debug)]
#[command(name = "dropcoder")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file. Defaults apply when it does not exist.
    #[arg(short, long, default_value = "dropcoder.toml")]
    config: PathBuf,

    /// Folder to watch for delivery units
    #[arg(short, long)]
    watch: Option<PathBuf>,

    /// Encoder executable (HandBrakeCLI)
    #[arg(long)]
    encoder: Option<PathBuf>,

    /// Prober executable (ffprobe)
    #[arg(long)]
    prober: Option<PathBuf>,

    /// Directory holding the queue/current/completed/errors files
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Skip encoder and prober availability checks. The watch root is still validated.
    #[arg(long, default_value = "false")]
    skip_checks: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(root) = &self.watch {
            config.watch.root = Some(root.clone());
        }
        if let Some(encoder) = &self.encoder {
            config.tools.encoder = encoder.clone();
        }
        if let Some(prober) = &self.prober {
            config.tools.prober = prober.clone();
        }
        if let Some(dir) = &self.state_dir {
            config.state.dir = dir.clone();
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let mut config = match Config::load_or_default(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.config.display(), e);
            return ExitCode::FAILURE;
        }
    };
    args.apply(&mut config);

    init_logging(config.log.format, &config.log.filter);
    info!(config = %args.config.display(), "dropcoder starting");

    let daemon_result = if args.skip_checks {
        warn!("Skipping tool checks (--skip-checks enabled)");
        Daemon::new_without_checks(config)
    } else {
        Daemon::new(config)
    };

    let daemon = match daemon_result {
        Ok(daemon) => daemon,
        Err(e) => {
            error!(error = %e, "Failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    let recovery = daemon.recovery();
    if let Some(path) = &recovery.interrupted {
        warn!(path = %path.display(), "Previous run was interrupted mid-encode");
    }
    if recovery.pending > 0 {
        info!(pending = recovery.pending, "Resuming queued files");
    }

    if let Err(e) = daemon.run().await {
        error!(error = %e, "Daemon error");
        return ExitCode::FAILURE;
    }

    info!("dropcoder stopped");
    ExitCode::SUCCESS
}
