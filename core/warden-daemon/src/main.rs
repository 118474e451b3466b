//! Warden daemon entrypoint.
//!
//! A small, single-writer service: resolve paths, load config, wire the
//! real collaborators, and hand control to the supervisor loop. All policy
//! lives in warden-core.

use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use warden_core::{
    load_config, Collaborators, CommandOracle, CommandOrchestrator, HttpReleaseFeed,
    StorageConfig, Supervisor, TmuxHost,
};

mod backoff;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

#[derive(Debug, Parser)]
#[command(name = "warden-daemon", about = "Session-liveness supervisor for tmux agent fleets")]
struct Args {
    /// Data root (default: ~/.warden)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Config file (default: <root>/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run exactly one cycle and exit
    #[arg(long)]
    once: bool,
}

fn main() {
    init_logging();
    let args = Args::parse();

    let storage = match args.root {
        Some(root) => StorageConfig::with_root(root),
        None => match StorageConfig::resolve() {
            Ok(storage) => storage,
            Err(err) => {
                error!(error = %err, "Failed to resolve storage root");
                std::process::exit(1);
            }
        },
    };

    backoff::apply_startup_backoff(&storage.backoff_file());

    let config_path = args
        .config
        .unwrap_or_else(|| storage.config_file());
    let config = load_config(&config_path);

    install_signal_handlers();

    let feed = match HttpReleaseFeed::new(
        config.release_feed_url.clone(),
        Duration::from_secs(config.host_timeout_secs),
    ) {
        Ok(feed) => feed,
        Err(err) => {
            error!(error = %err, "Failed to build release feed client");
            std::process::exit(1);
        }
    };

    let host_timeout = Duration::from_secs(config.host_timeout_secs);
    let collaborators = Collaborators {
        host: Box::new(TmuxHost::new(host_timeout)),
        orchestrator: Box::new(CommandOrchestrator::new(
            config.orchestrator_program.clone(),
            host_timeout,
        )),
        feed: Box::new(feed),
        oracle: Box::new(CommandOracle::new(
            config.oracle_program.clone(),
            config.oracle_args.clone(),
            Duration::from_secs(config.ai_timeout_secs),
        )),
    };

    let mut supervisor = match Supervisor::new(config, storage.clone(), collaborators) {
        Ok(supervisor) => supervisor,
        Err(err) => {
            error!(error = %err, "Failed to initialize supervisor");
            std::process::exit(1);
        }
    };

    info!(
        root = %storage.root().display(),
        interval_secs = supervisor.config().cycle_interval_secs,
        "Warden daemon started"
    );

    let result = if args.once {
        supervisor.run_cycle(chrono::Utc::now()).map(|_| ())
    } else {
        supervisor.run(&SHUTDOWN)
    };

    match result {
        Ok(()) => info!("Warden daemon stopped"),
        Err(err) => {
            error!(error = %err, "Supervisor failed");
            std::process::exit(1);
        }
    }
}

fn init_logging() {
    let debug_enabled = std::env::var("WARDEN_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

extern "C" fn handle_shutdown_signal(_signal: libc::c_int) {
    SHUTDOWN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers() {
    let handler = handle_shutdown_signal as extern "C" fn(libc::c_int) as usize;
    unsafe {
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}
