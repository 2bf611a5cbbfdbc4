//! Command-line entry point shared by the `tallyd` binaries.
//!
//! # Usage
//!
//! ```bash
//! # Start the server on port 2323 (foreground)
//! tallyd 2323
//! tallyd start 2323
//!
//! # Start in the background
//! tallyd start 2323 -d
//!
//! # Start from a config file, overriding the host
//! tallyd start -c tally.toml --host 127.0.0.1
//!
//! # Stop the daemon / check whether it is running
//! tallyd stop
//! tallyd status
//!
//! # Enable debug logging
//! RUST_LOG=tallyd=debug tallyd 2323
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown

use std::fs::{self, File};
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::{CliOverrides, ConfigError, ServerConfig};
use crate::pidfile::{is_process_running, log_file_path, stop_process, PidFile};
use crate::server::Server;
use crate::shutdown::Shutdown;
use crate::store::spawn_session_store;

/// Crates whose log level `--log-level` controls
const LOG_TARGETS: [&str; 3] = ["tallyd", "tally_core", "tally_protocol"];

/// How long `tallyd stop` waits for the process to exit
const STOP_WAIT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the process to exit
const STOP_POLL: Duration = Duration::from_millis(100);

/// tally daemon - per-client running totals over TCP
#[derive(Parser, Debug)]
#[command(name = "tallyd", version, about, args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    start: StartArgs,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the server (the default when no subcommand is given)
    Start(StartArgs),
    /// Stop the running daemon
    Stop,
    /// Show daemon status
    Status,
}

#[derive(ClapArgs, Debug, Default, Clone)]
struct StartArgs {
    /// TCP port to listen on
    port: Option<u16>,

    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,

    /// TOML configuration file
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host or IP address to bind to
    #[arg(long)]
    host: Option<String>,

    /// Log level for the daemon (e.g. info, debug)
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

impl StartArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            host: self.host.clone(),
            port: self.port,
            log_level: self.log_level.clone(),
        }
    }
}

/// Parses the process arguments and runs the selected command.
pub fn run() -> Result<()> {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Start(args.start));

    match command {
        Command::Start(start) => start_command(start),
        Command::Stop => stop_command(),
        Command::Status => status_command(),
    }
}

fn start_command(start: StartArgs) -> Result<()> {
    // Resolve before forking so usage errors reach the terminal
    let config = match start.overrides().resolve() {
        Ok(config) => config,
        Err(ConfigError::MissingPort) => {
            eprintln!("Usage: tallyd [start] <PORT> [-d] [-c FILE] [--host HOST]");
            eprintln!("A port is required: pass PORT, set TALLY_PORT, or set server.port in the config file.");
            process::exit(2);
        }
        Err(e) => return Err(e).context("Invalid configuration"),
    };

    let pid_file = PidFile::default();

    if let Some(pid) = pid_file.running_pid() {
        eprintln!("Daemon is already running (PID {pid})");
        eprintln!("Use 'tallyd stop' to stop it first.");
        process::exit(1);
    }

    if start.daemon {
        // Daemonize before starting tokio runtime
        daemonize()?;
    }

    pid_file.write_current()?;

    let result = run_daemon(config);

    pid_file.remove();

    result
}

fn stop_command() -> Result<()> {
    let Some(pid) = PidFile::default().running_pid() else {
        println!("Daemon is not running.");
        return Ok(());
    };

    println!("Stopping daemon (PID {pid})...");
    stop_process(pid)?;

    let polls = STOP_WAIT.as_millis() / STOP_POLL.as_millis();
    for _ in 0..polls {
        if !is_process_running(pid) {
            println!("Daemon stopped.");
            return Ok(());
        }
        std::thread::sleep(STOP_POLL);
    }

    eprintln!("Daemon did not stop within {} seconds.", STOP_WAIT.as_secs());
    process::exit(1);
}

fn status_command() -> Result<()> {
    let pid_file = PidFile::default();
    match pid_file.running_pid() {
        Some(pid) => {
            println!("Daemon is running (PID {pid})");
            println!("PID file: {}", pid_file.path().display());
            Ok(())
        }
        None => {
            println!("Daemon is not running.");
            process::exit(1);
        }
    }
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Builds the default filter directives for a bare level or a directive list.
///
/// A bare level such as `debug` applies to the daemon's own crates; anything
/// containing `=` or `,` is taken as a full directive string.
fn log_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initializes logging. `RUST_LOG` wins over the configured level.
fn init_logging(config: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directives(&config.log_level)));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Runs the server (async entry point).
#[tokio::main]
async fn run_daemon(config: ServerConfig) -> Result<()> {
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "tally daemon starting"
    );

    let shutdown = Shutdown::new();
    let _signals = shutdown.listen_for_signals();

    let store = spawn_session_store();
    info!("Session store started");

    let server = Server::new(config, store, shutdown);

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("tally daemon stopped");
    Ok(())
}
