//! Main entry point for the engine launcher
//!
//! Starts an engine executable, keeps it running until it exits or Ctrl+C
//! arrives, then shuts it down with the usual grace period.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

use shared::{link_info, link_warn, logging, Component, TerminateConfig};
use supervisor::{OutputMode, Process};

/// Launch and supervise an engine executable
#[derive(Parser)]
#[command(name = "engine-launcher")]
#[command(about = "Start an engine executable and stop it gracefully on Ctrl+C")]
pub struct Args {
    /// Executable to launch
    #[arg(long)]
    pub path: PathBuf,

    /// Working directory for the child (defaults to the current one)
    #[arg(long)]
    pub working_dir: Option<PathBuf>,

    /// Grace period before a forced kill, in milliseconds (overrides ENGINE_LINK_GRACE_PERIOD_MS)
    #[arg(long)]
    pub grace_ms: Option<u64>,

    /// Child output handling (inherit, discard, log)
    #[arg(long, default_value = "inherit")]
    pub output: OutputMode,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Arguments passed to the executable
    #[arg(last = true)]
    pub args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    logging::init_tracing(Component::Supervisor, Some(&args.log_level));
    logging::log_startup(Component::Supervisor, "engine launcher");

    let mut terminate = TerminateConfig::from_env()?;
    if let Some(ms) = args.grace_ms {
        terminate = terminate.with_grace_period(Duration::from_millis(ms));
    }

    let process = Process::with_config(terminate).with_output(args.output);
    let working_dir = args.working_dir.clone().unwrap_or_default();
    if let Err(e) = process.start(&args.path, args.args.clone(), &working_dir).await {
        logging::log_error(Component::Supervisor, "Launch", &e);
        return Err(e.into());
    }
    link_info!(Component::Supervisor, "{}", process.describe().await);

    let mut ticker = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !process.is_running().await {
                    link_warn!(Component::Supervisor, "Engine exited on its own");
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                link_info!(Component::Supervisor, "Received Ctrl+C");
                break;
            }
        }
    }

    process.terminate().await?;
    logging::log_shutdown(Component::Supervisor, "engine stopped");
    Ok(())
}
