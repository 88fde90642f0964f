// Copyright 2024 Saorsa Labs Ltd.
//
// This Saorsa Network Software is licensed under the General Public License (GPL), version 3.
// Please see the file LICENSE-GPL, or visit <http://www.gnu.org/licenses/> for the full text.
//
// Full details available at https://saorsalabs.com/licenses

//! aprsc-dash - live status dashboard for an aprsc APRS-IS server
//!
//! Polls the server's status port and redraws a text dashboard on stdout.
//! Commands are read from stdin, one per line.
//!
//! # Usage Examples
//!
//! Watch a local server:
//! ```bash
//! aprsc-dash
//! ```
//!
//! Watch a remote server, graphing connected clients:
//! ```bash
//! aprsc-dash --base-url http://rotate.aprs2.net:14501/ --metric totals.clients
//! ```
//!
//! Commands: `graph <metric>`, `range <from> <to>`, `clear`, `zoom in`,
//! `zoom out`, `rxerr <id>`, `cert <id>`.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use aprsc_dash::render::TextRenderer;
use aprsc_dash::{Command, Dashboard, DashboardConfig, Driver, HttpFetcher};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// aprsc status dashboard
#[derive(Parser, Debug)]
#[command(name = "aprsc-dash")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server status port URL
    #[arg(short = 'u', long)]
    base_url: Option<String>,

    /// JSON config file; command line options override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seconds between successful status polls
    #[arg(long)]
    poll_interval: Option<f64>,

    /// Seconds before retrying a failed status poll
    #[arg(long)]
    retry_interval: Option<f64>,

    /// Seconds before a status request times out
    #[arg(long)]
    status_timeout: Option<f64>,

    /// Metric graphed at startup
    #[arg(short, long)]
    metric: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Draw without ANSI colors
    #[arg(long)]
    no_color: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // stdout belongs to the dashboard
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&args.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    let config = load_config(&args)?;
    info!(base_url = %config.base_url, metric = %config.initial_metric, "starting dashboard");

    let fetcher = Arc::new(HttpFetcher::new(&config).context("cannot create HTTP client")?);
    let renderer = TextRenderer::new(std::io::stdout(), !args.no_color);
    let (command_tx, command_rx) = mpsc::channel(16);
    let driver = Driver::new(Dashboard::new(config), fetcher, renderer).with_commands(command_rx);

    let shutdown = driver.shutdown_token();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
        }
        info!("Shutdown signal received");
        shutdown.cancel();
    });

    // stdin reads block; keep them off the runtime
    std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || read_commands(command_tx))
        .context("cannot spawn stdin reader")?;

    driver.run().await;
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<DashboardConfig> {
    let mut config = match &args.config {
        Some(path) => DashboardConfig::from_file(path)
            .with_context(|| format!("cannot load config from {}", path.display()))?,
        None => DashboardConfig::default(),
    };

    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(secs) = args.poll_interval {
        config.poll_interval = seconds("--poll-interval", secs)?;
    }
    if let Some(secs) = args.retry_interval {
        config.retry_interval = seconds("--retry-interval", secs)?;
    }
    if let Some(secs) = args.status_timeout {
        config.status_timeout = seconds("--status-timeout", secs)?;
    }
    if let Some(metric) = &args.metric {
        config.initial_metric = metric.clone();
    }

    config.validate()?;
    Ok(config)
}

fn seconds(flag: &str, secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("{flag}: invalid duration {secs}"))
}

/// Forward stdin lines as commands until stdin closes or the driver stops
fn read_commands(commands: mpsc::Sender<Command>) {
    for line in std::io::stdin().lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to read stdin: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if commands.blocking_send(command).is_err() {
                    break;
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
    debug!("command input closed");
}
