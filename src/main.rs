pub mod config;
pub mod display;
pub mod instruction;
pub mod lifecycle;
pub mod mqtt;
pub mod sensor;

use crate::config::{Cli, SensorConfig};
use crate::lifecycle::{settle_sensor_mode, ConsolePrompt, SensorAgent};
use crate::mqtt::ConnectionError;
use crate::sensor::Presenter;
use clap::Parser;
use color_eyre::Result;
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LOG_DIR: &str = "logs";
const LOG_FILE: &str = "sensor_log.log";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    setup()?;

    info!("New program execution. User provided arguments: {:?}", cli);
    let config = match SensorConfig::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let mode = config.mode;
    let settled =
        tokio::task::spawn_blocking(move || settle_sensor_mode(mode, &mut ConsolePrompt)).await??;
    let config = match settled {
        Some(mode) => config.with_mode(mode),
        None => {
            println!("The program will close");
            return Ok(ExitCode::SUCCESS);
        }
    };
    config.log_summary();

    let interrupt = CancellationToken::new();
    watch_ctrl_c(interrupt.clone());

    let agent = SensorAgent::configure(config, interrupt);
    let agent = match agent.connect().await {
        Ok(agent) => agent,
        Err(ConnectionError::Interrupted { .. }) => {
            println!("The program will close");
            return Ok(ExitCode::SUCCESS);
        }
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let terminated = agent
        .start(Box::new(ConsolePrompt), Arc::new(Presenter))
        .run_until_terminated()
        .await;
    info!("Exited, channel closed cleanly: {}", terminated.closed_cleanly());

    Ok(ExitCode::SUCCESS)
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env()?;
    Ok(())
}

/// Logs go to an append-only file so stdout stays with the operator
fn setup_logging_env() -> Result<()> {
    let log_dir = PathBuf::from(LOG_DIR);
    fs::create_dir_all(&log_dir)?;
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE))?;

    FmtSubscriber::builder()
        .with_env_filter(log_filter(std::env::var("RUST_LOG").ok().as_deref()))
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    Ok(())
}

/// Falls back to `info` when the directive is missing or malformed
fn log_filter(directive: Option<&str>) -> EnvFilter {
    directive
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn watch_ctrl_c(interrupt: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl+C received, terminating");
                interrupt.cancel();
            }
            Err(e) => warn!("Unable to listen for Ctrl+C: {}", e),
        }
    });
}
