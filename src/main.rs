//! sysgauge - host metrics sampling and rolling history for desktop widgets
//!
//! Samples memory, network throughput and disk capacity, keeps a bounded
//! per-stream history that survives restarts, and prints ready-to-render
//! snapshots with sparklines.

mod config;
mod core;
mod error;
mod history;
mod integrations;
mod metrics;
mod ui;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::Level;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;
use crate::core::sampler::BackgroundSampler;
use crate::history::persist::FileBlobStore;
use crate::integrations::system::SystemMonitor;
use crate::metrics::{MetricKind, MetricsService};

#[derive(Parser)]
#[command(name = "sysgauge")]
#[command(author = "Sysgauge Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Host metrics sampling and rolling history for desktop widgets", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "SYSGAUGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample one metric and print its snapshot
    Show {
        kind: MetricKind,

        /// Network interface (defaults to the configured one)
        #[arg(short, long)]
        interface: Option<String>,

        /// Milliseconds between the two counter reads of a network rate
        #[arg(long, default_value = "1000")]
        settle_ms: u64,
    },

    /// Sample memory and network in the background until interrupted
    Watch {
        /// Network interface (defaults to the configured one)
        #[arg(short, long)]
        interface: Option<String>,
    },

    /// Print recorded history for a metric
    History {
        kind: MetricKind,

        #[arg(short, long)]
        interface: Option<String>,

        /// Window in minutes (defaults to the configured one)
        #[arg(short, long)]
        minutes: Option<u64>,
    },

    /// Clear recorded history for a metric
    Clear {
        kind: MetricKind,

        #[arg(short, long)]
        interface: Option<String>,
    },

    /// List network interfaces (loopback excluded)
    Interfaces,

    /// Show the size of a folder
    Folder {
        /// Folder to measure (defaults to the configured one)
        path: Option<PathBuf>,
    },

    /// Write a default configuration file
    Init {
        /// Force overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },
}

fn setup_logging(verbosity: u8) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    let log_dir = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sysgauge")
        .join("logs");

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "sysgauge.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

fn build_service(config: &Config) -> Result<Arc<MetricsService>> {
    let data_dir = config
        .general
        .data_dir
        .clone()
        .or_else(FileBlobStore::default_dir)
        .context("No data directory available for history")?;
    tracing::debug!(dir = %data_dir.display(), "history directory");

    Ok(Arc::new(MetricsService::new(
        Arc::new(SystemMonitor::new()),
        Arc::new(FileBlobStore::new(data_dir)),
        config.history_settings(),
        config.facade_settings(),
    )))
}

async fn run_watch(service: Arc<MetricsService>, interface: String, interval: Duration) -> Result<()> {
    service.select_interface(&interface);
    service.preload(&interface, Utc::now());

    let (report_tx, mut report_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle =
        BackgroundSampler::new(service, interface, interval).spawn(Some(report_tx), shutdown_rx);

    loop {
        tokio::select! {
            report = report_rx.recv() => {
                let Some(report) = report else { break };
                println!(
                    "{}  {}",
                    chrono::Local::now().format("%H:%M:%S"),
                    ui::summary_line(&report.memory, 20)
                );
                println!("          {}", ui::summary_line(&report.download, 20));
                println!("          {}", ui::summary_line(&report.upload, 20));
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let _ = shutdown_tx.send(true);
    handle.await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Keep the guard alive for the duration of the program
    let _logging_guard = setup_logging(cli.verbose)?;

    let config_path = cli.config.or_else(|| {
        let default_config = Config::default_path()?;
        if default_config.exists() {
            Some(default_config)
        } else {
            None
        }
    });

    if let Commands::Init { force } = cli.command {
        let path = config_path
            .or_else(Config::default_path)
            .context("No configuration directory available")?;
        return config::init_config(&path, force);
    }

    let config = if let Some(path) = config_path {
        Config::load(&path).with_context(|| format!("Failed to load {}", path.display()))?
    } else {
        Config::default()
    };

    let service = build_service(&config)?;
    let interface_or_default =
        |interface: Option<String>| interface.unwrap_or_else(|| config.network.interface.clone());

    match cli.command {
        Commands::Show {
            kind,
            interface,
            settle_ms,
        } => {
            let interface = interface_or_default(interface);
            if matches!(kind, MetricKind::NetworkDownload | MetricKind::NetworkUpload) {
                service.select_interface(&interface);
                service.prime_network(&interface, Utc::now());
                tokio::time::sleep(Duration::from_millis(settle_ms)).await;
            }
            let snapshot = service.get_metric(kind, &interface, Utc::now());
            ui::print_snapshot(&snapshot);
        }
        Commands::Watch { interface } => {
            let interface = interface_or_default(interface);
            run_watch(service, interface, config.sampling.interval.as_duration()).await?;
        }
        Commands::History {
            kind,
            interface,
            minutes,
        } => {
            let interface = interface_or_default(interface);
            let Some(stream_id) = kind.stream_id(&interface) else {
                println!("{} keeps no history", kind);
                return Ok(());
            };
            let window = minutes.unwrap_or(config.history.window_minutes);
            let samples = service.history().get_history(
                &stream_id,
                chrono::Duration::minutes(window as i64),
                Utc::now(),
            );
            ui::print_history(kind, &samples);
        }
        Commands::Clear { kind, interface } => {
            let interface = interface_or_default(interface);
            service.clear(kind, &interface);
            println!("Cleared {} history", kind);
        }
        Commands::Interfaces => {
            ui::print_interfaces(&service.interfaces());
        }
        Commands::Folder { path } => {
            let path = path
                .or_else(|| config.folder.path.clone())
                .context("No folder given and none configured")?;
            let size = integrations::folder::compute_directory_size(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ui::print_folder_size(&path, &size);
        }
        Commands::Init { .. } => unreachable!("handled before loading configuration"),
    }

    Ok(())
}
