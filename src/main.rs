//! doorwatch - main entry point
//!
//! Wires configuration, logging, process signals and the monitor control
//! loop together, and maps fatal errors to distinct exit codes.

use clap::{Parser, Subcommand};
use doorwatch::config::MonitorConfig;
use doorwatch::error::EXIT_FAILURE;
use doorwatch::monitor::Monitor;
use doorwatch::observability::init_default_logging;
use doorwatch::transport::mqtt::MqttConnector;
use doorwatch::CancelScope;
use std::path::PathBuf;
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};

/// Fleet monitor for MQTT door-access controllers
#[derive(Parser)]
#[command(name = "doorwatch")]
#[command(about = "Fleet monitor for MQTT door-access controllers")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the broker URL from the config file
    #[arg(short = 'm', long)]
    broker_url: Option<String>,

    /// Override the identity used to authenticate with the broker
    #[arg(short = 'u', long)]
    identity: Option<String>,

    /// Broker password; falls back to the config's secret_env variable
    #[arg(short = 'p', long, env = "DOORWATCH_SECRET")]
    secret: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor
    Run,
    /// Validate configuration
    Config {
        /// Show the resolved configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting doorwatch v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(code) => process::exit(code),
    };
    config.apply_overrides(cli.broker_url, cli.identity, cli.secret);
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        process::exit(doorwatch::MonitorError::Config(e).exit_code());
    }

    match cli.command {
        Commands::Run => {
            if let Err(e) = run_monitor(config).await {
                error!("Monitor failed: {}", e);
                process::exit(e.exit_code());
            }
        }
        Commands::Config { show } => {
            if show {
                match toml::to_string_pretty(&config) {
                    Ok(rendered) => println!("{rendered}"),
                    Err(e) => {
                        error!("Failed to render configuration: {}", e);
                        process::exit(EXIT_FAILURE);
                    }
                }
            }
            info!("Configuration validation complete");
        }
    }

    info!("Application shutdown complete");
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<MonitorConfig, i32> {
    let path = match config_path {
        Some(path) => path.clone(),
        None => {
            // Try default locations
            let default_paths = ["doorwatch.toml", "config/doorwatch.toml"];
            match default_paths.iter().map(PathBuf::from).find(|p| p.exists()) {
                Some(path) => path,
                None => {
                    error!(
                        "No configuration file found. Provide one with -c/--config or create doorwatch.toml"
                    );
                    return Err(EXIT_FAILURE);
                }
            }
        }
    };

    info!("Loading configuration from: {}", path.display());
    MonitorConfig::load_from_file(&path).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        doorwatch::MonitorError::Config(e).exit_code()
    })
}

async fn run_monitor(config: MonitorConfig) -> Result<(), doorwatch::MonitorError> {
    let cancel = CancelScope::new();

    // SIGINT/SIGTERM fire the cancellation scope; SIGHUP queues a reload
    let mut sigint =
        signal(SignalKind::interrupt()).map_err(doorwatch::MonitorError::Signals)?;
    let mut sigterm =
        signal(SignalKind::terminate()).map_err(doorwatch::MonitorError::Signals)?;
    let mut sighup = signal(SignalKind::hangup()).map_err(doorwatch::MonitorError::Signals)?;

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully"),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully"),
        }
        signal_cancel.cancel();
    });

    let (reload_tx, reload_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!("Received SIGHUP, scheduling reload");
            if reload_tx.send(()).await.is_err() {
                break;
            }
        }
    });

    let connector = MqttConnector::new(config.mqtt.clone());
    let monitor = Monitor::new(config, connector, cancel);
    monitor.run(reload_rx).await
}
