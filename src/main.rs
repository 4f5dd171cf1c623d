//! ReactorMQ - MQTT v3.1.1 broker for reactor telemetry
//!
//! Usage:
//!   reactormq [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>    Configuration file path
//!   -b, --bind <ADDR>      Bind address (default: 0.0.0.0:1883)
//!   --max-packet-size <N>  Maximum packet size (default: 268435455)
//!   -l, --log-level        Log level (error, warn, info, debug, trace)
//!   -h, --help             Print help

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use reactormq::broker::Broker;
use reactormq::config::Config;

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    /// Only errors
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    #[default]
    Info,
    /// Debug messages
    Debug,
    /// Trace messages (very verbose)
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// ReactorMQ - MQTT broker for reactor telemetry
#[derive(Parser, Debug)]
#[command(name = "reactormq")]
#[command(version)]
#[command(about = "MQTT v3.1.1 broker relaying reactor telemetry")]
struct Args {
    /// Configuration file path (TOML format)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// TCP bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Maximum packet size in bytes
    #[arg(long)]
    max_packet_size: Option<usize>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, value_enum)]
    log_level: Option<LogLevel>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => Config::load(path),
        None => Config::from_env(),
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }
    };

    // CLI args override file config
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(max_packet_size) = args.max_packet_size {
        config.limits.max_packet_size = max_packet_size;
    }
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    // Setup logging - CLI overrides config, config overrides default (info)
    let log_level = match args.log_level {
        Some(level) => level.to_tracing_level(),
        None => config.log.tracing_level().unwrap_or(Level::INFO),
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(path) = &args.config {
        info!("Loaded configuration from {:?}", path);
    }

    let broker_config = config.broker_config();
    info!("Starting ReactorMQ MQTT Broker");
    info!("  Bind address: {}", broker_config.bind_addr);
    info!("  Max packet size: {} bytes", broker_config.max_packet_size);

    let broker = Arc::new(Broker::new(broker_config));
    let mut server = tokio::spawn({
        let broker = broker.clone();
        async move { broker.run().await }
    });

    tokio::select! {
        result = &mut server => {
            // Only returns early if the listener could not be set up
            result??;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    info!("Shutdown requested, no longer accepting connections");
    broker.shutdown();
    server.await??;

    let active = broker.active_handlers();
    if active > 0 {
        info!(
            "Waiting for {} connection(s) to close (Ctrl+C again to exit now)",
            active
        );
        tokio::select! {
            _ = broker.wait_idle() => info!("All connections closed"),
            _ = tokio::signal::ctrl_c() => {
                warn!("Exiting with {} connection(s) open", broker.active_handlers());
            }
        }
    }

    Ok(())
}
