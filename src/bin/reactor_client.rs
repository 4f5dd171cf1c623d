//! reactor-client - talk to a ReactorMQ broker
//!
//! Usage:
//!   reactor-client [OPTIONS] <COMMAND>
//!
//! Commands:
//!   sim      Publish simulated reactor telemetry
//!   watch    Subscribe and print messages
//!   publish  Publish one message
//!   ping     Check the broker is responding

use std::time::{Duration, Instant};

use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use reactormq::client::Client;
use reactormq::protocol::QoS;
use reactormq::simulator::{ReactorSimulator, ReactorState, CORE_CLIENT_ID, TELEMETRY_TOPIC};

/// Log level for CLI
#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
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

#[derive(Parser, Debug)]
#[command(name = "reactor-client")]
#[command(version)]
#[command(about = "Publish and watch reactor telemetry over MQTT")]
struct Args {
    /// Broker address
    #[arg(short, long, default_value = "127.0.0.1:1883")]
    broker: String,

    /// Log level
    #[arg(short, long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish simulated reactor telemetry
    Sim {
        #[arg(long, default_value = TELEMETRY_TOPIC)]
        topic: String,

        #[arg(long, default_value = CORE_CLIENT_ID)]
        client_id: String,

        /// Milliseconds between samples
        #[arg(long, default_value_t = 1000, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: u64,

        #[arg(long, default_value_t = 1, value_parser = parse_qos)]
        qos: u8,

        /// Stop after this many samples
        #[arg(long)]
        count: Option<u64>,

        /// Initial core temperature in °C
        #[arg(long)]
        start_temp: Option<f64>,

        /// RNG seed for a reproducible run
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Subscribe and print every message received
    Watch {
        /// Topic filters (repeatable)
        #[arg(short, long = "filter", default_value = "reactor/#")]
        filters: Vec<String>,

        #[arg(long, default_value = "reactor_dashboard")]
        client_id: String,

        #[arg(long, default_value_t = 0, value_parser = parse_qos)]
        qos: u8,
    },
    /// Publish one message
    Publish {
        topic: String,
        message: String,

        #[arg(long, default_value = "reactor_cli")]
        client_id: String,

        #[arg(long, default_value_t = 0, value_parser = parse_qos)]
        qos: u8,
    },
    /// Round-trip a PINGREQ
    Ping {
        #[arg(long, default_value = "reactor_ping")]
        client_id: String,
    },
}

fn parse_qos(s: &str) -> Result<u8, String> {
    match s.parse::<u8>() {
        Ok(qos) if qos <= 2 => Ok(qos),
        _ => Err(format!("invalid QoS '{}' (expected 0, 1 or 2)", s)),
    }
}

fn qos(level: u8) -> QoS {
    QoS::from_u8(level).unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level.to_tracing_level())
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Sim {
            topic,
            client_id,
            interval_ms,
            qos: level,
            count,
            start_temp,
            seed,
        } => {
            let mut client = Client::connect(&args.broker, &client_id).await?;
            info!("Connected to {} as {}", args.broker, client_id);
            info!("Publishing to {} every {}ms", topic, interval_ms);

            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let mut sim = match start_temp {
                Some(temp) => ReactorSimulator::with_temperature(temp),
                None => ReactorSimulator::new(),
            };
            let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
            let mut published = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = tokio::signal::ctrl_c() => break,
                }

                let previous = sim.state();
                let telemetry = sim.step(&mut rng);
                if telemetry.state != previous {
                    match telemetry.state {
                        ReactorState::Scram => warn!(
                            "[{}] EMERGENCY SCRAM (temp={:.2}°C)",
                            telemetry.sample_id, telemetry.temp
                        ),
                        state => warn!(
                            "[{}] State changed to {} (temp={:.2}°C)",
                            telemetry.sample_id, state, telemetry.temp
                        ),
                    }
                }

                client
                    .publish(&topic, telemetry.to_json()?, qos(level))
                    .await?;
                published += 1;

                if telemetry.sample_id % 10 == 0 {
                    info!(
                        "[{:4}] Temp={:.1}°C  Accel={:.2}  State={:8}  Power={:3}%",
                        telemetry.sample_id,
                        telemetry.temp,
                        telemetry.accel_mag,
                        telemetry.state.to_string(),
                        telemetry.power
                    );
                }
                if count.is_some_and(|count| published >= count) {
                    break;
                }
            }

            info!("Published {} samples", published);
            client.disconnect().await?;
        }
        Command::Watch {
            filters,
            client_id,
            qos: level,
        } => {
            let mut client = Client::connect(&args.broker, &client_id).await?;
            let requested: Vec<(&str, QoS)> =
                filters.iter().map(|f| (f.as_str(), qos(level))).collect();
            let granted = client.subscribe(&requested).await?;
            info!("Subscribed to {:?} (granted {:?})", filters, granted);

            let started = Instant::now();
            loop {
                let publish = tokio::select! {
                    result = client.recv() => result?,
                    _ = tokio::signal::ctrl_c() => break,
                };
                let Some(publish) = publish else {
                    warn!("Broker closed the connection");
                    break;
                };

                let payload = match serde_json::from_slice::<serde_json::Value>(&publish.payload) {
                    Ok(json) => serde_json::to_string_pretty(&json)?,
                    Err(_) => String::from_utf8_lossy(&publish.payload).into_owned(),
                };
                println!(
                    "[{:>8.3}s] {} ({:?})\n{}",
                    started.elapsed().as_secs_f64(),
                    publish.topic,
                    publish.qos,
                    payload
                );
            }
        }
        Command::Publish {
            topic,
            message,
            client_id,
            qos: level,
        } => {
            let mut client = Client::connect(&args.broker, &client_id).await?;
            client.publish(&topic, message, qos(level)).await?;
            info!("Published to {}", topic);
            client.disconnect().await?;
        }
        Command::Ping { client_id } => {
            let mut client = Client::connect(&args.broker, &client_id).await?;
            let started = Instant::now();
            client.ping().await?;
            println!("PINGRESP from {} in {:?}", args.broker, started.elapsed());
            client.disconnect().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sim_rejects_zero_interval() {
        let result = Args::try_parse_from(["reactor-client", "sim", "--interval-ms", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_sim_defaults() {
        let args = Args::try_parse_from(["reactor-client", "sim"]).unwrap();
        match args.command {
            Command::Sim {
                interval_ms,
                qos,
                topic,
                ..
            } => {
                assert_eq!(interval_ms, 1000);
                assert_eq!(qos, 1);
                assert_eq!(topic, TELEMETRY_TOPIC);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_qos_range() {
        assert_eq!(parse_qos("2"), Ok(2));
        assert!(parse_qos("3").is_err());
        assert!(parse_qos("x").is_err());
    }
}
