//! ReactorMQ - MQTT v3.1.1 broker for reactor telemetry
//!
//! A broker for the MQTT subset the reactor core and its dashboards speak:
//! CONNECT, PUBLISH (QoS 0/1), SUBSCRIBE with `+`/`#` wildcards and PING.
//! Sessions, retained messages, QoS 2 flows and authentication are out of
//! scope. Also ships a small client and a telemetry simulator.

pub mod broker;
pub mod client;
pub mod codec;
pub mod config;
pub mod protocol;
pub mod simulator;
pub mod topic;

pub use broker::{Broker, BrokerConfig, BrokerEvent};
pub use client::{Client, ClientError};
pub use config::Config;
pub use protocol::{Packet, Publish, QoS};
pub use simulator::{ReactorSimulator, ReactorState, Telemetry};
