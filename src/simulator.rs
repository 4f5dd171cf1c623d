//! Reactor telemetry simulator
//!
//! Produces the telemetry stream the reactor core controller publishes,
//! for driving the broker without hardware.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Topic the reactor core publishes telemetry on
pub const TELEMETRY_TOPIC: &str = "reactor/telemetry";
/// Client identifier used by the reactor core
pub const CORE_CLIENT_ID: &str = "reactor_core_001";

const TEMP_START: f64 = 25.0;
const TEMP_MIN: f64 = 20.0;
const TEMP_MAX: f64 = 85.0;
const TEMP_DRIFT: f64 = 0.5;
const ACCEL_BASE: f64 = 9.81;
const ACCEL_VARIANCE: f64 = 0.2;
const POWER_START: i32 = 75;

const WARNING_ABOVE: f64 = 70.0;
const SCRAM_ABOVE: f64 = 80.0;
const RECOVER_BELOW: f64 = 60.0;

/// Reactor operating state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReactorState {
    Normal,
    Warning,
    /// Emergency shutdown; latched
    Scram,
}

impl fmt::Display for ReactorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorState::Normal => write!(f, "NORMAL"),
            ReactorState::Warning => write!(f, "WARNING"),
            ReactorState::Scram => write!(f, "SCRAM"),
        }
    }
}

/// One telemetry sample, serialized as the JSON payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Telemetry {
    pub sample_id: u64,
    /// Core temperature in °C, 2 decimals
    pub temp: f64,
    /// Accelerometer magnitude in m/s², 3 decimals
    pub accel_mag: f64,
    pub state: ReactorState,
    /// Power output in percent
    pub power: u8,
}

impl Telemetry {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Random-walk model of the reactor core
#[derive(Debug, Clone)]
pub struct ReactorSimulator {
    sample_id: u64,
    temp: f64,
    state: ReactorState,
    power: i32,
}

impl Default for ReactorSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactorSimulator {
    pub fn new() -> Self {
        Self::with_temperature(TEMP_START)
    }

    /// Start from a given core temperature (clamped to the sensor range)
    pub fn with_temperature(temp: f64) -> Self {
        Self {
            sample_id: 0,
            temp: temp.clamp(TEMP_MIN, TEMP_MAX),
            state: ReactorState::Normal,
            power: POWER_START,
        }
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    /// Advance one sample and return its telemetry
    pub fn step<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Telemetry {
        self.temp = (self.temp + rng.gen_range(-TEMP_DRIFT..=TEMP_DRIFT)).clamp(TEMP_MIN, TEMP_MAX);
        let accel_mag = ACCEL_BASE + rng.gen_range(-ACCEL_VARIANCE..=ACCEL_VARIANCE);

        // At most one transition per sample
        match self.state {
            ReactorState::Normal if self.temp > WARNING_ABOVE => {
                self.state = ReactorState::Warning;
            }
            ReactorState::Warning if self.temp > SCRAM_ABOVE => {
                self.state = ReactorState::Scram;
            }
            ReactorState::Warning if self.temp < RECOVER_BELOW => {
                self.state = ReactorState::Normal;
            }
            _ => {}
        }

        self.power = match self.state {
            ReactorState::Normal => (self.power + rng.gen_range(-2..=2)).clamp(0, 100),
            ReactorState::Warning => (self.power - rng.gen_range(0..=5)).max(50),
            ReactorState::Scram => 0,
        };

        let telemetry = Telemetry {
            sample_id: self.sample_id,
            temp: round_to(self.temp, 2),
            accel_mag: round_to(accel_mag, 3),
            state: self.state,
            power: self.power as u8,
        };
        self.sample_id += 1;
        telemetry
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
