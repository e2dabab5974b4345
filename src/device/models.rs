use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DeviceError, Result};

/// Threshold the board starts with until the user pushes a new one.
pub const DEFAULT_WARNING_THRESHOLD: i32 = 80;
/// Width of the band below the threshold reported as elevated.
pub const ELEVATED_BAND: i32 = 25;
pub const MAX_THRESHOLD_DIGITS: usize = 3;

pub fn fahrenheit(celsius: i32) -> i32 {
    (f64::from(celsius) * 1.8 + 32.0).round() as i32
}

/// Where the ambient temperature sits relative to the warning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempStatus {
    Normal,
    Elevated,
    Critical,
}

impl TempStatus {
    pub fn classify(celsius: i32, threshold: i32) -> Self {
        if celsius > threshold {
            TempStatus::Critical
        } else if celsius > threshold - ELEVATED_BAND {
            TempStatus::Elevated
        } else {
            TempStatus::Normal
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TempStatus::Normal => "normal",
            TempStatus::Elevated => "elevated",
            TempStatus::Critical => "critical",
        }
    }
}

/// One accepted GET_TEMP reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureReading {
    pub celsius: i32,
    pub fahrenheit: i32,
    pub status: TempStatus,
    pub taken_at: DateTime<Utc>,
}

impl TemperatureReading {
    pub fn new(celsius: i32, threshold: i32) -> Self {
        Self {
            celsius,
            fahrenheit: fahrenheit(celsius),
            status: TempStatus::classify(celsius, threshold),
            taken_at: Utc::now(),
        }
    }
}

/// Link health as seen by the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Connected { port: String },
    Disconnected { reason: String },
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}

/// Everything the front end needs to redraw, taken under one read lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceState {
    pub ambient: Option<TemperatureReading>,
    pub warning_threshold: i32,
    pub connection: ConnectionState,
    pub last_update: DateTime<Utc>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            ambient: None,
            warning_threshold: DEFAULT_WARNING_THRESHOLD,
            connection: ConnectionState::Connecting,
            last_update: Utc::now(),
        }
    }
}

impl DeviceState {
    pub fn record_reading(&mut self, celsius: i32) -> TemperatureReading {
        let reading = TemperatureReading::new(celsius, self.warning_threshold);
        self.ambient = Some(reading.clone());
        self.last_update = reading.taken_at;
        reading
    }

    /// Store a new threshold and re-grade the last reading against it.
    pub fn apply_threshold(&mut self, celsius: i32) {
        self.warning_threshold = celsius;
        if let Some(ambient) = self.ambient.as_mut() {
            ambient.status = TempStatus::classify(ambient.celsius, celsius);
        }
        self.last_update = Utc::now();
    }

    pub fn set_connection(&mut self, state: ConnectionState) {
        self.connection = state;
        self.last_update = Utc::now();
    }
}

/// Validate a threshold typed by the user: one to three decimal digits.
pub fn parse_threshold_input(input: &str) -> Result<i32> {
    let input = input.trim();
    if input.is_empty()
        || input.len() > MAX_THRESHOLD_DIGITS
        || !input.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(DeviceError::InvalidInput(input.to_string()));
    }
    input
        .parse()
        .map_err(|_| DeviceError::InvalidInput(input.to_string()))
}
