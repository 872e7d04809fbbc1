use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VelocityError;

pub const DISPLAY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    #[serde(rename = "x_axis")]
    pub x: f64,
    #[serde(rename = "y_axis")]
    pub y: f64,
    pub battery: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
}

/// All three fields are written together. A record with any field missing is
/// the "no prior record" sentinel and [`LastState::baseline`] returns `None`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LastState {
    #[serde(rename = "lastX", default)]
    pub last_x: Option<f64>,
    #[serde(rename = "lastY", default)]
    pub last_y: Option<f64>,
    #[serde(rename = "lastTime", default)]
    pub last_time: Option<i64>,
}

impl LastState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn at(x: f64, y: f64, time_secs: i64) -> Self {
        Self {
            last_x: Some(x),
            last_y: Some(y),
            last_time: Some(time_secs),
        }
    }

    pub fn baseline(&self) -> Option<Baseline> {
        match (self.last_x, self.last_y, self.last_time) {
            (Some(x), Some(y), Some(time_secs)) => Some(Baseline { x, y, time_secs }),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.baseline().is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub x: f64,
    pub y: f64,
    pub time_secs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VelocityResult {
    #[serde(rename = "x_axis")]
    pub x: f64,
    #[serde(rename = "y_axis")]
    pub y: f64,
    #[serde(rename = "totalVelocity")]
    pub total_velocity: Option<f64>,
    pub device_id: String,
    pub battery: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    pub time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPoint {
    pub device_id: String,
    pub timestamp_micros: i64,
    pub x_axis: f64,
    pub y_axis: f64,
    pub total_velocity: Option<f64>,
    pub battery: f64,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub geo: bool,
    pub side_table: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            geo: true,
            side_table: false,
        }
    }
}

/// What to do when a steady-state reading arrives in the same second as the
/// baseline (or earlier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroIntervalPolicy {
    /// Report no velocity.
    #[default]
    Null,
    /// Divide by one second instead.
    Clamp,
}

impl FromStr for ZeroIntervalPolicy {
    type Err = VelocityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "null" => Ok(Self::Null),
            "clamp" => Ok(Self::Clamp),
            other => Err(VelocityError::UnknownZeroIntervalPolicy(other.to_string())),
        }
    }
}

impl fmt::Display for ZeroIntervalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Clamp => f.write_str("clamp"),
        }
    }
}

pub fn format_display_time(at: DateTime<Utc>) -> String {
    at.format(DISPLAY_TIME_FORMAT).to_string()
}
