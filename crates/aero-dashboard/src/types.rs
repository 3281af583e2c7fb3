//! Realtime channel and REST API types.

use aero_core::{Reading, SensorEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// WebSocket frame envelope: `{"event": <name>, "data": <payload>}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ChannelMessage {
    /// Device → server.
    #[serde(rename = "sensorData")]
    SensorData(SensorEvent),
    /// Server → viewer, the inbound payload echoed verbatim.
    #[serde(rename = "newReading")]
    NewReading(SensorEvent),
    /// Server → sender of a frame that could not be handled.
    #[serde(rename = "error")]
    Error { message: String },
}

impl ChannelMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// Response for `GET /api/latest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestReading {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
    /// Vapour pressure deficit in kPa.
    pub vpd_kpa: f64,
}

impl From<&Reading> for LatestReading {
    fn from(reading: &Reading) -> Self {
        Self {
            temperature: reading.temperature,
            humidity: reading.humidity,
            timestamp: reading.timestamp,
            vpd_kpa: reading.vpd_kpa(),
        }
    }
}
