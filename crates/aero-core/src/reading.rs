//! Sensor readings.
//!
//! Two views of the same sample:
//! - [`SensorEvent`] is what a device pushed, kept as the original JSON object
//!   so it can be rebroadcast unmodified.
//! - [`Reading`] is the normalized document that gets persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};

/// Inbound sensor payload.
///
/// `temperature` and `humidity` are required numbers. `timestamp` is optional
/// and accepts either an RFC 3339 string or Unix milliseconds. Any other
/// fields are carried along untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub struct SensorEvent {
    temperature: f64,
    humidity: f64,
    timestamp: Option<DateTime<Utc>>,
    payload: Map<String, Value>,
}

impl SensorEvent {
    /// Build an event from measured values (device side).
    pub fn new(temperature: f64, humidity: f64) -> Self {
        let mut payload = Map::new();
        payload.insert("temperature".to_string(), number(temperature));
        payload.insert("humidity".to_string(), number(humidity));
        Self {
            temperature,
            humidity,
            timestamp: None,
            payload,
        }
    }

    /// Attach an explicit measurement timestamp.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.payload.insert(
            "timestamp".to_string(),
            Value::String(timestamp.to_rfc3339()),
        );
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach an extra payload field.
    ///
    /// Fields the event itself interprets are left alone.
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if !matches!(key.as_str(), "temperature" | "humidity" | "timestamp") {
            self.payload.insert(key, value);
        }
        self
    }

    /// Parse an event from a raw JSON object.
    pub fn from_payload(payload: Map<String, Value>) -> Result<Self> {
        let temperature = required_number(&payload, "temperature")?;
        let humidity = required_number(&payload, "humidity")?;
        let timestamp = match payload.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_timestamp(value)?),
        };

        Ok(Self {
            temperature,
            humidity,
            timestamp,
            payload,
        })
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Timestamp supplied by the device, if any.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// The payload exactly as received.
    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}

impl TryFrom<Map<String, Value>> for SensorEvent {
    type Error = CoreError;

    fn try_from(payload: Map<String, Value>) -> Result<Self> {
        Self::from_payload(payload)
    }
}

impl From<SensorEvent> for Map<String, Value> {
    fn from(event: SensorEvent) -> Self {
        event.payload
    }
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn required_number(payload: &Map<String, Value>, field: &str) -> Result<f64> {
    match payload.get(field) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| CoreError::InvalidPayload(format!("{field} is not representable"))),
        Some(other) => Err(CoreError::InvalidPayload(format!(
            "{field} must be a number, got {other}"
        ))),
        None => Err(CoreError::InvalidPayload(format!("missing field {field}"))),
    }
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| CoreError::InvalidTimestamp(format!("{s}: {e}"))),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| CoreError::InvalidTimestamp(n.to_string())),
        other => Err(CoreError::InvalidTimestamp(other.to_string())),
    }
}

/// Persisted reading document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    /// Normalize an event, defaulting the timestamp to `received_at`.
    pub fn from_event(event: &SensorEvent, received_at: DateTime<Utc>) -> Self {
        Self {
            temperature: event.temperature,
            humidity: event.humidity,
            timestamp: event.timestamp.unwrap_or(received_at),
        }
    }

    /// Vapour pressure deficit in kPa.
    pub fn vpd_kpa(&self) -> f64 {
        vapour_pressure_deficit(self.temperature, self.humidity)
    }
}

/// Vapour pressure deficit (kPa) from temperature (°C) and relative humidity (%).
///
/// Uses the Tetens approximation for saturation vapour pressure.
pub fn vapour_pressure_deficit(temperature_c: f64, humidity_pct: f64) -> f64 {
    let svp = 0.6108 * (17.27 * temperature_c / (temperature_c + 237.3)).exp();
    let avp = (humidity_pct / 100.0) * svp;
    svp - avp
}
