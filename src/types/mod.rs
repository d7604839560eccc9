//! Readings and snapshots shared by the producers, the aggregator and the
//! radio payload.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::time::Instant;

/// The sensors carried by the node, in payload order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorId {
    Mpu6050,
    Bmp180,
    Neo6m,
}

impl SensorId {
    pub const ALL: [SensorId; 3] = [SensorId::Mpu6050, SensorId::Bmp180, SensorId::Neo6m];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::Mpu6050 => "mpu6050",
            SensorId::Bmp180 => "bmp180",
            SensorId::Neo6m => "neo6m",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Monotonic instant for ordering and debounce, wall-clock time for the payload
#[derive(Clone, Copy, Debug)]
pub struct Timestamp {
    pub monotonic: Instant,
    pub wall: DateTime<Utc>,
}

impl Timestamp {
    pub fn now() -> Self {
        Self {
            monotonic: Instant::now(),
            wall: Utc::now(),
        }
    }

    pub fn iso(&self) -> String {
        iso8601(&self.wall)
    }
}

/// ISO-8601 UTC with microseconds and a `Z` suffix
pub fn iso8601(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Axes3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn rounded(&self, decimals: i32) -> Self {
        Self::new(round_to(self.x, decimals), round_to(self.y, decimals), round_to(self.z, decimals))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attitude {
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct InertialData {
    pub accel_g: Axes3,
    pub gyro_dps: Axes3,
    pub attitude_deg: Attitude,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BarometricData {
    pub temperature_c: f64,
    pub pressure_hpa: f64,
    /// The record as received
    pub raw: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PositionData {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub fix_time: Option<String>,
    /// Last accepted NMEA sentence
    pub raw: String,
}

/// Measurement fields, one variant per sensor kind
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorData {
    Inertial(InertialData),
    Barometric(BarometricData),
    Position(PositionData),
}

/// One sample from one producer
#[derive(Clone, Debug)]
pub struct Reading {
    pub sensor: SensorId,
    pub stamp: Timestamp,
    pub data: SensorData,
    pub synthetic: bool,
}

impl Reading {
    pub fn new(sensor: SensorId, data: SensorData, synthetic: bool) -> Self {
        Self {
            sensor,
            stamp: Timestamp::now(),
            data,
            synthetic,
        }
    }
}

#[derive(Serialize)]
struct ReadingFields<'a> {
    timestamp: String,
    #[serde(flatten)]
    data: &'a SensorData,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    synthetic: bool,
}

impl Serialize for Reading {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        ReadingFields {
            timestamp: self.stamp.iso(),
            data: &self.data,
            synthetic: self.synthetic,
        }
        .serialize(serializer)
    }
}

/// Latest reading per expected sensor at one emission tick
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub reported_at: DateTime<Utc>,
    pub sensors: Vec<(SensorId, Option<Reading>)>,
}

impl Snapshot {
    pub fn get(&self, sensor: SensorId) -> Option<&Reading> {
        self.sensors
            .iter()
            .find(|(id, _)| *id == sensor)
            .and_then(|(_, reading)| reading.as_ref())
    }

    pub fn to_json_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

struct SensorMap<'a>(&'a [(SensorId, Option<Reading>)]);

impl Serialize for SensorMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, reading) in self.0 {
            map.serialize_entry(id.as_str(), reading)?;
        }
        map.end()
    }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("reported_at", &iso8601(&self.reported_at))?;
        map.serialize_entry("sensors", &SensorMap(&self.sensors))?;
        map.end()
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
