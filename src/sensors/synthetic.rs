//! Deterministic stand-ins used when a device is missing at startup.
//! Every reading they produce is flagged synthetic.

use super::SensorSource;
use crate::error::SensorResult;
use crate::types::{round_to, Attitude, Axes3, BarometricData, InertialData, PositionData, SensorData, SensorId};
use chrono::Utc;
use std::time::Duration;

/// Gentle wobble around level, 1 g on z
pub struct SyntheticInertial {
    phase: f64,
    cadence: Duration,
}

impl SyntheticInertial {
    pub fn new(cadence: Duration) -> Self {
        SyntheticInertial { phase: 0.0, cadence }
    }
}

impl SensorSource for SyntheticInertial {
    fn sensor(&self) -> SensorId {
        SensorId::Mpu6050
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        let (s, c) = self.phase.sin_cos();
        self.phase += 0.05;
        Ok(Some(SensorData::Inertial(InertialData {
            accel_g: Axes3::new(0.01 * s, 0.01 * c, 1.0).rounded(4),
            gyro_dps: Axes3::new(0.1 * s, 0.1 * c, 0.0).rounded(3),
            attitude_deg: Attitude::default(),
        })))
    }
}

/// Slowly warming room at sea level
pub struct SyntheticBarometric {
    tick: u64,
    cadence: Duration,
}

impl SyntheticBarometric {
    pub fn new(cadence: Duration) -> Self {
        SyntheticBarometric { tick: 0, cadence }
    }
}

impl SensorSource for SyntheticBarometric {
    fn sensor(&self) -> SensorId {
        SensorId::Bmp180
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        let t = self.tick as f64;
        self.tick += 1;
        let temperature_c = round_to(25.0 + 0.01 * t, 2);
        let pressure_hpa = round_to(1013.25 + 0.02 * t, 2);
        Ok(Some(SensorData::Barometric(BarometricData {
            temperature_c,
            pressure_hpa,
            raw: format!("T={:.2},P={:.2}", temperature_c, pressure_hpa),
        })))
    }
}

/// Slow drift to the south-west
pub struct SyntheticPosition {
    tick: u64,
    cadence: Duration,
}

impl SyntheticPosition {
    pub fn new(cadence: Duration) -> Self {
        SyntheticPosition { tick: 0, cadence }
    }
}

impl SensorSource for SyntheticPosition {
    fn sensor(&self) -> SensorId {
        SensorId::Neo6m
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        let t = self.tick as f64;
        self.tick += 1;
        Ok(Some(SensorData::Position(PositionData {
            latitude: round_to(25.651 + 1e-5 * t, 6),
            longitude: round_to(-100.289 - 1e-5 * t, 6),
            altitude: Some(512.0),
            fix_time: Some(Utc::now().format("%H:%M:%S").to_string()),
            raw: "$GPGGA,SYNTHETIC".to_string(),
        })))
    }
}
