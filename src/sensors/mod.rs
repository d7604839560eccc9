//! Sensor sources and startup capability detection.

pub mod barometric;
#[cfg(feature = "hardware")]
pub mod hardware;
pub mod inertial;
pub mod position;
pub mod retry;
pub mod serial;
pub mod synthetic;

use crate::config::NodeConfig;
use crate::error::SensorResult;
use crate::types::{SensorData, SensorId};
use log::{info, warn};
use serde::Serialize;
use std::time::Duration;

/// A device the producer loop can sample.
///
/// `acquire` returns `Ok(None)` when the device had nothing this cycle
/// (blank line, unsupported sentence). An `Err` ends the producer.
pub trait SensorSource: Send {
    fn sensor(&self) -> SensorId;

    fn cadence(&self) -> Duration;

    fn is_synthetic(&self) -> bool {
        false
    }

    /// Blocking one-time setup before the first sample
    fn prepare(&mut self) -> SensorResult<()> {
        Ok(())
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>>;

    /// Release the device. Called exactly once per producer, but must be
    /// safe to call again.
    fn close(&mut self) {}
}

/// Outcome of probing one device at startup
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "driver", content = "reason", rename_all = "lowercase")]
pub enum Capability {
    Real,
    Synthetic(String),
}

impl Capability {
    pub fn is_real(&self) -> bool {
        matches!(self, Capability::Real)
    }
}

pub struct SelectedSource {
    pub sensor: SensorId,
    pub capability: Capability,
    pub source: Box<dyn SensorSource>,
}

impl SelectedSource {
    pub fn real(source: Box<dyn SensorSource>) -> Self {
        SelectedSource {
            sensor: source.sensor(),
            capability: Capability::Real,
            source,
        }
    }

    pub fn synthetic(source: Box<dyn SensorSource>, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        warn!(target: source.sensor().as_str(), "Device unavailable ({}), using synthetic data", reason);
        SelectedSource {
            sensor: source.sensor(),
            capability: Capability::Synthetic(reason),
            source,
        }
    }
}

#[cfg(feature = "hardware")]
fn probe_inertial(config: &NodeConfig) -> SelectedSource {
    use inertial::InertialSource;

    match hardware::Mpu6050Bus::open(config.inertial.i2c_bus, config.inertial.address) {
        Ok(bus) => SelectedSource::real(Box::new(InertialSource::new(bus, &config.inertial))),
        Err(e) => SelectedSource::synthetic(
            Box::new(synthetic::SyntheticInertial::new(config.inertial.sample_interval())),
            e.to_string(),
        ),
    }
}

#[cfg(feature = "hardware")]
fn probe_barometric(config: &NodeConfig) -> SelectedSource {
    match serial::open_serial(&config.barometric) {
        Ok(lines) => SelectedSource::real(Box::new(barometric::BarometricSource::new(lines, &config.barometric))),
        Err(e) => SelectedSource::synthetic(Box::new(synthetic::SyntheticBarometric::new(SYNTHETIC_BARO_PERIOD)), e.to_string()),
    }
}

#[cfg(feature = "hardware")]
fn probe_position(config: &NodeConfig) -> SelectedSource {
    match serial::open_serial(&config.position) {
        Ok(lines) => SelectedSource::real(Box::new(position::PositionSource::new(lines, &config.position))),
        Err(e) => SelectedSource::synthetic(Box::new(synthetic::SyntheticPosition::new(SYNTHETIC_GPS_PERIOD)), e.to_string()),
    }
}

#[cfg(not(feature = "hardware"))]
const NO_HARDWARE: &str = "built without hardware support";

#[cfg(not(feature = "hardware"))]
fn probe_inertial(config: &NodeConfig) -> SelectedSource {
    SelectedSource::synthetic(
        Box::new(synthetic::SyntheticInertial::new(config.inertial.sample_interval())),
        NO_HARDWARE,
    )
}

#[cfg(not(feature = "hardware"))]
fn probe_barometric(_config: &NodeConfig) -> SelectedSource {
    SelectedSource::synthetic(Box::new(synthetic::SyntheticBarometric::new(SYNTHETIC_BARO_PERIOD)), NO_HARDWARE)
}

#[cfg(not(feature = "hardware"))]
fn probe_position(_config: &NodeConfig) -> SelectedSource {
    SelectedSource::synthetic(Box::new(synthetic::SyntheticPosition::new(SYNTHETIC_GPS_PERIOD)), NO_HARDWARE)
}

const SYNTHETIC_BARO_PERIOD: Duration = Duration::from_millis(200);
const SYNTHETIC_GPS_PERIOD: Duration = Duration::from_millis(500);

/// Probe every device once and pick a real or synthetic source for each
pub fn detect_sources(config: &NodeConfig) -> Vec<SelectedSource> {
    let sources = vec![probe_inertial(config), probe_barometric(config), probe_position(config)];
    for selected in &sources {
        info!(
            target: "system",
            "{}: {}",
            selected.sensor,
            match &selected.capability {
                Capability::Real => "hardware",
                Capability::Synthetic(_) => "synthetic",
            }
        );
    }
    sources
}
