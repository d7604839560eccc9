//! BMP180 pressure/temperature over a serial bridge.
//!
//! The bridge prints one record per line, `T=<celsius>,P=<hPa>`. Keys are
//! case-insensitive and `temp`/`pressure` are accepted as long forms.

use super::serial::LineSource;
use super::SensorSource;
use crate::config::SerialSensorConfig;
use crate::error::{SensorError, SensorResult};
use crate::types::{BarometricData, SensorData, SensorId};
use log::debug;
use std::time::Duration;

/// Parse one bridge record. `None` for blank or malformed lines.
pub fn parse_record(line: &str) -> Option<BarometricData> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut temperature = None;
    let mut pressure = None;
    for field in line.split([',', ';']).map(str::trim).filter(|f| !f.is_empty()) {
        let (key, value) = field.split_once(['=', ':'])?;
        let value: f64 = value.trim().parse().ok()?;
        if !value.is_finite() {
            return None;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "t" | "temp" | "temperature" => temperature = Some(value),
            "p" | "press" | "pressure" => pressure = Some(value),
            _ => {}
        }
    }
    Some(BarometricData {
        temperature_c: temperature?,
        pressure_hpa: pressure?,
        raw: line.to_string(),
    })
}

pub struct BarometricSource<L: LineSource> {
    lines: Option<L>,
    settle_time: Duration,
    cadence: Duration,
    skipped: u64,
}

impl<L: LineSource> BarometricSource<L> {
    pub fn new(lines: L, config: &SerialSensorConfig) -> Self {
        BarometricSource {
            lines: Some(lines),
            settle_time: config.settle_time(),
            cadence: config.sample_interval(),
            skipped: 0,
        }
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }
}

impl<L: LineSource> SensorSource for BarometricSource<L> {
    fn sensor(&self) -> SensorId {
        SensorId::Bmp180
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn prepare(&mut self) -> SensorResult<()> {
        // The bridge resets when the port opens
        if !self.settle_time.is_zero() {
            std::thread::sleep(self.settle_time);
        }
        Ok(())
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| SensorError::Unavailable("serial port closed".to_string()))?;
        let Some(line) = lines.read_line()? else {
            return Ok(None);
        };
        match parse_record(&line) {
            Some(data) => Ok(Some(SensorData::Barometric(data))),
            None => {
                if !line.trim().is_empty() {
                    self.skipped += 1;
                    debug!(target: "bmp180", "Skipping malformed record: {:?}", line);
                }
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.lines = None;
    }
}
