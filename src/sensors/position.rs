//! NEO-6M GPS: NMEA sentences over serial.
//!
//! Only `$GPGGA` (fix with altitude) and `$GPRMC` (recommended minimum) are
//! used. A sentence with a bad checksum or without a valid fix is dropped.

use super::serial::LineSource;
use super::SensorSource;
use crate::config::SerialSensorConfig;
use crate::error::{SensorError, SensorResult};
use crate::types::{PositionData, SensorData, SensorId};
use log::trace;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct NmeaFix {
    pub latitude: f64,
    pub longitude: f64,
    /// Metres above mean sea level; RMC does not carry it
    pub altitude: Option<f64>,
    pub fix_time: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NmeaSentence {
    Gga(NmeaFix),
    Rmc(NmeaFix),
}

/// XOR of the bytes between `$` and `*` must match the trailing hex pair
fn checksum_ok(sentence: &str) -> bool {
    let Some((body, sum)) = sentence.split_once('*') else {
        // Checksum is optional in NMEA 0183
        return true;
    };
    let Ok(expected) = u8::from_str_radix(sum.trim(), 16) else {
        return false;
    };
    let computed = body.trim_start_matches('$').bytes().fold(0u8, |acc, b| acc ^ b);
    computed == expected
}

/// `ddmm.mmmm` (or `dddmm.mmmm`) plus hemisphere to signed decimal degrees
fn coordinate(value: &str, hemisphere: &str) -> Option<f64> {
    let raw: f64 = value.trim().parse().ok()?;
    let degrees = (raw / 100.0).trunc();
    let minutes = raw - degrees * 100.0;
    if !(0.0..60.0).contains(&minutes) {
        return None;
    }
    let decimal = degrees + minutes / 60.0;
    match hemisphere.trim() {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

/// `hhmmss.ss` to `hh:mm:ss`
fn fix_time(value: &str) -> Option<String> {
    let digits = value.get(0..6)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}:{}:{}", &digits[0..2], &digits[2..4], &digits[4..6]))
}

pub fn parse_sentence(line: &str) -> Option<NmeaSentence> {
    let line = line.trim();
    if !checksum_ok(line) {
        return None;
    }
    let body = line.split('*').next().unwrap_or(line);
    let fields: Vec<&str> = body.split(',').collect();

    match fields[0] {
        "$GPGGA" => {
            if fields.len() < 10 {
                return None;
            }
            let quality = fields[6].trim();
            if quality.is_empty() || quality == "0" {
                return None;
            }
            Some(NmeaSentence::Gga(NmeaFix {
                latitude: coordinate(fields[2], fields[3])?,
                longitude: coordinate(fields[4], fields[5])?,
                altitude: fields[9].trim().parse().ok(),
                fix_time: fix_time(fields[1]),
            }))
        }
        "$GPRMC" => {
            if fields.len() < 7 || fields[2].trim() != "A" {
                return None;
            }
            Some(NmeaSentence::Rmc(NmeaFix {
                latitude: coordinate(fields[3], fields[4])?,
                longitude: coordinate(fields[5], fields[6])?,
                altitude: None,
                fix_time: fix_time(fields[1]),
            }))
        }
        _ => None,
    }
}

/// Latest known fix, merged across sentence types
#[derive(Debug, Default)]
pub struct FixTracker {
    latest: Option<PositionData>,
}

impl FixTracker {
    pub fn update(&mut self, sentence: NmeaSentence, raw: &str) -> PositionData {
        let (fix, carry_altitude) = match sentence {
            NmeaSentence::Gga(fix) => (fix, false),
            NmeaSentence::Rmc(fix) => (fix, true),
        };
        let altitude = if carry_altitude {
            self.latest.as_ref().and_then(|p| p.altitude)
        } else {
            fix.altitude
        };
        let data = PositionData {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude,
            fix_time: fix.fix_time,
            raw: raw.trim().to_string(),
        };
        self.latest = Some(data.clone());
        data
    }

    pub fn latest(&self) -> Option<&PositionData> {
        self.latest.as_ref()
    }
}

pub struct PositionSource<L: LineSource> {
    lines: Option<L>,
    tracker: FixTracker,
    cadence: Duration,
}

impl<L: LineSource> PositionSource<L> {
    pub fn new(lines: L, config: &SerialSensorConfig) -> Self {
        PositionSource {
            lines: Some(lines),
            tracker: FixTracker::default(),
            cadence: config.sample_interval(),
        }
    }
}

impl<L: LineSource> SensorSource for PositionSource<L> {
    fn sensor(&self) -> SensorId {
        SensorId::Neo6m
    }

    fn cadence(&self) -> Duration {
        self.cadence
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        let lines = self
            .lines
            .as_mut()
            .ok_or_else(|| SensorError::Unavailable("serial port closed".to_string()))?;
        let Some(line) = lines.read_line()? else {
            return Ok(None);
        };
        if !(line.starts_with("$GPGGA") || line.starts_with("$GPRMC")) {
            return Ok(None);
        }
        match parse_sentence(&line) {
            Some(sentence) => Ok(Some(SensorData::Position(self.tracker.update(sentence, &line)))),
            None => {
                trace!(target: "neo6m", "Discarding sentence: {}", line);
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.lines = None;
    }
}
