use crate::types::{Reading, SensorId};
use serde::Serialize;
use std::collections::BTreeMap;

/// What the aggregator has seen from one sensor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActivityRecord {
    pub seen: bool,
    pub last_synthetic: bool,
    pub readings: u64,
}

/// Sensors grouped by where their latest data came from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActivityPartition {
    pub real: Vec<SensorId>,
    pub synthetic: Vec<SensorId>,
    pub never_seen: Vec<SensorId>,
}

/// Per-sensor activity, owned by the aggregator thread
#[derive(Clone, Debug)]
pub struct ActivityTracker {
    records: BTreeMap<SensorId, ActivityRecord>,
}

impl ActivityTracker {
    pub fn new(expected: &[SensorId]) -> Self {
        ActivityTracker {
            records: expected.iter().map(|id| (*id, ActivityRecord::default())).collect(),
        }
    }

    /// Returns false for a sensor that was not expected
    pub fn record(&mut self, reading: &Reading) -> bool {
        match self.records.get_mut(&reading.sensor) {
            Some(record) => {
                record.seen = true;
                record.last_synthetic = reading.synthetic;
                record.readings += 1;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, sensor: SensorId) -> Option<&ActivityRecord> {
        self.records.get(&sensor)
    }

    pub fn partition(&self) -> ActivityPartition {
        let mut partition = ActivityPartition::default();
        for (id, record) in &self.records {
            match (record.seen, record.last_synthetic) {
                (false, _) => partition.never_seen.push(*id),
                (true, false) => partition.real.push(*id),
                (true, true) => partition.synthetic.push(*id),
            }
        }
        partition
    }

    /// One-line status for periodic logging
    pub fn format_status(&self) -> String {
        self.records
            .iter()
            .map(|(id, record)| {
                let mark = match (record.seen, record.last_synthetic) {
                    (false, _) => "✗".to_string(),
                    (true, false) => format!("✓ {}", record.readings),
                    (true, true) => format!("~ {}", record.readings),
                };
                format!("{}: {}", id, mark)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BarometricData, SensorData};

    fn baro(synthetic: bool) -> Reading {
        Reading::new(
            SensorId::Bmp180,
            SensorData::Barometric(BarometricData {
                temperature_c: 21.0,
                pressure_hpa: 1000.0,
                raw: "T=21.00,P=1000.00".into(),
            }),
            synthetic,
        )
    }

    #[test]
    fn test_partition_tracks_latest_origin() {
        let mut tracker = ActivityTracker::new(&SensorId::ALL);
        assert!(tracker.record(&baro(true)));
        let partition = tracker.partition();
        assert_eq!(partition.synthetic, vec![SensorId::Bmp180]);
        assert_eq!(partition.never_seen, vec![SensorId::Mpu6050, SensorId::Neo6m]);

        tracker.record(&baro(false));
        let partition = tracker.partition();
        assert_eq!(partition.real, vec![SensorId::Bmp180]);
        assert!(partition.synthetic.is_empty());
        assert_eq!(tracker.get(SensorId::Bmp180).unwrap().readings, 2);
    }

    #[test]
    fn test_unexpected_sensor_ignored() {
        let mut tracker = ActivityTracker::new(&[SensorId::Mpu6050]);
        assert!(!tracker.record(&baro(false)));
        assert!(tracker.get(SensorId::Bmp180).is_none());
        assert_eq!(tracker.partition().never_seen, vec![SensorId::Mpu6050]);
    }

    #[test]
    fn test_format_status() {
        let mut tracker = ActivityTracker::new(&[SensorId::Mpu6050, SensorId::Bmp180]);
        tracker.record(&baro(false));
        assert_eq!(tracker.format_status(), "mpu6050: ✗ | bmp180: ✓ 1");
    }
}
