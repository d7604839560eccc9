use crate::activity::ActivityPartition;
use crate::incident::ZeroGStatus;
use crate::producer::ProducerReport;
use crate::radio::LinkReport;
use crate::sensors::{Capability, SelectedSource};
use crate::types::{iso8601, SensorId};
use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, Serialize)]
pub struct SensorCapability {
    pub sensor: SensorId,
    #[serde(flatten)]
    pub capability: Capability,
}

/// Hardware and link state right after startup
#[derive(Clone, Debug, Serialize)]
pub struct StartSummary {
    pub started_at: String,
    pub sensors: Vec<SensorCapability>,
    pub link: LinkReport,
}

impl StartSummary {
    pub fn new(sources: &[SelectedSource], link: LinkReport) -> Self {
        StartSummary {
            started_at: iso8601(&Utc::now()),
            sensors: sources
                .iter()
                .map(|s| SensorCapability {
                    sensor: s.sensor,
                    capability: s.capability.clone(),
                })
                .collect(),
            link,
        }
    }

    pub fn log(&self) {
        let names = |real: bool| -> String {
            let list: Vec<&str> = self
                .sensors
                .iter()
                .filter(|s| s.capability.is_real() == real)
                .map(|s| s.sensor.as_str())
                .collect();
            if list.is_empty() {
                "none".to_string()
            } else {
                list.join(", ")
            }
        };
        info!(target: "system", "Hardware sensors: {}", names(true));
        info!(target: "system", "Synthetic sensors: {}", names(false));
        if self.link.ready {
            info!(target: "system", "Radio link ready ({})", self.link.mode);
        } else {
            warn!(
                target: "system",
                "Radio link not ready ({:?}): {}",
                self.link.status,
                self.link.last_error.as_deref().unwrap_or("unknown")
            );
        }
    }
}

/// End-of-run record, logged and appended to the summary log
#[derive(Clone, Debug, Serialize)]
pub struct FinalSummary {
    pub finished_at: String,
    pub uptime_seconds: f64,
    /// `None` when the aggregator did not exit in time
    pub activity: Option<ActivityPartition>,
    pub zero_g: Option<ZeroGStatus>,
    pub snapshots: Option<u64>,
    pub link: LinkReport,
    pub producers: Vec<ProducerReport>,
}

impl FinalSummary {
    pub fn new(uptime: Duration, link: LinkReport) -> Self {
        FinalSummary {
            finished_at: iso8601(&Utc::now()),
            uptime_seconds: (uptime.as_secs_f64() * 10.0).round() / 10.0,
            activity: None,
            zero_g: None,
            snapshots: None,
            link,
            producers: Vec::new(),
        }
    }

    pub fn log(&self) {
        info!(target: "system", "Uptime {:.1} s", self.uptime_seconds);
        match &self.activity {
            Some(activity) => info!(
                target: "system",
                "Sensors real: {:?}, synthetic: {:?}, never seen: {:?}",
                activity.real, activity.synthetic, activity.never_seen
            ),
            None => warn!(target: "system", "Sensor activity unknown, aggregator did not report"),
        }
        match &self.zero_g {
            Some(ZeroGStatus {
                sent: true,
                sent_at,
                magnitude,
                ..
            }) => info!(
                target: "system",
                "Zero-g signal sent at {} ({:.3} g)",
                sent_at.as_deref().unwrap_or("?"),
                magnitude.unwrap_or(f64::NAN)
            ),
            Some(status) => info!(target: "system", "Zero-g signal not sent ({} detection(s))", status.detections),
            None => {}
        }
        if self.link.ready {
            info!(target: "system", "Radio link ready");
        } else {
            info!(
                target: "system",
                "Radio link not ready: {}",
                self.link.last_error.as_deref().unwrap_or("no error recorded")
            );
        }
        if self.link.link_failed {
            warn!(target: "system", "Link failure was flagged");
        }
        for producer in &self.producers {
            info!(
                target: "system",
                "{}: {} samples, {} dropped, {:?}",
                producer.sensor, producer.samples, producer.dropped, producer.exit
            );
        }
    }

    /// Append one JSON line to `path`
    pub fn append_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let json = serde_json::to_string(self)?;
        writeln!(file, "{}", json)
    }
}
