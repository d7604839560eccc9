//! The single consumer of the reading queue.
//!
//! Keeps the latest reading per sensor, feeds real inertial samples to the
//! zero-g detector and emits a snapshot of every expected sensor at a fixed
//! cadence: first to the local payload log, then over the radio unless the
//! link has failed.

use crate::activity::{ActivityPartition, ActivityTracker};
use crate::config::NodeConfig;
use crate::incident::{ZeroGDetector, ZeroGStatus};
use crate::payload_log::SnapshotSink;
use crate::radio::{LinkHealth, LinkStateManager, SendOutcome};
use crate::shutdown::StopFlag;
use crate::types::{Reading, SensorData, SensorId, Snapshot};
use chrono::Utc;
use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Link-failure warning state; logged once per transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LinkWarning {
    Quiet,
    LocalOnly,
}

#[derive(Clone, Debug, Serialize)]
pub struct AggregatorReport {
    pub activity: ActivityPartition,
    pub zero_g: ZeroGStatus,
    pub readings: u64,
    pub snapshots: u64,
    pub transmitted: u64,
}

pub struct Aggregator {
    expected: Vec<SensorId>,
    latest: HashMap<SensorId, Reading>,
    activity: ActivityTracker,
    zero_g: ZeroGDetector,
    link: LinkStateManager,
    health: Arc<LinkHealth>,
    sink: Box<dyn SnapshotSink>,
    topic: String,
    emit_interval: Duration,
    poll_timeout: Duration,
    last_emit: Option<Instant>,
    link_warning: LinkWarning,
    readings: u64,
    snapshots: u64,
    transmitted: u64,
}

impl Aggregator {
    pub fn new(
        expected: &[SensorId],
        zero_g: ZeroGDetector,
        link: LinkStateManager,
        sink: Box<dyn SnapshotSink>,
        config: &NodeConfig,
    ) -> Self {
        let health = link.health();
        Aggregator {
            expected: expected.to_vec(),
            latest: HashMap::new(),
            activity: ActivityTracker::new(expected),
            zero_g,
            link,
            health,
            sink,
            topic: config.radio.topic.clone(),
            emit_interval: config.aggregator.emit_interval(),
            poll_timeout: config.aggregator.poll_timeout(),
            last_emit: None,
            link_warning: LinkWarning::Quiet,
            readings: 0,
            snapshots: 0,
            transmitted: 0,
        }
    }

    pub fn activity(&self) -> &ActivityTracker {
        &self.activity
    }

    pub fn zero_g(&self) -> &ZeroGDetector {
        &self.zero_g
    }

    /// Fold one reading in. Returns the snapshot when this reading triggered
    /// an emission.
    pub fn handle(&mut self, reading: Reading, now: Instant) -> Option<Snapshot> {
        self.readings += 1;
        if !self.activity.record(&reading) {
            debug!(target: "aggregator", "Ignoring reading from unexpected sensor {}", reading.sensor);
            return None;
        }

        if !reading.synthetic {
            if let SensorData::Inertial(data) = &reading.data {
                self.zero_g.observe(data.accel_g.magnitude(), &reading.stamp);
            }
        }
        self.latest.insert(reading.sensor, reading);

        let due = self
            .last_emit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.emit_interval);
        if !due {
            return None;
        }
        self.last_emit = Some(now);
        let snapshot = self.build_snapshot();
        self.emit(&snapshot);
        Some(snapshot)
    }

    pub fn build_snapshot(&self) -> Snapshot {
        Snapshot {
            reported_at: Utc::now(),
            sensors: self
                .expected
                .iter()
                .map(|id| (*id, self.latest.get(id).cloned()))
                .collect(),
        }
    }

    fn emit(&mut self, snapshot: &Snapshot) {
        self.snapshots += 1;
        if let Err(e) = self.sink.record(snapshot) {
            error!(target: "aggregator", "Payload log write failed: {}", e);
        }

        if self.health.link_failed() {
            if self.link_warning == LinkWarning::Quiet {
                warn!(target: "aggregator", "Link failure flagged, snapshots kept local only");
                self.link_warning = LinkWarning::LocalOnly;
            }
            return;
        }
        if self.link_warning == LinkWarning::LocalOnly {
            info!(target: "aggregator", "Link recovered, transmitting again");
            self.link_warning = LinkWarning::Quiet;
        }

        match self.link.send_json(&self.topic, snapshot) {
            Ok(SendOutcome::Sent { frames }) => {
                self.transmitted += 1;
                debug!(target: "aggregator", "Snapshot {} sent in {} frame(s)", self.snapshots, frames);
            }
            Ok(SendOutcome::Refused(_)) => {}
            Err(e) => error!(target: "aggregator", "Snapshot transmission failed: {}", e),
        }
    }

    pub fn report(&self) -> AggregatorReport {
        AggregatorReport {
            activity: self.activity.partition(),
            zero_g: self.zero_g.status(),
            readings: self.readings,
            snapshots: self.snapshots,
            transmitted: self.transmitted,
        }
    }

    /// Consume readings until stopped or every producer has gone
    pub fn run(mut self, inbox: Receiver<Reading>, stop: StopFlag) -> AggregatorReport {
        info!(
            target: "aggregator",
            "Aggregating {} sensor(s), emitting every {} ms",
            self.expected.len(),
            self.emit_interval.as_millis()
        );
        let mut last_status = Instant::now();

        while !stop.is_set() {
            match inbox.recv_timeout(self.poll_timeout) {
                Ok(reading) => {
                    self.handle(reading, Instant::now());
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    info!(target: "aggregator", "All producers gone");
                    break;
                }
            }
            if last_status.elapsed() >= STATUS_LOG_INTERVAL {
                info!(target: "aggregator", "{}", self.activity.format_status());
                last_status = Instant::now();
            }
        }

        self.zero_g.release_actuator();
        let report = self.report();
        info!(
            target: "aggregator",
            "Aggregator exited: {} readings, {} snapshots, {} transmitted",
            report.readings, report.snapshots, report.transmitted
        );
        report
    }
}

pub fn spawn_aggregator(
    aggregator: Aggregator,
    inbox: Receiver<Reading>,
    stop: StopFlag,
) -> std::io::Result<JoinHandle<AggregatorReport>> {
    std::thread::Builder::new()
        .name("aggregator".to_string())
        .spawn(move || aggregator.run(inbox, stop))
}
