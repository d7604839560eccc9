//! One thread per sensor: acquire, stamp, enqueue, sleep until the next tick.

use crate::sensors::SensorSource;
use crate::shutdown::StopFlag;
use crate::types::{Reading, SensorId};
use crossbeam::channel::{SendTimeoutError, Sender};
use log::{debug, error, info};
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Shortest time a producer will block on a full queue
const MIN_ENQUEUE_WAIT: Duration = Duration::from_millis(10);

/// Reads allowed in one tick while the source keeps yielding nothing
const MAX_READS_PER_TICK: u32 = 32;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum ProducerExit {
    Stopped,
    /// The aggregator went away
    Disconnected,
    Failed(String),
}

#[derive(Clone, Debug, Serialize)]
pub struct ProducerReport {
    pub sensor: SensorId,
    pub synthetic: bool,
    pub samples: u64,
    pub dropped: u64,
    pub exit: ProducerExit,
}

/// Closes the source however the loop ends, panics included
struct CloseOnDrop(Box<dyn SensorSource>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

impl Deref for CloseOnDrop {
    type Target = dyn SensorSource;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for CloseOnDrop {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

/// Fixed-rate schedule that does not accumulate drift
struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    fn new(period: Duration) -> Self {
        Ticker {
            period,
            next: Instant::now() + period,
        }
    }

    /// Time left until the next tick; skips missed ticks instead of bursting
    fn until_next(&mut self) -> Duration {
        let now = Instant::now();
        if self.next <= now {
            self.next = now + self.period;
            return Duration::ZERO;
        }
        let wait = self.next - now;
        self.next += self.period;
        wait
    }
}

pub fn run_producer(source: Box<dyn SensorSource>, outbox: Sender<Reading>, stop: StopFlag) -> ProducerReport {
    let mut source = CloseOnDrop(source);
    let sensor = source.sensor();
    let synthetic = source.is_synthetic();
    let cadence = source.cadence();
    let target = sensor.as_str();
    let mut report = ProducerReport {
        sensor,
        synthetic,
        samples: 0,
        dropped: 0,
        exit: ProducerExit::Stopped,
    };

    if let Err(e) = source.prepare() {
        error!(target: target, "Setup failed: {}", e);
        report.exit = ProducerExit::Failed(e.to_string());
        return report;
    }
    info!(target: target, "Producer started ({} ms period{})", cadence.as_millis(), if synthetic { ", synthetic" } else { "" });

    let mut ticker = Ticker::new(cadence);
    let enqueue_wait = cadence.max(MIN_ENQUEUE_WAIT);
    while !stop.is_set() {
        let mut reads = 0;
        let acquired = loop {
            reads += 1;
            match source.acquire() {
                // Discarded line: read the next one without waiting for the tick
                Ok(None) if reads < MAX_READS_PER_TICK && !stop.is_set() => continue,
                other => break other,
            }
        };
        match acquired {
            Ok(Some(data)) => {
                let reading = Reading::new(sensor, data, synthetic);
                match outbox.send_timeout(reading, enqueue_wait) {
                    Ok(()) => {
                        report.samples += 1;
                        if report.samples % 100 == 0 {
                            debug!(target: target, "{} samples", report.samples);
                        }
                    }
                    Err(SendTimeoutError::Timeout(_)) => {
                        // Queue full, drop this sample
                        report.dropped += 1;
                    }
                    Err(SendTimeoutError::Disconnected(_)) => {
                        info!(target: target, "Queue closed after {} samples", report.samples);
                        report.exit = ProducerExit::Disconnected;
                        break;
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(target: target, "Read failed, producer stopping: {}", e);
                report.exit = ProducerExit::Failed(e.to_string());
                break;
            }
        }

        if stop.wait_timeout(ticker.until_next()) {
            break;
        }
    }

    info!(
        target: target,
        "Producer exited: {} samples, {} dropped",
        report.samples, report.dropped
    );
    report
}

pub fn spawn_producer(
    source: Box<dyn SensorSource>,
    outbox: Sender<Reading>,
    stop: StopFlag,
) -> std::io::Result<JoinHandle<ProducerReport>> {
    let name = format!("producer-{}", source.sensor());
    std::thread::Builder::new()
        .name(name)
        .spawn(move || run_producer(source, outbox, stop))
}
