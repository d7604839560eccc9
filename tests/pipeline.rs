use crossbeam::channel::bounded;
use rocket_telemetry::actuator::Actuator;
use rocket_telemetry::aggregator::{spawn_aggregator, Aggregator};
use rocket_telemetry::config::{NodeConfig, RadioMode};
use rocket_telemetry::error::{ActuatorError, SensorResult};
use rocket_telemetry::incident::ZeroGDetector;
use rocket_telemetry::payload_log::{MemorySink, PayloadLog};
use rocket_telemetry::producer::{spawn_producer, ProducerExit};
use rocket_telemetry::radio::{LinkStateManager, LoopbackRadio};
use rocket_telemetry::sensors::synthetic::{SyntheticBarometric, SyntheticPosition};
use rocket_telemetry::sensors::SensorSource;
use rocket_telemetry::shutdown::StopFlag;
use rocket_telemetry::types::{Attitude, Axes3, InertialData, SensorData, SensorId};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fast_config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.radio.inter_frame_gap = 0.0;
    config.aggregator.emit_interval = 0.05;
    config.aggregator.poll_timeout = 0.02;
    config.zero_g.min_delay = 0.05;
    config
}

/// Real (non-synthetic) inertial source reading a steady 1 g
struct FreeFall;

impl SensorSource for FreeFall {
    fn sensor(&self) -> SensorId {
        SensorId::Mpu6050
    }

    fn cadence(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn acquire(&mut self) -> SensorResult<Option<SensorData>> {
        Ok(Some(SensorData::Inertial(InertialData {
            accel_g: Axes3::new(0.0, 0.0, 1.0),
            gyro_dps: Axes3::default(),
            attitude_deg: Attitude::default(),
        })))
    }
}

#[derive(Clone, Default)]
struct Pins {
    high: Arc<AtomicU32>,
    low: Arc<AtomicU32>,
}

impl Actuator for Pins {
    fn activate(&mut self) -> Result<(), ActuatorError> {
        self.high.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.low.fetch_add(1, Ordering::SeqCst);
    }
}

fn link(radio: LoopbackRadio, config: &NodeConfig, mode: RadioMode) -> LinkStateManager {
    let mut radio_config = config.radio.clone();
    radio_config.mode = mode.as_str().to_string();
    let mut link = LinkStateManager::new(Some(Box::new(radio)), &radio_config);
    link.initialize();
    link
}

#[test]
fn snapshots_cross_the_loopback_link() {
    let config = fast_config();
    let (tx_radio, rx_radio) = LoopbackRadio::pair();
    let tx_link = link(tx_radio, &config, RadioMode::Tx);
    let mut rx_link = link(rx_radio, &config, RadioMode::Rx);
    let pins = Pins::default();
    let sink = MemorySink::new();
    let stop = StopFlag::new();

    let (outbox, inbox) = bounded(config.aggregator.queue_capacity());
    let sources: Vec<Box<dyn SensorSource>> = vec![
        Box::new(FreeFall),
        Box::new(SyntheticBarometric::new(Duration::from_millis(10))),
        Box::new(SyntheticPosition::new(Duration::from_millis(10))),
    ];
    let producers: Vec<_> = sources
        .into_iter()
        .map(|s| spawn_producer(s, outbox.clone(), stop.clone()).unwrap())
        .collect();
    drop(outbox);

    let zero_g = ZeroGDetector::new(&config.zero_g, Box::new(pins.clone()));
    let aggregator = Aggregator::new(&SensorId::ALL, zero_g, tx_link, Box::new(sink.clone()), &config);
    let aggregator = spawn_aggregator(aggregator, inbox, stop.clone()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut packets = Vec::new();
    while packets.len() < 3 && Instant::now() < deadline {
        match rx_link.poll(Instant::now()) {
            Some(packet) => packets.push(packet),
            None => std::thread::sleep(Duration::from_millis(1)),
        }
    }
    stop.set();

    for handle in producers {
        let report = handle.join().unwrap();
        assert_eq!(report.exit, ProducerExit::Stopped);
        assert!(report.samples > 0);
    }
    let report = aggregator.join().unwrap();

    assert!(packets.len() >= 3, "only {} packet(s) received", packets.len());
    let last = packets.last().unwrap();
    assert_eq!(last.topic, "sensors");
    let sensors = last.payload["sensors"].as_object().unwrap();
    assert_eq!(sensors.len(), 3);
    assert!(sensors["mpu6050"]["accel_g"].is_object());
    assert!(sensors["mpu6050"].get("synthetic").is_none());
    assert_eq!(sensors["bmp180"]["synthetic"], true);
    assert_eq!(sensors["neo6m"]["synthetic"], true);
    assert!(last.metadata.frame_total >= 1);

    assert!(report.snapshots >= 3);
    assert!(report.transmitted >= 3);
    assert_eq!(sink.len() as u64, report.snapshots);
    assert_eq!(report.activity.real, vec![SensorId::Mpu6050]);
    assert_eq!(report.activity.synthetic, vec![SensorId::Bmp180, SensorId::Neo6m]);

    assert!(report.zero_g.sent);
    assert_eq!(report.zero_g.detections, 2);
    assert_eq!(pins.high.load(Ordering::SeqCst), 1);
    assert_eq!(pins.low.load(Ordering::SeqCst), 1);
}

#[test]
fn link_failure_keeps_payload_log_going() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("logs").join("payloads.log");
    let config = fast_config();
    let (tx_radio, rx_radio) = LoopbackRadio::pair();
    let tx_link = link(tx_radio.with_init_code(3), &config, RadioMode::Tx);
    let health = tx_link.health();
    assert!(health.link_failed());
    let mut rx_link = link(rx_radio, &config, RadioMode::Rx);

    let stop = StopFlag::new();
    let (outbox, inbox) = bounded(16);
    let producer = spawn_producer(
        Box::new(SyntheticBarometric::new(Duration::from_millis(10))),
        outbox,
        stop.clone(),
    )
    .unwrap();
    let zero_g = ZeroGDetector::new(&config.zero_g, Box::new(Pins::default()));
    let aggregator = Aggregator::new(
        &[SensorId::Bmp180],
        zero_g,
        tx_link,
        Box::new(PayloadLog::new(&log_path)),
        &config,
    );
    let aggregator = spawn_aggregator(aggregator, inbox, stop.clone()).unwrap();

    std::thread::sleep(Duration::from_millis(300));
    stop.set();
    producer.join().unwrap();
    let report = aggregator.join().unwrap();

    assert!(report.snapshots >= 2);
    assert_eq!(report.transmitted, 0);
    assert!(rx_link.poll(Instant::now()).is_none());
    let logged = std::fs::read_to_string(&log_path).unwrap();
    assert_eq!(logged.lines().count() as u64, report.snapshots);
    assert!(health.report().link_failed);
}
