use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::bounded;
use env_logger::Env;
use log::{error, info, log, warn};
use std::path::PathBuf;
use std::time::Instant;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

use rocket_telemetry::actuator::build_actuator;
use rocket_telemetry::aggregator::{spawn_aggregator, Aggregator};
use rocket_telemetry::config::{NodeConfig, RadioMode, DEFAULT_CONFIG_PATH};
use rocket_telemetry::incident::ZeroGDetector;
use rocket_telemetry::payload_log::PayloadLog;
use rocket_telemetry::producer::spawn_producer;
use rocket_telemetry::radio::{Airwaves, LinkStateManager, LinkStatus, LoopbackRadio, RadioDriver};
use rocket_telemetry::receiver::{log_packet, receive_loop};
use rocket_telemetry::sensors::detect_sources;
use rocket_telemetry::shutdown::{join_with_timeout, wait_for_signal, StopFlag};
use rocket_telemetry::summary::{FinalSummary, StartSummary};
use rocket_telemetry::types::SensorId;

#[derive(Parser, Debug)]
#[command(name = "telemetry_node")]
#[command(about = "Rocket telemetry node: sensors, zero-g latch and LoRa link", long_about = None)]
struct Args {
    /// Duration in seconds (0 = continuous)
    #[arg(value_name = "SECONDS", default_value = "0")]
    duration: u64,

    /// JSON configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Radio mode (tx, rx), overrides the configuration file
    #[arg(long)]
    mode: Option<RadioMode>,

    /// Use an in-memory radio; in tx mode an in-process receiver logs what is sent
    #[arg(long)]
    loopback: bool,

    /// Log filter (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<String>,
}

const WAIT_TICK: Duration = Duration::from_millis(100);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, notes) = NodeConfig::load_or_default(&args.config);
    if let Some(mode) = args.mode {
        config.radio.mode = mode.as_str().to_string();
    }
    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(config.logging.level.as_str())).init();
    for note in &notes {
        log!(target: "system", note.level, "Config: {}", note.message);
    }
    info!(
        target: "system",
        "Telemetry node starting: mode={} duration={}s loopback={}",
        config.radio.mode(),
        args.duration,
        args.loopback
    );

    let stop = StopFlag::new();
    {
        let stop = stop.clone();
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!(target: "system", "{} received, stopping", signal);
            stop.set();
        });
    }
    if args.duration > 0 {
        let stop = stop.clone();
        let limit = Duration::from_secs(args.duration);
        tokio::spawn(async move {
            sleep(limit).await;
            info!(target: "system", "Duration reached, stopping");
            stop.set();
        });
    }

    match config.radio.mode() {
        RadioMode::Tx => run_transmitter(&config, args.loopback, stop).await,
        RadioMode::Rx => run_receiver(&config, args.loopback, stop).await,
    }
}

/// Receiver on the far end of a loopback pair, logging every packet
fn spawn_listener(radio: LoopbackRadio, config: &NodeConfig, stop: StopFlag) -> JoinHandle<u64> {
    let mut radio_config = config.radio.clone();
    radio_config.mode = RadioMode::Rx.as_str().to_string();
    let poll_interval = config.radio.poll_interval();
    tokio::spawn(async move {
        let mut link = LinkStateManager::new(Some(Box::new(radio)), &radio_config);
        link.initialize();
        receive_loop(&mut link, &stop, poll_interval, |packet| {
            log_packet(&packet);
            Ok(())
        })
        .await
    })
}

async fn run_transmitter(config: &NodeConfig, loopback: bool, stop: StopFlag) -> Result<()> {
    let started = Instant::now();

    let (driver, listener): (Option<Box<dyn RadioDriver>>, Option<LoopbackRadio>) = if loopback {
        let (local, remote) = LoopbackRadio::pair();
        (Some(Box::new(local) as Box<dyn RadioDriver>), Some(remote))
    } else {
        // No transceiver driver is built in; see `RadioDriver`
        (None, None)
    };
    let mut link = LinkStateManager::new(driver, &config.radio);
    link.initialize();
    let health = link.health();

    let sources = detect_sources(config);
    StartSummary::new(&sources, health.report()).log();

    let listener = listener.map(|radio| spawn_listener(radio, config, stop.clone()));

    let expected: Vec<SensorId> = sources.iter().map(|s| s.sensor).collect();
    let (outbox, inbox) = bounded(config.aggregator.queue_capacity());
    let mut producers = Vec::with_capacity(sources.len());
    for selected in sources {
        match spawn_producer(selected.source, outbox.clone(), stop.clone()) {
            Ok(handle) => producers.push(handle),
            Err(e) => {
                stop.set();
                return Err(e).with_context(|| format!("spawning {} producer", selected.sensor));
            }
        }
    }
    drop(outbox);

    let zero_g = ZeroGDetector::new(&config.zero_g, build_actuator(&config.actuator));
    let sink = PayloadLog::new(&config.logging.payload_log);
    info!(target: "system", "Payload log: {}", sink.path().display());
    let aggregator = Aggregator::new(&expected, zero_g, link, Box::new(sink), config);
    let aggregator = match spawn_aggregator(aggregator, inbox, stop.clone()) {
        Ok(handle) => handle,
        Err(e) => {
            stop.set();
            return Err(e).context("spawning aggregator");
        }
    };

    while !stop.is_set() {
        if aggregator.is_finished() {
            warn!(target: "system", "Aggregator exited early, stopping");
            stop.set();
            break;
        }
        sleep(WAIT_TICK).await;
    }

    info!(target: "system", "Shutting down");
    let join_timeout = config.aggregator.join_timeout();
    let mut producer_reports = Vec::new();
    for handle in producers {
        if let Some(report) = join_with_timeout(handle, join_timeout).await {
            producer_reports.push(report);
        }
    }
    let aggregate = join_with_timeout(aggregator, join_timeout).await;
    if let Some(listener) = listener {
        match tokio::time::timeout(join_timeout, listener).await {
            Ok(Ok(packets)) => info!(target: "system", "Loopback receiver got {} packet(s)", packets),
            Ok(Err(e)) => warn!(target: "system", "Loopback receiver failed: {}", e),
            Err(_) => warn!(target: "system", "Loopback receiver did not stop within {:?}", join_timeout),
        }
    }

    let mut summary = FinalSummary::new(started.elapsed(), health.report());
    summary.producers = producer_reports;
    if let Some(report) = aggregate {
        summary.activity = Some(report.activity);
        summary.zero_g = Some(report.zero_g);
        summary.snapshots = Some(report.snapshots);
    }
    finish(&summary, config);
    Ok(())
}

async fn run_receiver(config: &NodeConfig, loopback: bool, stop: StopFlag) -> Result<()> {
    let started = Instant::now();
    let driver: Option<Box<dyn RadioDriver>> = if loopback {
        Some(Box::new(LoopbackRadio::on(&Airwaves::new())) as Box<dyn RadioDriver>)
    } else {
        None
    };
    let mut link = LinkStateManager::new(driver, &config.radio);
    if link.initialize() != LinkStatus::Ready {
        warn!(target: "system", "Receiver link not ready, waiting for shutdown");
    }

    let packets = receive_loop(&mut link, &stop, config.radio.poll_interval(), |packet| {
        log_packet(&packet);
        Ok(())
    })
    .await;
    info!(target: "system", "Received {} packet(s)", packets);

    let summary = FinalSummary::new(started.elapsed(), link.health().report());
    finish(&summary, config);
    Ok(())
}

fn finish(summary: &FinalSummary, config: &NodeConfig) {
    summary.log();
    match summary.append_to(&config.logging.summary_log) {
        Ok(()) => info!(target: "system", "Summary appended to {}", config.logging.summary_log),
        Err(e) => error!(target: "system", "Cannot write summary to {}: {}", config.logging.summary_log, e),
    }
}
