use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use log::{debug, warn};
use rocket_telemetry::protocol::{Frame, Reassembler};

/// Decode hex-encoded radio frames (one per line) and print each completed
/// message as pretty JSON.
#[derive(Parser, Debug)]
#[command(name = "frame_inspect")]
struct Args {
    /// File of hex frames; reads stdin when omitted
    input: Option<PathBuf>,

    /// Reassembly timeout in seconds
    #[arg(long, default_value = "2.0")]
    timeout: f64,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let timeout = Duration::try_from_secs_f64(args.timeout).unwrap_or(Duration::from_secs(2));
    let mut reassembler = Reassembler::new(timeout);
    let mut messages = 0usize;

    for (number, line) in reader.lines().enumerate() {
        let line = line.context("reading input")?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let bytes = match hex::decode(line) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(target: "lora", "line {}: not hex ({})", number + 1, e);
                continue;
            }
        };
        let Some(frame) = Frame::decode(&bytes) else {
            warn!(target: "lora", "line {}: not a frame", number + 1);
            continue;
        };
        debug!(target: "lora", "line {}: '{}' {}/{}", number + 1, frame.topic, frame.index, frame.total);

        let topic = frame.topic.clone();
        let Some(payload) = reassembler.push(frame, Instant::now()) else {
            continue;
        };
        messages += 1;
        println!("# {} ({} bytes)", topic, payload.len());
        match serde_json::from_slice::<serde_json::Value>(&payload) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(_) => println!("{}", String::from_utf8_lossy(&payload)),
        }
    }

    if reassembler.pending() > 0 {
        warn!(target: "lora", "{} message(s) left incomplete", reassembler.pending());
    }
    eprintln!("{} message(s) decoded", messages);
    Ok(())
}
