//! Receive side of the link: poll, reassemble, hand decoded packets on.

use crate::radio::{LinkStateManager, ReceivedPacket};
use crate::shutdown::StopFlag;
use log::{info, warn};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default handler: one log line per packet
pub fn log_packet(packet: &ReceivedPacket) {
    info!(
        target: "lora",
        "[{}] {} (rssi {} dBm, snr {:.1} dB, {} frame(s))",
        packet.topic,
        packet.payload,
        packet.metadata.rssi,
        packet.metadata.snr,
        packet.metadata.frame_total
    );
}

/// Poll the link every `poll_interval` until `stop` is set. Handler errors
/// are logged and the loop carries on. Returns the number of packets handled.
pub async fn receive_loop<F>(link: &mut LinkStateManager, stop: &StopFlag, poll_interval: Duration, mut handler: F) -> u64
where
    F: FnMut(ReceivedPacket) -> anyhow::Result<()>,
{
    let mut ticker = interval(poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut handled = 0u64;

    info!(target: "lora", "Listening, polling every {} ms", poll_interval.as_millis());
    while !stop.is_set() {
        ticker.tick().await;
        let Some(packet) = link.poll(Instant::now().into_std()) else {
            continue;
        };
        handled += 1;
        if let Err(e) = handler(packet) {
            warn!(target: "lora", "Packet handler failed: {:#}", e);
        }
    }
    info!(
        target: "lora",
        "Receiver stopped after {} packet(s), {} incomplete",
        handled,
        link.pending_messages()
    );
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RadioConfig;
    use crate::protocol::encode_frames;
    use crate::radio::{Airwaves, LoopbackRadio};

    fn listener(air: &Airwaves) -> LinkStateManager {
        let config = RadioConfig {
            mode: "rx".into(),
            ..RadioConfig::default()
        };
        let mut link = LinkStateManager::new(Some(Box::new(LoopbackRadio::on(air))), &config);
        link.initialize();
        link
    }

    #[tokio::test]
    async fn test_receive_loop_delivers_and_survives_handler_errors() {
        let air = Airwaves::new();
        for payload in [r#"{"n":1}"#, r#"{"n":2}"#] {
            for frame in encode_frames("sensors", payload.as_bytes(), 200).unwrap() {
                air.inject(&frame);
            }
        }
        let mut link = listener(&air);
        let stop = StopFlag::new();
        let mut seen = Vec::new();

        let handled = receive_loop(&mut link, &stop, Duration::from_millis(1), |packet| {
            seen.push(packet.payload["n"].as_i64().unwrap_or(0));
            if seen.len() == 2 {
                stop.set();
            }
            anyhow::bail!("handler refused packet")
        })
        .await;

        assert_eq!(handled, 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_receive_loop_exits_when_stopped() {
        let air = Airwaves::new();
        let mut link = listener(&air);
        let stop = StopFlag::new();
        stop.set();
        let handled = receive_loop(&mut link, &stop, Duration::from_millis(50), |_| Ok(())).await;
        assert_eq!(handled, 0);
    }
}
