use super::{RadioDriver, LINK_FAILURE_CODE};
use crate::config::{RadioConfig, RadioMode};
use crate::error::RadioResult;
use crate::protocol::{encode_frames, Frame, Reassembler};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Uninitialized,
    Ready,
    /// Radio present but not answering; sends are suppressed until restart
    LinkFailed,
    InitError,
}

impl LinkStatus {
    fn to_u8(self) -> u8 {
        match self {
            LinkStatus::Uninitialized => 0,
            LinkStatus::Ready => 1,
            LinkStatus::LinkFailed => 2,
            LinkStatus::InitError => 3,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => LinkStatus::Ready,
            2 => LinkStatus::LinkFailed,
            3 => LinkStatus::InitError,
            _ => LinkStatus::Uninitialized,
        }
    }
}

/// Link state readable from any thread. Written only on init transitions.
#[derive(Debug)]
pub struct LinkHealth {
    mode: RadioMode,
    status: AtomicU8,
    last_error: Mutex<Option<String>>,
}

impl LinkHealth {
    fn new(mode: RadioMode) -> Self {
        Self {
            mode,
            status: AtomicU8::new(LinkStatus::Uninitialized.to_u8()),
            last_error: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn status(&self) -> LinkStatus {
        LinkStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn is_ready(&self) -> bool {
        self.status() == LinkStatus::Ready
    }

    pub fn link_failed(&self) -> bool {
        self.status() == LinkStatus::LinkFailed
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    fn set(&self, status: LinkStatus, error: Option<String>) {
        if let Ok(mut last) = self.last_error.lock() {
            *last = error;
        }
        self.status.store(status.to_u8(), Ordering::Release);
    }

    pub fn report(&self) -> LinkReport {
        LinkReport {
            mode: self.mode,
            status: self.status(),
            ready: self.is_ready(),
            link_failed: self.link_failed(),
            last_error: self.last_error(),
        }
    }
}

/// Point-in-time copy of the link state for summaries
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkReport {
    pub mode: RadioMode,
    pub status: LinkStatus,
    pub ready: bool,
    pub link_failed: bool,
    pub last_error: Option<String>,
}

/// Why a send was not attempted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Refusal {
    WrongMode,
    DriverUnavailable,
    LinkFailed,
    NotReady,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { frames: usize },
    Refused(Refusal),
}

/// Conditions that are warned about once, then stay quiet until the link is
/// re-initialised
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Notice {
    WrongMode = 1 << 0,
    DriverUnavailable = 1 << 1,
    LinkFailed = 1 << 2,
    NotReady = 1 << 3,
    NoReceive = 1 << 4,
    ReceiveNotReady = 1 << 5,
}

#[derive(Debug, Default)]
struct Notices {
    raised: u8,
}

impl Notices {
    /// True only the first time `notice` is raised
    fn raise(&mut self, notice: Notice) -> bool {
        let bit = notice as u8;
        let first = self.raised & bit == 0;
        self.raised |= bit;
        first
    }

    fn clear(&mut self) {
        self.raised = 0;
    }
}

impl From<Refusal> for Notice {
    fn from(r: Refusal) -> Self {
        match r {
            Refusal::WrongMode => Notice::WrongMode,
            Refusal::DriverUnavailable => Notice::DriverUnavailable,
            Refusal::LinkFailed => Notice::LinkFailed,
            Refusal::NotReady => Notice::NotReady,
        }
    }
}

/// Per-packet radio metadata handed to receive handlers
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LinkMetadata {
    pub last_rssi: i32,
    pub rssi: i32,
    pub snr: f32,
    pub frame_index: u8,
    pub frame_total: u8,
}

/// A fully reassembled and decoded message
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReceivedPacket {
    pub topic: String,
    pub payload: serde_json::Value,
    pub metadata: LinkMetadata,
}

/// Owns the radio driver and gates every send and receive on link state
pub struct LinkStateManager {
    driver: Option<Box<dyn RadioDriver>>,
    mode: RadioMode,
    frequency_hz: u32,
    spreading_factor: u8,
    max_frame: usize,
    inter_frame_gap: Duration,
    health: Arc<LinkHealth>,
    reassembler: Reassembler,
    notices: Notices,
}

impl LinkStateManager {
    pub fn new(driver: Option<Box<dyn RadioDriver>>, config: &RadioConfig) -> Self {
        let mode = config.mode();
        Self {
            driver,
            mode,
            frequency_hz: config.frequency_hz(),
            spreading_factor: config.spreading_factor(),
            max_frame: config.max_frame_bytes(),
            inter_frame_gap: config.inter_frame_gap(),
            health: Arc::new(LinkHealth::new(mode)),
            reassembler: Reassembler::new(config.frame_timeout()),
            notices: Notices::default(),
        }
    }

    pub fn mode(&self) -> RadioMode {
        self.mode
    }

    pub fn health(&self) -> Arc<LinkHealth> {
        Arc::clone(&self.health)
    }

    pub fn status(&self) -> LinkStatus {
        self.health.status()
    }

    /// Bring the radio up. Never fails: the outcome is the new status.
    pub fn initialize(&mut self) -> LinkStatus {
        let Some(driver) = self.driver.as_mut() else {
            self.record_init_error("radio driver not available");
            return LinkStatus::InitError;
        };

        match driver.init(self.mode, self.frequency_hz, self.spreading_factor) {
            Ok(0) => {
                self.health.set(LinkStatus::Ready, None);
                self.notices.clear();
                info!(
                    target: "lora",
                    "Radio ready: mode={} freq={:.3} MHz SF{}",
                    self.mode,
                    self.frequency_hz as f64 / 1e6,
                    self.spreading_factor
                );
                LinkStatus::Ready
            }
            Ok(LINK_FAILURE_CODE) => {
                self.health.set(
                    LinkStatus::LinkFailed,
                    Some(format!("radio init returned link failure code {}", LINK_FAILURE_CODE)),
                );
                if self.notices.raise(Notice::LinkFailed) {
                    warn!(target: "lora", "Radio link failure at init, running local-only");
                }
                LinkStatus::LinkFailed
            }
            Ok(code) => {
                self.record_init_error(&format!("radio init returned code {}", code));
                LinkStatus::InitError
            }
            Err(e) => {
                self.record_init_error(&e.to_string());
                LinkStatus::InitError
            }
        }
    }

    /// Mark the link unusable for a reason found outside the driver
    pub fn record_init_error(&mut self, reason: &str) {
        warn!(target: "lora", "Radio init error: {}", reason);
        self.health.set(LinkStatus::InitError, Some(reason.to_string()));
    }

    fn refuse(&mut self, refusal: Refusal) -> SendOutcome {
        if self.notices.raise(refusal.into()) {
            match refusal {
                Refusal::WrongMode => warn!(target: "lora", "Send refused: radio is in {} mode", self.mode),
                Refusal::DriverUnavailable => warn!(target: "lora", "Send refused: no radio driver"),
                Refusal::LinkFailed => warn!(target: "lora", "Send suppressed: link failure flagged"),
                Refusal::NotReady => warn!(target: "lora", "Send refused: radio not ready"),
            }
        }
        SendOutcome::Refused(refusal)
    }

    /// Frame and transmit one payload. Refusals are not errors; driver and
    /// encoding failures are.
    pub fn send_payload(&mut self, topic: &str, payload: &[u8]) -> RadioResult<SendOutcome> {
        if self.mode != RadioMode::Tx {
            return Ok(self.refuse(Refusal::WrongMode));
        }
        if self.driver.is_none() {
            return Ok(self.refuse(Refusal::DriverUnavailable));
        }
        match self.health.status() {
            LinkStatus::Ready => {}
            LinkStatus::LinkFailed => return Ok(self.refuse(Refusal::LinkFailed)),
            _ => return Ok(self.refuse(Refusal::NotReady)),
        }

        let frames = encode_frames(topic, payload, self.max_frame)?;
        let count = frames.len();
        let gap = self.inter_frame_gap;
        let Some(driver) = self.driver.as_mut() else {
            return Ok(SendOutcome::Refused(Refusal::DriverUnavailable));
        };
        for (i, frame) in frames.iter().enumerate() {
            driver.send(frame)?;
            if i + 1 < count && !gap.is_zero() {
                std::thread::sleep(gap);
            }
        }
        debug!(target: "lora", "Sent {} bytes on '{}' in {} frame(s)", payload.len(), topic, count);
        Ok(SendOutcome::Sent { frames: count })
    }

    /// Serialize `value` as compact JSON and send it
    pub fn send_json<T: Serialize>(&mut self, topic: &str, value: &T) -> RadioResult<SendOutcome> {
        let bytes = serde_json::to_vec(value)?;
        self.send_payload(topic, &bytes)
    }

    /// One receive cycle. Returns a packet when a message completes;
    /// `None` covers "nothing yet" and every recoverable problem.
    pub fn poll(&mut self, now: Instant) -> Option<ReceivedPacket> {
        if self.mode != RadioMode::Rx {
            return None;
        }
        let Some(driver) = self.driver.as_mut() else {
            if self.notices.raise(Notice::NoReceive) {
                warn!(target: "lora", "No radio driver, nothing to receive");
            }
            return None;
        };
        if !driver.can_receive() {
            if self.notices.raise(Notice::NoReceive) {
                warn!(target: "lora", "Radio driver cannot receive");
            }
            return None;
        }
        if !self.health.is_ready() {
            if self.notices.raise(Notice::ReceiveNotReady) {
                warn!(target: "lora", "Radio not ready, receive skipped");
            }
            return None;
        }
        // Every receive cycle ages out stale partial messages, idle ones included
        self.reassembler.sweep(now);

        let reception = match driver.receive() {
            Ok(r) => r,
            Err(e) => {
                warn!(target: "lora", "Receive failed: {}", e);
                return None;
            }
        };
        let raw = reception.payload()?;
        let Some(frame) = Frame::decode(raw) else {
            warn!(target: "lora", "Invalid frame ({} bytes): {}", raw.len(), hex::encode(raw));
            return None;
        };

        let topic = frame.topic.clone();
        let (frame_index, frame_total) = (frame.index, frame.total);
        let message = self.reassembler.push(frame, now)?;

        match serde_json::from_slice(&message) {
            Ok(payload) => Some(ReceivedPacket {
                topic,
                payload,
                metadata: LinkMetadata {
                    last_rssi: reception.last_rssi,
                    rssi: reception.rssi,
                    snr: reception.snr,
                    frame_index,
                    frame_total,
                },
            }),
            Err(e) => {
                warn!(target: "lora", "Message on '{}' is not valid JSON ({} bytes): {}", topic, message.len(), e);
                None
            }
        }
    }

    pub fn pending_messages(&self) -> usize {
        self.reassembler.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::{Airwaves, LoopbackRadio};
    use serde_json::json;

    fn config(mode: &str) -> RadioConfig {
        RadioConfig {
            mode: mode.to_string(),
            inter_frame_gap: 0.0,
            ..RadioConfig::default()
        }
    }

    fn manager(radio: LoopbackRadio, mode: &str) -> LinkStateManager {
        LinkStateManager::new(Some(Box::new(radio)), &config(mode))
    }

    #[test]
    fn test_init_ready() {
        let mut link = manager(LoopbackRadio::on(&Airwaves::new()), "tx");
        assert_eq!(link.status(), LinkStatus::Uninitialized);
        assert_eq!(link.initialize(), LinkStatus::Ready);
        assert!(link.health().is_ready());
        assert!(link.health().last_error().is_none());
    }

    #[test]
    fn test_init_code_three_is_link_failure() {
        let mut link = manager(LoopbackRadio::on(&Airwaves::new()).with_init_code(3), "tx");
        assert_eq!(link.initialize(), LinkStatus::LinkFailed);
        let health = link.health();
        assert!(health.link_failed());
        assert!(!health.is_ready());
        assert_eq!(
            link.send_payload("sensors", b"{}").unwrap(),
            SendOutcome::Refused(Refusal::LinkFailed)
        );
    }

    #[test]
    fn test_other_init_code_is_init_error() {
        let mut link = manager(LoopbackRadio::on(&Airwaves::new()).with_init_code(-1), "tx");
        assert_eq!(link.initialize(), LinkStatus::InitError);
        assert!(!link.health().link_failed());
        assert_eq!(link.health().last_error().unwrap(), "radio init returned code -1");
        assert_eq!(
            link.send_payload("sensors", b"{}").unwrap(),
            SendOutcome::Refused(Refusal::NotReady)
        );
    }

    #[test]
    fn test_missing_driver() {
        let mut link = LinkStateManager::new(None, &config("tx"));
        assert_eq!(link.initialize(), LinkStatus::InitError);
        assert_eq!(
            link.send_payload("sensors", b"{}").unwrap(),
            SendOutcome::Refused(Refusal::DriverUnavailable)
        );
    }

    #[test]
    fn test_receive_mode_refuses_send() {
        let mut link = manager(LoopbackRadio::on(&Airwaves::new()), "rx");
        link.initialize();
        assert_eq!(
            link.send_payload("sensors", b"{}").unwrap(),
            SendOutcome::Refused(Refusal::WrongMode)
        );
    }

    #[test]
    fn test_notice_raised_once_until_cleared() {
        let mut notices = Notices::default();
        assert!(notices.raise(Notice::NotReady));
        assert!(!notices.raise(Notice::NotReady));
        assert!(notices.raise(Notice::LinkFailed));
        notices.clear();
        assert!(notices.raise(Notice::NotReady));
    }

    #[test]
    fn test_send_then_receive_multi_frame() {
        let (tx_radio, rx_radio) = LoopbackRadio::pair();
        let mut tx = manager(tx_radio, "tx");
        let mut rx = manager(rx_radio, "rx");
        tx.initialize();
        rx.initialize();

        let body = json!({"reported_at": "2024-01-01T00:00:00.000000Z", "pad": "x".repeat(700)});
        let outcome = tx.send_json("sensors", &body).unwrap();
        let SendOutcome::Sent { frames } = outcome else {
            panic!("expected a send, got {:?}", outcome);
        };
        assert!(frames > 1);

        let now = Instant::now();
        let mut packets = Vec::new();
        for _ in 0..frames + 2 {
            if let Some(p) = rx.poll(now) {
                packets.push(p);
            }
        }
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].topic, "sensors");
        assert_eq!(packets[0].payload, body);
        assert_eq!(packets[0].metadata.frame_total as usize, frames);
        assert_eq!(packets[0].metadata.rssi, -58);
    }

    #[test]
    fn test_idle_polls_evict_stale_partial_message() {
        let air = Airwaves::new();
        let frames = encode_frames("sensors", &[b'7'; 400], 200).unwrap();
        assert_eq!(frames.len(), 3);
        air.inject(&frames[0]);
        let mut rx = manager(LoopbackRadio::on(&air), "rx");
        rx.initialize();

        let t0 = Instant::now();
        assert!(rx.poll(t0).is_none());
        assert_eq!(rx.pending_messages(), 1);

        // Nothing on the air, the frame timeout is 2 s
        assert!(rx.poll(t0 + Duration::from_secs(1)).is_none());
        assert_eq!(rx.pending_messages(), 1);
        assert!(rx.poll(t0 + Duration::from_secs(10)).is_none());
        assert_eq!(rx.pending_messages(), 0);

        // The rest of the message can no longer complete it
        air.inject(&frames[1]);
        air.inject(&frames[2]);
        let later = t0 + Duration::from_secs(10);
        assert!(rx.poll(later).is_none());
        assert!(rx.poll(later).is_none());
        assert_eq!(rx.pending_messages(), 1);
    }

    #[test]
    fn test_poll_ignores_garbage_and_tx_mode() {
        let air = Airwaves::new();
        air.inject(b"\x00\x01\x02\x03\x04\x05");
        let mut rx = manager(LoopbackRadio::on(&air), "rx");
        rx.initialize();
        assert!(rx.poll(Instant::now()).is_none());
        assert!(air.is_empty());

        air.inject(b"J\x01t\x01\x01{}");
        let mut tx = manager(LoopbackRadio::on(&air), "tx");
        tx.initialize();
        assert!(tx.poll(Instant::now()).is_none());
        assert_eq!(air.len(), 1);
    }

    #[test]
    fn test_poll_without_receive_capability() {
        let air = Airwaves::new();
        air.inject(b"J\x01t\x01\x01{}");
        let mut rx = manager(LoopbackRadio::on(&air).transmit_only(), "rx");
        rx.initialize();
        assert!(rx.poll(Instant::now()).is_none());
        assert_eq!(air.len(), 1);
    }

    #[test]
    fn test_send_error_propagates() {
        let mut link = manager(LoopbackRadio::on(&Airwaves::new()).failing_sends(), "tx");
        link.initialize();
        assert!(link.send_payload("sensors", b"{}").is_err());
        // A failed send does not change link state
        assert!(link.health().is_ready());
    }
}
