//! Radio driver boundary and link management.

pub mod link;
pub mod loopback;

pub use link::{LinkHealth, LinkMetadata, LinkReport, LinkStateManager, LinkStatus, ReceivedPacket, Refusal, SendOutcome};
pub use loopback::{Airwaves, LoopbackRadio};

use crate::config::RadioMode;
use crate::error::RadioResult;

/// Driver init code for "radio present but not answering"
pub const LINK_FAILURE_CODE: i32 = 3;

/// One buffer handed up by the driver
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawReception {
    pub buffer: Vec<u8>,
    /// Bytes of `buffer` that are valid; zero or negative means nothing received
    pub length: i32,
    pub last_rssi: i32,
    pub rssi: i32,
    pub snr: f32,
    /// Non-zero when the driver flagged the packet as corrupt
    pub error_code: i32,
}

impl RawReception {
    pub fn payload(&self) -> Option<&[u8]> {
        if self.error_code != 0 || self.length <= 0 {
            return None;
        }
        let len = (self.length as usize).min(self.buffer.len());
        Some(&self.buffer[..len])
    }
}

/// Low-level packet radio.
///
/// `init` returns the driver's status code: 0 is ready,
/// [`LINK_FAILURE_CODE`] is a link failure, anything else an init error.
///
/// The node binary only ships [`LoopbackRadio`]; a LoRa transceiver driver
/// plugs in here and is handed to [`LinkStateManager::new`]. Without one the
/// link reports an init error and the node runs local-only.
pub trait RadioDriver: Send {
    fn init(&mut self, mode: RadioMode, frequency_hz: u32, spreading_factor: u8) -> RadioResult<i32>;

    fn send(&mut self, frame: &[u8]) -> RadioResult<()>;

    fn receive(&mut self) -> RadioResult<RawReception>;

    /// Drivers built for transmit only report false
    fn can_receive(&self) -> bool {
        true
    }
}
