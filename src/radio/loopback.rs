//! In-memory radio for tests and for running a node against an in-process
//! receiver.

use super::{RadioDriver, RawReception};
use crate::config::RadioMode;
use crate::error::{RadioError, RadioResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Shared medium: frames sent by one radio are received by every radio
/// attached to the same `Airwaves`, in send order.
#[derive(Clone, Default)]
pub struct Airwaves {
    inner: Arc<Mutex<VecDeque<Vec<u8>>>>,
}

impl Airwaves {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Put a raw buffer on the air
    pub fn inject(&self, frame: &[u8]) {
        self.lock().push_back(frame.to_vec());
    }

    pub fn take(&self) -> Option<Vec<u8>> {
        self.lock().pop_front()
    }

    pub fn drain(&self) -> Vec<Vec<u8>> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct LoopbackRadio {
    air: Airwaves,
    init_code: i32,
    fail_sends: bool,
    can_receive: bool,
    sent: usize,
}

impl LoopbackRadio {
    pub fn on(air: &Airwaves) -> Self {
        Self {
            air: air.clone(),
            init_code: 0,
            fail_sends: false,
            can_receive: true,
            sent: 0,
        }
    }

    /// Transmitter and receiver sharing one medium
    pub fn pair() -> (Self, Self) {
        let air = Airwaves::new();
        (Self::on(&air), Self::on(&air))
    }

    /// Make `init` report this driver code
    pub fn with_init_code(mut self, code: i32) -> Self {
        self.init_code = code;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn transmit_only(mut self) -> Self {
        self.can_receive = false;
        self
    }

    pub fn frames_sent(&self) -> usize {
        self.sent
    }
}

impl RadioDriver for LoopbackRadio {
    fn init(&mut self, _mode: RadioMode, _frequency_hz: u32, _spreading_factor: u8) -> RadioResult<i32> {
        Ok(self.init_code)
    }

    fn send(&mut self, frame: &[u8]) -> RadioResult<()> {
        if self.fail_sends {
            return Err(RadioError::Driver("transmit timeout".to_string()));
        }
        self.air.inject(frame);
        self.sent += 1;
        Ok(())
    }

    fn receive(&mut self) -> RadioResult<RawReception> {
        Ok(match self.air.take() {
            Some(buffer) => RawReception {
                length: buffer.len() as i32,
                buffer,
                last_rssi: -61,
                rssi: -58,
                snr: 9.5,
                error_code: 0,
            },
            None => RawReception::default(),
        })
    }

    fn can_receive(&self) -> bool {
        self.can_receive
    }
}
