//! Zero-g detection with a debounce window and a one-shot latch.
//!
//! Inertial output is bias-corrected against the resting orientation, so a
//! body in free fall reads an acceleration magnitude close to 1 g. Each
//! in-band sample counts as a detection when at least `min_delay` has passed
//! since the previous one. Reaching `required` detections fires the latch
//! exactly once and drives the actuator; afterwards the detector ignores
//! everything.

use crate::actuator::Actuator;
use crate::config::ZeroGConfig;
use crate::types::{iso8601, Timestamp};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq)]
enum LatchState {
    Armed {
        detections: u32,
        last_detection: Option<Instant>,
    },
    Fired {
        at: DateTime<Utc>,
        magnitude: f64,
        detections: u32,
    },
}

/// What a single observation did to the detector
#[derive(Clone, Debug, PartialEq)]
pub enum ZeroGEvent {
    OutOfBand,
    /// In band, but too soon after the previous detection
    Debounced,
    Counted { detections: u32 },
    Fired { magnitude: f64, actuated: bool },
    /// Latch already fired
    Inert,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZeroGStatus {
    pub sent: bool,
    pub detections: u32,
    pub sent_at: Option<String>,
    pub magnitude: Option<f64>,
}

pub struct ZeroGDetector {
    reference_g: f64,
    tolerance: f64,
    min_delay: Duration,
    required: u32,
    state: LatchState,
    actuator: Box<dyn Actuator>,
}

impl ZeroGDetector {
    pub fn new(config: &ZeroGConfig, actuator: Box<dyn Actuator>) -> Self {
        ZeroGDetector {
            reference_g: config.reference_g,
            tolerance: config.tolerance,
            min_delay: config.min_delay(),
            required: config.required().max(1),
            state: LatchState::Armed {
                detections: 0,
                last_detection: None,
            },
            actuator,
        }
    }

    pub fn observe(&mut self, magnitude: f64, at: &Timestamp) -> ZeroGEvent {
        let LatchState::Armed {
            detections,
            last_detection,
        } = self.state
        else {
            return ZeroGEvent::Inert;
        };

        if !magnitude.is_finite() || (magnitude - self.reference_g).abs() > self.tolerance {
            return ZeroGEvent::OutOfBand;
        }
        if let Some(last) = last_detection {
            if at.monotonic.saturating_duration_since(last) < self.min_delay {
                return ZeroGEvent::Debounced;
            }
        }

        let detections = detections + 1;
        debug!(target: "aggregator", "Zero-g detection {}/{} at {:.3} g", detections, self.required, magnitude);
        if detections < self.required {
            self.state = LatchState::Armed {
                detections,
                last_detection: Some(at.monotonic),
            };
            return ZeroGEvent::Counted { detections };
        }

        self.state = LatchState::Fired {
            at: at.wall,
            magnitude,
            detections,
        };
        warn!(
            target: "aggregator",
            "Zero-g confirmed after {} detections ({:.3} g), signalling",
            detections, magnitude
        );
        let actuated = match self.actuator.activate() {
            Ok(()) => {
                info!(target: "gpio", "Zero-g signal sent");
                true
            }
            Err(e) => {
                error!(target: "gpio", "Zero-g signal not sent: {}", e);
                false
            }
        };
        ZeroGEvent::Fired { magnitude, actuated }
    }

    pub fn status(&self) -> ZeroGStatus {
        match &self.state {
            LatchState::Armed { detections, .. } => ZeroGStatus {
                sent: false,
                detections: *detections,
                sent_at: None,
                magnitude: None,
            },
            LatchState::Fired {
                at,
                magnitude,
                detections,
            } => ZeroGStatus {
                sent: true,
                detections: *detections,
                sent_at: Some(iso8601(at)),
                magnitude: Some(*magnitude),
            },
        }
    }

    pub fn release_actuator(&mut self) {
        self.actuator.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActuatorError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Counting {
        activations: Arc<AtomicU32>,
        fail: bool,
    }

    impl Actuator for Counting {
        fn activate(&mut self) -> Result<(), ActuatorError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ActuatorError::Gpio("pin busy".into()));
            }
            Ok(())
        }
    }

    fn at(base: Instant, secs: f64) -> Timestamp {
        Timestamp {
            monotonic: base + Duration::from_secs_f64(secs),
            wall: Utc::now(),
        }
    }

    fn detector(actuator: Counting) -> ZeroGDetector {
        ZeroGDetector::new(&ZeroGConfig::default(), Box::new(actuator))
    }

    #[test]
    fn test_debounced_scenario_fires_on_second_detection() {
        let actuator = Counting::default();
        let mut zero_g = detector(actuator.clone());
        let base = Instant::now();

        assert_eq!(zero_g.observe(1.00, &at(base, 0.0)), ZeroGEvent::Counted { detections: 1 });
        assert_eq!(zero_g.observe(1.02, &at(base, 0.3)), ZeroGEvent::Debounced);
        assert_eq!(
            zero_g.observe(0.99, &at(base, 1.6)),
            ZeroGEvent::Fired {
                magnitude: 0.99,
                actuated: true
            }
        );

        let status = zero_g.status();
        assert!(status.sent);
        assert_eq!(status.detections, 2);
        assert_eq!(status.magnitude, Some(0.99));
        assert!(status.sent_at.is_some());
        assert_eq!(actuator.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_inert_after_firing() {
        let actuator = Counting::default();
        let mut zero_g = detector(actuator.clone());
        let base = Instant::now();
        zero_g.observe(1.0, &at(base, 0.0));
        zero_g.observe(1.0, &at(base, 1.0));
        assert!(zero_g.status().sent);

        for i in 2..10 {
            assert_eq!(zero_g.observe(1.0, &at(base, i as f64 * 2.0)), ZeroGEvent::Inert);
        }
        assert_eq!(zero_g.status().detections, 2);
        assert_eq!(actuator.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_out_of_band_does_not_count() {
        let mut zero_g = detector(Counting::default());
        let base = Instant::now();
        assert_eq!(zero_g.observe(0.94, &at(base, 0.0)), ZeroGEvent::OutOfBand);
        assert_eq!(zero_g.observe(1.051, &at(base, 2.0)), ZeroGEvent::OutOfBand);
        assert_eq!(zero_g.observe(f64::NAN, &at(base, 4.0)), ZeroGEvent::OutOfBand);
        assert_eq!(zero_g.status().detections, 0);
    }

    #[test]
    fn test_rapid_in_band_samples_count_once() {
        let mut zero_g = detector(Counting::default());
        let base = Instant::now();
        for i in 0..20 {
            zero_g.observe(1.0, &at(base, i as f64 * 0.04));
        }
        assert_eq!(zero_g.status().detections, 1);
        assert!(!zero_g.status().sent);
    }

    #[test]
    fn test_actuator_failure_still_latches() {
        let actuator = Counting {
            fail: true,
            ..Counting::default()
        };
        let mut zero_g = detector(actuator.clone());
        let base = Instant::now();
        zero_g.observe(1.0, &at(base, 0.0));
        let event = zero_g.observe(1.0, &at(base, 1.5));
        assert_eq!(
            event,
            ZeroGEvent::Fired {
                magnitude: 1.0,
                actuated: false
            }
        );
        assert!(zero_g.status().sent);
        assert_eq!(zero_g.observe(1.0, &at(base, 3.0)), ZeroGEvent::Inert);
        assert_eq!(actuator.activations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_single_required_fires_immediately() {
        let config = ZeroGConfig {
            required: 1,
            ..ZeroGConfig::default()
        };
        let mut zero_g = ZeroGDetector::new(&config, Box::new(Counting::default()));
        let event = zero_g.observe(1.01, &Timestamp::now());
        assert!(matches!(event, ZeroGEvent::Fired { .. }));
    }
}
