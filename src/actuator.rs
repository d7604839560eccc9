//! Output pins driven when the zero-g latch fires.

use crate::config::ActuatorConfig;
use crate::error::ActuatorError;
use log::info;

pub trait Actuator: Send {
    /// Drive every output high
    fn activate(&mut self) -> Result<(), ActuatorError>;

    /// Drive every output low again. Safe to call when never activated.
    fn release(&mut self) {}
}

/// Stands in when GPIO is disabled or missing; activation always fails
#[derive(Debug)]
pub struct DisabledActuator {
    reason: String,
}

impl DisabledActuator {
    pub fn new(reason: impl Into<String>) -> Self {
        DisabledActuator { reason: reason.into() }
    }
}

impl Actuator for DisabledActuator {
    fn activate(&mut self) -> Result<(), ActuatorError> {
        Err(ActuatorError::Unavailable(self.reason.clone()))
    }
}

#[cfg(feature = "hardware")]
pub use gpio::GpioActuator;

#[cfg(feature = "hardware")]
mod gpio {
    use super::Actuator;
    use crate::error::ActuatorError;
    use log::{debug, info};
    use rppal::gpio::{Gpio, OutputPin};

    /// Pins are claimed on first activation, not at startup
    pub struct GpioActuator {
        pins: Vec<u8>,
        outputs: Vec<OutputPin>,
    }

    impl GpioActuator {
        pub fn new(pins: Vec<u8>) -> Self {
            GpioActuator {
                pins,
                outputs: Vec::new(),
            }
        }

        fn claim(&mut self) -> Result<(), ActuatorError> {
            if !self.outputs.is_empty() {
                return Ok(());
            }
            let gpio = Gpio::new().map_err(|e| ActuatorError::Unavailable(e.to_string()))?;
            for pin in &self.pins {
                let mut output = gpio
                    .get(*pin)
                    .map_err(|e| ActuatorError::Gpio(format!("pin {}: {}", pin, e)))?
                    .into_output_low();
                output.set_reset_on_drop(false);
                self.outputs.push(output);
            }
            Ok(())
        }
    }

    impl Actuator for GpioActuator {
        fn activate(&mut self) -> Result<(), ActuatorError> {
            self.claim()?;
            for output in &mut self.outputs {
                output.set_high();
            }
            info!(target: "gpio", "Pins {:?} high", self.pins);
            Ok(())
        }

        fn release(&mut self) {
            if self.outputs.is_empty() {
                return;
            }
            for output in &mut self.outputs {
                output.set_low();
            }
            self.outputs.clear();
            debug!(target: "gpio", "Pins {:?} released", self.pins);
        }
    }
}

pub fn build_actuator(config: &ActuatorConfig) -> Box<dyn Actuator> {
    if !config.enabled || config.pins.is_empty() {
        info!(target: "gpio", "Actuator disabled");
        return Box::new(DisabledActuator::new("disabled in configuration"));
    }

    #[cfg(feature = "hardware")]
    {
        info!(target: "gpio", "Actuator on pins {:?}", config.pins);
        Box::new(GpioActuator::new(config.pins.clone()))
    }

    #[cfg(not(feature = "hardware"))]
    {
        log::warn!(target: "gpio", "GPIO unsupported in this build, pins {:?} will not be driven", config.pins);
        Box::new(DisabledActuator::new("built without GPIO support"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_actuator_reports_unavailable() {
        let mut actuator = DisabledActuator::new("no gpio");
        let err = actuator.activate().unwrap_err();
        assert!(matches!(err, ActuatorError::Unavailable(ref r) if r == "no gpio"));
        actuator.release();
    }

    #[test]
    fn test_build_disabled_by_config() {
        let config = ActuatorConfig {
            enabled: false,
            pins: vec![12, 7],
        };
        let mut actuator = build_actuator(&config);
        assert!(actuator.activate().is_err());
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn test_build_without_hardware_is_unavailable() {
        let mut actuator = build_actuator(&ActuatorConfig::default());
        assert!(matches!(actuator.activate(), Err(ActuatorError::Unavailable(_))));
    }
}
