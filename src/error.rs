use thiserror::Error;

/// Failures raised by a sensor driver
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Bus error: {0}")]
    Bus(String),

    #[error("Serial I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Calibration failed: {0}")]
    Calibration(String),
}

/// Failures raised by the radio driver or the link layer
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("Radio driver error: {0}")]
    Driver(String),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("Payload encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload needs {chunks} frames, the wire format allows at most {max}")]
    PayloadTooLarge { chunks: usize, max: usize },
}

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Actuator unavailable: {0}")]
    Unavailable(String),

    #[error("GPIO error: {0}")]
    Gpio(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config root must be a JSON object")]
    NotAnObject,
}

pub type SensorResult<T> = Result<T, SensorError>;
pub type RadioResult<T> = Result<T, RadioError>;
