//! Node configuration.
//!
//! Loaded from a JSON file (default `lora_config.json`). Every section falls
//! back to its defaults, and every out-of-range value is replaced by its
//! default, with a note the caller logs once the logger is up. A bad config
//! never stops the node.
//!
//! Radio keys may sit at the top level of the file (the historical flat
//! layout) or inside a `radio` object; the object wins.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "lora_config.json";

/// Longest accepted duration setting, in seconds
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Something the loader replaced, logged once the logger is up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigNote {
    pub level: log::Level,
    pub message: String,
}

impl ConfigNote {
    fn warn(message: String) -> Self {
        ConfigNote {
            level: log::Level::Warn,
            message,
        }
    }

    fn error(message: String) -> Self {
        ConfigNote {
            level: log::Level::Error,
            message,
        }
    }
}

/// Radio role for this process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioMode {
    Tx,
    Rx,
}

impl RadioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RadioMode::Tx => "tx",
            RadioMode::Rx => "rx",
        }
    }
}

impl fmt::Display for RadioMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RadioMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tx" => Ok(RadioMode::Tx),
            "rx" => Ok(RadioMode::Rx),
            other => Err(format!("unknown radio mode '{}' (expected tx or rx)", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    pub mode: String,
    pub frequency_hz: i64,
    pub spread_factor: i64,
    /// Seconds between receive polls
    pub poll_interval: f64,
    /// Seconds before an incomplete reassembly is evicted
    pub frame_timeout: f64,
    pub max_frame_bytes: i64,
    pub topic: String,
    /// Seconds to pause between frames of one multi-frame message
    pub inter_frame_gap: f64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            mode: "tx".to_string(),
            frequency_hz: 433_000_000,
            spread_factor: 7,
            poll_interval: 0.05,
            frame_timeout: 2.0,
            max_frame_bytes: 200,
            topic: "sensors".to_string(),
            inter_frame_gap: 0.05,
        }
    }
}

impl RadioConfig {
    pub const MIN_FRAME_TIMEOUT: f64 = 0.1;

    fn sanitize(&mut self, notes: &mut Vec<String>) {
        let defaults = Self::default();
        match self.mode.parse::<RadioMode>() {
            Ok(mode) => self.mode = mode.as_str().to_string(),
            Err(e) => {
                notes.push(format!("radio.mode: {}, using tx", e));
                self.mode = defaults.mode.clone();
            }
        }
        if self.frequency_hz <= 0 || self.frequency_hz > u32::MAX as i64 {
            notes.push(format!(
                "radio.frequency_hz {} out of range, using {}",
                self.frequency_hz, defaults.frequency_hz
            ));
            self.frequency_hz = defaults.frequency_hz;
        }
        if !(7..=12).contains(&self.spread_factor) {
            notes.push(format!(
                "radio.spread_factor {} not in 7..=12, using {}",
                self.spread_factor, defaults.spread_factor
            ));
            self.spread_factor = defaults.spread_factor;
        }
        if !self.poll_interval.is_finite() || self.poll_interval < 0.0 {
            notes.push(format!("radio.poll_interval {} invalid, using 0", self.poll_interval));
            self.poll_interval = 0.0;
        }
        if !self.frame_timeout.is_finite() || self.frame_timeout < Self::MIN_FRAME_TIMEOUT {
            notes.push(format!(
                "radio.frame_timeout {} below {}, clamped",
                self.frame_timeout,
                Self::MIN_FRAME_TIMEOUT
            ));
            self.frame_timeout = Self::MIN_FRAME_TIMEOUT;
        }
        // Smallest frame that can carry a byte: tag, topic length, index, total, chunk
        if self.max_frame_bytes < 6 || self.max_frame_bytes > 255 {
            notes.push(format!(
                "radio.max_frame_bytes {} out of range, using {}",
                self.max_frame_bytes, defaults.max_frame_bytes
            ));
            self.max_frame_bytes = defaults.max_frame_bytes;
        }
        if !self.inter_frame_gap.is_finite() || self.inter_frame_gap < 0.0 {
            notes.push(format!(
                "radio.inter_frame_gap {} invalid, using {}",
                self.inter_frame_gap, defaults.inter_frame_gap
            ));
            self.inter_frame_gap = defaults.inter_frame_gap;
        }
        capped(&mut self.poll_interval, defaults.poll_interval, "radio.poll_interval", notes);
        capped(&mut self.frame_timeout, defaults.frame_timeout, "radio.frame_timeout", notes);
        capped(&mut self.inter_frame_gap, defaults.inter_frame_gap, "radio.inter_frame_gap", notes);
    }

    pub fn mode(&self) -> RadioMode {
        self.mode.parse().unwrap_or(RadioMode::Tx)
    }

    pub fn frequency_hz(&self) -> u32 {
        u32::try_from(self.frequency_hz).unwrap_or(433_000_000)
    }

    pub fn spreading_factor(&self) -> u8 {
        u8::try_from(self.spread_factor).unwrap_or(7)
    }

    pub fn poll_interval(&self) -> Duration {
        secs(self.poll_interval)
    }

    pub fn frame_timeout(&self) -> Duration {
        secs(self.frame_timeout.max(Self::MIN_FRAME_TIMEOUT))
    }

    pub fn max_frame_bytes(&self) -> usize {
        usize::try_from(self.max_frame_bytes).unwrap_or(200)
    }

    pub fn inter_frame_gap(&self) -> Duration {
        secs(self.inter_frame_gap)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Minimum seconds between snapshots
    pub emit_interval: f64,
    /// Seconds the aggregator blocks on the queue before re-checking the stop flag
    pub poll_timeout: f64,
    pub queue_capacity: i64,
    /// Seconds to wait for each worker at shutdown
    pub join_timeout: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            emit_interval: 0.5,
            poll_timeout: 0.2,
            queue_capacity: 64,
            join_timeout: 1.0,
        }
    }
}

impl AggregatorConfig {
    fn sanitize(&mut self, notes: &mut Vec<String>) {
        let d = Self::default();
        positive(&mut self.emit_interval, d.emit_interval, "aggregator.emit_interval", notes);
        positive(&mut self.poll_timeout, d.poll_timeout, "aggregator.poll_timeout", notes);
        positive(&mut self.join_timeout, d.join_timeout, "aggregator.join_timeout", notes);
        capped(&mut self.emit_interval, d.emit_interval, "aggregator.emit_interval", notes);
        capped(&mut self.poll_timeout, d.poll_timeout, "aggregator.poll_timeout", notes);
        capped(&mut self.join_timeout, d.join_timeout, "aggregator.join_timeout", notes);
        if self.queue_capacity < 1 {
            notes.push(format!(
                "aggregator.queue_capacity {} invalid, using {}",
                self.queue_capacity, d.queue_capacity
            ));
            self.queue_capacity = d.queue_capacity;
        }
    }

    pub fn emit_interval(&self) -> Duration {
        secs(self.emit_interval)
    }

    pub fn poll_timeout(&self) -> Duration {
        secs(self.poll_timeout)
    }

    pub fn queue_capacity(&self) -> usize {
        usize::try_from(self.queue_capacity).unwrap_or(64)
    }

    pub fn join_timeout(&self) -> Duration {
        secs(self.join_timeout)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZeroGConfig {
    pub reference_g: f64,
    pub tolerance: f64,
    pub min_delay: f64,
    pub required: i64,
}

impl Default for ZeroGConfig {
    fn default() -> Self {
        Self {
            reference_g: 1.0,
            tolerance: 0.05,
            min_delay: 1.0,
            required: 2,
        }
    }
}

impl ZeroGConfig {
    fn sanitize(&mut self, notes: &mut Vec<String>) {
        let d = Self::default();
        positive(&mut self.reference_g, d.reference_g, "zero_g.reference_g", notes);
        positive(&mut self.tolerance, d.tolerance, "zero_g.tolerance", notes);
        if !self.min_delay.is_finite() || self.min_delay < 0.0 {
            notes.push(format!("zero_g.min_delay {} invalid, using {}", self.min_delay, d.min_delay));
            self.min_delay = d.min_delay;
        }
        capped(&mut self.min_delay, d.min_delay, "zero_g.min_delay", notes);
        if self.required < 1 || self.required > u32::MAX as i64 {
            notes.push(format!("zero_g.required {} invalid, using {}", self.required, d.required));
            self.required = d.required;
        }
    }

    pub fn min_delay(&self) -> Duration {
        secs(self.min_delay)
    }

    pub fn required(&self) -> u32 {
        u32::try_from(self.required).unwrap_or(2)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InertialConfig {
    pub i2c_bus: u8,
    pub address: u16,
    pub calibration_samples: i64,
    pub calibration_pause: f64,
    pub sample_interval: f64,
    pub input_alpha: f64,
    pub fusion_weight: f64,
    pub output_smoothing: f64,
    pub retry_attempts: i64,
    pub retry_delay: f64,
}

impl Default for InertialConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            address: 0x68,
            calibration_samples: 500,
            calibration_pause: 0.002,
            sample_interval: 0.05,
            input_alpha: 0.3,
            fusion_weight: 0.96,
            output_smoothing: 0.9,
            retry_attempts: 3,
            retry_delay: 0.05,
        }
    }
}

impl InertialConfig {
    fn sanitize(&mut self, notes: &mut Vec<String>) {
        let d = Self::default();
        if self.calibration_samples < 1 {
            notes.push(format!(
                "inertial.calibration_samples {} invalid, using {}",
                self.calibration_samples, d.calibration_samples
            ));
            self.calibration_samples = d.calibration_samples;
        }
        if !self.calibration_pause.is_finite() || self.calibration_pause < 0.0 {
            notes.push(format!(
                "inertial.calibration_pause {} invalid, using {}",
                self.calibration_pause, d.calibration_pause
            ));
            self.calibration_pause = d.calibration_pause;
        }
        positive(&mut self.sample_interval, d.sample_interval, "inertial.sample_interval", notes);
        unit(&mut self.input_alpha, d.input_alpha, "inertial.input_alpha", notes);
        unit(&mut self.fusion_weight, d.fusion_weight, "inertial.fusion_weight", notes);
        unit(&mut self.output_smoothing, d.output_smoothing, "inertial.output_smoothing", notes);
        if self.retry_attempts < 1 {
            notes.push(format!(
                "inertial.retry_attempts {} invalid, using {}",
                self.retry_attempts, d.retry_attempts
            ));
            self.retry_attempts = d.retry_attempts;
        }
        if !self.retry_delay.is_finite() || self.retry_delay < 0.0 {
            notes.push(format!("inertial.retry_delay {} invalid, using {}", self.retry_delay, d.retry_delay));
            self.retry_delay = d.retry_delay;
        }
        capped(&mut self.calibration_pause, d.calibration_pause, "inertial.calibration_pause", notes);
        capped(&mut self.sample_interval, d.sample_interval, "inertial.sample_interval", notes);
        capped(&mut self.retry_delay, d.retry_delay, "inertial.retry_delay", notes);
    }

    pub fn calibration_samples(&self) -> usize {
        usize::try_from(self.calibration_samples).unwrap_or(500)
    }

    pub fn calibration_pause(&self) -> Duration {
        secs(self.calibration_pause)
    }

    pub fn sample_interval(&self) -> Duration {
        secs(self.sample_interval)
    }

    pub fn retry_attempts(&self) -> u32 {
        u32::try_from(self.retry_attempts).unwrap_or(3)
    }

    pub fn retry_delay(&self) -> Duration {
        secs(self.retry_delay)
    }
}

/// A line-oriented serial sensor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialSensorConfig {
    pub port: String,
    pub baud: u32,
    pub read_timeout: f64,
    /// Seconds to let the device settle after opening the port
    pub settle_time: f64,
    pub sample_interval: f64,
}

impl SerialSensorConfig {
    pub fn barometric() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 9600,
            read_timeout: 0.2,
            settle_time: 2.0,
            sample_interval: 0.05,
        }
    }

    pub fn position() -> Self {
        Self {
            port: "/dev/serial0".to_string(),
            baud: 9600,
            read_timeout: 0.4,
            settle_time: 0.0,
            sample_interval: 0.1,
        }
    }

    fn sanitize(&mut self, section: &str, defaults: Self, notes: &mut Vec<String>) {
        if self.baud == 0 {
            notes.push(format!("{}.baud 0 invalid, using {}", section, defaults.baud));
            self.baud = defaults.baud;
        }
        positive(&mut self.read_timeout, defaults.read_timeout, &format!("{}.read_timeout", section), notes);
        positive(
            &mut self.sample_interval,
            defaults.sample_interval,
            &format!("{}.sample_interval", section),
            notes,
        );
        if !self.settle_time.is_finite() || self.settle_time < 0.0 {
            notes.push(format!("{}.settle_time {} invalid, using {}", section, self.settle_time, defaults.settle_time));
            self.settle_time = defaults.settle_time;
        }
        capped(&mut self.read_timeout, defaults.read_timeout, &format!("{}.read_timeout", section), notes);
        capped(&mut self.settle_time, defaults.settle_time, &format!("{}.settle_time", section), notes);
        capped(
            &mut self.sample_interval,
            defaults.sample_interval,
            &format!("{}.sample_interval", section),
            notes,
        );
    }

    pub fn read_timeout(&self) -> Duration {
        secs(self.read_timeout)
    }

    pub fn settle_time(&self) -> Duration {
        secs(self.settle_time)
    }

    pub fn sample_interval(&self) -> Duration {
        secs(self.sample_interval)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub enabled: bool,
    /// BCM pin numbers driven high when the zero-g signal fires
    pub pins: Vec<u8>,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pins: vec![12, 7],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub payload_log: String,
    pub summary_log: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            payload_log: "logs/payloads.log".to_string(),
            summary_log: "logs/summary.log".to_string(),
        }
    }
}

impl LoggingConfig {
    fn sanitize(&mut self, notes: &mut Vec<String>) {
        let level = self.level.trim().to_ascii_lowercase();
        if ["off", "error", "warn", "info", "debug", "trace"].contains(&level.as_str()) {
            self.level = level;
        } else {
            notes.push(format!("logging.level '{}' unknown, using info", self.level));
            self.level = "info".to_string();
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub radio: RadioConfig,
    pub aggregator: AggregatorConfig,
    pub zero_g: ZeroGConfig,
    pub inertial: InertialConfig,
    pub barometric: SerialSensorConfig,
    pub position: SerialSensorConfig,
    pub actuator: ActuatorConfig,
    pub logging: LoggingConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            radio: RadioConfig::default(),
            aggregator: AggregatorConfig::default(),
            zero_g: ZeroGConfig::default(),
            inertial: InertialConfig::default(),
            barometric: SerialSensorConfig::barometric(),
            position: SerialSensorConfig::position(),
            actuator: ActuatorConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from file, falling back to defaults.
    ///
    /// Returns the config together with notes about every value that was
    /// replaced. A file that cannot be used at all is an error-level note.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Vec<ConfigNote>) {
        let path = path.as_ref();
        if !path.exists() {
            let notes = vec![ConfigNote::warn(format!(
                "config file {} not found, using defaults",
                path.display()
            ))];
            return (Self::default(), notes);
        }
        match Self::load(path) {
            Ok((config, notes)) => (config, notes.into_iter().map(ConfigNote::warn).collect()),
            Err(e) => {
                let notes = vec![ConfigNote::error(format!("{} ({}), using defaults", e, path.display()))];
                (Self::default(), notes)
            }
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<(Self, Vec<String>), ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let root: Value = serde_json::from_str(content)?;
        let root = root.as_object().ok_or(ConfigError::NotAnObject)?;
        let mut notes = Vec::new();

        // Flat top-level radio keys first, then the `radio` object on top
        let mut radio_overlay = root.clone();
        if let Some(Value::Object(radio)) = root.get("radio") {
            for (k, v) in radio {
                radio_overlay.insert(k.clone(), v.clone());
            }
        }

        let mut config = Self {
            radio: overlay(Some(&Value::Object(radio_overlay)), RadioConfig::default(), "radio", &mut notes),
            aggregator: overlay(root.get("aggregator"), AggregatorConfig::default(), "aggregator", &mut notes),
            zero_g: overlay(root.get("zero_g"), ZeroGConfig::default(), "zero_g", &mut notes),
            inertial: overlay(root.get("inertial"), InertialConfig::default(), "inertial", &mut notes),
            barometric: overlay(root.get("barometric"), SerialSensorConfig::barometric(), "barometric", &mut notes),
            position: overlay(root.get("position"), SerialSensorConfig::position(), "position", &mut notes),
            actuator: overlay(root.get("actuator"), ActuatorConfig::default(), "actuator", &mut notes),
            logging: overlay(root.get("logging"), LoggingConfig::default(), "logging", &mut notes),
        };
        config.sanitize(&mut notes);
        Ok((config, notes))
    }

    fn sanitize(&mut self, notes: &mut Vec<String>) {
        self.radio.sanitize(notes);
        self.aggregator.sanitize(notes);
        self.zero_g.sanitize(notes);
        self.inertial.sanitize(notes);
        self.barometric.sanitize("barometric", SerialSensorConfig::barometric(), notes);
        self.position.sanitize("position", SerialSensorConfig::position(), notes);
        self.logging.sanitize(notes);
    }
}

/// Deserialize `section` on top of `default`, key by key.
fn overlay<T>(section: Option<&Value>, default: T, name: &str, notes: &mut Vec<String>) -> T
where
    T: Serialize + DeserializeOwned,
{
    let user = match section {
        None => return default,
        Some(Value::Object(map)) => map,
        Some(_) => {
            notes.push(format!("{} must be an object, using defaults", name));
            return default;
        }
    };
    let mut merged = match serde_json::to_value(&default) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (k, v) in user {
        if merged.contains_key(k) {
            merged.insert(k.clone(), v.clone());
        }
    }
    match serde_json::from_value(Value::Object(merged)) {
        Ok(value) => value,
        Err(e) => {
            notes.push(format!("{}: {}, using defaults", name, e));
            default
        }
    }
}

fn positive(value: &mut f64, default: f64, name: &str, notes: &mut Vec<String>) {
    if !value.is_finite() || *value <= 0.0 {
        notes.push(format!("{} {} must be positive, using {}", name, value, default));
        *value = default;
    }
}

fn unit(value: &mut f64, default: f64, name: &str, notes: &mut Vec<String>) {
    if !value.is_finite() || *value < 0.0 || *value > 1.0 {
        notes.push(format!("{} {} not in [0, 1], using {}", name, value, default));
        *value = default;
    }
}

fn capped(value: &mut f64, default: f64, name: &str, notes: &mut Vec<String>) {
    if *value > MAX_DURATION_SECS {
        notes.push(format!("{} {} exceeds {} s, using {}", name, value, MAX_DURATION_SECS, default));
        *value = default;
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::try_from_secs_f64(value.min(MAX_DURATION_SECS)).unwrap_or(Duration::ZERO)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_clean() {
        let (config, notes) = NodeConfig::from_json_str("{}").unwrap();
        assert!(notes.is_empty(), "unexpected notes: {:?}", notes);
        assert_eq!(config.radio.mode(), RadioMode::Tx);
        assert_eq!(config.radio.frequency_hz(), 433_000_000);
        assert_eq!(config.radio.spreading_factor(), 7);
        assert_eq!(config.radio.frame_timeout(), Duration::from_secs(2));
        assert_eq!(config.aggregator.emit_interval(), Duration::from_millis(500));
        assert_eq!(config.barometric.port, "/dev/ttyUSB0");
        assert_eq!(config.position.port, "/dev/serial0");
    }

    #[test]
    fn test_flat_radio_keys() {
        let json = r#"{"mode": "RX", "frequency_hz": 915000000, "spread_factor": 9, "poll_interval": 0.1}"#;
        let (config, notes) = NodeConfig::from_json_str(json).unwrap();
        assert!(notes.is_empty());
        assert_eq!(config.radio.mode(), RadioMode::Rx);
        assert_eq!(config.radio.frequency_hz(), 915_000_000);
        assert_eq!(config.radio.spreading_factor(), 9);
        assert_eq!(config.radio.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_nested_radio_overrides_flat() {
        let json = r#"{"mode": "rx", "radio": {"mode": "tx"}}"#;
        let (config, _) = NodeConfig::from_json_str(json).unwrap();
        assert_eq!(config.radio.mode(), RadioMode::Tx);
    }

    #[test]
    fn test_out_of_range_values_fall_back() {
        let json = r#"{"mode": "broadcast", "spread_factor": 13, "frame_timeout": 0.01, "poll_interval": -1}"#;
        let (config, notes) = NodeConfig::from_json_str(json).unwrap();
        assert_eq!(config.radio.mode(), RadioMode::Tx);
        assert_eq!(config.radio.spreading_factor(), 7);
        assert_eq!(config.radio.frame_timeout(), Duration::from_millis(100));
        assert_eq!(config.radio.poll_interval(), Duration::ZERO);
        assert_eq!(notes.len(), 4);
    }

    #[test]
    fn test_bad_section_type_keeps_other_sections() {
        let json = r#"{"zero_g": {"tolerance": "wide"}, "aggregator": {"emit_interval": 1.5}}"#;
        let (config, notes) = NodeConfig::from_json_str(json).unwrap();
        assert_eq!(config.zero_g.tolerance, 0.05);
        assert_eq!(config.aggregator.emit_interval(), Duration::from_millis(1500));
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("zero_g"));
    }

    #[test]
    fn test_partial_serial_section_keeps_its_own_defaults() {
        let json = r#"{"position": {"baud": 4800}}"#;
        let (config, _) = NodeConfig::from_json_str(json).unwrap();
        assert_eq!(config.position.baud, 4800);
        assert_eq!(config.position.port, "/dev/serial0");
        assert_eq!(config.position.read_timeout(), Duration::from_millis(400));
    }

    #[test]
    fn test_non_object_root_is_an_error() {
        assert!(matches!(
            NodeConfig::from_json_str("[1, 2]"),
            Err(ConfigError::NotAnObject)
        ));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let (config, notes) = NodeConfig::load_or_default("/nonexistent/lora_config.json");
        assert_eq!(config.radio.mode(), RadioMode::Tx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, log::Level::Warn);
    }

    #[test]
    fn test_unusable_file_is_an_error_note() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lora_config.json");
        for content in ["[1, 2]", "{not json"] {
            std::fs::write(&path, content).unwrap();
            let (config, notes) = NodeConfig::load_or_default(&path);
            assert_eq!(config.radio.mode(), RadioMode::Tx);
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].level, log::Level::Error);
        }
    }

    #[test]
    fn test_replaced_values_are_warnings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lora_config.json");
        std::fs::write(&path, r#"{"spread_factor": 13, "mode": "rx"}"#).unwrap();
        let (config, notes) = NodeConfig::load_or_default(&path);
        assert_eq!(config.radio.mode(), RadioMode::Rx);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].level, log::Level::Warn);
        assert!(notes[0].message.starts_with("radio.spread_factor"));
    }

    #[test]
    fn test_overflowing_durations_fall_back() {
        let json = r#"{"aggregator": {"emit_interval": 1e20}, "zero_g": {"min_delay": 1e300}, "inter_frame_gap": 1e19}"#;
        let (config, notes) = NodeConfig::from_json_str(json).unwrap();
        assert_eq!(config.aggregator.emit_interval(), Duration::from_millis(500));
        assert_eq!(config.zero_g.min_delay(), Duration::from_secs(1));
        assert_eq!(config.radio.inter_frame_gap(), RadioConfig::default().inter_frame_gap());
        assert_eq!(notes.len(), 3, "notes: {:?}", notes);
        assert!(notes[0].starts_with("radio.inter_frame_gap"));
    }

    #[test]
    fn test_duration_accessor_never_overflows() {
        let mut config = AggregatorConfig::default();
        config.emit_interval = 1e20;
        assert_eq!(config.emit_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(" Rx ".parse::<RadioMode>(), Ok(RadioMode::Rx));
        assert!("both".parse::<RadioMode>().is_err());
    }
}
