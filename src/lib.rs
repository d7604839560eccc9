//! Rocket telemetry node: sensor producers, zero-g detection and a chunked
//! LoRa link carrying JSON snapshots.

pub mod activity;
pub mod actuator;
pub mod aggregator;
pub mod config;
pub mod error;
pub mod filters;
pub mod incident;
pub mod payload_log;
pub mod producer;
pub mod protocol;
pub mod radio;
pub mod receiver;
pub mod sensors;
pub mod shutdown;
pub mod smoothing;
pub mod summary;
pub mod types;
