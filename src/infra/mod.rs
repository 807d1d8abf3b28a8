//! Infrastructure shared by the controller and its I/O tasks
//!
//! - `config` - TOML configuration with per-section defaults
//! - `metrics` - atomic counters, gauges and latency histograms
//! - `broker` - optional embedded rumqttd for bench rooms

pub mod broker;
pub mod config;
pub mod metrics;

pub use config::{ActuatorMode, Config};
pub use metrics::Metrics;
