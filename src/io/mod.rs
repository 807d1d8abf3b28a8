//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `signals` - Shared boolean sensor signals read once per tick
//! - `sensor_mqtt` - MQTT client feeding the sensor signals
//! - `notify_channel` - Typed channel for notifications and status
//! - `mqtt_notifier` - MQTT publisher for notifications and status
//! - `prometheus` - Prometheus metrics and status HTTP endpoint

pub mod mqtt_notifier;
pub mod notify_channel;
pub mod prometheus;
pub mod sensor_mqtt;
pub mod signals;

// Re-export commonly used types
pub use mqtt_notifier::MqttNotifier;
pub use notify_channel::{
    create_notify_channel, create_status_channel, NotificationSender, NotifyMessage, StatusPayload,
};
pub use signals::{SensorSignals, Signal};
