//! Configuration loading from TOML files
//!
//! The binary picks the file from `--config <path>`, else the CONFIG_FILE
//! environment variable, else `config/dev.toml`.
//!
//! Every section is optional; missing keys fall back to the defaults below.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Longest tick period the pipeline is allowed to run at
const MAX_TICK_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorMode {
    /// Telldus Live HTTP API
    Http,
    /// Log and acknowledge locally
    Mock,
}

impl ActuatorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorMode::Http => "http",
            ActuatorMode::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "childguard".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self { host: default_mqtt_host(), port: default_mqtt_port(), username: None, password: None }
    }
}

fn default_mqtt_host() -> String {
    "localhost".to_string()
}

fn default_mqtt_port() -> u16 {
    1883
}

/// MQTT topics the sensor monitors publish their boolean edges on
#[derive(Debug, Clone, Deserialize)]
pub struct SensorsConfig {
    #[serde(default = "default_lower_topic")]
    pub lower_topic: String,
    #[serde(default = "default_higher_topic")]
    pub higher_topic: String,
    #[serde(default = "default_direction_topic")]
    pub direction_topic: String,
    #[serde(default = "default_proximity_topic")]
    pub proximity_topic: String,
    #[serde(default = "default_motion_topic")]
    pub motion_topic: String,
}

impl Default for SensorsConfig {
    fn default() -> Self {
        Self {
            lower_topic: default_lower_topic(),
            higher_topic: default_higher_topic(),
            direction_topic: default_direction_topic(),
            proximity_topic: default_proximity_topic(),
            motion_topic: default_motion_topic(),
        }
    }
}

fn default_lower_topic() -> String {
    "childguard/sensors/lower".to_string()
}

fn default_higher_topic() -> String {
    "childguard/sensors/higher".to_string()
}

fn default_direction_topic() -> String {
    "childguard/sensors/direction".to_string()
}

fn default_proximity_topic() -> String {
    "childguard/sensors/proximity".to_string()
}

fn default_motion_topic() -> String {
    "childguard/sensors/motion".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DoorConfig {
    /// Co-trigger window for the two threshold sensors
    #[serde(default = "default_window_both_sensors_ms")]
    pub window_both_sensors_ms: u64,
    #[serde(default)]
    pub direction_sensor_enabled: bool,
}

impl Default for DoorConfig {
    fn default() -> Self {
        Self {
            window_both_sensors_ms: default_window_both_sensors_ms(),
            direction_sensor_enabled: false,
        }
    }
}

fn default_window_both_sensors_ms() -> u64 {
    500
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// No-motion period after which the room is assumed empty
    #[serde(default = "default_timeslot_pir_secs")]
    pub timeslot_pir_secs: u64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self { timeslot_pir_secs: default_timeslot_pir_secs() }
    }
}

fn default_timeslot_pir_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_timeslot_child_alone_secs")]
    pub timeslot_child_alone_secs: u64,
    #[serde(default = "default_timeslot_actuator_cooldown_secs")]
    pub timeslot_actuator_cooldown_secs: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            timeslot_child_alone_secs: default_timeslot_child_alone_secs(),
            timeslot_actuator_cooldown_secs: default_timeslot_actuator_cooldown_secs(),
        }
    }
}

fn default_timeslot_child_alone_secs() -> u64 {
    60
}

fn default_timeslot_actuator_cooldown_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControllerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { tick_ms: default_tick_ms() }
    }
}

fn default_tick_ms() -> u64 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActuatorConfig {
    #[serde(default = "default_actuator_mode")]
    pub mode: ActuatorMode,
    #[serde(default = "default_actuator_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub device_id: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub token_secret: String,
    #[serde(default = "default_actuator_timeout_ms")]
    pub timeout_ms: u64,
    /// Switch the appliance on when the controller starts
    #[serde(default = "default_on_at_startup")]
    pub on_at_startup: bool,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            mode: default_actuator_mode(),
            base_url: default_actuator_base_url(),
            device_id: String::new(),
            public_key: String::new(),
            private_key: String::new(),
            token: String::new(),
            token_secret: String::new(),
            timeout_ms: default_actuator_timeout_ms(),
            on_at_startup: default_on_at_startup(),
        }
    }
}

fn default_actuator_mode() -> ActuatorMode {
    ActuatorMode::Mock
}

fn default_actuator_base_url() -> String {
    "https://pa-api.telldus.com/json".to_string()
}

fn default_actuator_timeout_ms() -> u64 {
    5000
}

fn default_on_at_startup() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_notifications_enabled")]
    pub enabled: bool,
    /// Topic the companion app subscribes to (QoS 1, plain text)
    #[serde(default = "default_notifications_topic")]
    pub topic: String,
    /// Topic for occupancy/door status snapshots (QoS 0, JSON)
    #[serde(default = "default_status_topic")]
    pub status_topic: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: default_notifications_enabled(),
            topic: default_notifications_topic(),
            status_topic: default_status_topic(),
        }
    }
}

fn default_notifications_enabled() -> bool {
    true
}

fn default_notifications_topic() -> String {
    "iotlab/notifications".to_string()
}

fn default_status_topic() -> String {
    "childguard/status".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
    /// Prometheus metrics HTTP port (0 to disable)
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_metrics_interval(),
            prometheus_port: default_prometheus_port(),
        }
    }
}

fn default_metrics_interval() -> u64 {
    30
}

fn default_prometheus_port() -> u16 {
    9090
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_broker_bind_address(),
            port: default_broker_port(),
        }
    }
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub sensors: SensorsConfig,
    #[serde(default)]
    pub door: DoorConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub actuator: ActuatorConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    mqtt_host: String,
    mqtt_port: u16,
    mqtt_username: Option<String>,
    mqtt_password: Option<String>,
    sensors: SensorsConfig,
    window_both_sensors_ms: u64,
    direction_sensor_enabled: bool,
    timeslot_pir_secs: u64,
    timeslot_child_alone_secs: u64,
    timeslot_actuator_cooldown_secs: u64,
    tick_ms: u64,
    actuator: ActuatorConfig,
    notifications_enabled: bool,
    notifications_topic: String,
    status_topic: String,
    metrics_interval_secs: u64,
    prometheus_port: u16,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            mqtt_host: toml_config.mqtt.host,
            mqtt_port: toml_config.mqtt.port,
            mqtt_username: toml_config.mqtt.username,
            mqtt_password: toml_config.mqtt.password,
            sensors: toml_config.sensors,
            window_both_sensors_ms: toml_config.door.window_both_sensors_ms,
            direction_sensor_enabled: toml_config.door.direction_sensor_enabled,
            timeslot_pir_secs: toml_config.room.timeslot_pir_secs,
            timeslot_child_alone_secs: toml_config.safety.timeslot_child_alone_secs,
            timeslot_actuator_cooldown_secs: toml_config.safety.timeslot_actuator_cooldown_secs,
            tick_ms: toml_config.controller.tick_ms.clamp(1, MAX_TICK_MS),
            actuator: toml_config.actuator,
            notifications_enabled: toml_config.notifications.enabled,
            notifications_topic: toml_config.notifications.topic,
            status_topic: toml_config.notifications.status_topic,
            metrics_interval_secs: toml_config.metrics.interval_secs.max(1),
            prometheus_port: toml_config.metrics.prometheus_port,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            config_file: config_file.to_string(),
        }
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str, origin: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content)
            .with_context(|| format!("Failed to parse config file {origin}"))?;
        Ok(Self::from_toml(toml_config, origin))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Load configuration from a path, falling back to defaults on failure
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), path = %path, "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn mqtt_host(&self) -> &str {
        &self.mqtt_host
    }

    pub fn mqtt_port(&self) -> u16 {
        self.mqtt_port
    }

    pub fn mqtt_username(&self) -> Option<&str> {
        self.mqtt_username.as_deref()
    }

    pub fn mqtt_password(&self) -> Option<&str> {
        self.mqtt_password.as_deref()
    }

    pub fn sensors(&self) -> &SensorsConfig {
        &self.sensors
    }

    pub fn window_both_sensors(&self) -> Duration {
        Duration::from_millis(self.window_both_sensors_ms)
    }

    pub fn direction_sensor_enabled(&self) -> bool {
        self.direction_sensor_enabled
    }

    pub fn timeslot_pir(&self) -> Duration {
        Duration::from_secs(self.timeslot_pir_secs)
    }

    pub fn timeslot_child_alone(&self) -> Duration {
        Duration::from_secs(self.timeslot_child_alone_secs)
    }

    pub fn timeslot_actuator_cooldown(&self) -> Duration {
        Duration::from_secs(self.timeslot_actuator_cooldown_secs)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn actuator(&self) -> &ActuatorConfig {
        &self.actuator
    }

    pub fn actuator_mode(&self) -> ActuatorMode {
        self.actuator.mode
    }

    pub fn notifications_enabled(&self) -> bool {
        self.notifications_enabled
    }

    pub fn notifications_topic(&self) -> &str {
        &self.notifications_topic
    }

    pub fn status_topic(&self) -> &str {
        &self.status_topic
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn prometheus_port(&self) -> u16 {
        self.prometheus_port
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to enable the direction sensor
    pub fn with_direction_sensor(mut self, enabled: bool) -> Self {
        self.direction_sensor_enabled = enabled;
        self
    }

    /// Builder method for tests to disable the startup `On` command
    pub fn with_on_at_startup(mut self, enabled: bool) -> Self {
        self.actuator.on_at_startup = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.mqtt_host(), "localhost");
        assert_eq!(config.mqtt_port(), 1883);
        assert_eq!(config.window_both_sensors(), Duration::from_millis(500));
        assert_eq!(config.timeslot_pir(), Duration::from_secs(30));
        assert_eq!(config.timeslot_child_alone(), Duration::from_secs(60));
        assert_eq!(config.timeslot_actuator_cooldown(), Duration::from_secs(10));
        assert!(!config.direction_sensor_enabled());
        assert_eq!(config.actuator_mode(), ActuatorMode::Mock);
        assert_eq!(config.notifications_topic(), "iotlab/notifications");
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_tick_clamped_to_max() {
        let config = Config::from_toml_str("[controller]\ntick_ms = 250\n", "inline").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(MAX_TICK_MS));

        let config = Config::from_toml_str("[controller]\ntick_ms = 0\n", "inline").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config =
            Config::from_toml_str("[door]\ndirection_sensor_enabled = true\n", "inline").unwrap();
        assert!(config.direction_sensor_enabled());
        assert_eq!(config.window_both_sensors(), Duration::from_millis(500));
        assert_eq!(config.sensors().lower_topic, "childguard/sensors/lower");
    }

    #[test]
    fn test_invalid_toml_is_error() {
        assert!(Config::from_toml_str("[door\n", "inline").is_err());
    }
}
