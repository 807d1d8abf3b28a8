//! MQTT client for receiving sensor monitor edges
//!
//! Each sensor monitor publishes its boolean reading on its own topic. This
//! task is the single writer of every shared signal; the controller only
//! reads them.

use crate::infra::config::{Config, SensorsConfig};
use crate::infra::metrics::Metrics;
use crate::io::signals::{SensorSignals, Signal};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Topic → signal routing table
#[derive(Debug, Clone)]
pub struct SignalRoutes {
    routes: Vec<(String, Signal)>,
}

impl SignalRoutes {
    pub fn from_config(sensors: &SensorsConfig, direction_enabled: bool) -> Self {
        let mut routes = vec![
            (sensors.lower_topic.clone(), Signal::Lower),
            (sensors.higher_topic.clone(), Signal::Higher),
            (sensors.proximity_topic.clone(), Signal::Proximity),
            (sensors.motion_topic.clone(), Signal::RoomMotion),
        ];
        if direction_enabled {
            routes.push((sensors.direction_topic.clone(), Signal::Direction));
        }
        Self { routes }
    }

    pub fn resolve(&self, topic: &str) -> Option<Signal> {
        self.routes.iter().find(|(t, _)| t == topic).map(|(_, s)| *s)
    }

    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(|(t, _)| t.as_str())
    }
}

/// Parse a sensor payload into a boolean reading
pub fn parse_signal_payload(payload: &[u8]) -> Option<bool> {
    let text = std::str::from_utf8(payload).ok()?;
    match text.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "detected" | "high" => Some(true),
        "0" | "false" | "off" | "clear" | "low" => Some(false),
        _ => None,
    }
}

/// Start the MQTT sensor client and write readings into `signals`
pub async fn start_sensor_client(
    config: &Config,
    signals: Arc<SensorSignals>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("childguard-sensors-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let routes = SignalRoutes::from_config(config.sensors(), config.direction_sensor_enabled());
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

    for topic in routes.topics() {
        client.subscribe(topic, QoS::AtLeastOnce).await?;
    }

    info!(
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        topics = ?routes.topics().collect::<Vec<_>>(),
        "sensor_mqtt_subscribed"
    );

    // Rate-limit malformed payload warnings to 1 per second
    let mut last_bad_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("sensor_mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(signal) = routes.resolve(&publish.topic) else {
                            continue;
                        };
                        match parse_signal_payload(&publish.payload) {
                            Some(value) => {
                                let previous = signals.set(signal, value);
                                metrics.record_signal_update();
                                if previous != value {
                                    debug!(signal = %signal.as_str(), value = %value, "sensor_signal_edge");
                                }
                            }
                            None => {
                                metrics.record_signal_rejected();
                                if last_bad_warn.elapsed() >= Duration::from_secs(1) {
                                    warn!(
                                        topic = %publish.topic,
                                        payload_len = publish.payload.len(),
                                        "sensor_payload_unrecognized"
                                    );
                                    last_bad_warn = Instant::now();
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("sensor_mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "sensor_mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signal_payload() {
        assert_eq!(parse_signal_payload(b"1"), Some(true));
        assert_eq!(parse_signal_payload(b" TRUE \n"), Some(true));
        assert_eq!(parse_signal_payload(b"detected"), Some(true));
        assert_eq!(parse_signal_payload(b"0"), Some(false));
        assert_eq!(parse_signal_payload(b"Off"), Some(false));
        assert_eq!(parse_signal_payload(b"maybe"), None);
        assert_eq!(parse_signal_payload(&[0xff, 0xfe]), None);
    }

    #[test]
    fn test_routes_from_default_config() {
        let config = Config::default();
        let routes = SignalRoutes::from_config(config.sensors(), false);
        assert_eq!(routes.resolve("childguard/sensors/lower"), Some(Signal::Lower));
        assert_eq!(routes.resolve("childguard/sensors/motion"), Some(Signal::RoomMotion));
        assert_eq!(routes.resolve("childguard/sensors/direction"), None);
        assert_eq!(routes.topics().count(), 4);
    }

    #[test]
    fn test_direction_route_when_enabled() {
        let config = Config::default();
        let routes = SignalRoutes::from_config(config.sensors(), true);
        assert_eq!(routes.resolve("childguard/sensors/direction"), Some(Signal::Direction));
    }
}
