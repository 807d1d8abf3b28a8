//! Embedded MQTT broker using rumqttd
//!
//! For bench setups where the sensor monitors, the controller and the
//! companion app share one box. Production rooms point `[mqtt]` at an
//! existing broker and leave `[broker] enabled = false`.

use crate::infra::config::Config as AppConfig;
use anyhow::Context;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// A handful of sensor monitors plus the app and the controller itself
const MAX_CONNECTIONS: usize = 64;

/// Notifications and status payloads are short text or JSON
const MAX_PAYLOAD_SIZE: usize = 16 * 1024;

fn broker_config(listen: SocketAddr) -> Config {
    let router = RouterConfig {
        max_segment_size: 1024 * 1024,
        max_segment_count: 4,
        max_connections: MAX_CONNECTIONS,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size: MAX_PAYLOAD_SIZE,
                max_inflight_count: 100,
                auth: None,
                dynamic_filters: false,
                external_auth: None,
            },
        },
    );

    Config {
        id: 0,
        router,
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Parse `bind_address:port` into a listen address
pub fn listen_addr(bind_address: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let addr = format!("{bind_address}:{port}");
    addr.parse().with_context(|| format!("invalid broker bind address {addr}"))
}

/// Start the embedded broker on its own thread (rumqttd blocks)
pub fn start_embedded_broker(app_config: &AppConfig) -> anyhow::Result<()> {
    let listen = listen_addr(app_config.broker_bind_address(), app_config.broker_port())?;
    let config = broker_config(listen);

    thread::Builder::new()
        .name("mqtt-broker".to_string())
        .spawn(move || {
            let mut broker = Broker::new(config);
            if let Err(e) = broker.start() {
                warn!(error = %e, "broker_start_failed");
            }
        })
        .context("failed to spawn broker thread")?;

    // Give the listener a moment before the MQTT clients connect
    thread::sleep(Duration::from_millis(100));
    info!(listen = %listen, "broker_started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_addr() {
        let addr = listen_addr("127.0.0.1", 1884).unwrap();
        assert_eq!(addr.port(), 1884);
        assert!(listen_addr("not an address", 1883).is_err());
    }
}
