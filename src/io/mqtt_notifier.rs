//! MQTT publisher for caregiver notifications and room status
//!
//! - `notifications.topic` (default iotlab/notifications) - plain-text alerts (QoS 1)
//! - `notifications.status_topic` (default childguard/status) - status JSON (QoS 0)

use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::notify_channel::NotifyMessage;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// MQTT notifier actor
///
/// Receives messages from the notify channel and publishes them.
pub struct MqttNotifier {
    client: AsyncClient,
    rx: mpsc::Receiver<NotifyMessage>,
    metrics: Arc<Metrics>,
    notifications_topic: String,
    status_topic: String,
}

impl MqttNotifier {
    /// Create a new notifier connected to the configured broker
    pub fn new(
        config: &Config,
        rx: mpsc::Receiver<NotifyMessage>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let client_id = format!("childguard-notify-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
            mqttoptions.set_credentials(username, password);
        }

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        tokio::spawn(async move {
            let mut eventloop = eventloop;
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_notifier_connected");
                    }
                    Ok(Event::Incoming(Packet::PubAck(_))) => {
                        debug!("mqtt_notifier_puback");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "mqtt_notifier_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            rx,
            metrics,
            notifications_topic: config.notifications_topic().to_string(),
            status_topic: config.status_topic().to_string(),
        }
    }

    /// Run the publisher loop until shutdown, then drain what is queued
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            notifications = %self.notifications_topic,
            status = %self.status_topic,
            "mqtt_notifier_started"
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("mqtt_notifier_shutdown");
                        while let Ok(msg) = self.rx.try_recv() {
                            self.publish_message(msg).await;
                        }
                        return;
                    }
                }
                msg = self.rx.recv() => {
                    match msg {
                        Some(msg) => self.publish_message(msg).await,
                        None => {
                            info!("mqtt_notifier_channel_closed");
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn publish_message(&self, msg: NotifyMessage) {
        match msg {
            NotifyMessage::Notification(request) => {
                // At-least-once: the companion app must not miss an alert
                match self
                    .client
                    .publish(
                        &self.notifications_topic,
                        QoS::AtLeastOnce,
                        false,
                        request.text.clone().into_bytes(),
                    )
                    .await
                {
                    Ok(()) => {
                        self.metrics.record_notification_sent();
                        info!(text = %request.text, "notification_published");
                    }
                    Err(e) => {
                        error!(error = %e, text = %request.text, "notification_publish_failed");
                    }
                }
            }
            NotifyMessage::Status(payload) => {
                if let Ok(json) = serde_json::to_string(&payload) {
                    if let Err(e) = self
                        .client
                        .publish(&self.status_topic, QoS::AtMostOnce, false, json.into_bytes())
                        .await
                    {
                        debug!(error = %e, "mqtt_status_publish_failed");
                    }
                }
            }
        }
    }
}
