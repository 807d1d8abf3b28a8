//! Typed channel for outbound notifications and status snapshots
//!
//! Provides a non-blocking way for the controller to hand messages to the
//! MQTT notifier. Uses a bounded mpsc channel; when it is full the message
//! is dropped and counted.

use crate::domain::clock::epoch_ms;
use crate::domain::types::{DoorState, NotificationRequest, OccupancyCount};
use crate::infra::metrics::Metrics;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Messages that can be sent to the MQTT notifier
#[derive(Debug)]
pub enum NotifyMessage {
    /// Caregiver alert, published as plain text
    Notification(NotificationRequest),
    /// Room snapshot, published as JSON
    Status(StatusPayload),
}

/// Payload for room status snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusPayload {
    /// Site identifier
    pub site: String,
    /// Timestamp (epoch ms)
    pub ts: u64,
    pub door: DoorState,
    pub adults: u32,
    pub children: u32,
    /// Children present with no adult
    pub alone: bool,
    pub actuator_on: bool,
}

impl StatusPayload {
    pub fn new(site: &str, door: DoorState, count: OccupancyCount, actuator_on: bool) -> Self {
        Self {
            site: site.to_string(),
            ts: epoch_ms(),
            door,
            adults: count.adults,
            children: count.children,
            alone: count.children_alone(),
            actuator_on,
        }
    }

    /// Same room state, ignoring the timestamp
    pub fn same_state(&self, other: &StatusPayload) -> bool {
        self.door == other.door
            && self.adults == other.adults
            && self.children == other.children
            && self.actuator_on == other.actuator_on
    }
}

/// Sender handle for notifier messages
///
/// Clone this to share across multiple producers.
/// Non-blocking - if the channel is full, messages are dropped.
#[derive(Clone)]
pub struct NotificationSender {
    tx: mpsc::Sender<NotifyMessage>,
    metrics: Arc<Metrics>,
}

impl NotificationSender {
    pub fn new(tx: mpsc::Sender<NotifyMessage>, metrics: Arc<Metrics>) -> Self {
        Self { tx, metrics }
    }

    /// Queue a caregiver notification; returns false if it was dropped
    pub fn send_notification(&self, request: NotificationRequest) -> bool {
        match self.tx.try_send(NotifyMessage::Notification(request)) {
            Ok(()) => true,
            Err(_) => {
                self.metrics.record_notification_dropped();
                false
            }
        }
    }

    /// Queue a status snapshot; returns false if it was dropped
    pub fn send_status(&self, payload: StatusPayload) -> bool {
        match self.tx.try_send(NotifyMessage::Status(payload)) {
            Ok(()) => true,
            Err(_) => {
                self.metrics.record_status_dropped();
                false
            }
        }
    }
}

/// Create a new notify channel pair
///
/// Returns (sender, receiver) where sender can be cloned and shared.
pub fn create_notify_channel(
    buffer_size: usize,
    metrics: Arc<Metrics>,
) -> (NotificationSender, mpsc::Receiver<NotifyMessage>) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (NotificationSender::new(tx, metrics), rx)
}

/// Latest-value channel for the HTTP `/status` endpoint, starting with an empty room
pub fn create_status_channel(
    site_id: &str,
    actuator_on: bool,
) -> (watch::Sender<StatusPayload>, watch::Receiver<StatusPayload>) {
    watch::channel(StatusPayload::new(
        site_id,
        DoorState::Free,
        OccupancyCount::default(),
        actuator_on,
    ))
}
