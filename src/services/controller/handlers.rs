//! Side-effect handlers for the Controller
//!
//! Each handler logs one kind of change, updates metrics, and pushes work
//! onto a channel without awaiting it.

use super::Controller;
use crate::domain::types::{ActuatorCommand, CrossingEvent, DoorState, NotificationRequest};
use crate::io::notify_channel::StatusPayload;
use crate::services::actuator_worker::ActuatorCmd;
use crate::services::occupancy::{OccupancyChange, OccupancyChangeCause};
use std::time::Instant;
use tracing::{debug, info, warn};

impl Controller {
    /// Pick up the worker's latest acknowledgement, if it is for our last command
    ///
    /// Acks for older commands are ignored: a newer command is still in
    /// flight and its ack will follow.
    pub(crate) fn apply_actuator_ack(&mut self) {
        if !self.ack_rx.has_changed().unwrap_or(false) {
            return;
        }
        let ack = *self.ack_rx.borrow_and_update();
        if ack.seq != self.last_cmd_seq {
            debug!(ack_seq = %ack.seq, last_cmd_seq = %self.last_cmd_seq, "actuator_ack_stale");
            return;
        }
        if ack.is_on != self.actuator_is_on {
            warn!(
                seq = %ack.seq,
                expected_on = %self.actuator_is_on,
                acked_on = %ack.is_on,
                "actuator_state_corrected"
            );
            self.actuator_is_on = ack.is_on;
            self.status_dirty = true;
        }
    }

    pub(crate) fn handle_door_state_change(&mut self, new_state: DoorState) {
        info!(from = %self.door_state, to = %new_state, "door_state_changed");
        self.door_state = new_state;
        self.metrics.set_door_state(new_state);
        self.status_dirty = true;
    }

    pub(crate) fn handle_crossing(&mut self, event: CrossingEvent) {
        self.metrics.record_crossing(event);
        info!(
            person = %event.person.as_str(),
            direction = %event.direction.as_str(),
            "crossing_detected"
        );
    }

    pub(crate) fn handle_occupancy_change(&mut self, change: OccupancyChange) {
        match change.cause {
            OccupancyChangeCause::PresenceTimeout => {
                self.metrics.record_presence_reset();
                warn!(
                    adults = %change.old.adults,
                    children = %change.old.children,
                    timeslot_pir_secs = %self.occupancy.timeslot_pir().as_secs(),
                    "presence_timeout_reset"
                );
            }
            OccupancyChangeCause::Crossing(_) => {}
        }

        info!(
            old_adults = %change.old.adults,
            old_children = %change.old.children,
            adults = %change.new.adults,
            children = %change.new.children,
            cause = %change.cause.as_str(),
            "occupancy_changed"
        );

        if change.child_became_alone() {
            warn!(children = %change.new.children, "child_alone_started");
        }

        self.metrics.set_occupancy(change.new);
        self.status_dirty = true;
    }

    pub(crate) fn handle_child_alone_alert(&mut self) {
        self.metrics.record_child_alone_alert();
        warn!(
            children = %self.occupancy.count().children,
            threshold_secs = %self.safety.timeslot_child_alone().as_secs(),
            "child_alone_threshold_exceeded"
        );
    }

    pub(crate) fn handle_proximity_shutoff(&mut self) {
        warn!(children = %self.occupancy.count().children, "appliance_proximity_shutoff");
    }

    /// Enqueue a command for the worker and update the mirror optimistically
    ///
    /// On a full queue the command is dropped and the mirror is left alone,
    /// so the policy re-issues it on a later tick. Returns whether it was enqueued.
    pub(crate) fn dispatch_command(&mut self, command: ActuatorCommand) -> bool {
        let seq = self.last_cmd_seq + 1;
        let cmd = ActuatorCmd { seq, command, enqueued_at: Instant::now() };

        match self.cmd_tx.try_send(cmd) {
            Ok(()) => {
                self.last_cmd_seq = seq;
                self.actuator_is_on = command.target_is_on();
                self.status_dirty = true;
                info!(seq = %seq, command = %command.as_str(), "actuator_cmd_enqueued");
                true
            }
            Err(e) => {
                self.metrics.record_actuator_cmd_dropped();
                warn!(seq = %seq, command = %command.as_str(), error = %e, "actuator_cmd_dropped");
                false
            }
        }
    }

    pub(crate) fn dispatch_notification(&mut self, request: NotificationRequest) {
        if !self.config.notifications_enabled() {
            info!(text = %request.text, "notification_suppressed");
            return;
        }
        let Some(ref sender) = self.notify_sender else {
            info!(text = %request.text, "notification_no_transport");
            return;
        };
        if sender.send_notification(request.clone()) {
            info!(text = %request.text, "notification_enqueued");
        } else {
            warn!(text = %request.text, "notification_dropped");
        }
    }

    /// Publish the room state if it differs from the last published one
    pub(crate) fn publish_status(&mut self) {
        self.status_dirty = false;
        let payload = self.status_payload();
        if self.status_tx.borrow().same_state(&payload) {
            return;
        }
        self.send_status(payload);
    }

    /// Publish to the HTTP endpoint and the notifier unconditionally
    pub(crate) fn send_status(&mut self, payload: StatusPayload) {
        if let Some(ref sender) = self.notify_sender {
            sender.send_status(payload.clone());
        }
        self.status_tx.send_replace(payload);
    }

    pub(crate) fn status_payload(&self) -> StatusPayload {
        StatusPayload::new(
            self.config.site_id(),
            self.door_state,
            self.occupancy.count(),
            self.actuator_is_on,
        )
    }
}
