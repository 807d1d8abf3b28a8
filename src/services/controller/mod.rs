//! Fixed-period control loop for the room
//!
//! Each tick reads one sensor snapshot and runs the pipeline in order:
//! door crossing detection, occupancy update, safety decision. Side effects
//! (actuator commands, notifications, status) leave through non-blocking
//! channels, so nothing inside a tick awaits I/O.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::clock::Clock;
use crate::domain::types::{
    ActuatorCommand, CrossingEvent, DoorState, OccupancyCount, SensorSnapshot,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::notify_channel::{NotificationSender, StatusPayload};
use crate::io::signals::SensorSignals;
use crate::services::actuator_worker::{ActuatorAck, ActuatorCmd};
use crate::services::door_detector::DoorCrossingDetector;
use crate::services::occupancy::OccupancyTracker;
use crate::services::safety::{SafetyActuatorCoordinator, SafetyDecision, APPLIANCE_DISABLED_TEXT};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::info;

/// Result of one tick, mostly for tests and tooling
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub door_state: DoorState,
    pub crossing: Option<CrossingEvent>,
    pub count: OccupancyCount,
    pub decision: SafetyDecision,
}

/// Owns the three pipeline components and the actuator state mirror
pub struct Controller {
    pub(crate) detector: DoorCrossingDetector,
    pub(crate) occupancy: OccupancyTracker,
    pub(crate) safety: SafetyActuatorCoordinator,
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
    /// Commands to the actuator worker
    pub(crate) cmd_tx: mpsc::Sender<ActuatorCmd>,
    /// Acknowledged appliance state from the worker
    pub(crate) ack_rx: watch::Receiver<ActuatorAck>,
    /// Notifier channel (None when running without MQTT egress)
    pub(crate) notify_sender: Option<NotificationSender>,
    /// Latest status for the HTTP endpoint
    pub(crate) status_tx: watch::Sender<StatusPayload>,
    /// Appliance state as last commanded; corrected by acknowledgements
    pub(crate) actuator_is_on: bool,
    /// Sequence number of the last enqueued command
    pub(crate) last_cmd_seq: u64,
    pub(crate) door_state: DoorState,
    /// Something visible in the status payload changed this tick
    pub(crate) status_dirty: bool,
}

impl Controller {
    pub fn new(
        config: Config,
        metrics: Arc<Metrics>,
        cmd_tx: mpsc::Sender<ActuatorCmd>,
        ack_rx: watch::Receiver<ActuatorAck>,
        notify_sender: Option<NotificationSender>,
        status_tx: watch::Sender<StatusPayload>,
        now: Instant,
    ) -> Self {
        let ActuatorAck { seq, is_on } = *ack_rx.borrow();
        metrics.set_actuator_on(is_on);
        Self {
            detector: DoorCrossingDetector::new(
                config.window_both_sensors(),
                config.direction_sensor_enabled(),
                now,
            ),
            occupancy: OccupancyTracker::new(config.timeslot_pir(), now),
            safety: SafetyActuatorCoordinator::new(
                config.timeslot_child_alone(),
                config.timeslot_actuator_cooldown(),
                now,
            ),
            config,
            metrics,
            cmd_tx,
            ack_rx,
            notify_sender,
            status_tx,
            actuator_is_on: is_on,
            last_cmd_seq: seq,
            door_state: DoorState::Free,
            status_dirty: false,
        }
    }

    /// Switch the appliance on at boot when configured to
    pub fn startup(&mut self) {
        info!(
            window_ms = %self.config.window_both_sensors().as_millis(),
            timeslot_pir_secs = %self.config.timeslot_pir().as_secs(),
            timeslot_child_alone_secs = %self.config.timeslot_child_alone().as_secs(),
            cooldown_secs = %self.config.timeslot_actuator_cooldown().as_secs(),
            direction_sensor = %self.config.direction_sensor_enabled(),
            "controller_configured"
        );
        if self.config.actuator().on_at_startup {
            self.dispatch_command(ActuatorCommand::On);
        }
        // Announce the initial state even if it matches the channel default
        self.status_dirty = false;
        self.send_status(self.status_payload());
    }

    /// Run one pipeline pass over a sensor snapshot
    pub fn tick(&mut self, snapshot: SensorSnapshot) -> TickOutcome {
        let tick_start = Instant::now();
        let now = snapshot.now;

        self.apply_actuator_ack();

        let (door_state, crossing) = self.detector.update(
            snapshot.lower_detected,
            snapshot.higher_detected,
            snapshot.direction_detected,
            now,
        );
        if door_state != self.door_state {
            self.handle_door_state_change(door_state);
        }
        if let Some(event) = crossing {
            self.handle_crossing(event);
        }

        let count = self.occupancy.apply(crossing, snapshot.room_motion_detected, now);
        if let Some(change) = self.occupancy.take_change() {
            self.handle_occupancy_change(change);
        }

        let alerted_before = self.safety.episode().is_some_and(|e| e.notified);
        let decision = self.safety.decide(
            count.adults,
            count.children,
            snapshot.actuator_proximity_detected,
            self.actuator_is_on,
            now,
        );
        let alerted_now = self.safety.episode().is_some_and(|e| e.notified);
        if alerted_now && !alerted_before {
            self.handle_child_alone_alert();
        }

        let mut shutoff_dropped = false;
        if let Some(command) = decision.command {
            if command == ActuatorCommand::Off {
                self.handle_proximity_shutoff();
            }
            shutoff_dropped = !self.dispatch_command(command) && command == ActuatorCommand::Off;
        }
        for request in &decision.notify {
            // Nothing was switched off, so there is nothing to report yet
            if shutoff_dropped && request.text == APPLIANCE_DISABLED_TEXT {
                continue;
            }
            self.dispatch_notification(request.clone());
        }

        if self.status_dirty {
            self.publish_status();
        }

        self.metrics.record_tick(tick_start.elapsed().as_micros() as u64);

        TickOutcome { door_state, crossing, count, decision }
    }

    /// Tick at the configured period until shutdown flips
    pub async fn run(
        &mut self,
        signals: Arc<SensorSignals>,
        clock: Arc<dyn Clock>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.config.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let direction_enabled = self.config.direction_sensor_enabled();

        info!(tick_ms = %self.config.tick_interval().as_millis(), "controller_started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("controller_shutdown");
                        return;
                    }
                }
                _ = ticker.tick() => {
                    let snapshot = signals.snapshot(direction_enabled, clock.now());
                    self.tick(snapshot);
                }
            }
        }
    }

    #[inline]
    pub fn door_state(&self) -> DoorState {
        self.door_state
    }

    #[inline]
    pub fn occupancy(&self) -> OccupancyCount {
        self.occupancy.count()
    }

    #[inline]
    pub fn actuator_is_on(&self) -> bool {
        self.actuator_is_on
    }

    #[inline]
    pub fn last_cmd_seq(&self) -> u64 {
        self.last_cmd_seq
    }
}
