//! Tests for the Controller module

use super::*;
use crate::domain::clock::SystemClock;
use crate::domain::types::{Direction, PersonKind};
use crate::io::notify_channel::{create_notify_channel, create_status_channel, NotifyMessage};
use crate::services::safety::APPLIANCE_DISABLED_TEXT;
use std::time::Duration;

/// Test harness that keeps channel receivers alive so `try_send` succeeds
struct TestController {
    controller: Controller,
    cmd_rx: mpsc::Receiver<ActuatorCmd>,
    notify_rx: mpsc::Receiver<NotifyMessage>,
    ack_tx: watch::Sender<ActuatorAck>,
    status_rx: watch::Receiver<StatusPayload>,
    metrics: Arc<Metrics>,
    t0: Instant,
}

impl std::ops::Deref for TestController {
    type Target = Controller;
    fn deref(&self) -> &Self::Target {
        &self.controller
    }
}

impl std::ops::DerefMut for TestController {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.controller
    }
}

impl TestController {
    fn notifications(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(msg) = self.notify_rx.try_recv() {
            if let NotifyMessage::Notification(n) = msg {
                texts.push(n.text);
            }
        }
        texts
    }

    fn commands(&mut self) -> Vec<(u64, ActuatorCommand)> {
        let mut cmds = Vec::new();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            cmds.push((cmd.seq, cmd.command));
        }
        cmds
    }

    /// Direction sensor, then a solitary lower trip longer than the window
    fn child_enters(&mut self, t: Instant) -> Instant {
        self.tick(at(t).direction().build());
        self.tick(at(t + ms(100)).lower().build());
        self.tick(at(t + ms(700)).lower().build());
        let end = t + ms(800);
        let outcome = self.tick(at(end).build());
        assert_eq!(outcome.crossing, Some(CrossingEvent::new(PersonKind::Child, Direction::Entering)));
        end
    }

    /// Direction sensor, then both threshold sensors together
    fn adult_enters(&mut self, t: Instant) -> Instant {
        self.tick(at(t).direction().build());
        self.tick(at(t + ms(100)).lower().higher().build());
        let end = t + ms(300);
        let outcome = self.tick(at(end).build());
        assert_eq!(outcome.crossing, Some(CrossingEvent::new(PersonKind::Adult, Direction::Entering)));
        end
    }
}

fn test_config() -> Config {
    Config::default().with_direction_sensor(true).with_on_at_startup(false)
}

fn create_test_controller() -> TestController {
    create_test_controller_with(test_config(), 64)
}

fn create_test_controller_with(config: Config, cmd_buffer: usize) -> TestController {
    let metrics = Arc::new(Metrics::new());
    let (cmd_tx, cmd_rx) = mpsc::channel(cmd_buffer);
    let (ack_tx, ack_rx) = watch::channel(ActuatorAck { seq: 0, is_on: true });
    let (notify_sender, notify_rx) = create_notify_channel(64, metrics.clone());
    let (status_tx, status_rx) = create_status_channel(config.site_id(), true);
    let t0 = Instant::now();
    let controller = Controller::new(
        config,
        metrics.clone(),
        cmd_tx,
        ack_rx,
        Some(notify_sender),
        status_tx,
        t0,
    );
    TestController { controller, cmd_rx, notify_rx, ack_tx, status_rx, metrics, t0 }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Builder for test sensor snapshots
struct SnapshotBuilder {
    snapshot: SensorSnapshot,
}

fn at(now: Instant) -> SnapshotBuilder {
    SnapshotBuilder {
        snapshot: SensorSnapshot { direction_detected: Some(false), ..SensorSnapshot::idle(now) },
    }
}

impl SnapshotBuilder {
    fn lower(mut self) -> Self {
        self.snapshot.lower_detected = true;
        self
    }

    fn higher(mut self) -> Self {
        self.snapshot.higher_detected = true;
        self
    }

    fn direction(mut self) -> Self {
        self.snapshot.direction_detected = Some(true);
        self
    }

    fn proximity(mut self) -> Self {
        self.snapshot.actuator_proximity_detected = true;
        self
    }

    fn motion(mut self) -> Self {
        self.snapshot.room_motion_detected = true;
        self
    }

    fn build(self) -> SensorSnapshot {
        self.snapshot
    }
}

#[tokio::test]
async fn test_adult_entering_counts_adult() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    ctl.adult_enters(t0);

    assert_eq!(ctl.occupancy(), OccupancyCount::new(1, 0));
    assert_eq!(ctl.door_state(), DoorState::Free);
    assert_eq!(ctl.metrics.crossings(PersonKind::Adult, Direction::Entering), 1);

    let status = ctl.status_rx.borrow().clone();
    assert_eq!(status.adults, 1);
    assert!(!status.alone);
}

#[tokio::test]
async fn test_child_entering_marks_child_alone() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    ctl.child_enters(t0);

    assert_eq!(ctl.occupancy(), OccupancyCount::new(0, 1));
    let status = ctl.status_rx.borrow().clone();
    assert_eq!(status.children, 1);
    assert!(status.alone);
    assert!(ctl.safety.episode().is_some());
}

#[tokio::test]
async fn test_door_states_reported_per_tick() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    assert_eq!(ctl.tick(at(t0).lower().build()).door_state, DoorState::CheckLow);
    assert_eq!(ctl.tick(at(t0 + ms(200)).lower().higher().build()).door_state, DoorState::OccupiedAdult);
    assert_eq!(ctl.metrics.snapshot().door_state, DoorState::OccupiedAdult.code());
    assert_eq!(ctl.tick(at(t0 + ms(400)).build()).door_state, DoorState::Free);
}

#[tokio::test]
async fn test_solitary_high_leaves_counts_unchanged() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    ctl.tick(at(t0).higher().build());
    let outcome = ctl.tick(at(t0 + ms(600)).higher().build());

    assert_eq!(outcome.door_state, DoorState::Free);
    assert!(outcome.crossing.is_none());
    assert_eq!(ctl.occupancy(), OccupancyCount::default());
}

#[tokio::test]
async fn test_exit_without_direction_mark_decrements() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.adult_enters(t0);
    ctl.tick(at(t + secs(2)).lower().higher().motion().build());
    let outcome = ctl.tick(at(t + secs(2) + ms(300)).build());

    assert_eq!(outcome.crossing, Some(CrossingEvent::new(PersonKind::Adult, Direction::Exiting)));
    assert_eq!(ctl.occupancy(), OccupancyCount::default());
}

#[tokio::test]
async fn test_child_alone_notifies_once_per_episode() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    for s in 1..=120 {
        ctl.tick(at(t + secs(s)).motion().build());
    }

    let texts = ctl.notifications();
    assert_eq!(texts, vec!["A child has been alone in the room for over 60 seconds!".to_string()]);
    assert_eq!(ctl.metrics.child_alone_alerts_total(), 1);
}

#[tokio::test]
async fn test_adult_arrival_ends_episode() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    ctl.tick(at(t + secs(61) + ms(500)).motion().build());
    assert_eq!(ctl.notifications().len(), 1);

    let t = ctl.adult_enters(t + secs(62));
    assert!(ctl.safety.episode().is_none());

    // Stay supervised well past the threshold: no further alert
    for s in 1..=90 {
        ctl.tick(at(t + secs(s)).motion().build());
    }
    assert!(ctl.notifications().is_empty());
}

#[tokio::test]
async fn test_proximity_while_alone_switches_off() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    let outcome = ctl.tick(at(t + secs(1)).proximity().motion().build());

    assert_eq!(outcome.decision.command, Some(ActuatorCommand::Off));
    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::Off)]);
    assert!(!ctl.actuator_is_on());
    assert_eq!(ctl.notifications(), vec![APPLIANCE_DISABLED_TEXT.to_string()]);
    assert!(!ctl.status_rx.borrow().actuator_on);

    // Already off: further proximity does nothing
    ctl.tick(at(t + secs(2)).proximity().motion().build());
    assert!(ctl.commands().is_empty());
    assert!(ctl.notifications().is_empty());
}

#[tokio::test]
async fn test_proximity_with_adult_present_is_ignored() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.adult_enters(t0);
    let t = ctl.child_enters(t + secs(1));
    ctl.tick(at(t + secs(1)).proximity().motion().build());

    assert!(ctl.commands().is_empty());
    assert!(ctl.actuator_is_on());
}

#[tokio::test]
async fn test_power_restored_after_cooldown_once_supervised() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    let off_at = t + secs(1);
    ctl.tick(at(off_at).proximity().motion().build());
    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::Off)]);

    ctl.adult_enters(off_at + secs(2));
    ctl.tick(at(off_at + secs(5)).motion().build());
    ctl.tick(at(off_at + secs(10)).motion().build());
    assert!(ctl.commands().is_empty());

    let outcome = ctl.tick(at(off_at + secs(10) + ms(1)).motion().build());
    assert_eq!(outcome.decision.command, Some(ActuatorCommand::On));
    assert_eq!(ctl.commands(), vec![(2, ActuatorCommand::On)]);
    assert!(ctl.actuator_is_on());
}

#[tokio::test]
async fn test_failed_off_ack_restores_mirror_and_retries() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    ctl.tick(at(t + secs(1)).proximity().motion().build());
    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::Off)]);

    // Worker reports the Off failed: appliance still on
    ctl.ack_tx.send_replace(ActuatorAck { seq: 1, is_on: true });
    let outcome = ctl.tick(at(t + secs(2)).proximity().motion().build());

    assert_eq!(outcome.decision.command, Some(ActuatorCommand::Off));
    assert_eq!(ctl.commands(), vec![(2, ActuatorCommand::Off)]);
    assert!(!ctl.actuator_is_on());
}

#[tokio::test]
async fn test_stale_ack_ignored() {
    let config = test_config().with_on_at_startup(true);
    let mut ctl = create_test_controller_with(config, 64);
    let t0 = ctl.t0;

    ctl.startup();
    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::On)]);

    ctl.ack_tx.send_replace(ActuatorAck { seq: 0, is_on: false });
    ctl.tick(at(t0 + ms(5)).build());
    assert!(ctl.actuator_is_on());

    ctl.ack_tx.send_replace(ActuatorAck { seq: 1, is_on: true });
    ctl.tick(at(t0 + ms(10)).build());
    assert!(ctl.actuator_is_on());
    assert_eq!(ctl.last_cmd_seq(), 1);
}

#[tokio::test]
async fn test_presence_timeout_resets_counts_once() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    ctl.tick(at(t + secs(30)).build());
    assert_eq!(ctl.occupancy(), OccupancyCount::new(0, 1));

    ctl.tick(at(t + secs(31)).build());
    assert_eq!(ctl.occupancy(), OccupancyCount::default());
    assert_eq!(ctl.metrics.presence_resets_total(), 1);

    ctl.tick(at(t + secs(40)).build());
    assert_eq!(ctl.metrics.presence_resets_total(), 1);
    assert!(ctl.safety.episode().is_none());
    assert_eq!(ctl.metrics.snapshot().children, 0);
}

#[tokio::test]
async fn test_startup_switches_on_when_configured() {
    let config = test_config().with_on_at_startup(true);
    let mut ctl = create_test_controller_with(config, 64);

    ctl.startup();

    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::On)]);
    assert!(ctl.status_rx.borrow().actuator_on);
}

#[tokio::test]
async fn test_startup_skips_on_when_disabled() {
    let mut ctl = create_test_controller();
    ctl.startup();
    assert!(ctl.commands().is_empty());
}

#[tokio::test]
async fn test_full_command_queue_drops_then_retries() {
    let config = test_config().with_on_at_startup(true);
    let mut ctl = create_test_controller_with(config, 1);
    let t0 = ctl.t0;

    // Startup On occupies the only slot
    ctl.startup();

    let t = ctl.child_enters(t0);
    ctl.tick(at(t + secs(1)).proximity().motion().build());
    assert_eq!(ctl.metrics.actuator_cmds_dropped(), 1);
    assert!(ctl.actuator_is_on());
    assert_eq!(ctl.last_cmd_seq(), 1);

    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::On)]);
    ctl.tick(at(t + secs(2)).proximity().motion().build());
    assert_eq!(ctl.commands(), vec![(2, ActuatorCommand::Off)]);
}

#[tokio::test]
async fn test_dropped_shutoff_sends_no_disabled_notice() {
    let config = test_config().with_on_at_startup(true);
    let mut ctl = create_test_controller_with(config, 1);
    let t0 = ctl.t0;
    ctl.startup();

    let t = ctl.child_enters(t0);
    ctl.tick(at(t + secs(1)).proximity().motion().build());
    assert_eq!(ctl.metrics.actuator_cmds_dropped(), 1);
    assert!(ctl.notifications().is_empty());

    // Still full: dropped again, still silent
    ctl.tick(at(t + secs(2)).proximity().motion().build());
    assert_eq!(ctl.metrics.actuator_cmds_dropped(), 2);
    assert!(ctl.notifications().is_empty());

    // Slot frees up: the Off goes out with its notice
    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::On)]);
    ctl.tick(at(t + secs(3)).proximity().motion().build());
    assert_eq!(ctl.commands(), vec![(2, ActuatorCommand::Off)]);
    assert_eq!(ctl.notifications(), vec![APPLIANCE_DISABLED_TEXT.to_string()]);
}

#[tokio::test]
async fn test_notifications_disabled_suppresses_alerts() {
    let config = Config::from_toml_str(
        "[door]\ndirection_sensor_enabled = true\n\
         [actuator]\non_at_startup = false\n\
         [notifications]\nenabled = false\n",
        "inline",
    )
    .unwrap();
    let mut ctl = create_test_controller_with(config, 64);
    let t0 = ctl.t0;

    let t = ctl.child_enters(t0);
    ctl.tick(at(t + secs(1)).proximity().motion().build());

    assert_eq!(ctl.commands(), vec![(1, ActuatorCommand::Off)]);
    assert!(ctl.notifications().is_empty());
}

#[tokio::test]
async fn test_status_sent_to_notifier_on_change() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    ctl.tick(at(t0).lower().higher().build());

    let mut statuses = 0;
    while let Ok(msg) = ctl.notify_rx.try_recv() {
        if let NotifyMessage::Status(payload) = msg {
            assert_eq!(payload.door, DoorState::OccupiedAdult);
            statuses += 1;
        }
    }
    assert_eq!(statuses, 1);

    // Nothing changed: nothing published
    ctl.tick(at(t0 + ms(5)).lower().higher().build());
    assert!(ctl.notify_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unchanged_status_is_not_republished() {
    let mut ctl = create_test_controller();
    let t0 = ctl.t0;

    ctl.status_dirty = true;
    ctl.tick(at(t0).build());
    assert!(ctl.notify_rx.try_recv().is_err());
    assert!(!ctl.status_dirty);
}

#[tokio::test]
async fn test_startup_always_announces_status() {
    let mut ctl = create_test_controller();
    ctl.startup();

    let mut statuses = 0;
    while let Ok(msg) = ctl.notify_rx.try_recv() {
        if let NotifyMessage::Status(payload) = msg {
            assert_eq!(payload.door, DoorState::Free);
            statuses += 1;
        }
    }
    assert_eq!(statuses, 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let mut ctl = create_test_controller();
    let signals = Arc::new(SensorSignals::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(ms(30)).await;
        let _ = shutdown_tx.send(true);
    });

    ctl.run(signals, Arc::new(SystemClock), shutdown_rx).await;
    assert!(ctl.metrics.ticks_total() > 0);
}
