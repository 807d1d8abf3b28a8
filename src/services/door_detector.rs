//! Doorway crossing classifier
//!
//! Two threshold sensors are mounted across the door frame, one at child
//! height and one above it. An adult-sized body trips both within the
//! co-trigger window; a body that only trips the lower sensor for longer
//! than the window is a child. A solitary trip of the higher sensor is
//! discarded: the lower sensor is the reference for every real crossing.
//!
//! The optional direction sensor sits on the outer side of the door. A
//! trigger just before the threshold sensors marks the crossing as an
//! entry; without one the crossing counts as an exit.
//!
//! The detector does no logging of its own; the controller logs state changes.

use crate::domain::clock::elapsed;
use crate::domain::types::{CrossingEvent, Direction, DoorState};
use std::time::{Duration, Instant};

/// Default co-trigger window for the two threshold sensors
pub const DEFAULT_WINDOW_BOTH_SENSORS: Duration = Duration::from_millis(500);

/// Converts threshold sensor readings into a door state and crossing events
#[derive(Debug)]
pub struct DoorCrossingDetector {
    state: DoorState,
    /// When the first threshold sensor tripped for the current crossing
    door_triggered_at: Instant,
    /// Tentative entry mark from the direction sensor
    direction_triggered_at: Option<Instant>,
    window: Duration,
    direction_sensor_enabled: bool,
}

impl DoorCrossingDetector {
    pub fn new(window: Duration, direction_sensor_enabled: bool, now: Instant) -> Self {
        Self {
            state: DoorState::Free,
            door_triggered_at: now,
            direction_triggered_at: None,
            window,
            direction_sensor_enabled,
        }
    }

    /// Advance the state machine with one snapshot of the sensors
    ///
    /// Transitions cascade within a single call, so a lower trip that has
    /// already cleared when the window elapses goes straight through
    /// `OccupiedChild` to `Free` and still emits its crossing.
    pub fn update(
        &mut self,
        lower: bool,
        higher: bool,
        direction: Option<bool>,
        now: Instant,
    ) -> (DoorState, Option<CrossingEvent>) {
        let direction = if self.direction_sensor_enabled { direction.unwrap_or(false) } else { false };

        if self.state == DoorState::Free {
            self.expire_direction(now);

            if lower {
                self.state = DoorState::CheckLow;
                self.door_triggered_at = now;
            } else if higher {
                self.state = DoorState::CheckHigh;
                self.door_triggered_at = now;
            } else if direction {
                self.direction_triggered_at = Some(now);
            }
        }

        if matches!(self.state, DoorState::CheckLow | DoorState::CheckHigh) {
            self.check_window(lower, higher, now);
        }

        let mut crossing = None;
        if let Some(person) = self.state.occupant() {
            if !lower && !higher {
                self.state = DoorState::Free;
                crossing = Some(CrossingEvent::new(person, self.resolve_direction()));
                self.direction_triggered_at = None;
            }
        }

        (self.state, crossing)
    }

    /// Classify a pending check once the other sensor trips or the window closes
    fn check_window(&mut self, lower: bool, higher: bool, now: Instant) {
        if elapsed(now, self.door_triggered_at) < self.window {
            match self.state {
                DoorState::CheckLow if higher => self.state = DoorState::OccupiedAdult,
                DoorState::CheckHigh if lower => self.state = DoorState::OccupiedAdult,
                _ => {}
            }
        } else {
            self.state = match self.state {
                DoorState::CheckHigh => DoorState::Free,
                DoorState::CheckLow => DoorState::OccupiedChild,
                other => other,
            };
        }
    }

    /// Entry only when the direction sensor fired within the window before the door
    fn resolve_direction(&self) -> Direction {
        match self.direction_triggered_at {
            Some(at) if elapsed(self.door_triggered_at, at) <= self.window => Direction::Entering,
            _ => Direction::Exiting,
        }
    }

    /// Drop a direction mark that never led to a threshold trip
    fn expire_direction(&mut self, now: Instant) {
        if let Some(at) = self.direction_triggered_at {
            if elapsed(now, at) > self.window {
                self.direction_triggered_at = None;
            }
        }
    }

    #[inline]
    pub fn state(&self) -> DoorState {
        self.state
    }

    /// Whether an entry mark from the direction sensor is pending
    #[inline]
    pub fn direction_pending(&self) -> bool {
        self.direction_triggered_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::PersonKind;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn detector(t0: Instant) -> DoorCrossingDetector {
        DoorCrossingDetector::new(DEFAULT_WINDOW_BOTH_SENSORS, false, t0)
    }

    fn detector_with_direction(t0: Instant) -> DoorCrossingDetector {
        DoorCrossingDetector::new(DEFAULT_WINDOW_BOTH_SENSORS, true, t0)
    }

    #[test]
    fn test_idle_stays_free() {
        let t0 = Instant::now();
        let mut d = detector(t0);
        assert_eq!(d.update(false, false, None, t0), (DoorState::Free, None));
        assert_eq!(d.update(false, false, None, t0 + ms(100)), (DoorState::Free, None));
    }

    #[test]
    fn test_lower_then_higher_is_adult() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        assert_eq!(d.update(true, false, None, t0).0, DoorState::CheckLow);
        assert_eq!(d.update(true, true, None, t0 + ms(200)).0, DoorState::OccupiedAdult);

        let (state, crossing) = d.update(false, false, None, t0 + ms(900));
        assert_eq!(state, DoorState::Free);
        assert_eq!(crossing, Some(CrossingEvent::new(PersonKind::Adult, Direction::Exiting)));
    }

    #[test]
    fn test_higher_then_lower_is_adult() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        assert_eq!(d.update(false, true, None, t0).0, DoorState::CheckHigh);
        assert_eq!(d.update(true, true, None, t0 + ms(300)).0, DoorState::OccupiedAdult);
    }

    #[test]
    fn test_simultaneous_trigger_is_adult_same_tick() {
        let t0 = Instant::now();
        let mut d = detector(t0);
        assert_eq!(d.update(true, true, None, t0).0, DoorState::OccupiedAdult);
    }

    #[test]
    fn test_solitary_low_becomes_child() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        assert_eq!(d.update(true, false, None, t0).0, DoorState::CheckLow);
        assert_eq!(d.update(true, false, None, t0 + ms(499)).0, DoorState::CheckLow);
        assert_eq!(d.update(true, false, None, t0 + ms(500)).0, DoorState::OccupiedChild);

        let (state, crossing) = d.update(false, false, None, t0 + ms(600));
        assert_eq!(state, DoorState::Free);
        assert_eq!(crossing, Some(CrossingEvent::new(PersonKind::Child, Direction::Exiting)));
    }

    #[test]
    fn test_quick_low_trip_still_counts_child() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        d.update(true, false, None, t0);
        // Lower clears before the window closes; still a pending check
        assert_eq!(d.update(false, false, None, t0 + ms(200)), (DoorState::CheckLow, None));

        // Window closes with both clear: child classified and released in one tick
        let (state, crossing) = d.update(false, false, None, t0 + ms(510));
        assert_eq!(state, DoorState::Free);
        assert_eq!(crossing.map(|c| c.person), Some(PersonKind::Child));
    }

    #[test]
    fn test_solitary_high_discarded() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        assert_eq!(d.update(false, true, None, t0).0, DoorState::CheckHigh);
        assert_eq!(d.update(false, true, None, t0 + ms(400)).0, DoorState::CheckHigh);
        assert_eq!(d.update(false, true, None, t0 + ms(500)), (DoorState::Free, None));
    }

    #[test]
    fn test_late_second_sensor_does_not_upgrade_child() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        d.update(true, false, None, t0);
        assert_eq!(d.update(true, false, None, t0 + ms(600)).0, DoorState::OccupiedChild);
        // Higher trips well after the window: stays a child
        assert_eq!(d.update(true, true, None, t0 + ms(700)).0, DoorState::OccupiedChild);
        assert_eq!(d.update(false, true, None, t0 + ms(800)).0, DoorState::OccupiedChild);

        let (_, crossing) = d.update(false, false, None, t0 + ms(900));
        assert_eq!(crossing.map(|c| c.person), Some(PersonKind::Child));
    }

    #[test]
    fn test_occupied_waits_for_both_clear() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        d.update(true, true, None, t0);
        assert_eq!(d.update(false, true, None, t0 + ms(100)), (DoorState::OccupiedAdult, None));
        assert_eq!(d.update(true, false, None, t0 + ms(200)), (DoorState::OccupiedAdult, None));
        assert!(d.update(false, false, None, t0 + ms(300)).1.is_some());
    }

    #[test]
    fn test_single_event_per_crossing() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        d.update(true, true, None, t0);
        assert!(d.update(false, false, None, t0 + ms(300)).1.is_some());
        assert!(d.update(false, false, None, t0 + ms(310)).1.is_none());
        assert!(d.update(false, false, None, t0 + ms(320)).1.is_none());
    }

    #[test]
    fn test_direction_before_door_marks_entering() {
        let t0 = Instant::now();
        let mut d = detector_with_direction(t0);

        d.update(false, false, Some(true), t0);
        assert!(d.direction_pending());
        d.update(true, true, Some(false), t0 + ms(200));

        let (_, crossing) = d.update(false, false, Some(false), t0 + ms(800));
        assert_eq!(crossing, Some(CrossingEvent::new(PersonKind::Adult, Direction::Entering)));
        assert!(!d.direction_pending());
    }

    #[test]
    fn test_stale_direction_defaults_to_exiting() {
        let t0 = Instant::now();
        let mut d = detector_with_direction(t0);

        d.update(false, false, Some(true), t0);
        d.update(false, false, Some(false), t0 + ms(600));
        assert!(!d.direction_pending());

        d.update(true, true, None, t0 + ms(700));
        let (_, crossing) = d.update(false, false, None, t0 + ms(900));
        assert_eq!(crossing.map(|c| c.direction), Some(Direction::Exiting));
    }

    #[test]
    fn test_direction_ignored_when_disabled() {
        let t0 = Instant::now();
        let mut d = detector(t0);

        d.update(false, false, Some(true), t0);
        assert!(!d.direction_pending());
        d.update(true, true, None, t0 + ms(100));
        let (_, crossing) = d.update(false, false, None, t0 + ms(400));
        assert_eq!(crossing.map(|c| c.direction), Some(Direction::Exiting));
    }

    #[test]
    fn test_direction_after_door_trip_ignored() {
        let t0 = Instant::now();
        let mut d = detector_with_direction(t0);

        d.update(true, false, Some(false), t0);
        d.update(true, false, Some(true), t0 + ms(100));
        assert!(!d.direction_pending());
    }

    #[test]
    fn test_backwards_clock_keeps_window_open() {
        let t0 = Instant::now() + Duration::from_secs(10);
        let mut d = detector(t0);

        d.update(true, false, None, t0);
        // Clock reads earlier than the trigger: elapsed clamps to zero
        assert_eq!(d.update(true, false, None, t0 - ms(900)).0, DoorState::CheckLow);
        assert_eq!(d.update(true, true, None, t0 - ms(800)).0, DoorState::OccupiedAdult);
    }
}
