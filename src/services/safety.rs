//! Safety policy for the controlled appliance
//!
//! Decides, once per tick, whether to switch the appliance and whether to
//! alert the caregiver. Evaluated in priority order:
//!
//! 1. Children alone: start (or continue) an alone episode. Past
//!    `timeslot_child_alone` the episode alerts once. Independently, any
//!    proximity near a powered appliance switches it off at once.
//! 2. Otherwise: the episode ends, and a switched-off appliance comes back
//!    on only after `timeslot_actuator_cooldown` since it went off.
//!
//! The proximity sensor cannot tell a child from an adult; anything near the
//! appliance during an alone episode is treated as the child.

use crate::domain::clock::elapsed;
use crate::domain::types::{ActuatorCommand, NotificationRequest};
use smallvec::SmallVec;
use std::time::{Duration, Instant};

pub const DEFAULT_TIMESLOT_CHILD_ALONE: Duration = Duration::from_secs(60);
pub const DEFAULT_TIMESLOT_ACTUATOR_COOLDOWN: Duration = Duration::from_secs(10);

/// Notification text for an alone episode past its threshold
pub fn child_alone_text(threshold: Duration) -> String {
    format!("A child has been alone in the room for over {} seconds!", threshold.as_secs())
}

pub const APPLIANCE_DISABLED_TEXT: &str = "An appliance has been disabled for safety.";

/// Interval during which children are present with no adult
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AloneEpisode {
    pub started_at: Instant,
    pub notified: bool,
}

/// Output of one policy evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyDecision {
    pub command: Option<ActuatorCommand>,
    /// At most two per tick: the alone alert and the shutoff notice
    pub notify: SmallVec<[NotificationRequest; 2]>,
}

impl SafetyDecision {
    pub fn is_empty(&self) -> bool {
        self.command.is_none() && self.notify.is_empty()
    }
}

pub struct SafetyActuatorCoordinator {
    episode: Option<AloneEpisode>,
    last_off_at: Instant,
    timeslot_child_alone: Duration,
    timeslot_actuator_cooldown: Duration,
}

impl SafetyActuatorCoordinator {
    pub fn new(
        timeslot_child_alone: Duration,
        timeslot_actuator_cooldown: Duration,
        now: Instant,
    ) -> Self {
        Self { episode: None, last_off_at: now, timeslot_child_alone, timeslot_actuator_cooldown }
    }

    pub fn decide(
        &mut self,
        adults: u32,
        children: u32,
        proximity: bool,
        actuator_is_on: bool,
        now: Instant,
    ) -> SafetyDecision {
        let mut decision = SafetyDecision::default();

        if children > 0 && adults == 0 {
            let episode =
                self.episode.get_or_insert(AloneEpisode { started_at: now, notified: false });

            if !episode.notified && elapsed(now, episode.started_at) > self.timeslot_child_alone {
                episode.notified = true;
                decision.notify.push(NotificationRequest::new(child_alone_text(
                    self.timeslot_child_alone,
                )));
            }

            if actuator_is_on && proximity {
                decision.command = Some(ActuatorCommand::Off);
                self.last_off_at = now;
                decision.notify.push(NotificationRequest::new(APPLIANCE_DISABLED_TEXT));
            }
        } else {
            if !actuator_is_on
                && elapsed(now, self.last_off_at) > self.timeslot_actuator_cooldown
            {
                decision.command = Some(ActuatorCommand::On);
            }
            self.episode = None;
        }

        decision
    }

    /// Current alone episode, if children are unsupervised
    #[inline]
    pub fn episode(&self) -> Option<AloneEpisode> {
        self.episode
    }

    #[inline]
    pub fn last_off_at(&self) -> Instant {
        self.last_off_at
    }

    #[inline]
    pub fn timeslot_child_alone(&self) -> Duration {
        self.timeslot_child_alone
    }
}
