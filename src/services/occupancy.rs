//! Room occupancy counter with presence-timeout recovery
//!
//! Crossing events move the adult/child counts up or down. Exits clamp at
//! zero, so a missed entry never drives a count negative.
//!
//! Key behaviors:
//! - Any crossing refreshes the last-motion timestamp
//! - While anyone is counted, room motion refreshes it too
//! - No motion for longer than `timeslot_pir` resets both counts to zero,
//!   recovering from an occluded exit; the reset fires once per occupancy

use crate::domain::clock::elapsed;
use crate::domain::types::{CrossingEvent, Direction, OccupancyCount, PersonKind};
use std::time::{Duration, Instant};

/// Default no-motion period before the room is assumed empty
pub const DEFAULT_TIMESLOT_PIR: Duration = Duration::from_secs(30);

/// Why the counts changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccupancyChangeCause {
    Crossing(CrossingEvent),
    PresenceTimeout,
}

impl OccupancyChangeCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccupancyChangeCause::Crossing(_) => "crossing",
            OccupancyChangeCause::PresenceTimeout => "presence_timeout",
        }
    }
}

/// Old vs new counts, reported for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OccupancyChange {
    pub old: OccupancyCount,
    pub new: OccupancyCount,
    pub cause: OccupancyChangeCause,
}

impl OccupancyChange {
    /// The change left children in the room without an adult
    pub fn child_became_alone(&self) -> bool {
        self.new.children_alone() && !self.old.children_alone()
    }
}

pub struct OccupancyTracker {
    count: OccupancyCount,
    last_motion_at: Instant,
    timeslot_pir: Duration,
    /// Latest change not yet taken by the caller
    pending_change: Option<OccupancyChange>,
}

impl OccupancyTracker {
    pub fn new(timeslot_pir: Duration, now: Instant) -> Self {
        Self {
            count: OccupancyCount::default(),
            last_motion_at: now,
            timeslot_pir,
            pending_change: None,
        }
    }

    /// Apply this tick's crossing (if any) and room motion reading
    pub fn apply(
        &mut self,
        event: Option<CrossingEvent>,
        room_motion: bool,
        now: Instant,
    ) -> OccupancyCount {
        if let Some(event) = event {
            let old = self.count;
            let slot = match event.person {
                PersonKind::Adult => &mut self.count.adults,
                PersonKind::Child => &mut self.count.children,
            };
            *slot = match event.direction {
                Direction::Entering => slot.saturating_add(1),
                Direction::Exiting => slot.saturating_sub(1),
            };
            self.last_motion_at = now;
            self.record_change(old, OccupancyChangeCause::Crossing(event));
        }

        if !self.count.is_empty() {
            if room_motion {
                self.last_motion_at = now;
            } else if elapsed(now, self.last_motion_at) > self.timeslot_pir {
                let old = self.count;
                self.count = OccupancyCount::default();
                self.record_change(old, OccupancyChangeCause::PresenceTimeout);
            }
        }

        self.count
    }

    fn record_change(&mut self, old: OccupancyCount, cause: OccupancyChangeCause) {
        if old == self.count {
            return;
        }
        // A crossing and a timeout in the same tick collapse into one report
        let old = self.pending_change.map(|c| c.old).unwrap_or(old);
        self.pending_change = Some(OccupancyChange { old, new: self.count, cause });
    }

    /// Take the change produced by the last `apply`, if any
    pub fn take_change(&mut self) -> Option<OccupancyChange> {
        self.pending_change.take()
    }

    #[inline]
    pub fn count(&self) -> OccupancyCount {
        self.count
    }

    #[inline]
    pub fn timeslot_pir(&self) -> Duration {
        self.timeslot_pir
    }
}
