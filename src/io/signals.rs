//! Shared boolean sensor signals
//!
//! Each signal has exactly one writer (its sensor monitor) and one reader
//! (the controller tick loop). Plain atomics are enough; the controller
//! reads all of them once at tick start and works from that snapshot.

use crate::domain::types::SensorSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Signal identifiers, one per sensor monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Lower,
    Higher,
    Direction,
    Proximity,
    RoomMotion,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Lower => "lower",
            Signal::Higher => "higher",
            Signal::Direction => "direction",
            Signal::Proximity => "proximity",
            Signal::RoomMotion => "motion",
        }
    }
}

impl std::str::FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lower" => Ok(Signal::Lower),
            "higher" => Ok(Signal::Higher),
            "direction" => Ok(Signal::Direction),
            "proximity" => Ok(Signal::Proximity),
            "motion" | "room_motion" | "pir" => Ok(Signal::RoomMotion),
            other => Err(format!("unknown signal '{other}'")),
        }
    }
}

#[derive(Debug, Default)]
pub struct SensorSignals {
    lower: AtomicBool,
    higher: AtomicBool,
    direction: AtomicBool,
    proximity: AtomicBool,
    room_motion: AtomicBool,
}

impl SensorSignals {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, signal: Signal) -> &AtomicBool {
        match signal {
            Signal::Lower => &self.lower,
            Signal::Higher => &self.higher,
            Signal::Direction => &self.direction,
            Signal::Proximity => &self.proximity,
            Signal::RoomMotion => &self.room_motion,
        }
    }

    /// Store a new value; returns the previous one
    #[inline]
    pub fn set(&self, signal: Signal, value: bool) -> bool {
        self.slot(signal).swap(value, Ordering::AcqRel)
    }

    #[inline]
    pub fn get(&self, signal: Signal) -> bool {
        self.slot(signal).load(Ordering::Acquire)
    }

    /// Read every signal once for a tick
    pub fn snapshot(&self, direction_enabled: bool, now: Instant) -> SensorSnapshot {
        SensorSnapshot {
            lower_detected: self.get(Signal::Lower),
            higher_detected: self.get(Signal::Higher),
            direction_detected: direction_enabled.then(|| self.get(Signal::Direction)),
            actuator_proximity_detected: self.get(Signal::Proximity),
            room_motion_detected: self.get(Signal::RoomMotion),
            now,
        }
    }
}
