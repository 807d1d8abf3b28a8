//! Shared types for the room-safety controller

use serde::Serialize;
use std::time::Instant;

/// Doorway classifier state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorState {
    /// Nobody at the door
    Free,
    /// Lower sensor triggered, waiting for the higher one
    CheckLow,
    /// Higher sensor triggered, waiting for the lower one
    CheckHigh,
    /// Child-sized body in the doorway
    OccupiedChild,
    /// Adult-sized body in the doorway
    OccupiedAdult,
}

impl DoorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorState::Free => "free",
            DoorState::CheckLow => "check_low",
            DoorState::CheckHigh => "check_high",
            DoorState::OccupiedChild => "occupied_child",
            DoorState::OccupiedAdult => "occupied_adult",
        }
    }

    /// Numeric code for the Prometheus gauge
    pub fn code(&self) -> u64 {
        match self {
            DoorState::Free => 0,
            DoorState::CheckLow => 1,
            DoorState::CheckHigh => 2,
            DoorState::OccupiedChild => 3,
            DoorState::OccupiedAdult => 4,
        }
    }

    /// Person type occupying the doorway, if any
    pub fn occupant(&self) -> Option<PersonKind> {
        match self {
            DoorState::OccupiedChild => Some(PersonKind::Child),
            DoorState::OccupiedAdult => Some(PersonKind::Adult),
            DoorState::Free | DoorState::CheckLow | DoorState::CheckHigh => None,
        }
    }
}

impl std::fmt::Display for DoorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PersonKind {
    Child,
    Adult,
}

impl PersonKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonKind::Child => "child",
            PersonKind::Adult => "adult",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Entering,
    Exiting,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Entering => "entering",
            Direction::Exiting => "exiting",
        }
    }
}

/// A completed doorway crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossingEvent {
    pub person: PersonKind,
    pub direction: Direction,
}

impl CrossingEvent {
    pub fn new(person: PersonKind, direction: Direction) -> Self {
        Self { person, direction }
    }
}

/// People currently in the room. Unsigned, so never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OccupancyCount {
    pub adults: u32,
    pub children: u32,
}

impl OccupancyCount {
    pub fn new(adults: u32, children: u32) -> Self {
        Self { adults, children }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.adults == 0 && self.children == 0
    }

    /// Children present with no adult
    #[inline]
    pub fn children_alone(&self) -> bool {
        self.children > 0 && self.adults == 0
    }
}

impl std::fmt::Display for OccupancyCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "adults={} children={}", self.adults, self.children)
    }
}

/// Command for the controlled appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActuatorCommand {
    On,
    Off,
}

impl ActuatorCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActuatorCommand::On => "on",
            ActuatorCommand::Off => "off",
        }
    }

    /// Actuator state once the command is acknowledged
    pub fn target_is_on(&self) -> bool {
        matches!(self, ActuatorCommand::On)
    }
}

/// Text alert for the notification transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationRequest {
    pub text: String,
}

impl NotificationRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// One consistent read of every input signal for a tick
#[derive(Debug, Clone, Copy)]
pub struct SensorSnapshot {
    pub lower_detected: bool,
    pub higher_detected: bool,
    /// `None` when the direction sensor is disabled
    pub direction_detected: Option<bool>,
    pub actuator_proximity_detected: bool,
    pub room_motion_detected: bool,
    pub now: Instant,
}

impl SensorSnapshot {
    /// All signals clear at `now`
    pub fn idle(now: Instant) -> Self {
        Self {
            lower_detected: false,
            higher_detected: false,
            direction_detected: None,
            actuator_proximity_detected: false,
            room_motion_detected: false,
            now,
        }
    }
}
