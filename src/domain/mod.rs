//! Domain models - core types shared by every stage of the tick pipeline
//!
//! - `types` - door states, crossings, occupancy counts, actuator commands
//! - `clock` - monotonic time source and saturating elapsed helpers

pub mod clock;
pub mod types;

pub use clock::{Clock, SystemClock};
pub use types::{
    ActuatorCommand, CrossingEvent, Direction, DoorState, NotificationRequest, OccupancyCount,
    PersonKind, SensorSnapshot,
};
