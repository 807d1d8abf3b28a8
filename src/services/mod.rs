//! Services - room safety logic and actuator plumbing
//!
//! This module contains the core services:
//! - `door_detector` - Classifies doorway crossings from two threshold sensors
//! - `occupancy` - Adult/child counts with presence-timeout recovery
//! - `safety` - Alone alerts and appliance shutoff policy
//! - `controller` - Fixed-period tick loop wiring the three together
//! - `actuator` - Appliance switch interface (Telldus, mock)
//! - `actuator_worker` - Async actuator command worker

pub mod actuator;
pub mod actuator_worker;
pub mod controller;
pub mod door_detector;
pub mod occupancy;
pub mod safety;

// Re-export commonly used types
pub use actuator::{build_actuator, Actuator, MockActuator, TelldusActuator};
pub use actuator_worker::{create_actuator_worker, ActuatorAck, ActuatorCmd, ActuatorWorker};
pub use controller::{Controller, TickOutcome};
pub use door_detector::DoorCrossingDetector;
pub use occupancy::OccupancyTracker;
pub use safety::{SafetyActuatorCoordinator, SafetyDecision};
