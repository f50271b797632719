//! Control session
//!
//! Owns the robot's mutable state (head position, speed mode, halt flag) and
//! applies each control sample to the actuator under a single lock.

mod controller;

pub use controller::{RobotSessionController, SampleOutcome};
