//! Actuator trait abstraction for pluggable wheel/servo drivers

use async_trait::async_trait;
use thiserror::Error;

/// Fatal faults raised while bringing up the motor controller
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorInitError {
    #[error("Motor controller not detected: {0}")]
    NotDetected(String),

    #[error("Motor controller firmware needs to be updated: {0}")]
    FirmwareMismatch(String),

    #[error("Unexpected error initializing motor controller: {0}")]
    Unknown(String),
}

impl ActuatorInitError {
    /// Process exit code reported for this fault
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::NotDetected(_) => 1,
            Self::FirmwareMismatch(_) => 2,
            Self::Unknown(_) => 3,
        }
    }
}

/// Recoverable write failures during normal operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActuatorError {
    #[error("Wheel write failed: {0}")]
    Wheels(String),

    #[error("Head servo write failed: {0}")]
    Head(String),
}

/// Wheel and camera-head hardware
///
/// Implementations serialise their own bus access; callers may share one
/// instance behind an `Arc`.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Set both wheel speeds in degrees per second, negative = reverse
    async fn set_wheel_speeds(&self, left: i32, right: i32) -> Result<(), ActuatorError>;

    /// Point the head servos at the given angles
    async fn set_head_angles(&self, pan: i32, tilt: i32) -> Result<(), ActuatorError>;

    /// Zero both wheels
    async fn stop(&self) -> Result<(), ActuatorError>;

    /// Cut power to the head servos once a move has settled
    async fn disable_head_actuators(&self) -> Result<(), ActuatorError>;

    /// Human-readable driver name
    fn name(&self) -> &'static str;
}
