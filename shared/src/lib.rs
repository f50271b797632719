//! Remote Robot Shared Logic
//!
//! Pure, synchronous building blocks used by the robot runtime: parsing of
//! browser control samples, the drive command resolver, the camera head
//! position tracker and MJPEG framing helpers.

pub mod head;
pub mod mjpeg;
pub mod resolver;
pub mod sample;

pub use head::{HeadConfig, HeadPosition, HeadPositionTracker};
pub use mjpeg::{AssemblerError, FrameAssembler};
pub use resolver::{
    round_away_from_zero, CommandResolver, DriveCommand, DriveConfig, DriveMode, Motion,
    Resolution, ResolverPolicy,
};
pub use sample::{ControlSample, MotionState, SampleError};

/// Hard limits of the hardware and the control protocol
pub mod limits {
    /// Lowest servo angle in degrees
    pub const SERVO_MIN_DEG: i32 = 0;

    /// Highest servo angle in degrees
    pub const SERVO_MAX_DEG: i32 = 180;

    /// Decimal digits kept by the speed rounding step
    pub const SPEED_ROUNDING_DIGITS: i32 = 2;

    /// Largest digit count accepted by `round_away_from_zero`
    pub const MAX_ROUNDING_DIGITS: i32 = 14;

    /// JPEG start-of-image marker
    pub const JPEG_SOI: [u8; 2] = [0xFF, 0xD8];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_servo_limits_are_ordered() {
        assert!(limits::SERVO_MIN_DEG < limits::SERVO_MAX_DEG);
        assert_eq!(limits::SERVO_MAX_DEG, 180);
    }
}
