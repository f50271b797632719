//! Camera head position tracking
//!
//! Keeps the logical pan/tilt angles of the camera head. The tracker never
//! talks to hardware: it records the intended angles and the session applies
//! them, so a failed servo write leaves the tracked value untouched.

use crate::limits::{SERVO_MAX_DEG, SERVO_MIN_DEG};
use serde::Deserialize;

/// Pan/tilt angles in degrees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadPosition {
    pub pan: i32,
    pub tilt: i32,
}

impl HeadPosition {
    pub fn new(pan: i32, tilt: i32) -> Self {
        Self { pan, tilt }
    }
}

/// Head calibration and travel limits
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeadConfig {
    /// Calibrated pan angle that faces straight ahead
    pub pan_center: i32,
    /// Calibrated tilt angle that looks level
    pub tilt_center: i32,
    /// Degrees moved per arrow key press
    pub step: i32,
    pub pan_min: i32,
    pub pan_max: i32,
    pub tilt_min: i32,
    pub tilt_max: i32,
    /// Time given to the servos to reach a new angle before powering them down
    pub settle_ms: u64,
    /// Pan extremes visited by the shake gesture
    pub shake_pan: [i32; 2],
    /// Tilt extremes visited by the shake gesture
    pub shake_tilt: [i32; 2],
}

impl Default for HeadConfig {
    fn default() -> Self {
        Self {
            pan_center: 85,
            tilt_center: 95,
            step: 5,
            pan_min: SERVO_MIN_DEG,
            pan_max: SERVO_MAX_DEG,
            tilt_min: SERVO_MIN_DEG,
            tilt_max: SERVO_MAX_DEG,
            settle_ms: 250,
            shake_pan: [110, 84],
            shake_tilt: [110, 66],
        }
    }
}

/// Tracks the current and calibrated head position
#[derive(Debug, Clone)]
pub struct HeadPositionTracker {
    current: HeadPosition,
    center: HeadPosition,
    step: i32,
    pan_range: (i32, i32),
    tilt_range: (i32, i32),
}

impl HeadPositionTracker {
    /// Create a tracker resting at the calibrated center.
    ///
    /// Configured ranges are narrowed to what the servos can physically do.
    pub fn new(config: &HeadConfig) -> Self {
        let pan_range = servo_range(config.pan_min, config.pan_max);
        let tilt_range = servo_range(config.tilt_min, config.tilt_max);
        let center = HeadPosition::new(
            config.pan_center.clamp(pan_range.0, pan_range.1),
            config.tilt_center.clamp(tilt_range.0, tilt_range.1),
        );

        Self {
            current: center,
            center,
            step: config.step.saturating_abs(),
            pan_range,
            tilt_range,
        }
    }

    /// Current intended position
    pub fn position(&self) -> HeadPosition {
        self.current
    }

    /// Calibrated center
    pub fn center_position(&self) -> HeadPosition {
        self.center
    }

    /// Move pan one step; `direction` > 0 turns right, < 0 turns left
    pub fn step_pan(&mut self, direction: i32) -> HeadPosition {
        let pan = self.current.pan.saturating_add(direction.signum() * self.step);
        self.current.pan = pan.clamp(self.pan_range.0, self.pan_range.1);
        self.current
    }

    /// Move tilt one step; `direction` > 0 looks up, < 0 looks down
    pub fn step_tilt(&mut self, direction: i32) -> HeadPosition {
        let tilt = self.current.tilt.saturating_add(direction.signum() * self.step);
        self.current.tilt = tilt.clamp(self.tilt_range.0, self.tilt_range.1);
        self.current
    }

    /// Reset both axes to the calibrated center
    pub fn center(&mut self) -> HeadPosition {
        self.current = self.center;
        self.current
    }

    /// Positions visited by the "I'm alive" head shake.
    ///
    /// Pans to both extremes, re-centers, tilts to both extremes and
    /// re-centers again. The tracker ends at center.
    pub fn shake_script(&mut self, config: &HeadConfig) -> Vec<HeadPosition> {
        let clamp_pan = |p: i32| p.clamp(self.pan_range.0, self.pan_range.1);
        let clamp_tilt = |t: i32| t.clamp(self.tilt_range.0, self.tilt_range.1);
        let tilt = self.current.tilt;
        let center = self.center;

        let script = vec![
            HeadPosition::new(clamp_pan(config.shake_pan[0]), tilt),
            HeadPosition::new(clamp_pan(config.shake_pan[1]), tilt),
            center,
            HeadPosition::new(center.pan, clamp_tilt(config.shake_tilt[0])),
            HeadPosition::new(center.pan, clamp_tilt(config.shake_tilt[1])),
            center,
        ];

        self.current = center;
        script
    }
}

fn servo_range(min: i32, max: i32) -> (i32, i32) {
    let low = min.min(max).clamp(SERVO_MIN_DEG, SERVO_MAX_DEG);
    let high = min.max(max).clamp(SERVO_MIN_DEG, SERVO_MAX_DEG);
    (low, high)
}
