//! Drive Command Resolver
//!
//! Turns a noisy two-axis control sample into bounded differential wheel
//! speeds. The resolver holds configuration only; every call is a pure
//! function of the sample.

use crate::limits::{MAX_ROUNDING_DIGITS, SPEED_ROUNDING_DIGITS};
use crate::sample::{ControlSample, SampleError};
use serde::Deserialize;

/// Wheel speeds in angular degrees per second, negative = reverse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveCommand {
    pub left_speed: i32,
    pub right_speed: i32,
}

impl DriveCommand {
    pub const STOP: DriveCommand = DriveCommand {
        left_speed: 0,
        right_speed: 0,
    };

    pub fn new(left_speed: i32, right_speed: i32) -> Self {
        Self {
            left_speed,
            right_speed,
        }
    }

    pub fn is_stop(&self) -> bool {
        *self == Self::STOP
    }

    /// Swap the wheels
    pub fn mirrored(&self) -> Self {
        Self::new(self.right_speed, self.left_speed)
    }
}

/// Speed cap selected by the turbo trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriveMode {
    #[default]
    Normal,
    Turbo,
}

/// What the wheels should be doing after a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    Stop,
    Forward,
    Backward,
}

/// How wheel speeds are derived from a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverPolicy {
    /// Steer by x-axis deflection (joystick clients)
    #[default]
    AxisDeflection,
    /// Steer by stick angle sectors (virtual joystick clients sending `angle_degrees`)
    AngleSector,
}

/// Drive tuning
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Speed cap with only the primary trigger held
    pub normal_speed: i32,
    /// Speed cap with the turbo trigger held
    pub turbo_speed: i32,
    /// `|x|` below this is treated as exactly zero
    pub deadzone: f64,
    /// Multiplier applied to the speed cap when reversing
    pub reverse_factor: f64,
    /// Scale applied to the x-axis before the deadzone
    pub x_axis_sensitivity: f64,
    pub policy: ResolverPolicy,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            normal_speed: 150,
            turbo_speed: 300,
            deadzone: 0.20,
            reverse_factor: 0.50,
            x_axis_sensitivity: 1.0,
            policy: ResolverPolicy::AxisDeflection,
        }
    }
}

impl DriveConfig {
    /// Speed cap for a mode
    pub fn speed_for(&self, mode: DriveMode) -> i32 {
        match mode {
            DriveMode::Normal => self.normal_speed,
            DriveMode::Turbo => self.turbo_speed,
        }
    }
}

/// Outcome of resolving one sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolution {
    pub command: DriveCommand,
    pub motion: Motion,
    pub mode: DriveMode,
    /// Speed of the outside wheel, before the direction sign
    pub desired_speed: i32,
    /// Speed of the inside wheel, before the direction sign
    pub differential_speed: i32,
}

impl Resolution {
    fn stop(mode: DriveMode) -> Self {
        Self {
            command: DriveCommand::STOP,
            motion: Motion::Stop,
            mode,
            desired_speed: 0,
            differential_speed: 0,
        }
    }
}

/// Maps control samples onto drive commands
#[derive(Debug, Clone, Default)]
pub struct CommandResolver {
    config: DriveConfig,
}

impl CommandResolver {
    pub fn new(config: DriveConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Resolve a sample into wheel speeds.
    ///
    /// Out-of-range axes and force are clamped, never rejected. The only
    /// error is a sample lacking the input the configured policy steers by.
    pub fn resolve(&self, sample: &ControlSample) -> Result<Resolution, SampleError> {
        let mode = if sample.trigger_turbo {
            DriveMode::Turbo
        } else {
            DriveMode::Normal
        };

        match self.config.policy {
            ResolverPolicy::AxisDeflection => Ok(self.resolve_axes(sample, mode)),
            ResolverPolicy::AngleSector => {
                let angle = sample
                    .angle_degrees
                    .ok_or(SampleError::MissingField("angle_degrees"))?;
                Ok(self.resolve_angle(sample, angle, mode))
            }
        }
    }

    fn resolve_axes(&self, sample: &ControlSample, mode: DriveMode) -> Resolution {
        let mut x_axis = sample.x_axis * self.config.x_axis_sensitivity;
        if x_axis.abs() < self.config.deadzone {
            x_axis = 0.0;
        }
        let x_axis = x_axis.clamp(-1.0, 1.0);
        let y_axis = sample.y_axis.clamp(-1.0, 1.0);
        let force = sample.force.clamp(0.0, 1.0);

        if force == 0.0 || !sample.trigger_primary {
            return Resolution::stop(mode);
        }

        let mut speed = self.config.speed_for(mode) as f64;
        let motion = if y_axis < 0.0 {
            Motion::Forward
        } else if y_axis > 0.0 {
            speed *= self.config.reverse_factor;
            Motion::Backward
        } else {
            return Resolution::stop(mode);
        };

        let desired = desired_speed(speed, force);
        let differential = if x_axis == 0.0 {
            desired
        } else {
            differential_speed(desired, x_axis)
        };

        // The inside wheel of the turn runs at the differential speed
        let (left, right) = if x_axis < 0.0 {
            (differential, desired)
        } else {
            (desired, differential)
        };
        let sign = if motion == Motion::Backward { -1 } else { 1 };

        Resolution {
            command: DriveCommand::new(left * sign, right * sign),
            motion,
            mode,
            desired_speed: desired,
            differential_speed: differential,
        }
    }

    fn resolve_angle(&self, sample: &ControlSample, angle: f64, mode: DriveMode) -> Resolution {
        let force = sample.force.clamp(0.0, 1.0);
        if force == 0.0 || !sample.trigger_primary {
            return Resolution::stop(mode);
        }

        // Clients send fractional angles; sectors work on whole degrees
        let angle = angle.trunc().clamp(0.0, 360.0);
        let cap = self.config.speed_for(mode) as f64;
        let speed = (cap * force).min(cap);

        let (left, right, motion) = if (260.0..=280.0).contains(&angle) {
            let reverse = -speed * self.config.reverse_factor;
            (reverse, reverse, Motion::Backward)
        } else if angle > 90.0 && angle < 260.0 {
            let sign = if angle >= 180.0 { -1.0 } else { 1.0 };
            let left = speed * ((angle - 170.0) / 90.0).abs() * sign;
            (left, speed, Motion::Forward)
        } else if angle < 90.0 {
            (speed, speed * angle / 90.0, Motion::Forward)
        } else if angle > 280.0 {
            (speed, speed * ((angle - 280.0) / 80.0 - 1.0), Motion::Forward)
        } else {
            // Exactly 90 degrees is straight ahead
            (speed, speed, Motion::Forward)
        };

        let left = wheel_speed(left, cap);
        let right = wheel_speed(right, cap);
        let desired = left.abs().max(right.abs());

        Resolution {
            command: DriveCommand::new(left, right),
            motion,
            mode,
            desired_speed: desired,
            differential_speed: left.abs().min(right.abs()),
        }
    }
}

/// Fraction of the speed cap requested by the stick force
fn desired_speed(speed: f64, force: f64) -> i32 {
    round_away_from_zero(speed * force, SPEED_ROUNDING_DIGITS)
        .clamp(0.0, speed)
        .trunc() as i32
}

/// Reduced speed of the inside wheel while turning
fn differential_speed(desired: i32, x_axis: f64) -> i32 {
    let desired_f = desired as f64;
    let differential = round_away_from_zero(
        desired_f - (desired_f * x_axis).abs(),
        SPEED_ROUNDING_DIGITS,
    )
    .trunc() as i32;
    differential.clamp(0, desired)
}

fn wheel_speed(value: f64, cap: f64) -> i32 {
    round_away_from_zero(value, SPEED_ROUNDING_DIGITS)
        .clamp(-cap, cap)
        .trunc() as i32
}

/// Round half away from zero at `digits` decimal places.
///
/// `digits` is clamped to `0..=14`. The scaled value is widened by a few
/// ulps first so decimal halves that binary floating point stores just below
/// the midpoint (`2.345 * 100 == 234.49999999999997`) still round outward.
pub fn round_away_from_zero(x: f64, digits: i32) -> f64 {
    let digits = digits.clamp(0, MAX_ROUNDING_DIGITS);
    let exp = 10f64.powi(digits);
    let scaled = x * exp * (1.0 + 8.0 * f64::EPSILON);

    if scaled > 0.0 {
        (scaled + 0.5).trunc() / exp
    } else if scaled < 0.0 {
        (scaled - 0.5).trunc() / exp
    } else {
        0.0
    }
}
