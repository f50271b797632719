//! Runtime configuration
//!
//! Every section has working defaults; an optional TOML file overrides any
//! subset of fields.

use clap::Parser;
use robot_shared::limits::SERVO_MAX_DEG;
use robot_shared::mjpeg::{DEFAULT_BOUNDARY, DEFAULT_MAX_FRAME_SIZE};
use robot_shared::{DriveConfig, HeadConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Remote-controlled camera robot: wheel and head control plus live MJPEG video.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Skip the startup and shutdown head shake
    #[arg(long, default_value_t = false)]
    pub no_gesture: bool,
}

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub web: WebConfig,
    pub stream: StreamConfig,
    pub drive: DriveConfig,
    pub head: HeadConfig,
    pub capture: CaptureConfig,
    pub actuator: ActuatorConfig,
}

/// Command endpoint and static client files
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind: String,
    /// Directory holding the browser client
    pub static_dir: PathBuf,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".into(),
            static_dir: PathBuf::from("static"),
        }
    }
}

/// MJPEG viewer endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub bind: String,
    /// Request path serving the stream
    pub path: String,
    /// Multipart boundary token
    pub boundary: String,
    /// Longest a single write to a viewer may take before it is dropped
    pub write_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5002".into(),
            path: "/stream.mjpg".into(),
            boundary: DEFAULT_BOUNDARY.into(),
            write_timeout_ms: 5000,
        }
    }
}

impl StreamConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Camera process producing MJPEG on stdout
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub command: String,
    pub args: Vec<String>,
    pub max_frame_bytes: usize,
    pub read_chunk_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: "libcamera-vid".into(),
            args: [
                "--codec", "mjpeg", "--width", "800", "--height", "600", "--framerate", "30",
                "--timeout", "0", "--nopreview", "-o", "-",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            max_frame_bytes: DEFAULT_MAX_FRAME_SIZE,
            read_chunk_bytes: 64 * 1024,
        }
    }
}

/// Which wheel/servo driver to start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuatorKind {
    /// Logs every call instead of driving hardware
    #[default]
    Simulated,
}

/// Init fault a simulated driver reports, for bench-testing startup handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedFault {
    NotDetected,
    FirmwareMismatch,
    Unknown,
}

/// Runtime write failure a simulated driver reports on every call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulatedWriteFault {
    Wheels,
    Head,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub kind: ActuatorKind,
    /// Absolute wheel speed cap programmed at init, degrees per second
    pub max_speed: i32,
    pub simulated_fault: Option<SimulatedFault>,
    pub simulated_write_fault: Option<SimulatedWriteFault>,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        Self {
            kind: ActuatorKind::Simulated,
            max_speed: 300,
            simulated_fault: None,
            simulated_write_fault: None,
        }
    }
}

impl RobotConfig {
    /// Load from `path` if given, otherwise use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Reject values that would make the resolver or streams misbehave
    pub fn validate(&self) -> Result<(), ConfigError> {
        let drive = &self.drive;
        if drive.normal_speed < 0 || drive.turbo_speed < 0 {
            return Err(ConfigError::Invalid("drive speeds must not be negative".into()));
        }
        if !(0.0..1.0).contains(&drive.deadzone) {
            return Err(ConfigError::Invalid(format!(
                "drive.deadzone must be in [0, 1), got {}",
                drive.deadzone
            )));
        }
        if !(0.0..=1.0).contains(&drive.reverse_factor) {
            return Err(ConfigError::Invalid(format!(
                "drive.reverse_factor must be in [0, 1], got {}",
                drive.reverse_factor
            )));
        }
        if !drive.x_axis_sensitivity.is_finite() || drive.x_axis_sensitivity <= 0.0 {
            return Err(ConfigError::Invalid(
                "drive.x_axis_sensitivity must be positive".into(),
            ));
        }
        if !(1..=SERVO_MAX_DEG).contains(&self.head.step) {
            return Err(ConfigError::Invalid(format!(
                "head.step must be in [1, {}], got {}",
                SERVO_MAX_DEG, self.head.step
            )));
        }
        if self.stream.boundary.is_empty() || !self.stream.path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "stream.boundary must be set and stream.path must start with '/'".into(),
            ));
        }
        if self.capture.read_chunk_bytes == 0 || self.capture.max_frame_bytes == 0 {
            return Err(ConfigError::Invalid("capture buffer sizes must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_shared::ResolverPolicy;

    #[test]
    fn test_defaults_are_valid() {
        let config = RobotConfig::load(None).expect("defaults");
        assert_eq!(config.drive.normal_speed, 150);
        assert_eq!(config.drive.turbo_speed, 300);
        assert_eq!(config.head.step, 5);
        assert_eq!(config.stream.path, "/stream.mjpg");
        assert_eq!(config.stream.write_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let config = RobotConfig::from_toml(
            r#"
            [drive]
            deadzone = 0.1
            policy = "angle_sector"

            [head]
            pan_center = 88
            "#,
        )
        .expect("parse");

        assert_eq!(config.drive.deadzone, 0.1);
        assert_eq!(config.drive.policy, ResolverPolicy::AngleSector);
        assert_eq!(config.drive.reverse_factor, 0.5);
        assert_eq!(config.head.pan_center, 88);
        assert_eq!(config.head.tilt_center, 95);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut config = RobotConfig::default();
        config.drive.deadzone = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = RobotConfig::default();
        config.stream.path = "stream".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_head_step_must_fit_servo_travel() {
        let mut config = RobotConfig::default();
        config.head.step = i32::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.head.step = 0;
        assert!(config.validate().is_err());

        config.head.step = 180;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_simulated_write_fault_parses() {
        let config = RobotConfig::from_toml(
            r#"
            [actuator]
            simulated_write_fault = "head"
            "#,
        )
        .expect("parse");
        assert_eq!(
            config.actuator.simulated_write_fault,
            Some(SimulatedWriteFault::Head)
        );
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result = RobotConfig::load(Some(Path::new("/nonexistent/robot.toml")));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
