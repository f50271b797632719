//! Control samples sent by the browser client
//!
//! The client posts a flat set of named fields on every joystick or keyboard
//! event. This module turns that field set into a typed [`ControlSample`]
//! once, at the boundary, so nothing downstream touches raw strings.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while building a sample from request fields
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Field {field} is not a number: {value:?}")]
    NotNumeric { field: &'static str, value: String },

    #[error("Field {field} is not finite: {value}")]
    NotFinite { field: &'static str, value: f64 },
}

/// Discrete keyboard/hat action carried alongside the analog axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Home,
    Escape,
    /// Anything else the client sends; ignored
    #[default]
    None,
}

impl MotionState {
    /// Map the client's key name onto a motion state
    pub fn parse(value: &str) -> Self {
        match value {
            "ArrowUp" => Self::ArrowUp,
            "ArrowDown" => Self::ArrowDown,
            "ArrowLeft" => Self::ArrowLeft,
            "ArrowRight" => Self::ArrowRight,
            "Home" => Self::Home,
            "Escape" => Self::Escape,
            _ => Self::None,
        }
    }
}

/// One control sample, valid for a single request
#[derive(Debug, Clone, PartialEq)]
pub struct ControlSample {
    pub controller_status: String,
    pub motion_state: MotionState,
    /// Joystick deflection, negative = left
    pub x_axis: f64,
    /// Joystick deflection, negative = forward
    pub y_axis: f64,
    pub head_x_axis: f64,
    pub head_y_axis: f64,
    /// Deflection magnitude in [0, 1]
    pub force: f64,
    /// Motion enable (`trigger_1`)
    pub trigger_primary: bool,
    /// Turbo speed select (`trigger_2`)
    pub trigger_turbo: bool,
    pub head_enable: bool,
    /// Client clock, milliseconds
    pub time_stamp: i64,
    /// Stick angle in degrees, only sent by angle-based clients
    pub angle_degrees: Option<f64>,
}

impl Default for ControlSample {
    fn default() -> Self {
        Self {
            controller_status: "Disconnected".into(),
            motion_state: MotionState::None,
            x_axis: 0.0,
            y_axis: 0.0,
            head_x_axis: 0.0,
            head_y_axis: 0.0,
            force: 0.0,
            trigger_primary: false,
            trigger_turbo: false,
            head_enable: false,
            time_stamp: 0,
            angle_degrees: None,
        }
    }
}

impl ControlSample {
    /// Build a sample from the request's named fields.
    ///
    /// Every documented field is required. Numbers are only checked for
    /// being parseable and finite here; range clamping is the resolver's job.
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, SampleError> {
        let fields = Fields(params);

        Ok(Self {
            controller_status: fields.text("controller_status")?.to_string(),
            motion_state: MotionState::parse(fields.text("motion_state")?),
            x_axis: fields.number("x_axis")?,
            y_axis: fields.number("y_axis")?,
            head_x_axis: fields.number("head_x_axis")?,
            head_y_axis: fields.number("head_y_axis")?,
            force: fields.number("force")?,
            trigger_primary: fields.flag("trigger_1")?,
            trigger_turbo: fields.flag("trigger_2")?,
            head_enable: fields.flag("head_enable")?,
            time_stamp: fields.integer("time_stamp")?,
            angle_degrees: fields.optional_number("angle_degrees")?,
        })
    }
}

struct Fields<'a>(&'a HashMap<String, String>);

impl Fields<'_> {
    fn text(&self, name: &'static str) -> Result<&str, SampleError> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .ok_or(SampleError::MissingField(name))
    }

    fn number(&self, name: &'static str) -> Result<f64, SampleError> {
        parse_number(name, self.text(name)?)
    }

    fn optional_number(&self, name: &'static str) -> Result<Option<f64>, SampleError> {
        match self.0.get(name) {
            Some(raw) if !raw.trim().is_empty() => parse_number(name, raw.trim()).map(Some),
            _ => Ok(None),
        }
    }

    /// Integers occasionally arrive with a fractional part; truncate those
    fn integer(&self, name: &'static str) -> Result<i64, SampleError> {
        let raw = self.text(name)?;
        match raw.parse::<i64>() {
            Ok(v) => Ok(v),
            Err(_) => parse_number(name, raw).map(|v| v.trunc() as i64),
        }
    }

    fn flag(&self, name: &'static str) -> Result<bool, SampleError> {
        Ok(self.integer(name)? != 0)
    }
}

fn parse_number(field: &'static str, raw: &str) -> Result<f64, SampleError> {
    let value = raw.parse::<f64>().map_err(|_| SampleError::NotNumeric {
        field,
        value: raw.to_string(),
    })?;

    if !value.is_finite() {
        return Err(SampleError::NotFinite { field, value });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joystick_params() -> HashMap<String, String> {
        [
            ("controller_status", "Connected"),
            ("motion_state", "None"),
            ("x_axis", "-0.4"),
            ("y_axis", "-0.6"),
            ("head_x_axis", "0"),
            ("head_y_axis", "0"),
            ("force", "0.6"),
            ("trigger_1", "1"),
            ("trigger_2", "0"),
            ("head_enable", "0"),
            ("time_stamp", "1700000000123"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_parse_complete_sample() {
        let sample = ControlSample::from_params(&joystick_params()).expect("valid sample");
        assert_eq!(sample.controller_status, "Connected");
        assert_eq!(sample.x_axis, -0.4);
        assert_eq!(sample.force, 0.6);
        assert!(sample.trigger_primary);
        assert!(!sample.trigger_turbo);
        assert_eq!(sample.time_stamp, 1_700_000_000_123);
        assert_eq!(sample.angle_degrees, None);
    }

    #[test]
    fn test_missing_field_is_rejected() {
        let mut params = joystick_params();
        params.remove("force");
        let result = ControlSample::from_params(&params);
        assert_eq!(result, Err(SampleError::MissingField("force")));
    }

    #[test]
    fn test_non_numeric_field_is_rejected() {
        let mut params = joystick_params();
        params.insert("y_axis".into(), "forward".into());
        let result = ControlSample::from_params(&params);
        assert!(matches!(
            result,
            Err(SampleError::NotNumeric { field: "y_axis", .. })
        ));
    }

    #[test]
    fn test_non_finite_field_is_rejected() {
        let mut params = joystick_params();
        params.insert("x_axis".into(), "NaN".into());
        assert!(matches!(
            ControlSample::from_params(&params),
            Err(SampleError::NotFinite { field: "x_axis", .. })
        ));
    }

    #[test]
    fn test_fractional_timestamp_is_truncated() {
        let mut params = joystick_params();
        params.insert("time_stamp".into(), "1234.9".into());
        let sample = ControlSample::from_params(&params).expect("valid sample");
        assert_eq!(sample.time_stamp, 1234);
    }

    #[test]
    fn test_unknown_motion_state_is_ignored() {
        let mut params = joystick_params();
        params.insert("motion_state".into(), "KeyQ".into());
        let sample = ControlSample::from_params(&params).expect("valid sample");
        assert_eq!(sample.motion_state, MotionState::None);

        assert_eq!(MotionState::parse("Home"), MotionState::Home);
        assert_eq!(MotionState::parse("Escape"), MotionState::Escape);
    }

    #[test]
    fn test_optional_angle() {
        let mut params = joystick_params();
        params.insert("angle_degrees".into(), "45".into());
        let sample = ControlSample::from_params(&params).expect("valid sample");
        assert_eq!(sample.angle_degrees, Some(45.0));
    }
}
