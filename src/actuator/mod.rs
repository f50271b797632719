//! Actuator Module
//!
//! Seam between the robot logic and the wheel/servo controller. Drivers
//! implement [`Actuator`]; [`connect`] picks one from configuration.

mod simulated;
mod traits;

pub use simulated::SimulatedActuator;
pub use traits::{Actuator, ActuatorError, ActuatorInitError};

use crate::config::{ActuatorConfig, ActuatorKind};
use std::sync::Arc;

/// Bring up the configured driver
pub fn connect(config: &ActuatorConfig) -> Result<Arc<dyn Actuator>, ActuatorInitError> {
    match config.kind {
        ActuatorKind::Simulated => Ok(Arc::new(SimulatedActuator::connect(config)?)),
    }
}
