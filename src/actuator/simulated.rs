//! Simulated actuator that logs instead of driving hardware

use crate::actuator::traits::{Actuator, ActuatorError, ActuatorInitError};
use crate::config::{ActuatorConfig, SimulatedFault, SimulatedWriteFault};
use async_trait::async_trait;
use robot_shared::{DriveCommand, HeadPosition};
use std::sync::Mutex;
use tracing::{debug, info};

/// Last values written to the simulated hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SimulatedState {
    pub wheels: DriveCommand,
    pub head: Option<HeadPosition>,
    pub head_powered: bool,
}

/// Stand-in motor controller for development machines
pub struct SimulatedActuator {
    max_speed: i32,
    write_fault: Option<SimulatedWriteFault>,
    state: Mutex<SimulatedState>,
}

impl SimulatedActuator {
    /// Bring up the simulated controller, honouring any configured init fault
    pub fn connect(config: &ActuatorConfig) -> Result<Self, ActuatorInitError> {
        match config.simulated_fault {
            Some(SimulatedFault::NotDetected) => {
                return Err(ActuatorInitError::NotDetected("simulated".into()))
            }
            Some(SimulatedFault::FirmwareMismatch) => {
                return Err(ActuatorInitError::FirmwareMismatch("simulated".into()))
            }
            Some(SimulatedFault::Unknown) => {
                return Err(ActuatorInitError::Unknown("simulated".into()))
            }
            None => {}
        }

        if config.max_speed <= 0 {
            return Err(ActuatorInitError::Unknown(format!(
                "invalid wheel speed cap {}",
                config.max_speed
            )));
        }

        info!(
            "[ACTUATOR] Simulated controller ready (speed cap {} dps)",
            config.max_speed
        );
        Ok(Self {
            max_speed: config.max_speed,
            write_fault: config.simulated_write_fault,
            state: Mutex::new(SimulatedState::default()),
        })
    }

    /// Snapshot of the simulated hardware
    pub fn state(&self) -> SimulatedState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn check_wheels(&self) -> Result<(), ActuatorError> {
        match self.write_fault {
            Some(SimulatedWriteFault::Wheels) => {
                Err(ActuatorError::Wheels("simulated bus fault".into()))
            }
            _ => Ok(()),
        }
    }

    fn check_head(&self) -> Result<(), ActuatorError> {
        match self.write_fault {
            Some(SimulatedWriteFault::Head) => {
                Err(ActuatorError::Head("simulated bus fault".into()))
            }
            _ => Ok(()),
        }
    }

    fn update(&self, f: impl FnOnce(&mut SimulatedState)) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut state);
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    async fn set_wheel_speeds(&self, left: i32, right: i32) -> Result<(), ActuatorError> {
        self.check_wheels()?;
        // The controller silently caps anything above its programmed limit
        let left = left.clamp(-self.max_speed, self.max_speed);
        let right = right.clamp(-self.max_speed, self.max_speed);
        debug!("[ACTUATOR] wheels left={} right={}", left, right);
        self.update(|s| s.wheels = DriveCommand::new(left, right));
        Ok(())
    }

    async fn set_head_angles(&self, pan: i32, tilt: i32) -> Result<(), ActuatorError> {
        self.check_head()?;
        debug!("[ACTUATOR] head pan={} tilt={}", pan, tilt);
        self.update(|s| {
            s.head = Some(HeadPosition::new(pan, tilt));
            s.head_powered = true;
        });
        Ok(())
    }

    async fn stop(&self) -> Result<(), ActuatorError> {
        self.check_wheels()?;
        debug!("[ACTUATOR] stop");
        self.update(|s| s.wheels = DriveCommand::STOP);
        Ok(())
    }

    async fn disable_head_actuators(&self) -> Result<(), ActuatorError> {
        self.check_head()?;
        debug!("[ACTUATOR] head servos off");
        self.update(|s| s.head_powered = false);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
