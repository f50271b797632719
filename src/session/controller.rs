//! Robot session controller - serialises control samples and drives the actuator

use crate::actuator::{Actuator, ActuatorError};
use robot_shared::{
    CommandResolver, ControlSample, DriveCommand, DriveConfig, DriveMode, HeadConfig,
    HeadPosition, HeadPositionTracker, MotionState, SampleError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of handling one control sample
#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Sample applied; carries the wheel command that was resolved
    Applied { command: DriveCommand },
    /// Sample malformed; session state left untouched
    Rejected(SampleError),
    /// Client asked the robot to shut down; wheels are already stopped
    ShutdownRequested,
}

/// Mutable state owned by the command path
#[derive(Debug)]
pub struct SessionState {
    pub tracker: HeadPositionTracker,
    pub mode: DriveMode,
    /// Wheels are known to be stopped
    pub halted: bool,
    pub last_time_stamp: i64,
    pub controller_status: String,
}

impl SessionState {
    fn new(head: &HeadConfig) -> Self {
        Self {
            tracker: HeadPositionTracker::new(head),
            mode: DriveMode::Normal,
            halted: true,
            last_time_stamp: 0,
            controller_status: String::new(),
        }
    }
}

/// Applies control samples to the robot, one at a time
pub struct RobotSessionController {
    actuator: Arc<dyn Actuator>,
    resolver: CommandResolver,
    head_config: HeadConfig,
    state: Mutex<SessionState>,
}

impl RobotSessionController {
    pub fn new(actuator: Arc<dyn Actuator>, drive: DriveConfig, head: HeadConfig) -> Self {
        Self {
            actuator,
            resolver: CommandResolver::new(drive),
            state: Mutex::new(SessionState::new(&head)),
            head_config: head,
        }
    }

    /// Resolve and apply one sample.
    ///
    /// Wheel output is applied first, then the sample's motion state. Actuator
    /// failures are logged; the tracked head position keeps the intended value.
    pub async fn handle_sample(&self, sample: &ControlSample) -> SampleOutcome {
        let mut state = self.state.lock().await;

        let resolution = match self.resolver.resolve(sample) {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!("[SESSION] Rejected sample: {}", e);
                return SampleOutcome::Rejected(e);
            }
        };

        if sample.controller_status != state.controller_status {
            info!("[SESSION] Controller status: {}", sample.controller_status);
            state.controller_status = sample.controller_status.clone();
        }
        if sample.time_stamp < state.last_time_stamp {
            debug!(
                "[SESSION] Sample time went backwards: {} < {}",
                sample.time_stamp, state.last_time_stamp
            );
        }
        state.last_time_stamp = sample.time_stamp;
        state.mode = resolution.mode;

        let command = resolution.command;
        if command.is_stop() {
            self.halt(&mut state).await;
        } else {
            debug!(
                "[SESSION] {:?} {:?} left={} right={}",
                resolution.motion, resolution.mode, command.left_speed, command.right_speed
            );
            match self
                .actuator
                .set_wheel_speeds(command.left_speed, command.right_speed)
                .await
            {
                Ok(()) => state.halted = false,
                Err(e) => {
                    warn!("[SESSION] {}", e);
                    // Unknown wheel state; let the next stop go through
                    state.halted = false;
                }
            }
        }

        match sample.motion_state {
            MotionState::ArrowUp => {
                let target = state.tracker.step_tilt(1);
                self.move_head(target).await;
            }
            MotionState::ArrowDown => {
                let target = state.tracker.step_tilt(-1);
                self.move_head(target).await;
            }
            MotionState::ArrowRight => {
                let target = state.tracker.step_pan(1);
                self.move_head(target).await;
            }
            MotionState::ArrowLeft => {
                let target = state.tracker.step_pan(-1);
                self.move_head(target).await;
            }
            MotionState::Home => {
                info!("[SESSION] Centering head");
                let target = state.tracker.center();
                self.move_head(target).await;
            }
            MotionState::Escape => {
                info!("[SESSION] Shutdown requested by client");
                self.force_stop(&mut state).await;
                return SampleOutcome::ShutdownRequested;
            }
            MotionState::None => {}
        }

        SampleOutcome::Applied { command }
    }

    /// Stop the wheels from outside the command path (signals, shutdown)
    pub async fn emergency_stop(&self) {
        let mut state = self.state.lock().await;
        warn!("[SESSION] Emergency stop");
        self.force_stop(&mut state).await;
    }

    /// Run the liveness head shake; command samples wait until it finishes
    pub async fn shake(&self) {
        let mut state = self.state.lock().await;
        let script = state.tracker.shake_script(&self.head_config);
        debug!("[SESSION] Head shake ({} moves)", script.len());

        for position in script {
            if let Err(e) = self
                .actuator
                .set_head_angles(position.pan, position.tilt)
                .await
            {
                warn!("[SESSION] {}", e);
            }
            tokio::time::sleep(self.settle_time()).await;
        }
        self.log_failure(self.actuator.disable_head_actuators().await);
    }

    /// Point the head at its calibrated center and power the servos down
    pub async fn center_head(&self) -> HeadPosition {
        let mut state = self.state.lock().await;
        let target = state.tracker.center();
        self.move_head(target).await;
        target
    }

    /// Intended head position
    pub async fn head_position(&self) -> HeadPosition {
        self.state.lock().await.tracker.position()
    }

    /// Whether the wheels are known to be stopped
    pub async fn is_halted(&self) -> bool {
        self.state.lock().await.halted
    }

    /// Speed mode selected by the last applied sample
    pub async fn mode(&self) -> DriveMode {
        self.state.lock().await.mode
    }

    /// Stop unless already stopped
    async fn halt(&self, state: &mut SessionState) {
        if state.halted {
            return;
        }
        debug!("[SESSION] Halting");
        match self.actuator.stop().await {
            Ok(()) => state.halted = true,
            Err(e) => warn!("[SESSION] {}", e),
        }
    }

    /// Stop regardless of the tracked halt flag
    async fn force_stop(&self, state: &mut SessionState) {
        self.log_failure(self.actuator.stop().await);
        state.halted = true;
    }

    async fn move_head(&self, target: HeadPosition) {
        debug!("[SESSION] Head pan={} tilt={}", target.pan, target.tilt);
        self.log_failure(self.actuator.set_head_angles(target.pan, target.tilt).await);
        tokio::time::sleep(self.settle_time()).await;
        self.log_failure(self.actuator.disable_head_actuators().await);
    }

    fn settle_time(&self) -> Duration {
        Duration::from_millis(self.head_config.settle_ms)
    }

    fn log_failure(&self, result: Result<(), ActuatorError>) {
        if let Err(e) = result {
            warn!("[SESSION] {} ({})", e, self.actuator.name());
        }
    }
}
