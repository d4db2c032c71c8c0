//! Program lifecycle
//!
//! 1. [`prompt`] - blocking yes/no questions to the operator
//! 2. [`coordinator`] - instruction dispatch and the run state
//! 3. [`agent`] - typestate startup and shutdown sequence
//!
//! # Sequence
//!
//! ```text
//! Configured ──connect──► Connected ──start──► Running ──exit/interrupt──► Terminated
//!                                                │                          (channel
//!                                                └── instruction loop        closed once)
//! ```

pub mod agent;
pub mod coordinator;
pub mod prompt;

use tracing::info;

use crate::config::SensorMode;

pub use agent::SensorAgent;
pub use coordinator::{Acknowledgement, LifecycleCoordinator, RunState};
pub use prompt::{confirm, ConsolePrompt, Prompt, PromptError};

/// Resolves the sensor mode before anything connects.
///
/// Real hardware is not supported: the operator is offered the mock sensor
/// instead. `None` means the offer was declined and the program should end.
pub fn settle_sensor_mode(
    mode: SensorMode,
    prompt: &mut dyn Prompt,
) -> Result<Option<SensorMode>, PromptError> {
    if mode == SensorMode::Mockup {
        return Ok(Some(mode));
    }

    println!("Attention! The real sensor functioning is not implemented yet.");
    if prompt.confirm("Do you want to change to the mockup?")? {
        info!("Switched from real sensor to mockup");
        Ok(Some(SensorMode::Mockup))
    } else {
        info!("Mockup fallback declined");
        Ok(None)
    }
}
