//! Lifecycle coordinator
//!
//! Single entry point for every decoded instruction. Start and stop are
//! delegated to the [`DisplayController`]; exit is handled here because it
//! decides whether the process keeps running.
//!
//! # Exit handling
//!
//! ```text
//! exit ──► force Idle ──► ask operator ──┬─ y ──► Running (display stays Idle)
//!                                        └─ n ──► Terminating
//! ```
//!
//! The question blocks the instruction path until answered. Instructions
//! arriving meanwhile stay queued in delivery order; emission is already
//! suspended, so nothing else observable happens while the operator
//! decides.

use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::prompt::{Prompt, PromptError};
use crate::display::{DisplayController, DisplayState, DisplayWatch, Transition};
use crate::instruction::Instruction;

pub const CONTINUE_QUESTION: &str = "Do you want to continue using the program?";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Running,
    Terminating,
}

/// What handling one instruction produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Display(Transition),
    /// Exit declined by the operator
    ContinueRunning,
    /// Exit confirmed, or termination requested otherwise
    Terminating,
    Ignored,
}

impl Acknowledgement {
    /// Text shown to the operator, if any
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Acknowledgement::Display(transition) => transition.notice(),
            Acknowledgement::ContinueRunning => Some("Waiting for instructions..."),
            Acknowledgement::Terminating | Acknowledgement::Ignored => None,
        }
    }
}

/// Owner of the display controller and the run state
pub struct LifecycleCoordinator {
    display: DisplayController,
    run_state: RunState,
    prompt: Arc<Mutex<Box<dyn Prompt>>>,
}

impl LifecycleCoordinator {
    pub fn new(display: DisplayController, prompt: Box<dyn Prompt>) -> Self {
        Self {
            display,
            run_state: RunState::Running,
            prompt: Arc::new(Mutex::new(prompt)),
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn display_state(&self) -> DisplayState {
        self.display.state()
    }

    pub fn display_watch(&self) -> DisplayWatch {
        self.display.watch()
    }

    pub async fn handle(&mut self, instruction: Instruction) -> Acknowledgement {
        if self.run_state == RunState::Terminating {
            debug!("Terminating, ignoring {} instruction", instruction);
            return Acknowledgement::Ignored;
        }

        match instruction {
            Instruction::Start | Instruction::Stop => {
                info!("Received {} instruction", instruction);
                Acknowledgement::Display(self.display.handle(instruction))
            }
            Instruction::Exit => {
                info!("Received exit instruction");
                self.handle_exit().await
            }
            Instruction::Unrecognized => Acknowledgement::Ignored,
        }
    }

    /// Moves to Terminating without asking. Idempotent.
    pub fn terminate(&mut self) {
        self.display.force_idle();
        if self.run_state != RunState::Terminating {
            self.run_state = RunState::Terminating;
            info!("Run state: {:?}", self.run_state);
        }
    }

    async fn handle_exit(&mut self) -> Acknowledgement {
        if self.display.force_idle() {
            info!("Emission suspended by exit instruction");
        }

        match self.ask(CONTINUE_QUESTION).await {
            Ok(true) => {
                info!("Operator chose to continue");
                Acknowledgement::ContinueRunning
            }
            Ok(false) => {
                info!("Exit of the program confirmed");
                self.terminate();
                Acknowledgement::Terminating
            }
            Err(e) => {
                warn!("No answer to exit confirmation, terminating: {}", e);
                self.terminate();
                Acknowledgement::Terminating
            }
        }
    }

    /// Runs the blocking prompt off the async workers and waits for it
    async fn ask(&self, question: &'static str) -> Result<bool, PromptError> {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || {
            let mut prompt = prompt
                .lock()
                .map_err(|e| PromptError::Unavailable(e.to_string()))?;
            prompt.confirm(question)
        })
        .await
        .map_err(|e| PromptError::Unavailable(e.to_string()))?
    }
}
