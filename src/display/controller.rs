use tokio::sync::watch;
use tracing::{debug, info};

use crate::instruction::Instruction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DisplayState {
    #[default]
    Idle,
    Active,
}

/// Result of applying an instruction to the display state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Idle -> Active, emission loop woken
    Started,
    /// Start while already Active
    AlreadyActive,
    /// Active -> Idle, emission loop suspended
    Stopped,
    /// Stop while Idle; nothing to stop
    CannotStop,
    /// Not a display instruction
    Ignored,
}

impl Transition {
    /// Text shown to the operator for this transition, if any
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Transition::Stopped => Some("Waiting for instructions..."),
            Transition::CannotStop => Some("Cannot stop. Start command has not been received."),
            Transition::Started | Transition::AlreadyActive | Transition::Ignored => None,
        }
    }
}

/// Sole writer of the display state
#[derive(Debug)]
pub struct DisplayController {
    state_tx: watch::Sender<DisplayState>,
}

impl Default for DisplayController {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayController {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(DisplayState::Idle);
        Self { state_tx }
    }

    pub fn state(&self) -> DisplayState {
        *self.state_tx.borrow()
    }

    /// Read-only view for the emission loop
    pub fn watch(&self) -> DisplayWatch {
        DisplayWatch {
            state_rx: self.state_tx.subscribe(),
        }
    }

    /// Applies a start/stop instruction. Exit belongs to the lifecycle
    /// coordinator and, like unrecognized payloads, is ignored here.
    pub fn handle(&self, instruction: Instruction) -> Transition {
        match instruction {
            Instruction::Start => {
                if self.set_active() {
                    info!("Display activated");
                    Transition::Started
                } else {
                    debug!("Start received while already active");
                    Transition::AlreadyActive
                }
            }
            Instruction::Stop => {
                if self.set_idle() {
                    info!("Display suspended");
                    Transition::Stopped
                } else {
                    info!("Stop rejected: display is not active");
                    Transition::CannotStop
                }
            }
            Instruction::Exit | Instruction::Unrecognized => Transition::Ignored,
        }
    }

    /// Suspends emission regardless of the current state.
    /// Returns whether the display was active.
    pub fn force_idle(&self) -> bool {
        self.set_idle()
    }

    fn set_active(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == DisplayState::Idle {
                *state = DisplayState::Active;
                true
            } else {
                false
            }
        })
    }

    fn set_idle(&self) -> bool {
        self.state_tx.send_if_modified(|state| {
            if *state == DisplayState::Active {
                *state = DisplayState::Idle;
                true
            } else {
                false
            }
        })
    }
}

/// Receiving side of the display state
#[derive(Debug, Clone)]
pub struct DisplayWatch {
    state_rx: watch::Receiver<DisplayState>,
}

impl DisplayWatch {
    /// Blocks while the display is Idle.
    /// Returns `false` once the controller is gone.
    pub async fn wait_while_idle(&mut self) -> bool {
        self.wait_for(DisplayState::Active).await
    }

    /// Resolves as soon as the display turns Idle.
    /// Returns `false` once the controller is gone.
    pub async fn wait_until_idle(&mut self) -> bool {
        self.wait_for(DisplayState::Idle).await
    }

    async fn wait_for(&mut self, wanted: DisplayState) -> bool {
        self.state_rx.wait_for(|state| *state == wanted).await.is_ok()
    }
}
