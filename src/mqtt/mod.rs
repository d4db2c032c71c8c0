//! # MQTT Instruction Channel
//!
//! Connects the agent to an MQTT broker and delivers the control
//! instructions published on the instruction topic.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker settings and config file loading
//! ├── message_manager.rs  - Received instruction messages
//! └── mqtt_handler.rs     - Connect, subscribe, event loop, close
//! ```
//!
//! ## Delivery
//!
//! The rumqttc event loop runs in its own task and forwards every publish
//! on the instruction topic, in arrival order, into an mpsc channel. The
//! lifecycle side only ever sees a [`ChannelLink`]: the receiving end of
//! that channel plus a [`ChannelHandle`] used to close the connection.
//!
//! ## Failure Reasons
//!
//! Connection attempts are bounded by a timeout and fail with a
//! [`ConnectionError`] that tells refused, timed out and other transport
//! failures apart, so the operator gets a distinct message for each.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub use config::MqttConfig;
pub use message_manager::InstructionMessage;
pub use mqtt_handler::{ChannelError, ConnectionError, ConnectionState, MqttChannel, MqttHandler};

/// Closable side of an established instruction channel
pub trait ChannelHandle: Send + 'static {
    /// Best-effort disconnect. Must be called at most once.
    fn close(&mut self) -> Result<(), ChannelError>;
}

/// Everything the lifecycle needs from an established connection
pub struct ChannelLink {
    pub(crate) handle: Box<dyn ChannelHandle>,
    pub(crate) instructions: mpsc::Receiver<InstructionMessage>,
    pub(crate) event_task: Option<JoinHandle<()>>,
}

impl ChannelLink {
    pub fn new(
        handle: Box<dyn ChannelHandle>,
        instructions: mpsc::Receiver<InstructionMessage>,
    ) -> Self {
        Self {
            handle,
            instructions,
            event_task: None,
        }
    }

    pub(crate) fn with_event_task(mut self, task: JoinHandle<()>) -> Self {
        self.event_task = Some(task);
        self
    }
}
