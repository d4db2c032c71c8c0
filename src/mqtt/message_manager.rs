use chrono::{DateTime, Local};
use std::fmt;

use crate::instruction::Instruction;

/// Raw instruction message as delivered by the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionMessage {
    topic: String,
    payload: String,
    received_at: DateTime<Local>,
}

impl fmt::Display for InstructionMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} - {}: {}",
            self.received_at.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.topic,
            self.payload
        )
    }
}

impl InstructionMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Local::now(),
        }
    }

    /// Invalid UTF-8 is replaced, which can only decode as unrecognized
    pub fn from_publish(topic: &str, payload: &[u8]) -> Self {
        Self::new(topic, String::from_utf8_lossy(payload).into_owned())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Local> {
        self.received_at
    }

    pub fn instruction(&self) -> Instruction {
        Instruction::decode(&self.payload)
    }
}
