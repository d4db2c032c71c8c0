//! Display subsystem: instruction-driven emission of sensor readings
//!
//! Split in two so that instruction handling never waits on the emission
//! period:
//!
//! 1. [`controller`] - owns the Idle/Active state and applies start/stop
//! 2. [`emitter`] - background task that renders batches while Active
//!
//! # Architecture
//!
//! ```text
//! Instruction ──► DisplayController ──[watch]──► Emitter ──► BatchSink
//!                  (sole writer)                (reader)
//! ```
//!
//! The state lives in a `tokio::sync::watch` channel. A transition is a
//! single store into the channel, so the emitter either observes the state
//! before or after it, never a half-applied toggle.

pub mod controller;
pub mod emitter;

pub use controller::{DisplayController, DisplayState, DisplayWatch, Transition};
pub use emitter::{EmitterHandle, EmitterSettings};
