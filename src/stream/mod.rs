//! Flow B: the real-time chat stream processor and its supporting pieces.
//!
//! `windows` (C8) and `state_backend` (C9) are pure/low-level building
//! blocks; `processor` (C7) wires them together into the keyed, windowed
//! pipeline that turns a `ChatMessage` into a `FlinkDecision`.

pub mod processor;
pub mod state_backend;
pub mod windows;

pub use processor::StreamProcessor;
