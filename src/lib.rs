//! Moderation engine library.
//!
//! Exposes the tiered Flow A orchestrator and the windowed Flow B stream
//! processor, plus their shared domain types, configuration envelope, and
//! error taxonomy. Binaries (and the broker/REST/persistence adapters this
//! crate does not own) depend on this library rather than reimplementing
//! any of the moderation logic.

pub mod collections;
pub mod config;
pub mod domain;
pub mod error;
pub mod ml_scoring;
pub mod orchestrator;
pub mod rate_tracker;
pub mod reputation;
pub mod review_queue;
pub mod sinks;
pub mod stream;
pub mod triage;

pub use config::ModerationConfig;
pub use domain::{ChatMessage, Content, FlinkDecision, ModerationResult, ReviewTask};
pub use error::{ModerationError, ModerationResult as EngineResult};
pub use orchestrator::Orchestrator;
pub use stream::StreamProcessor;
