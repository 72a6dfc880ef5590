//! Error taxonomy for the moderation engine.
//!
//! Each tier returns a typed error; the orchestrator maps those to a fall-back,
//! dead-letter, or best-effort-continue outcome. See the propagation rules in
//! the crate's design notes.

use thiserror::Error;

/// The four-way error taxonomy the engine surfaces to callers.
#[derive(Debug, Error)]
pub enum ModerationError {
    /// Malformed input record or missing required field.
    #[error("invalid input for content {content_id}: {reason}")]
    InputInvalid { content_id: String, reason: String },

    /// The text or image scorer failed or timed out.
    #[error("scorer unavailable for content {content_id}: {source}")]
    ScorerUnavailable {
        content_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The keyed state backend failed a read or write.
    #[error("state backend unavailable for key {key}: {reason}")]
    StateUnavailable { key: String, reason: String },

    /// An uncaught defect. Always fatal, always dead-lettered with context.
    #[error("internal error in {context}: {source}")]
    Internal {
        context: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ModerationError {
    /// Whether this error should route the content to the dead-letter sink.
    ///
    /// `ScorerUnavailable` is not dead-lettered: the orchestrator falls back to a
    /// triage-only result instead.
    pub fn is_dead_letter(&self) -> bool {
        matches!(
            self,
            ModerationError::InputInvalid { .. } | ModerationError::Internal { .. }
        )
    }

    pub fn content_id(&self) -> Option<&str> {
        match self {
            ModerationError::InputInvalid { content_id, .. } => Some(content_id),
            ModerationError::ScorerUnavailable { content_id, .. } => Some(content_id),
            _ => None,
        }
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scorer_unavailable_is_not_dead_lettered() {
        let err = ModerationError::ScorerUnavailable {
            content_id: "c1".into(),
            source: anyhow::anyhow!("timeout"),
        };
        assert!(!err.is_dead_letter());
    }

    #[test]
    fn input_invalid_is_dead_lettered() {
        let err = ModerationError::InputInvalid {
            content_id: "c1".into(),
            reason: "missing text and media".into(),
        };
        assert!(err.is_dead_letter());
    }
}
