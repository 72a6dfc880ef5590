//! Output sinks (C12, remainder).
//!
//! The engine never owns persistence or broker plumbing (§1 Non-goals); it
//! only needs somewhere to hand terminal records and dead-lettered content.
//! `InMemorySink` is the reference implementation used by tests and the
//! bundled demo binary, shaped like the in-memory maps used for rate-limit
//! and auth-session state elsewhere in this codebase.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{FlinkDecision, ModerationResult, ReviewTask};

#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit_result(&self, result: ModerationResult);
    async fn emit_review_task(&self, task: ReviewTask);
    async fn emit_flink_decision(&self, decision: FlinkDecision);
}

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub content_id: String,
    pub reason: String,
}

#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn emit(&self, entry: DeadLetter);
}

/// In-memory sink: collects everything emitted to it behind a mutex, for
/// inspection by tests and the demo binary. Not meant for production use.
#[derive(Default)]
pub struct InMemorySink {
    results: Mutex<Vec<ModerationResult>>,
    review_tasks: Mutex<Vec<ReviewTask>>,
    flink_decisions: Mutex<Vec<FlinkDecision>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<ModerationResult> {
        self.results.lock().clone()
    }

    pub fn review_tasks(&self) -> Vec<ReviewTask> {
        self.review_tasks.lock().clone()
    }

    pub fn flink_decisions(&self) -> Vec<FlinkDecision> {
        self.flink_decisions.lock().clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().clone()
    }
}

#[async_trait]
impl ResultSink for InMemorySink {
    async fn emit_result(&self, result: ModerationResult) {
        self.results.lock().push(result);
    }

    async fn emit_review_task(&self, task: ReviewTask) {
        self.review_tasks.lock().push(task);
    }

    async fn emit_flink_decision(&self, decision: FlinkDecision) {
        self.flink_decisions.lock().push(decision);
    }
}

#[async_trait]
impl DeadLetterSink for InMemorySink {
    async fn emit(&self, entry: DeadLetter) {
        tracing::warn!(content_id = %entry.content_id, reason = %entry.reason, "dead-lettered content");
        self.dead_letters.lock().push(entry);
    }
}
