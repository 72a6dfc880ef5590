//! Orchestrator (C5)
//!
//! The tiered cascade: risk assessment → fast-approve gate → triage →
//! ML scoring → score combination → final decision → (optional) review task
//! construction and reputation recording. Modelled as a straight pipeline of
//! steps returning tagged variants, not nested callbacks.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use tracing::{info, instrument, warn};

use crate::config::ModerationConfig;
use crate::domain::{
    Content, Decision, DecisionSource, ModerationResult, Severity, ViolationKind,
};
use crate::error::ModerationError;
use crate::ml_scoring::{map_violations, ImageAnalyzer, TextScorer};
use crate::rate_tracker::BurstTracker;
use crate::reputation::ReputationEngine;
use crate::review_queue::{build_review_task, EscalationReason};
use crate::sinks::{DeadLetter, DeadLetterSink, ResultSink};
use crate::triage::TriageService;

pub struct Orchestrator {
    config: ModerationConfig,
    reputation: Arc<ReputationEngine>,
    triage: Arc<TriageService>,
    text_scorer: Arc<dyn TextScorer>,
    image_analyzer: Arc<dyn ImageAnalyzer>,
    burst_tracker: Arc<BurstTracker>,
    sink: Arc<dyn ResultSink>,
    dead_letter: Arc<dyn DeadLetterSink>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ModerationConfig,
        reputation: Arc<ReputationEngine>,
        triage: Arc<TriageService>,
        text_scorer: Arc<dyn TextScorer>,
        image_analyzer: Arc<dyn ImageAnalyzer>,
        sink: Arc<dyn ResultSink>,
        dead_letter: Arc<dyn DeadLetterSink>,
    ) -> Self {
        Self {
            config,
            reputation,
            triage,
            text_scorer,
            image_analyzer,
            burst_tracker: Arc::new(BurstTracker::default()),
            sink,
            dead_letter,
        }
    }

    /// Runs the full cascade for one content, emits the terminal result (and,
    /// on escalation, a review task) to the sink, and records the outcome
    /// against the user's reputation.
    #[instrument(skip(self, content), fields(content_id = %content.content_id))]
    pub async fn moderate(&self, content: Content) -> Result<ModerationResult, ModerationError> {
        let start = Instant::now();
        counter!("moderation_content_total").increment(1);

        if !content.has_payload() {
            let err = ModerationError::InputInvalid {
                content_id: content.content_id.clone(),
                reason: "content has neither text, image, nor media".to_string(),
            };
            counter!("moderation_content_dead_lettered_total").increment(1);
            self.dead_letter
                .emit(DeadLetter { content_id: content.content_id.clone(), reason: err.to_string() })
                .await;
            return Err(err);
        }

        // --- risk assessment ---
        let risk_profile = self.reputation.get_risk_profile(&content.user_id);
        let is_bursting = self.burst_tracker.record_and_check(&content.user_id);

        // --- fast-approve gate ---
        let no_media = content.image_url.is_none() && content.media_urls.is_empty();
        if risk_profile.fast_track_approved && no_media && !is_bursting {
            let result = ModerationResult {
                content_id: content.content_id.clone(),
                decision: Decision::Approved,
                decision_source: DecisionSource::Triage,
                severity: Severity::None,
                violations: vec![],
                ml_scores: None,
                combined_risk_score: risk_profile.risk_score,
                processing_ms: elapsed_ms(start),
                tier_reached: "fast_approve",
                notes: Some("fast-tracked: trusted user, text-only, not bursting".into()),
            };
            self.reputation.record_approval(&content.user_id);
            record_result_metrics(&result);
            self.sink.emit_result(result.clone()).await;
            info!(content_id = %content.content_id, "fast-approved");
            return Ok(result);
        }

        // --- triage ---
        let triage_result = self.triage.check(&content);
        if triage_result.should_block {
            let result = ModerationResult {
                content_id: content.content_id.clone(),
                decision: Decision::Rejected,
                decision_source: DecisionSource::Triage,
                severity: triage_result.severity,
                violations: triage_result.violations.clone(),
                ml_scores: None,
                combined_risk_score: triage_result.confidence,
                processing_ms: elapsed_ms(start),
                tier_reached: "triage",
                notes: Some(format!("blocked by triage: {:?}", triage_result.matched_patterns)),
            };
            self.reputation.record_rejection(
                &content.user_id,
                &result.violations,
                result.severity,
                &content.content_id,
                "triage_reject",
            );
            record_result_metrics(&result);
            self.sink.emit_result(result.clone()).await;
            warn!(content_id = %content.content_id, "rejected at triage");
            return Ok(result);
        }

        // --- ML scoring (may fall back on failure) ---
        let ml_scores = match self.score_text_and_image(&content).await {
            Ok(scores) => scores,
            Err(source) => {
                warn!(content_id = %content.content_id, error = %source, "scorer unavailable, falling back to triage-only");
                let result = ModerationResult {
                    content_id: content.content_id.clone(),
                    decision: Decision::Escalated,
                    decision_source: DecisionSource::Triage,
                    severity: triage_result.severity.min(Severity::Medium),
                    violations: triage_result.violations.clone(),
                    ml_scores: None,
                    combined_risk_score: risk_profile.risk_score,
                    processing_ms: elapsed_ms(start),
                    tier_reached: "ml_scoring_fallback",
                    notes: Some("ml scorer unavailable; needs human review".into()),
                };
                let task = build_review_task(
                    &content,
                    result.severity,
                    EscalationReason::LowMlConfidence,
                    None,
                    &self.config.sla_deadlines,
                );
                gauge!("moderation_review_queue_depth", "priority" => format!("{:?}", task.priority)).increment(1.0);
                record_result_metrics(&result);
                self.sink.emit_review_task(task).await;
                self.sink.emit_result(result.clone()).await;
                return Ok(result);
            }
        };

        let ml_mapping = map_violations(&ml_scores, &self.config.ml_thresholds);
        let severity = triage_result.severity.max(ml_mapping.severity);
        let mut violations: Vec<ViolationKind> =
            triage_result.violations.iter().chain(ml_mapping.violations.iter()).copied().collect();
        violations.sort_by_key(|v| format!("{v:?}"));
        violations.dedup();

        let combined = 0.3 * triage_result.confidence
            + 0.5 * (1.0 - ml_scores.confidence)
            + 0.2 * risk_profile.risk_score;
        let combined = combined.clamp(0.0, 1.0);

        // --- escalation check ---
        if ml_mapping.needs_human_review || combined > self.config.escalation_combined_threshold {
            let reason = if ml_mapping.needs_human_review && ml_scores.confidence < 0.5 {
                EscalationReason::LowMlConfidence
            } else if ml_mapping.needs_human_review {
                EscalationReason::BorderlineBand
            } else {
                EscalationReason::CombinedRiskAboveThreshold
            };
            let result = ModerationResult {
                content_id: content.content_id.clone(),
                decision: Decision::Escalated,
                decision_source: DecisionSource::Ml,
                severity,
                violations,
                ml_scores: Some(ml_scores.clone()),
                combined_risk_score: combined,
                processing_ms: elapsed_ms(start),
                tier_reached: "ml_scoring",
                notes: None,
            };
            let task = build_review_task(
                &content,
                severity,
                reason,
                Some(ml_scores.confidence),
                &self.config.sla_deadlines,
            );
            gauge!("moderation_review_queue_depth", "priority" => format!("{:?}", task.priority)).increment(1.0);
            record_result_metrics(&result);
            self.sink.emit_review_task(task).await;
            self.sink.emit_result(result.clone()).await;
            info!(content_id = %content.content_id, combined, "escalated");
            return Ok(result);
        }

        // --- final decision ---
        let decision = if severity == Severity::Critical {
            Decision::Rejected
        } else if severity == Severity::High && combined > self.config.rejection_combined_threshold {
            Decision::Rejected
        } else if severity == Severity::Medium {
            Decision::Quarantined
        } else {
            Decision::Approved
        };

        let result = ModerationResult {
            content_id: content.content_id.clone(),
            decision,
            decision_source: DecisionSource::Ml,
            severity,
            violations,
            ml_scores: Some(ml_scores),
            combined_risk_score: combined,
            processing_ms: elapsed_ms(start),
            tier_reached: "final_decision",
            notes: None,
        };

        match result.decision {
            Decision::Rejected => {
                self.reputation.record_rejection(
                    &content.user_id,
                    &result.violations,
                    result.severity,
                    &content.content_id,
                    "final_reject",
                );
            }
            Decision::Approved => {
                self.reputation.record_approval(&content.user_id);
            }
            Decision::Quarantined | Decision::Escalated | Decision::Pending => {
                // Outcome not yet known; reputation is untouched.
            }
        }

        record_result_metrics(&result);
        self.sink.emit_result(result.clone()).await;
        info!(content_id = %content.content_id, decision = ?result.decision, "final decision");
        Ok(result)
    }

    async fn score_text_and_image(
        &self,
        content: &Content,
    ) -> anyhow::Result<crate::domain::MlScores> {
        let mut scores = self
            .text_scorer
            .score(content.text_content.as_deref().unwrap_or(""))
            .await?;

        if let Some(image_ref) = &content.image_url {
            scores.image_analysis = Some(self.image_analyzer.analyze(image_ref).await?);
        }

        Ok(scores.clamp())
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Records the §6 observability surface for one terminal result: a
/// per-tier processing-time histogram and a decision counter. No exporter
/// is started here (out of scope); these are the same named metrics one
/// would scrape.
fn record_result_metrics(result: &ModerationResult) {
    histogram!("moderation_tier_processing_ms", "tier" => result.tier_reached)
        .record(result.processing_ms);
    counter!("moderation_decision_total", "decision" => format!("{:?}", result.decision))
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_scoring::{HeuristicImageAnalyzer, WordListTextScorer};
    use crate::sinks::InMemorySink;
    use chrono::Utc;
    use crate::domain::ContentKind;

    fn build_orchestrator() -> (Orchestrator, Arc<InMemorySink>) {
        let sink = Arc::new(InMemorySink::new());
        let orch = Orchestrator::new(
            ModerationConfig::default(),
            Arc::new(ReputationEngine::new(crate::config::ReputationWeights::default())),
            Arc::new(TriageService::new(1000)),
            Arc::new(WordListTextScorer::new()),
            Arc::new(HeuristicImageAnalyzer::new()),
            sink.clone(),
            sink.clone(),
        );
        (orch, sink)
    }

    fn content(user_id: &str, text: &str) -> Content {
        Content {
            content_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            content_kind: ContentKind::ForumPost,
            text_content: Some(text.to_string()),
            image_url: None,
            media_urls: vec![],
            created_at: Utc::now(),
            parent_id: None,
            channel_id: None,
            creator_metadata: None,
        }
    }

    #[tokio::test]
    async fn critical_pattern_rejects_without_ml_call() {
        let (orch, _sink) = build_orchestrator();
        let result = orch.moderate(content("u1", "this is a bomb threat")).await.unwrap();
        assert_eq!(result.decision, Decision::Rejected);
        assert_eq!(result.decision_source, DecisionSource::Triage);
        assert_eq!(result.severity, Severity::Critical);
        assert!(result.ml_scores.is_none());
    }

    #[tokio::test]
    async fn spam_block_rejects_at_triage() {
        let (orch, _sink) = build_orchestrator();
        let result = orch
            .moderate(content("u2", "BUY NOW!!! http://bit.ly/xyz http://bit.ly/abc"))
            .await
            .unwrap();
        assert_eq!(result.decision, Decision::Rejected);
        assert_eq!(result.decision_source, DecisionSource::Triage);
        assert!(result.violations.contains(&ViolationKind::Spam));
    }

    #[tokio::test]
    async fn content_without_any_payload_is_rejected_as_invalid() {
        let (orch, sink) = build_orchestrator();
        let mut c = content("u3", "");
        c.text_content = None;
        let err = orch.moderate(c).await.unwrap_err();
        assert!(err.is_dead_letter());
        assert_eq!(sink.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn clean_text_from_a_fresh_normal_user_is_not_fast_tracked_but_can_still_approve() {
        let (orch, _sink) = build_orchestrator();
        let result = orch.moderate(content("u4", "Great game everyone!")).await.unwrap();
        assert_ne!(result.decision, Decision::Rejected);
    }
}
