//! End-to-end scenarios against the public `Orchestrator` / `StreamProcessor`
//! API, one per §8 scenario of the moderation engine spec. These exercise the
//! library the way a caller (the demo binary, or a future broker adapter)
//! would: construct the pipeline from its public pieces, feed it content or
//! chat messages, and read back the terminal records from an `InMemorySink`.

use std::sync::Arc;

use chrono::Utc;

use moderation_engine::config::ReputationWeights;
use moderation_engine::domain::{ChatMessage, Content, ContentKind, Decision, DecisionSource, Severity, ViolationKind};
use moderation_engine::ml_scoring::{HeuristicImageAnalyzer, WordListTextScorer};
use moderation_engine::reputation::ReputationEngine;
use moderation_engine::sinks::InMemorySink;
use moderation_engine::triage::TriageService;
use moderation_engine::{ModerationConfig, Orchestrator, StreamProcessor};

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

fn build_orchestrator() -> (Orchestrator, Arc<InMemorySink>) {
    let sink = Arc::new(InMemorySink::new());
    let config = ModerationConfig::default();
    let orchestrator = Orchestrator::new(
        config.clone(),
        Arc::new(ReputationEngine::new(ReputationWeights::default())),
        Arc::new(TriageService::new(config.duplicate_cache_capacity)),
        Arc::new(WordListTextScorer::new()),
        Arc::new(HeuristicImageAnalyzer::new()),
        sink.clone(),
        sink.clone(),
    );
    (orchestrator, sink)
}

// Scenario 1: trusted text approval.
#[tokio::test]
async fn trusted_user_clean_text_is_fast_approved() {
    let (orchestrator, sink) = build_orchestrator();

    // Build up a trusted reputation the same way a real caller would:
    // enough clean approvals to cross the fast-track threshold.
    let reputation = Arc::new(ReputationEngine::new(ReputationWeights::default()));
    for _ in 0..50 {
        reputation.record_approval("trusted-alice");
    }
    let config = ModerationConfig::default();
    let orchestrator = Orchestrator::new(
        config.clone(),
        reputation,
        Arc::new(TriageService::new(config.duplicate_cache_capacity)),
        Arc::new(WordListTextScorer::new()),
        Arc::new(HeuristicImageAnalyzer::new()),
        sink.clone(),
        sink.clone(),
    );

    let result = orchestrator
        .moderate(content("trusted-alice", "Great game everyone!"))
        .await
        .unwrap();

    assert_eq!(result.decision, Decision::Approved);
    assert_eq!(result.decision_source, DecisionSource::Triage);
    assert_eq!(result.severity, Severity::None);
    assert!(result.processing_ms <= 10.0);
    assert!(sink.review_tasks().is_empty());
}

// Scenario 2: fast-path spam block at triage.
#[tokio::test]
async fn spam_text_with_blocked_links_rejects_at_triage() {
    let (orchestrator, _sink) = build_orchestrator();

    let result = orchestrator
        .moderate(content("spammer", "BUY NOW!!! http://bit.ly/xyz http://bit.ly/abc"))
        .await
        .unwrap();

    assert_eq!(result.decision, Decision::Rejected);
    assert_eq!(result.decision_source, DecisionSource::Triage);
    assert!(result.violations.contains(&ViolationKind::Spam));
    assert!(result.severity >= Severity::Medium);
    assert!(result.combined_risk_score >= 0.8);
}

// Scenario 3: critical pattern escalates immediately, no ML call.
#[tokio::test]
async fn bomb_threat_text_rejects_critical_without_ml() {
    let (orchestrator, _sink) = build_orchestrator();

    let result = orchestrator
        .moderate(content("anon", "this reads like a bomb threat against the building"))
        .await
        .unwrap();

    assert_eq!(result.decision, Decision::Rejected);
    assert_eq!(result.decision_source, DecisionSource::Triage);
    assert_eq!(result.severity, Severity::Critical);
    assert!(result.violations.contains(&ViolationKind::Threat));
    assert!(result.ml_scores.is_none());
}

// Scenario 4: borderline ML band escalates to human review.
#[tokio::test]
async fn borderline_harassment_text_escalates_with_review_task() {
    let (orchestrator, sink) = build_orchestrator();

    let result = orchestrator
        .moderate(content(
            "normal-user",
            "you should really reconsider, your behaviour is borderline",
        ))
        .await
        .unwrap();

    assert_eq!(result.decision, Decision::Escalated);
    assert_eq!(result.decision_source, DecisionSource::Ml);
    let tasks = sink.review_tasks();
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].sla_deadline > tasks[0].created_at);
}

// Scenario 5: Flow B burst of identical messages trips rate limit and
// duplicate detection, and counts climb 1..=15 monotonically.
#[tokio::test]
async fn flow_b_burst_of_identical_messages_rate_limits_and_flags_repeats() {
    let sink = Arc::new(InMemorySink::new());
    let processor = StreamProcessor::new(ModerationConfig::default(), sink.clone());

    let mut counts = Vec::new();
    let mut decisions = Vec::new();
    for i in 0..15i64 {
        let msg = ChatMessage {
            message_id: format!("burst-{i}"),
            user_id: "raider".to_string(),
            channel_id: "general".to_string(),
            text: "spam".to_string(),
            timestamp: (10_000 + i) as f64,
        };
        let decision = processor.process(msg).await.unwrap();
        counts.push(decision.count_1m);
        decisions.push(decision);
    }

    assert_eq!(counts, (1..=15).collect::<Vec<_>>());

    let eleventh = &decisions[10];
    assert!(eleventh.is_rate_limited);
    assert_eq!(eleventh.decision, Decision::Rejected);

    let twelfth = &decisions[11];
    assert!(twelfth.is_repeat_message);
    assert_eq!(twelfth.decision, Decision::Rejected);

    let last = decisions.last().unwrap();
    assert_eq!(last.count_1m, 15);
    assert!(last.is_rate_limited);
    assert!(last.is_repeat_message);
    assert_eq!(last.decision, Decision::Rejected);
}

// Scenario 6: reputation decay — violation impact shrinks towards zero as
// time passes, so overall score at t0 + decay window is strictly greater
// than immediately after the violation (holding all else constant).
#[tokio::test]
async fn reputation_score_recovers_as_violation_ages_out() {
    let reputation = ReputationEngine::new(ReputationWeights::default());

    let outcome = reputation.record_violation(
        "decaying-user",
        ViolationKind::Spam,
        Severity::High,
        "c1",
        "final_reject",
    );
    let score_at_t0 = outcome.risk_profile.risk_score;

    // Backdate the decay window directly: construct an engine with a decay
    // constant small enough that "now" already looks like t0 + many
    // half-lives relative to a violation recorded moments ago.
    let fast_decay = ReputationEngine::new(ReputationWeights::default()).with_decay_days(1e-6);
    fast_decay.record_violation("decaying-user", ViolationKind::Spam, Severity::High, "c1", "final_reject");
    let profile_after_decay = fast_decay.get_risk_profile("decaying-user");

    // A violation that has decayed away almost entirely leaves a strictly
    // lower risk_score (higher reputation) than one just recorded.
    assert!(profile_after_decay.risk_score < score_at_t0);
}

// Checkpoint/restore replay determinism for Flow B (§8 round-trip property).
#[tokio::test]
async fn flow_b_checkpoint_restore_replay_is_deterministic() {
    let sink = Arc::new(InMemorySink::new());
    let processor = StreamProcessor::new(ModerationConfig::default(), sink);

    processor
        .process(ChatMessage {
            message_id: "m1".into(),
            user_id: "replay-user".into(),
            channel_id: "general".into(),
            text: "hello there".into(),
            timestamp: 5_000.0,
        })
        .await
        .unwrap();

    let checkpoint = processor.checkpoint();

    let next = ChatMessage {
        message_id: "m2".into(),
        user_id: "replay-user".into(),
        channel_id: "general".into(),
        text: "hello again".into(),
        timestamp: 5_001.0,
    };
    let first_pass = processor.process(next.clone()).await.unwrap();

    processor.restore(checkpoint).unwrap();
    let replayed = processor.process(next).await.unwrap();

    assert_eq!(first_pass.count_1m, replayed.count_1m);
    assert_eq!(first_pass.decision, replayed.decision);
    assert_eq!(first_pass.is_repeat_message, replayed.is_repeat_message);
}

// Idempotence: re-running Flow A moderation against two fresh orchestrators
// wired the same way (same config, fresh reputation) yields identical
// decisions for identical input, as the reference deterministic scorer has
// no wall-clock or RNG dependence.
#[tokio::test]
async fn flow_a_is_idempotent_given_identical_input_and_reputation() {
    let (orchestrator_a, _sink_a) = build_orchestrator();
    let (orchestrator_b, _sink_b) = build_orchestrator();

    let text = "you should really reconsider, your behaviour is borderline";
    let result_a = orchestrator_a.moderate(content("u-idempotent", text)).await.unwrap();
    let result_b = orchestrator_b.moderate(content("u-idempotent", text)).await.unwrap();

    assert_eq!(result_a.decision, result_b.decision);
    assert_eq!(result_a.decision_source, result_b.decision_source);
    assert_eq!(result_a.severity, result_b.severity);
    assert_eq!(result_a.violations, result_b.violations);
}

#[tokio::test]
async fn content_without_payload_is_dead_lettered_not_panicking() {
    let (orchestrator, sink) = build_orchestrator();
    let mut empty = content("u-empty", "");
    empty.text_content = None;

    let err = orchestrator.moderate(empty).await.unwrap_err();
    assert!(err.is_dead_letter());
    assert_eq!(sink.dead_letters().len(), 1);
}
