//! Reputation Engine (C2)
//! Owns per-user reputation: score, decayed violation history, risk
//! classification, automatic sanctions, and rate-limit derivation.
//!
//! Guarded by a single `RwLock` over a sharded-by-entry `HashMap`, the same
//! shape as the rate-limit state map elsewhere in this codebase: reads are
//! cheap and frequent (one per content, to fetch a risk profile), writes are
//! infrequent (one per violation or approval).

use std::collections::HashMap;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::ReputationWeights;
use crate::domain::{RiskLevel, RiskProfile, Severity, UserReputation, ViolationKind, ViolationRecord};

const VIOLATION_DECAY_DAYS: f64 = 90.0;

/// Sanction automatically applied as a side effect of recording a violation.
#[derive(Debug, Clone, PartialEq)]
pub enum Sanction {
    None,
    /// Critical violation kinds (threat, CSAM) ban immediately.
    ImmediateBan,
    /// 30-day violation count >= 5.
    TemporaryBan { days: i64 },
    /// 30-day violation count >= 3.
    Mute { hours: i64 },
    /// 30-day violation count >= 2.
    RateLimitMultiplier(f64),
}

pub struct SanctionOutcome {
    pub sanction: Sanction,
    pub risk_profile: RiskProfile,
}

pub struct ReputationEngine {
    weights: ReputationWeights,
    decay_days: f64,
    users: RwLock<HashMap<String, UserReputation>>,
}

impl ReputationEngine {
    pub fn new(weights: ReputationWeights) -> Self {
        Self {
            weights,
            decay_days: VIOLATION_DECAY_DAYS,
            users: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_decay_days(mut self, decay_days: f64) -> Self {
        self.decay_days = decay_days;
        self
    }

    /// Pure read over current user state; creates a fresh reputation record
    /// (score 50, empty history) for users never seen before.
    pub fn get_risk_profile(&self, user_id: &str) -> RiskProfile {
        let mut users = self.users.write();
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserReputation::new(user_id, Utc::now()));
        risk_profile_for(user, self.weights, self.decay_days)
    }

    /// Appends a violation record, recomputes the score, and applies any
    /// automatic sanction. Returns the resulting risk profile.
    pub fn record_violation(
        &self,
        user_id: &str,
        kind: ViolationKind,
        severity: Severity,
        content_id: &str,
        action: &str,
    ) -> SanctionOutcome {
        let mut users = self.users.write();
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserReputation::new(user_id, Utc::now()));

        let now = Utc::now();
        user.violation_history.push(ViolationRecord {
            kind,
            severity: severity as u8,
            content_id: content_id.to_string(),
            timestamp: now,
            action_taken: action.to_string(),
        });
        user.last_violation_at = Some(now);
        user.violations_30d = count_recent(&user.violation_history, now, 30.0);

        let sanction = if kind.is_critical() {
            Sanction::ImmediateBan
        } else {
            match user.violations_30d {
                n if n >= 5 => Sanction::TemporaryBan { days: 30 },
                n if n >= 3 => Sanction::Mute { hours: 24 },
                n if n >= 2 => Sanction::RateLimitMultiplier(2.0),
                _ => Sanction::None,
            }
        };

        let risk_profile = risk_profile_for(user, self.weights, self.decay_days);
        info!(
            user_id,
            content_id,
            violation = ?kind,
            severity = severity as u8,
            violations_30d = user.violations_30d,
            sanction = ?sanction,
            "recorded violation"
        );

        SanctionOutcome { sanction, risk_profile }
    }

    /// Records a terminal rejection: bumps post/rejected counters once, then
    /// appends one violation record per distinct violation kind at the
    /// result's severity, per the final-decision recording rule.
    pub fn record_rejection(
        &self,
        user_id: &str,
        violations: &[ViolationKind],
        severity: Severity,
        content_id: &str,
        action: &str,
    ) -> RiskProfile {
        {
            let mut users = self.users.write();
            let user = users
                .entry(user_id.to_string())
                .or_insert_with(|| UserReputation::new(user_id, Utc::now()));
            user.posts += 1;
            user.rejected += 1;
        }
        let mut last = self.get_risk_profile(user_id);
        for kind in violations {
            last = self.record_violation(user_id, *kind, severity, content_id, action).risk_profile;
        }
        last
    }

    /// Increments post/approved counters. The score itself is not nudged
    /// directly here — `recompute_score` already reads the updated
    /// `approval_rate`, so a higher approval count raises the score through
    /// that component on the very next recomputation below; a separate
    /// additive nudge would just be overwritten by that recomputation.
    pub fn record_approval(&self, user_id: &str) -> RiskProfile {
        let mut users = self.users.write();
        let user = users
            .entry(user_id.to_string())
            .or_insert_with(|| UserReputation::new(user_id, Utc::now()));
        user.posts += 1;
        user.approved += 1;
        let profile = risk_profile_for(user, self.weights, self.decay_days);
        debug!(user_id, score = user.overall_score, "recorded approval");
        profile
    }
}

/// Violation impact: `min(100, sum(severity_i * 10 * exp(-days_i / decay)))`.
fn violation_impact(history: &[ViolationRecord], now: DateTime<Utc>, decay_days: f64) -> f64 {
    let total: f64 = history
        .iter()
        .map(|v| {
            let age_days = (now - v.timestamp).num_seconds() as f64 / 86_400.0;
            v.severity as f64 * 10.0 * (-age_days.max(0.0) / decay_days).exp()
        })
        .sum();
    total.min(100.0)
}

fn count_recent(history: &[ViolationRecord], now: DateTime<Utc>, window_days: f64) -> u64 {
    let cutoff = now - ChronoDuration::seconds((window_days * 86_400.0) as i64);
    history.iter().filter(|v| v.timestamp >= cutoff).count() as u64
}

/// Community standing: degraded by the pressure of recent (30-day) violation
/// count, independent of the severity-weighted decay in `violation_impact` —
/// this captures "how many recent incidents" rather than "how bad were they".
fn community_standing(violations_30d: u64) -> f64 {
    (100.0 - violations_30d as f64 * 15.0).max(0.0)
}

fn account_age_factor(account_created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let days = (now - account_created_at).num_seconds() as f64 / 86_400.0;
    (days.max(0.0) / 3.65).min(100.0)
}

fn recompute_score(user: &UserReputation, weights: ReputationWeights, decay_days: f64) -> f64 {
    // A user with no posts and no violations has no signal yet — the weighted
    // formula's components (approval-rate defaulting to 0.5, a brand-new
    // account's age factor near 0) do not actually agree on 50, so recomputing
    // them would silently move a fresh account off its documented starting
    // score (§3.1: "starts at 50"). Keep the seeded value until there's
    // something to recompute from.
    if user.posts == 0 && user.violation_history.is_empty() {
        return user.overall_score;
    }

    let now = Utc::now();
    let approval_component = user.approval_rate() * 100.0;
    let age_component = account_age_factor(user.account_created_at, now);
    let impact = violation_impact(&user.violation_history, now, decay_days);
    let violation_component = 100.0 - impact;
    let community_component = community_standing(user.violations_30d);

    let score = weights.approval_rate * approval_component
        + weights.account_age * age_component
        + weights.violation_impact * violation_component
        + weights.community_standing * community_component;
    score.clamp(0.0, 100.0)
}

fn classify_risk(score: f64, violations_30d: u64) -> RiskLevel {
    if score >= 80.0 && violations_30d == 0 {
        RiskLevel::Trusted
    } else if score >= 50.0 && violations_30d <= 1 {
        RiskLevel::Normal
    } else if score >= 30.0 || violations_30d <= 3 {
        RiskLevel::Watch
    } else if score >= 10.0 {
        RiskLevel::Restricted
    } else {
        RiskLevel::Banned
    }
}

fn risk_profile_for(
    user: &mut UserReputation,
    weights: ReputationWeights,
    decay_days: f64,
) -> RiskProfile {
    user.overall_score = recompute_score(user, weights, decay_days);
    let risk_level = classify_risk(user.overall_score, user.violations_30d);
    let limits = crate::config::ModerationConfig::default().rate_limit_for(risk_level);

    RiskProfile {
        risk_level,
        risk_score: 1.0 - user.overall_score / 100.0,
        fast_track_approved: risk_level == RiskLevel::Trusted,
        rate_limit_per_minute: limits.per_minute,
        rate_limit_per_hour: limits.per_hour,
        current_velocity: 0.0,
    }
}
