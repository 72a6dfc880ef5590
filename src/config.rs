//! Configuration envelope.
//!
//! Every tunable named by the spec (triage thresholds, ML thresholds, the SLA
//! deadline table, the rate-limit table, the allowed-lateness window, and the
//! duplicate-cache capacity) lives here with a default matching the reference
//! values, and an `from_env()` constructor following the same
//! `env::var(...).unwrap_or_else(..).parse().unwrap_or(..)` idiom used
//! throughout this codebase's env-driven config.

use std::env;
use std::time::Duration;

use crate::domain::{Priority, RiskLevel};

/// Rate limits (per-minute, per-hour) for a given risk level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimit {
    pub per_minute: u32,
    pub per_hour: u32,
}

/// Top-level configuration envelope for the whole engine.
#[derive(Debug, Clone)]
pub struct ModerationConfig {
    // --- Reputation / C2 ---
    pub reputation_weights: ReputationWeights,
    pub violation_decay_days: f64,

    // --- Triage / C3 ---
    pub duplicate_cache_capacity: usize,

    // --- ML scoring / C4 ---
    pub ml_thresholds: MlThresholds,

    // --- Orchestrator / C5 ---
    pub escalation_combined_threshold: f64,
    pub rejection_combined_threshold: f64,

    // --- Review queue / C6 ---
    pub sla_deadlines: SlaDeadlines,

    // --- Stream processor / C7 ---
    pub allowed_lateness: Duration,
    pub tumbling_window: Duration,
    pub sliding_window: Duration,
    pub sliding_slide: Duration,
    pub session_gap: Duration,
    pub window_retention: Duration,
    pub recent_hash_capacity: usize,
    pub rate_limit_count_1m: u32,
    pub chat_thresholds: ChatThresholds,
    pub state_sweep_every: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            reputation_weights: ReputationWeights::default(),
            violation_decay_days: 90.0,
            duplicate_cache_capacity: 10_000,
            ml_thresholds: MlThresholds::default(),
            escalation_combined_threshold: 0.6,
            rejection_combined_threshold: 0.7,
            sla_deadlines: SlaDeadlines::default(),
            allowed_lateness: Duration::from_secs(10),
            tumbling_window: Duration::from_secs(60),
            sliding_window: Duration::from_secs(5 * 60),
            sliding_slide: Duration::from_secs(60),
            session_gap: Duration::from_secs(2 * 60),
            window_retention: Duration::from_secs(5 * 60),
            recent_hash_capacity: 100,
            rate_limit_count_1m: 10,
            chat_thresholds: ChatThresholds::default(),
            state_sweep_every: 100,
        }
    }
}

impl ModerationConfig {
    /// Load configuration from environment variables, falling back to the
    /// reference defaults for anything unset or unparseable. Reads `.env`
    /// first via `dotenv`, matching the rest of this codebase's entrypoints.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let defaults = Self::default();

        let env_f64 = |key: &str, default: f64| -> f64 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_usize = |key: &str, default: usize| -> usize {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_u32 = |key: &str, default: u32| -> u32 {
            env::var(key)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };
        let env_secs = |key: &str, default: Duration| -> Duration {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            violation_decay_days: env_f64(
                "MODERATION_VIOLATION_DECAY_DAYS",
                defaults.violation_decay_days,
            ),
            duplicate_cache_capacity: env_usize(
                "MODERATION_DUPLICATE_CACHE_CAPACITY",
                defaults.duplicate_cache_capacity,
            ),
            escalation_combined_threshold: env_f64(
                "MODERATION_ESCALATION_THRESHOLD",
                defaults.escalation_combined_threshold,
            ),
            rejection_combined_threshold: env_f64(
                "MODERATION_REJECTION_THRESHOLD",
                defaults.rejection_combined_threshold,
            ),
            allowed_lateness: env_secs("MODERATION_ALLOWED_LATENESS_SECS", defaults.allowed_lateness),
            tumbling_window: env_secs("MODERATION_TUMBLING_WINDOW_SECS", defaults.tumbling_window),
            sliding_window: env_secs("MODERATION_SLIDING_WINDOW_SECS", defaults.sliding_window),
            sliding_slide: env_secs("MODERATION_SLIDING_SLIDE_SECS", defaults.sliding_slide),
            session_gap: env_secs("MODERATION_SESSION_GAP_SECS", defaults.session_gap),
            window_retention: env_secs(
                "MODERATION_WINDOW_RETENTION_SECS",
                defaults.window_retention,
            ),
            recent_hash_capacity: env_usize(
                "MODERATION_RECENT_HASH_CAPACITY",
                defaults.recent_hash_capacity,
            ),
            rate_limit_count_1m: env_u32(
                "MODERATION_RATE_LIMIT_COUNT_1M",
                defaults.rate_limit_count_1m,
            ),
            state_sweep_every: env::var("MODERATION_STATE_SWEEP_EVERY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.state_sweep_every),
            ..defaults
        }
    }

    pub fn rate_limit_for(&self, risk: RiskLevel) -> RateLimit {
        match risk {
            RiskLevel::Trusted => RateLimit { per_minute: 20, per_hour: 200 },
            RiskLevel::Normal => RateLimit { per_minute: 10, per_hour: 100 },
            RiskLevel::Watch => RateLimit { per_minute: 5, per_hour: 50 },
            RiskLevel::Restricted => RateLimit { per_minute: 2, per_hour: 20 },
            RiskLevel::Banned => RateLimit { per_minute: 0, per_hour: 0 },
        }
    }
}

/// Weights for the reputation overall-score formula. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReputationWeights {
    pub approval_rate: f64,
    pub account_age: f64,
    pub violation_impact: f64,
    pub community_standing: f64,
}

impl Default for ReputationWeights {
    fn default() -> Self {
        Self {
            approval_rate: 0.3,
            account_age: 0.2,
            violation_impact: 0.3,
            community_standing: 0.2,
        }
    }
}

/// Thresholds that turn ML scores into violations (see the ML scoring tier).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MlThresholds {
    pub toxicity: f64,
    pub spam: f64,
    pub hate_speech: f64,
    pub harassment: f64,
    pub violence: f64,
    pub adult: f64,
    pub image_explicit_nudity: f64,
    pub image_violence: f64,
}

impl Default for MlThresholds {
    fn default() -> Self {
        Self {
            toxicity: 0.70,
            spam: 0.80,
            hate_speech: 0.60,
            harassment: 0.65,
            violence: 0.70,
            adult: 0.75,
            image_explicit_nudity: 0.70,
            image_violence: 0.70,
        }
    }
}

/// Thresholds and knobs driving the Flow B feature computation and decision
/// rule (§4.5). The word lists are intentionally tiny — the reference
/// implementation, like the ML tier's `WordListTextScorer`, is a deterministic
/// stand-in a real deployment would replace with a hosted classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatThresholds {
    pub spam_score_reject: f64,
    pub toxicity_score_reject: f64,
    pub duplicate_repeat_reject_above: usize,
    pub repeated_char_run: usize,
    pub caps_ratio_threshold: f64,
    pub link_count_threshold: usize,
    pub burst_gap_secs: f64,
    pub burst_velocity: f64,
    pub velocity_ema_alpha: f64,
}

impl Default for ChatThresholds {
    fn default() -> Self {
        Self {
            spam_score_reject: 0.7,
            toxicity_score_reject: 0.8,
            duplicate_repeat_reject_above: 3,
            repeated_char_run: 5,
            caps_ratio_threshold: 0.7,
            link_count_threshold: 3,
            burst_gap_secs: 0.5,
            burst_velocity: 2.0,
            velocity_ema_alpha: 0.3,
        }
    }
}

/// SLA deadline, in minutes, keyed by review-task priority.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaDeadlines {
    pub low_minutes: i64,
    pub medium_minutes: i64,
    pub high_minutes: i64,
    pub urgent_minutes: i64,
    pub critical_minutes: i64,
}

impl Default for SlaDeadlines {
    fn default() -> Self {
        Self {
            low_minutes: 1440,
            medium_minutes: 240,
            high_minutes: 60,
            urgent_minutes: 15,
            critical_minutes: 5,
        }
    }
}

impl SlaDeadlines {
    pub fn minutes_for(&self, priority: Priority) -> i64 {
        match priority {
            Priority::Low => self.low_minutes,
            Priority::Medium => self.medium_minutes,
            Priority::High => self.high_minutes,
            Priority::Urgent => self.urgent_minutes,
            Priority::Critical => self.critical_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_rate_limit_table() {
        let cfg = ModerationConfig::default();
        assert_eq!(cfg.rate_limit_for(RiskLevel::Trusted).per_minute, 20);
        assert_eq!(cfg.rate_limit_for(RiskLevel::Banned).per_hour, 0);
    }

    #[test]
    fn sla_deadlines_match_reference_table() {
        let cfg = ModerationConfig::default();
        assert_eq!(cfg.sla_deadlines.minutes_for(Priority::Critical), 5);
        assert_eq!(cfg.sla_deadlines.minutes_for(Priority::Low), 1440);
    }
}
