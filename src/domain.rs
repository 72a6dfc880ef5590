//! Domain types shared across the engine: enumerations, scoring records,
//! decision records, and window state. Nothing here owns behavior beyond
//! small, pure helpers (clamping, severity ordering); the tiers in
//! `reputation`, `triage`, `ml_scoring`, and `orchestrator` do the work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical severity ordering. Numeric, not lexical — `max` over a list of
/// violations must use this ordering, not the enum's declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    None = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl Severity {
    pub fn max(self, other: Severity) -> Severity {
        std::cmp::max(self, other)
    }
}

impl Default for Severity {
    fn default() -> Self {
        Severity::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    Threat,
    Csam,
    Spam,
    Profanity,
    HateSpeech,
    Harassment,
    Violence,
    Adult,
}

impl ViolationKind {
    /// Critical violation kinds trigger an immediate ban regardless of history.
    pub fn is_critical(self) -> bool {
        matches!(self, ViolationKind::Threat | ViolationKind::Csam)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Trusted,
    Normal,
    Watch,
    Restricted,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
    Escalated,
    Quarantined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    Triage,
    Ml,
    Human,
    Realtime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
    Critical,
}

impl Priority {
    pub fn from_severity(severity: Severity) -> Priority {
        match severity {
            Severity::Critical => Priority::Critical,
            Severity::High => Priority::Urgent,
            Severity::Medium => Priority::High,
            Severity::Low => Priority::Medium,
            Severity::None => Priority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    ForumPost,
    Image,
    Profile,
    LiveChat,
    Video,
    Audio,
}

/// Immutable input to Flow A.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub content_id: String,
    pub user_id: String,
    pub content_kind: ContentKind,
    pub text_content: Option<String>,
    pub image_url: Option<String>,
    pub media_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub parent_id: Option<String>,
    pub channel_id: Option<String>,
    pub creator_metadata: Option<serde_json::Value>,
}

impl Content {
    /// Invariant: at least one of text / image / media must be non-empty.
    pub fn has_payload(&self) -> bool {
        self.text_content.as_ref().is_some_and(|t| !t.trim().is_empty())
            || self.image_url.is_some()
            || !self.media_urls.is_empty()
    }
}

/// Immutable record of a single past violation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub kind: ViolationKind,
    pub severity: u8,
    pub content_id: String,
    pub timestamp: DateTime<Utc>,
    pub action_taken: String,
}

/// Mutable per-user reputation record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserReputation {
    pub user_id: String,
    pub overall_score: f64,
    pub posts: u64,
    pub approved: u64,
    pub rejected: u64,
    pub posts_last_hour: u64,
    pub posts_last_day: u64,
    pub posts_last_week: u64,
    pub violation_history: Vec<ViolationRecord>,
    pub violations_30d: u64,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub account_created_at: DateTime<Utc>,
}

impl UserReputation {
    pub fn new(user_id: impl Into<String>, account_created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            overall_score: 50.0,
            posts: 0,
            approved: 0,
            rejected: 0,
            posts_last_hour: 0,
            posts_last_day: 0,
            posts_last_week: 0,
            violation_history: Vec::new(),
            violations_30d: 0,
            last_violation_at: None,
            account_created_at,
        }
    }

    pub fn approval_rate(&self) -> f64 {
        if self.posts == 0 {
            0.5
        } else {
            self.approved as f64 / self.posts as f64
        }
    }
}

/// Derived (not persisted) view over a user's current reputation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskProfile {
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub fast_track_approved: bool,
    pub rate_limit_per_minute: u32,
    pub rate_limit_per_hour: u32,
    pub current_velocity: f64,
}

/// Result of the deterministic triage tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageResult {
    pub should_block: bool,
    pub violations: Vec<ViolationKind>,
    pub severity: Severity,
    pub confidence: f64,
    pub matched_patterns: Vec<String>,
    pub processing_ms: f64,
}

/// Image analysis produced by the (pluggable) image analyser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageAnalysis {
    pub label_probabilities: std::collections::HashMap<String, f64>,
    pub explicit_nudity: f64,
    pub violence: f64,
    pub weapons_detected: bool,
}

/// The nine-dimension output of the ML scoring tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlScores {
    pub toxicity: f64,
    pub spam: f64,
    pub hate_speech: f64,
    pub harassment: f64,
    pub violence: f64,
    pub adult: f64,
    pub sentiment: f64,
    pub confidence: f64,
    pub image_analysis: Option<ImageAnalysis>,
}

impl MlScores {
    /// Clamp every bounded field into its documented range. Simulated scorers
    /// must clamp rather than reject on numeric overflow.
    pub fn clamp(mut self) -> Self {
        self.toxicity = self.toxicity.clamp(0.0, 1.0);
        self.spam = self.spam.clamp(0.0, 1.0);
        self.hate_speech = self.hate_speech.clamp(0.0, 1.0);
        self.harassment = self.harassment.clamp(0.0, 1.0);
        self.violence = self.violence.clamp(0.0, 1.0);
        self.adult = self.adult.clamp(0.0, 1.0);
        self.sentiment = self.sentiment.clamp(-1.0, 1.0);
        self.confidence = self.confidence.clamp(0.0, 1.0);
        self
    }
}

/// Terminal Flow A record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationResult {
    pub content_id: String,
    pub decision: Decision,
    pub decision_source: DecisionSource,
    pub severity: Severity,
    pub violations: Vec<ViolationKind>,
    pub ml_scores: Option<MlScores>,
    pub combined_risk_score: f64,
    pub processing_ms: f64,
    pub tier_reached: &'static str,
    pub notes: Option<String>,
}

/// Escalation queue item produced by the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewTask {
    pub content_id: String,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub sla_deadline: DateTime<Utc>,
    pub text_preview: String,
    pub image_refs: Vec<String>,
    pub escalation_reason: String,
    pub ml_confidence_at_escalation: Option<f64>,
}

/// Terminal Flow B record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlinkDecision {
    pub message_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub decision: Decision,
    pub severity: Severity,
    pub violations: Vec<ViolationKind>,
    pub spam_score: f64,
    pub toxicity_score: f64,
    pub processing_ms: f64,
    pub count_1m: u32,
    pub count_5m: u32,
    pub is_rate_limited: bool,
    pub is_repeat_message: bool,
    pub is_bursting: bool,
    pub raid_suspected: bool,
}

/// Input message for Flow B, pre-parsed by the broker-facing adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub user_id: String,
    pub channel_id: String,
    pub text: String,
    /// Event-time timestamp, fractional epoch seconds, as carried by the
    /// upstream adapter. Sub-second precision matters here: burst detection
    /// keys off a <0.5s gap between consecutive messages.
    pub timestamp: f64,
}

/// Per-user state owned exclusively by the stream processor. Created on
/// first message, pruned by the background sweep, destroyed on checkpoint
/// compaction of idle users.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowState {
    /// (event-time, text) pairs bounded by a 5-minute retention window.
    pub recent_messages: std::collections::VecDeque<(f64, String)>,
    /// Last 100 message hashes, FIFO, for duplicate detection.
    pub recent_hashes: std::collections::VecDeque<String>,
    pub last_message_at: Option<f64>,
    /// Exponentially-smoothed velocity, messages/sec.
    pub velocity: f64,
    pub violation_count: u32,
}

impl WindowState {
    pub fn count_since(&self, cutoff: f64) -> u32 {
        self.recent_messages.iter().filter(|(t, _)| *t >= cutoff).count() as u32
    }
}

/// Per-channel aggregate state: used to flag raids / coordinated spam waves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    pub active_users: std::collections::HashSet<String>,
    /// Messages observed in the current one-minute bucket.
    pub messages_this_minute: u32,
    pub current_minute_bucket: i64,
    pub baseline_rate: f64,
    pub spike_threshold_multiplier: f64,
    pub raid_suspected: bool,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            active_users: std::collections::HashSet::new(),
            messages_this_minute: 0,
            current_minute_bucket: 0,
            baseline_rate: 1.0,
            spike_threshold_multiplier: 4.0,
            raid_suspected: false,
        }
    }
}
