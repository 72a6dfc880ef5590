//! Stream Processor (C7)
//!
//! Flow B's hot path: watermark tracking, window assignment (C8), keyed
//! state read/update (C9), feature computation, and the reject/approve
//! decision. No suspension points — every reference scorer here is a plain
//! function, matching the end-to-end 10 ms budget. Per-user ordering is the
//! caller's responsibility (§5): this processor assumes messages for a given
//! user arrive here already serialized.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use md5::{Digest, Md5};
use metrics::{counter, histogram};
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::config::{ChatThresholds, ModerationConfig};
use crate::domain::{ChannelState, ChatMessage, Decision, FlinkDecision, Severity, ViolationKind, WindowState};
use crate::error::ModerationError;
use crate::sinks::ResultSink;

use super::state_backend::StateBackend;
use super::windows::{session, sliding, tumbling, WindowBounds};

lazy_static! {
    static ref LINK_PATTERN: Regex = Regex::new(r"https?://[^\s]+").unwrap();
    static ref REPEATED_CHAR_RUN: Regex = Regex::new(r"(.)\1{4,}").unwrap();
    static ref TOXIC_WORDS: Vec<&'static str> =
        vec!["idiot", "hate you", "kys", "loser", "shut up"];
    static ref BLOCKLIST_PHRASES: Vec<&'static str> =
        vec!["free nitro", "dm me for", "check my profile for followers"];
}

/// Per-message feature vector computed from window state and text, before
/// the decision rule is applied.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ChatFeatures {
    spam_score: f64,
    toxicity_score: f64,
    is_duplicate_repeat: bool,
    is_rate_limited: bool,
    is_bursting: bool,
    blocklist_hit: bool,
    count_1m: u32,
    count_5m: u32,
}

fn caps_ratio(text: &str) -> f64 {
    let alpha: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if alpha.is_empty() {
        return 0.0;
    }
    let upper = alpha.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / alpha.len() as f64
}

fn spam_score(text: &str, thresholds: &ChatThresholds) -> f64 {
    let repeated = REPEATED_CHAR_RUN.is_match(text);
    let caps = caps_ratio(text) >= thresholds.caps_ratio_threshold;
    let links = LINK_PATTERN.find_iter(text).count() >= thresholds.link_count_threshold;
    let mut score = 0.0;
    if repeated {
        score += 0.3;
    }
    if caps {
        score += 0.3;
    }
    if links {
        score += 0.4;
    }
    score.clamp(0.0, 1.0)
}

fn toxicity_score(text: &str) -> f64 {
    let lower = text.to_lowercase();
    let hits = TOXIC_WORDS.iter().filter(|w| lower.contains(*w)).count();
    (hits as f64 * 0.25).min(1.0)
}

fn blocklist_hit(text: &str) -> bool {
    let lower = text.to_lowercase();
    BLOCKLIST_PHRASES.iter().any(|p| lower.contains(p))
}

fn md5_hex(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Stream processor owning keyed per-user and per-channel state. Construct
/// one per partition; the caller is responsible for routing messages with
/// the same `user_id` to the same processor instance (or serializing access
/// to a shared one) to preserve per-user ordering (§5).
pub struct StreamProcessor {
    config: ModerationConfig,
    user_state: StateBackend<WindowState>,
    channel_state: StateBackend<ChannelState>,
    watermark: Mutex<f64>,
    messages_seen: AtomicU64,
    sink: std::sync::Arc<dyn ResultSink>,
}

impl StreamProcessor {
    pub fn new(config: ModerationConfig, sink: std::sync::Arc<dyn ResultSink>) -> Self {
        Self {
            config,
            user_state: StateBackend::new("flow_b_user_window"),
            channel_state: StateBackend::new("flow_b_channel"),
            watermark: Mutex::new(f64::MIN),
            messages_seen: AtomicU64::new(0),
            sink,
        }
    }

    /// Current watermark: the latest event-time seen so far. Monotone by
    /// construction (`advance_watermark` never moves it backward).
    pub fn watermark(&self) -> f64 {
        *self.watermark.lock()
    }

    /// Advances the watermark and reports whether `event_time` is late
    /// relative to `allowed_lateness`. Late messages are still processed —
    /// dropping is a pluggable policy this reference implementation does not
    /// apply.
    fn advance_watermark(&self, event_time: f64) -> bool {
        let lateness = self.config.allowed_lateness.as_secs_f64();
        let mut watermark = self.watermark.lock();
        *watermark = watermark.max(event_time);
        event_time < *watermark - lateness
    }

    /// Runs the full Flow B pipeline for one message: window assignment,
    /// keyed state read, feature computation, decision, state write, and
    /// periodic sweep. Emits the resulting `FlinkDecision` to the sink.
    #[instrument(skip(self, msg), fields(message_id = %msg.message_id))]
    pub async fn process(&self, msg: ChatMessage) -> Result<FlinkDecision, ModerationError> {
        let start = std::time::Instant::now();
        counter!("moderation_chat_messages_total").increment(1);
        let late = self.advance_watermark(msg.timestamp);
        if late {
            debug!(message_id = %msg.message_id, "flow b: late message, processing anyway");
        }

        // Window assignment (C8). The tumbling/sliding/session bounds are
        // computed for downstream windowed aggregation; the 1m/5m counts fed
        // into the decision use the trailing-window definition below, which
        // is what the monotonicity invariant (§8) is stated against.
        let _tumbling_window: WindowBounds =
            tumbling(self.config.tumbling_window.as_secs() as i64, msg.timestamp as i64);
        let _sliding_windows: Vec<WindowBounds> = sliding(
            self.config.sliding_window.as_secs() as i64,
            self.config.sliding_slide.as_secs() as i64,
            msg.timestamp as i64,
        );

        let hash = md5_hex(&msg.text);
        let features = {
            let mut state = self.user_state.get(&msg.user_id).unwrap_or_default();
            let _session: WindowBounds = session(
                state
                    .recent_messages
                    .back()
                    .map(|(t, _)| WindowBounds { start: *t as i64, end: *t as i64 }),
                self.config.session_gap.as_secs() as i64,
                msg.timestamp as i64,
            );

            let cutoff_1m = msg.timestamp - 60.0;
            let cutoff_5m = msg.timestamp - 300.0;
            let count_1m = state.count_since(cutoff_1m) + 1;
            let count_5m = state.count_since(cutoff_5m) + 1;

            let is_duplicate = state.recent_hashes.contains(&hash);
            let is_duplicate_repeat =
                is_duplicate && state.recent_hashes.len() > self.config.chat_thresholds.duplicate_repeat_reject_above;

            let is_bursting = match state.last_message_at {
                Some(last) => {
                    let dt = msg.timestamp - last;
                    dt < self.config.chat_thresholds.burst_gap_secs
                        && state.velocity > self.config.chat_thresholds.burst_velocity
                }
                None => false,
            };

            let features = ChatFeatures {
                spam_score: spam_score(&msg.text, &self.config.chat_thresholds),
                toxicity_score: toxicity_score(&msg.text),
                is_duplicate_repeat,
                is_rate_limited: count_1m > self.config.rate_limit_count_1m,
                is_bursting,
                blocklist_hit: blocklist_hit(&msg.text),
                count_1m,
                count_5m,
            };

            self.update_user_state(&mut state, &msg, hash.clone());
            self.user_state
                .put(&msg.user_id, state)
                .map_err(|e| {
                    warn!(message_id = %msg.message_id, error = %e, "flow b: state write failed, message counted but not persisted");
                    e
                })
                .ok();

            features
        };

        let raid_suspected = self.update_channel_state(&msg);

        let decision_outcome = decide(&features);

        let processing_ms = start.elapsed().as_secs_f64() * 1000.0;
        histogram!("moderation_tier_processing_ms", "tier" => "stream_process").record(processing_ms);
        counter!("moderation_decision_total", "decision" => format!("{:?}", decision_outcome.decision))
            .increment(1);
        if processing_ms > 10.0 {
            warn!(message_id = %msg.message_id, processing_ms, "flow b: exceeded 10ms budget");
        }

        let result = FlinkDecision {
            message_id: msg.message_id,
            user_id: msg.user_id,
            channel_id: msg.channel_id,
            decision: decision_outcome.decision,
            severity: decision_outcome.severity,
            violations: decision_outcome.violations,
            spam_score: features.spam_score,
            toxicity_score: features.toxicity_score,
            processing_ms,
            count_1m: features.count_1m,
            count_5m: features.count_5m,
            is_rate_limited: features.is_rate_limited,
            is_repeat_message: features.is_duplicate_repeat,
            is_bursting: features.is_bursting,
            raid_suspected,
        };

        self.sink.emit_flink_decision(result.clone()).await;

        let seen = self.messages_seen.fetch_add(1, Ordering::Relaxed) + 1;
        if seen % self.config.state_sweep_every == 0 {
            self.sweep(msg.timestamp);
        }

        Ok(result)
    }

    fn update_user_state(&self, state: &mut WindowState, msg: &ChatMessage, hash: String) {
        let alpha = self.config.chat_thresholds.velocity_ema_alpha;
        if let Some(last) = state.last_message_at {
            let dt = (msg.timestamp - last).max(0.0);
            if dt > 0.0 {
                state.velocity = alpha * (1.0 / dt) + (1.0 - alpha) * state.velocity;
            }
        }
        state.last_message_at = Some(msg.timestamp);
        state.recent_messages.push_back((msg.timestamp, msg.text.clone()));
        state.recent_hashes.push_back(hash);
        while state.recent_hashes.len() > self.config.recent_hash_capacity {
            state.recent_hashes.pop_front();
        }
    }

    fn update_channel_state(&self, msg: &ChatMessage) -> bool {
        let Some(channel_id) = Some(msg.channel_id.clone()).filter(|c| !c.is_empty()) else {
            return false;
        };
        let mut state = self.channel_state.get(&channel_id).unwrap_or_default();
        let minute_bucket = (msg.timestamp / 60.0).floor() as i64;
        if minute_bucket != state.current_minute_bucket {
            state.baseline_rate = 0.3 * state.messages_this_minute as f64 + 0.7 * state.baseline_rate;
            state.messages_this_minute = 0;
            state.current_minute_bucket = minute_bucket;
            state.active_users = HashSet::new();
        }
        state.messages_this_minute += 1;
        state.active_users.insert(msg.user_id.clone());
        state.raid_suspected = state.messages_this_minute as f64
            > state.baseline_rate.max(1.0) * state.spike_threshold_multiplier;
        let raid = state.raid_suspected;
        self.channel_state.put(&channel_id, state).ok();
        raid
    }

    /// Background sweep: prunes window entries older than the retention
    /// window across all keyed users, and drops state for users idle longer
    /// than twice the retention window (checkpoint compaction of idle users,
    /// §3.2).
    fn sweep(&self, now: f64) {
        let retention = self.config.window_retention.as_secs_f64();
        let cutoff = now - retention;
        self.user_state.prune_all(|state| {
            while state.recent_messages.front().is_some_and(|(t, _)| *t < cutoff) {
                state.recent_messages.pop_front();
            }
        });
        self.user_state
            .retain(|_, state| state.last_message_at.is_some_and(|t| t >= now - retention * 2.0));
        debug!(live_users = self.user_state.len(), "flow b: background sweep complete");
    }

    /// Takes a logical checkpoint of both keyed state backends. Returns
    /// `(user_checkpoint_id, channel_checkpoint_id)`.
    pub fn checkpoint(&self) -> (u64, u64) {
        (self.user_state.checkpoint(), self.channel_state.checkpoint())
    }

    /// Restores both backends from a prior checkpoint pair, atomically per
    /// backend.
    pub fn restore(&self, ids: (u64, u64)) -> Result<(), ModerationError> {
        self.user_state.restore(ids.0)?;
        self.channel_state.restore(ids.1)?;
        Ok(())
    }
}

struct DecisionOutcome {
    decision: Decision,
    severity: Severity,
    violations: Vec<ViolationKind>,
}

/// The reject/approve rule from §4.5 step 5. Conditions accumulate severity
/// and violations rather than short-circuiting — several can co-occur on
/// the same message (e.g. rate-limited *and* a repeat message), and the
/// resulting decision is `Rejected` if any reject-triggering condition held.
fn decide(features: &ChatFeatures) -> DecisionOutcome {
    let mut severity = Severity::None;
    let mut violations = Vec::new();
    let mut reject = false;

    if features.spam_score > 0.7 {
        severity = severity.max(Severity::Medium);
        violations.push(ViolationKind::Spam);
        reject = true;
    }
    if features.toxicity_score > 0.8 {
        severity = severity.max(Severity::High);
        violations.push(ViolationKind::Harassment);
        reject = true;
    }
    if features.is_duplicate_repeat {
        severity = severity.max(Severity::Low);
        violations.push(ViolationKind::Spam);
        reject = true;
    }
    if features.blocklist_hit {
        severity = severity.max(Severity::Medium);
        violations.push(ViolationKind::Spam);
        reject = true;
    }
    if features.is_rate_limited {
        reject = true;
    }
    if features.is_bursting {
        severity = severity.max(Severity::Low);
    }

    violations.sort_by_key(|v| format!("{v:?}"));
    violations.dedup();

    DecisionOutcome {
        decision: if reject { Decision::Rejected } else { Decision::Approved },
        severity,
        violations,
    }
}
