//! Triage Tier (C3)
//!
//! Deterministic, regex-driven fast path: critical patterns, blocked domains,
//! spam patterns, profanity, and duplicate-content detection via a bounded
//! recent-hash cache. Stateless per call except for that cache.

use std::collections::HashSet;
use std::time::Instant;

use lazy_static::lazy_static;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::collections::BoundedFifoSet;
use crate::domain::{Content, Severity, TriageResult, ViolationKind};

lazy_static! {
    static ref CRITICAL_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bbomb\s+threat\b").unwrap(),
        Regex::new(r"(?i)\bkill\s+(you|myself|them)\b").unwrap(),
        Regex::new(r"(?i)\bschool\s+shoot(ing|er)\b").unwrap(),
    ];
    static ref SPAM_PATTERNS: Vec<Regex> = vec![
        Regex::new(r"(?i)\bbuy\s+now\b").unwrap(),
        Regex::new(r"(?i)\bclick\s+here\b").unwrap(),
        Regex::new(r"(?i)\bfree\s+money\b").unwrap(),
        Regex::new(r"!{3,}").unwrap(),
    ];
    static ref SPAM_PHRASES: HashSet<&'static str> =
        ["act now", "limited time offer", "work from home"].into_iter().collect();
    static ref PROFANITY_WORDS: HashSet<&'static str> =
        ["damn", "hell", "crap", "idiot"].into_iter().collect();
    static ref URL_PATTERN: Regex = Regex::new(r"https?://[^\s]+").unwrap();
    static ref BLOCKED_DOMAINS: HashSet<&'static str> =
        ["bit.ly", "tinyurl.com", "spamlink.ru"].into_iter().collect();
}

pub struct TriageService {
    cache: Mutex<BoundedFifoSet>,
}

impl TriageService {
    pub fn new(duplicate_cache_capacity: usize) -> Self {
        Self { cache: Mutex::new(BoundedFifoSet::new(duplicate_cache_capacity)) }
    }

    pub fn check(&self, content: &Content) -> TriageResult {
        let start = Instant::now();
        let text = content.text_content.as_deref().unwrap_or("");

        let mut violations = Vec::new();
        let mut matched_patterns = Vec::new();
        let mut severity = Severity::None;
        let mut confidence = 0.0_f64;

        // 1. Critical patterns short-circuit everything else.
        if let Some(pattern) = CRITICAL_PATTERNS.iter().find(|p| p.is_match(text)) {
            violations.push(ViolationKind::Threat);
            matched_patterns.push(format!("critical:{}", pattern.as_str()));
            let result = TriageResult {
                should_block: true,
                violations,
                severity: Severity::Critical,
                confidence: 0.99,
                matched_patterns,
                processing_ms: elapsed_ms(start),
            };
            debug!(content_id = %content.content_id, "triage: critical pattern match, short-circuit");
            return result;
        }

        // 2. Blocked-domain scan.
        let urls: Vec<&str> = URL_PATTERN.find_iter(text).map(|m| m.as_str()).collect();
        if urls.iter().any(|url| BLOCKED_DOMAINS.iter().any(|d| url.contains(d))) {
            violations.push(ViolationKind::Spam);
            matched_patterns.push("blocked_domain".to_string());
            severity = severity.max(Severity::High);
            confidence = confidence.max(0.95);
        }

        // 3. Spam patterns / exact spam phrases.
        let lower = text.to_lowercase();
        let spam_pattern_hit = SPAM_PATTERNS.iter().any(|p| p.is_match(text));
        let spam_phrase_hit = SPAM_PHRASES.iter().any(|phrase| lower.contains(phrase));
        if spam_pattern_hit || spam_phrase_hit || urls.len() >= 2 {
            violations.push(ViolationKind::Spam);
            matched_patterns.push("spam_pattern".to_string());
            severity = severity.max(Severity::Medium);
            confidence = confidence.max(0.80);
        }

        // 4. Profanity.
        if lower.split_whitespace().any(|w| PROFANITY_WORDS.contains(w.trim_matches(|c: char| !c.is_alphanumeric()))) {
            violations.push(ViolationKind::Profanity);
            matched_patterns.push("profanity".to_string());
            severity = severity.max(Severity::Low);
            confidence = confidence.max(0.90);
        }

        // 5. Duplicate content.
        if !text.is_empty() {
            let hash = md5_hex(text);
            let duplicate = self.cache.lock().check_and_insert(hash);
            if duplicate {
                violations.push(ViolationKind::Spam);
                matched_patterns.push("duplicate_content".to_string());
                severity = severity.max(Severity::Low);
                confidence = confidence.max(0.85);
            }
        }

        violations.sort_by_key(|v| format!("{v:?}"));
        violations.dedup();

        let should_block = severity >= Severity::High || (severity >= Severity::Medium && confidence >= 0.9);

        TriageResult {
            should_block,
            violations,
            severity,
            confidence,
            matched_patterns,
            processing_ms: elapsed_ms(start),
        }
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn md5_hex(text: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::domain::ContentKind;

    fn content(text: &str) -> Content {
        Content {
            content_id: "c1".into(),
            user_id: "u1".into(),
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

    #[test]
    fn clean_text_passes_triage() {
        let svc = TriageService::new(1000);
        let result = svc.check(&content("Great game everyone!"));
        assert!(!result.should_block);
        assert_eq!(result.severity, Severity::None);
    }

    #[test]
    fn critical_pattern_blocks_regardless_of_anything_else() {
        let svc = TriageService::new(1000);
        let result = svc.check(&content("this is a bomb threat against the school"));
        assert!(result.should_block);
        assert_eq!(result.severity, Severity::Critical);
        assert!(result.violations.contains(&ViolationKind::Threat));
    }

    #[test]
    fn spam_phrases_and_links_block() {
        let svc = TriageService::new(1000);
        let result =
            svc.check(&content("BUY NOW!!! http://bit.ly/xyz http://bit.ly/abc"));
        assert!(result.should_block);
        assert!(result.violations.contains(&ViolationKind::Spam));
        assert!(result.severity >= Severity::Medium);
    }

    #[test]
    fn duplicate_detection_is_order_independent_within_capacity() {
        let svc = TriageService::new(1000);
        let first = svc.check(&content("a totally unique message body xyz123"));
        assert!(!first.violations.contains(&ViolationKind::Spam) || first.matched_patterns.iter().all(|p| p != "duplicate_content"));
        let second = svc.check(&content("a totally unique message body xyz123"));
        assert!(second.matched_patterns.iter().any(|p| p == "duplicate_content"));
    }

    #[test]
    fn lru_evicts_oldest_entry_beyond_capacity() {
        let svc = TriageService::new(2);
        svc.check(&content("message one unique"));
        svc.check(&content("message two unique"));
        svc.check(&content("message three unique"));
        // "message one" should have been evicted, so repeating it is not a duplicate.
        let result = svc.check(&content("message one unique"));
        assert!(!result.matched_patterns.iter().any(|p| p == "duplicate_content"));
    }
}
