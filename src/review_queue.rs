//! Review Queue Model (C6)
//!
//! The priority ladder and SLA deadline arithmetic used to construct a
//! `ReviewTask` on escalation. Construction itself happens in the
//! orchestrator (which knows the escalation reason); this module is the
//! pure arithmetic it calls into.

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::config::SlaDeadlines;
use crate::domain::{Content, Priority, ReviewTask, Severity};

const TEXT_PREVIEW_MAX_CODEPOINTS: usize = 500;

/// Reason a content was escalated, distinct from the decision itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationReason {
    LowMlConfidence,
    BorderlineBand,
    CombinedRiskAboveThreshold,
}

impl EscalationReason {
    pub fn describe(self) -> &'static str {
        match self {
            EscalationReason::LowMlConfidence => "ml confidence below 0.5",
            EscalationReason::BorderlineBand => "score within borderline band of a threshold",
            EscalationReason::CombinedRiskAboveThreshold => "combined risk score above 0.6",
        }
    }
}

pub fn sla_deadline(created_at: DateTime<Utc>, priority: Priority, table: &SlaDeadlines) -> DateTime<Utc> {
    created_at + ChronoDuration::minutes(table.minutes_for(priority))
}

pub fn text_preview(text: Option<&str>) -> String {
    match text {
        None => String::new(),
        Some(t) => t.chars().take(TEXT_PREVIEW_MAX_CODEPOINTS).collect(),
    }
}

pub fn build_review_task(
    content: &Content,
    severity: Severity,
    reason: EscalationReason,
    ml_confidence: Option<f64>,
    table: &SlaDeadlines,
) -> ReviewTask {
    let priority = Priority::from_severity(severity);
    let created_at = Utc::now();
    let mut image_refs = content.media_urls.clone();
    if let Some(img) = &content.image_url {
        image_refs.insert(0, img.clone());
    }

    ReviewTask {
        content_id: content.content_id.clone(),
        priority,
        created_at,
        sla_deadline: sla_deadline(created_at, priority, table),
        text_preview: text_preview(content.text_content.as_deref()),
        image_refs,
        escalation_reason: reason.describe().to_string(),
        ml_confidence_at_escalation: ml_confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ladder_matches_severity() {
        assert_eq!(Priority::from_severity(Severity::Critical), Priority::Critical);
        assert_eq!(Priority::from_severity(Severity::High), Priority::Urgent);
        assert_eq!(Priority::from_severity(Severity::Medium), Priority::High);
        assert_eq!(Priority::from_severity(Severity::Low), Priority::Medium);
        assert_eq!(Priority::from_severity(Severity::None), Priority::Low);
    }

    #[test]
    fn sla_deadline_adds_the_right_number_of_minutes() {
        let table = SlaDeadlines::default();
        let now = Utc::now();
        let deadline = sla_deadline(now, Priority::Critical, &table);
        assert_eq!((deadline - now).num_minutes(), 5);
        let deadline = sla_deadline(now, Priority::Low, &table);
        assert_eq!((deadline - now).num_minutes(), 1440);
    }

    #[test]
    fn text_preview_truncates_to_five_hundred_codepoints() {
        let long_text: String = std::iter::repeat('a').take(600).collect();
        let preview = text_preview(Some(&long_text));
        assert_eq!(preview.chars().count(), 500);
    }
}
