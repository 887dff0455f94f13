//! Deterministic rule-based judge
//!
//! Used when the oracle is disabled and whenever an oracle call fails after
//! retries. Uses the same signal categories as the candidate scorer, with two
//! hard tie-breakers: any exact email or exact normalized phone is a
//! duplicate at confidence 100 regardless of name.

use crate::normalize::{emails_equal, phones_equal};
use crate::scorer::score_pair;
use crate::types::{DuplicationVerdict, ExternalContact, InternalContact};

/// Heuristic score at or above which the rule-based judge calls a duplicate
pub const RULE_DUPLICATE_SCORE: u8 = 70;

#[derive(Debug, Clone, Default)]
pub struct RuleBasedJudge;

impl RuleBasedJudge {
    pub fn new() -> Self {
        Self
    }

    pub fn judge(&self, internal: &InternalContact, external: &ExternalContact) -> DuplicationVerdict {
        if let Some(email) = internal
            .emails
            .iter()
            .find(|a| external.emails.iter().any(|b| emails_equal(a, b)))
        {
            return DuplicationVerdict {
                confidence: 100,
                is_duplicate: true,
                reasoning: format!("Rule-based: exact email match ({})", email.trim().to_lowercase()),
            };
        }

        if internal
            .phones
            .iter()
            .any(|a| external.phones.iter().any(|b| phones_equal(a, b)))
        {
            return DuplicationVerdict {
                confidence: 100,
                is_duplicate: true,
                reasoning: "Rule-based: exact phone match".to_string(),
            };
        }

        let breakdown = score_pair(internal, external);
        let reasoning = if breakdown.signals.is_empty() {
            "Rule-based: no shared signals".to_string()
        } else {
            let described: Vec<&str> = breakdown.signals.iter().map(|s| s.describe()).collect();
            format!("Rule-based: {}", described.join(", "))
        };

        DuplicationVerdict {
            confidence: breakdown.score,
            is_duplicate: breakdown.score >= RULE_DUPLICATE_SCORE,
            reasoning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn internal(name: &str) -> InternalContact {
        InternalContact {
            id: "i".into(),
            owner_id: "o".into(),
            entity_type: "person".into(),
            name: name.into(),
            emails: vec![],
            phones: vec![],
            company: None,
            title: None,
            address: None,
            website: None,
            notes: String::new(),
            tags: Default::default(),
            relationship: None,
            importance: None,
            last_interaction: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_email_wins_over_name() {
        let mut int = internal("Alice Zhang");
        int.emails = vec!["shared@x.com".into()];
        let ext = ExternalContact {
            display_name: "Totally Different".into(),
            emails: vec!["other@y.com".into(), "SHARED@x.com".into()],
            ..Default::default()
        };

        let v = RuleBasedJudge::new().judge(&int, &ext);
        assert!(v.is_duplicate);
        assert_eq!(v.confidence, 100);
    }

    #[test]
    fn test_exact_phone_wins_over_name() {
        let mut int = internal("Alice Zhang");
        int.phones = vec!["(555) 123-4567".into()];
        let ext = ExternalContact {
            display_name: "Bob".into(),
            phones: vec!["555.123.4567".into()],
            ..Default::default()
        };

        let v = RuleBasedJudge::new().judge(&int, &ext);
        assert!(v.is_duplicate);
        assert_eq!(v.confidence, 100);
    }

    #[test]
    fn test_weak_signals_not_duplicate() {
        let int = internal("Jane Doe");
        let ext = ExternalContact {
            display_name: "Jane Smith".into(),
            ..Default::default()
        };

        let v = RuleBasedJudge::new().judge(&int, &ext);
        assert!(!v.is_duplicate);
        assert_eq!(v.confidence, 30);
        assert!(v.reasoning.contains("overlapping name tokens"));
    }

    #[test]
    fn test_strong_heuristics_are_duplicate() {
        let mut int = internal("Jane Doe");
        int.company = Some("Acme".into());
        int.emails = vec!["jane@acme.io".into()];
        let ext = ExternalContact {
            display_name: "Jane Doe".into(),
            organization: Some("acme".into()),
            emails: vec!["jdoe@acme.io".into()],
            ..Default::default()
        };

        let v = RuleBasedJudge::new().judge(&int, &ext);
        assert_eq!(v.confidence, 85);
        assert!(v.is_duplicate);
    }
}
