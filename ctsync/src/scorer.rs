//! Candidate Scorer
//!
//! Heuristic pre-filter over the unmatched partitions. Performs no external
//! calls; it exists only to bound how many pairs reach the oracle.

use crate::normalize::{email_domain, initials, name_tokens, normalize_name, phone_contains, text_eq};
use crate::types::{CandidatePair, ExternalContact, InternalContact};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Scores at or below this are discarded
pub const MIN_CANDIDATE_SCORE: u8 = 20;

/// Default cap on candidates retained per internal record
pub const DEFAULT_MAX_CANDIDATES: usize = 3;

/// One heuristic signal and its additive weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    ExactName,
    NameTokenOverlap,
    InitialsMatch,
    SharedEmailDomain,
    SameOrganization,
    PhoneContainment,
    SameTitle,
}

impl Signal {
    pub fn weight(self) -> u8 {
        match self {
            Self::ExactName => 50,
            Self::NameTokenOverlap => 30,
            Self::InitialsMatch => 20,
            Self::SharedEmailDomain => 20,
            Self::SameOrganization => 15,
            Self::PhoneContainment => 10,
            Self::SameTitle => 5,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::ExactName => "identical name",
            Self::NameTokenOverlap => "overlapping name tokens",
            Self::InitialsMatch => "matching initials",
            Self::SharedEmailDomain => "shared email domain",
            Self::SameOrganization => "same organization",
            Self::PhoneContainment => "overlapping phone number",
            Self::SameTitle => "same title",
        }
    }
}

/// Signals found for a pair and their capped total
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score: u8,
    pub signals: Vec<Signal>,
}

/// Score one pair with additive weighted signals, capped at 100
///
/// Exact name and partial token overlap are mutually exclusive; initials only
/// count when the names are not already identical.
pub fn score_pair(internal: &InternalContact, external: &ExternalContact) -> ScoreBreakdown {
    let mut signals = Vec::new();

    let exact_name = match (normalize_name(&internal.name), normalize_name(&external.display_name)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };

    if exact_name {
        signals.push(Signal::ExactName);
    } else {
        let internal_tokens: HashSet<String> = name_tokens(&internal.name).into_iter().collect();
        let overlap = name_tokens(&external.display_name)
            .iter()
            .any(|t| t.chars().count() > 1 && internal_tokens.contains(t));
        if overlap {
            signals.push(Signal::NameTokenOverlap);
        }

        if let (Some(a), Some(b)) = (initials(&internal.name), initials(&external.display_name)) {
            if a.chars().count() > 1 && a == b {
                signals.push(Signal::InitialsMatch);
            }
        }
    }

    let internal_domains: HashSet<String> =
        internal.emails.iter().filter_map(|e| email_domain(e)).collect();
    if external
        .emails
        .iter()
        .filter_map(|e| email_domain(e))
        .any(|d| internal_domains.contains(&d))
    {
        signals.push(Signal::SharedEmailDomain);
    }

    if text_eq(internal.company.as_deref(), external.organization.as_deref()) {
        signals.push(Signal::SameOrganization);
    }

    if internal
        .phones
        .iter()
        .any(|a| external.phones.iter().any(|b| phone_contains(a, b)))
    {
        signals.push(Signal::PhoneContainment);
    }

    if text_eq(internal.title.as_deref(), external.title.as_deref()) {
        signals.push(Signal::SameTitle);
    }

    let total: u32 = signals.iter().map(|s| s.weight() as u32).sum();
    ScoreBreakdown {
        score: total.min(100) as u8,
        signals,
    }
}

/// Ranked duplicate candidate generator
#[derive(Debug, Clone)]
pub struct CandidateScorer {
    max_candidates: usize,
}

impl CandidateScorer {
    pub fn new(max_candidates: usize) -> Self {
        Self {
            max_candidates: max_candidates.max(1),
        }
    }

    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Generate candidates, highest score first
    ///
    /// Per internal record: score every external record, keep scores above
    /// `MIN_CANDIDATE_SCORE`, retain the top `max_candidates`. Pairs are then
    /// deduplicated by (internal index, external index) keeping the higher score.
    pub fn generate(
        &self,
        unmatched_internal: &[InternalContact],
        unmatched_external: &[ExternalContact],
    ) -> Vec<CandidatePair> {
        let mut by_key: HashMap<(usize, usize), u8> = HashMap::new();

        for (i, int) in unmatched_internal.iter().enumerate() {
            let mut scored: Vec<(usize, u8)> = unmatched_external
                .iter()
                .enumerate()
                .map(|(e, ext)| (e, score_pair(int, ext).score))
                .filter(|(_, score)| *score > MIN_CANDIDATE_SCORE)
                .collect();

            // stable: ties keep external order
            scored.sort_by(|a, b| b.1.cmp(&a.1));
            scored.truncate(self.max_candidates);

            for (e, score) in scored {
                let entry = by_key.entry((i, e)).or_insert(score);
                if score > *entry {
                    *entry = score;
                }
            }
        }

        let mut candidates: Vec<CandidatePair> = by_key
            .into_iter()
            .map(|((i, e), score)| CandidatePair {
                internal_index: i,
                external_index: e,
                internal: unmatched_internal[i].clone(),
                external: unmatched_external[e].clone(),
                score,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.internal_index.cmp(&b.internal_index))
                .then(a.external_index.cmp(&b.external_index))
        });

        debug!(
            internal = unmatched_internal.len(),
            external = unmatched_external.len(),
            candidates = candidates.len(),
            "Candidate scoring complete"
        );

        candidates
    }
}

impl Default for CandidateScorer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CANDIDATES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn internal(name: &str) -> InternalContact {
        InternalContact {
            id: format!("id-{}", name),
            owner_id: "owner".into(),
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

    fn external(name: &str) -> ExternalContact {
        ExternalContact {
            display_name: name.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_exact_name_scores_50() {
        let b = score_pair(&internal("Jane Doe"), &external("jane  doe"));
        assert_eq!(b.signals, vec![Signal::ExactName]);
        assert_eq!(b.score, 50);
    }

    #[test]
    fn test_partial_name_plus_org() {
        let mut int = internal("Jane Doe");
        int.company = Some("Acme".into());
        let mut ext = external("Jane Smith");
        ext.organization = Some("ACME".into());

        let b = score_pair(&int, &ext);
        assert!(b.signals.contains(&Signal::NameTokenOverlap));
        assert!(b.signals.contains(&Signal::SameOrganization));
        assert!(!b.signals.contains(&Signal::InitialsMatch));
        assert_eq!(b.score, 45);
    }

    #[test]
    fn test_initials_and_domain() {
        let mut int = internal("Robert Smith");
        int.emails = vec!["rob@acme.io".into()];
        let mut ext = external("R. S.");
        ext.emails = vec!["bobby@acme.io".into()];

        let b = score_pair(&int, &ext);
        assert_eq!(b.signals, vec![Signal::InitialsMatch, Signal::SharedEmailDomain]);
        assert_eq!(b.score, 40);
    }

    #[test]
    fn test_score_capped_at_100() {
        let mut int = internal("Jane Doe");
        int.emails = vec!["j@acme.io".into()];
        int.phones = vec!["+1 555 123 4567".into()];
        int.company = Some("Acme".into());
        int.title = Some("CTO".into());
        let mut ext = external("Jane Doe");
        ext.emails = vec!["jane@acme.io".into()];
        ext.phones = vec!["555-123-4567".into()];
        ext.organization = Some("Acme".into());
        ext.title = Some("cto".into());

        assert_eq!(score_pair(&int, &ext).score, 100);
    }

    #[test]
    fn test_low_scores_dropped() {
        let mut int = internal("Alpha Person");
        int.title = Some("Engineer".into());
        let mut ext = external("Omega Human");
        ext.title = Some("Engineer".into());

        let candidates = CandidateScorer::default().generate(&[int], &[ext]);
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_top_n_per_internal_record() {
        let int = internal("Jane Doe");
        let externals: Vec<ExternalContact> = vec![
            external("Jane Doe"),
            external("Jane Smith"),
            external("Jane Roe"),
            external("Jane Poe"),
            external("Mark Twain"),
        ];

        let candidates = CandidateScorer::new(2).generate(&[int], &externals);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].external_index, 0);
        assert_eq!(candidates[0].score, 50);
        assert_eq!(candidates[1].score, 30);
    }

    #[test]
    fn test_sorted_descending_across_records() {
        let ints = vec![internal("Jane Doe"), internal("Mark Twain")];
        let exts = vec![external("Mark Twain"), external("Jane Smith")];

        let candidates = CandidateScorer::default().generate(&ints, &exts);
        let scores: Vec<u8> = candidates.iter().map(|c| c.score).collect();
        let mut sorted = scores.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(scores, sorted);
        assert_eq!(candidates[0].internal_index, 1);
        assert_eq!(candidates[0].external_index, 0);
    }
}
