//! Matcher
//!
//! Tiered identity pairing between the internal and external record sets.
//! Four sequential, claim-exclusive passes run strongest signal first:
//!
//! | Pass       | Signal                                   | Confidence |
//! |------------|------------------------------------------|------------|
//! | Identifier | embedded internal id (field, else marker)| 100        |
//! | Email      | first external email, case-insensitive   | 95         |
//! | Phone      | normalized digits                        | 90         |
//! | Name       | full name, case/whitespace-insensitive   | 70         |
//!
//! A record claimed by an earlier pass is invisible to later passes, so a
//! coincidental name collision can never pre-empt a stronger signal.

use crate::normalize::{normalize_email, normalize_name, normalize_phone};
use crate::types::{ExternalContact, InternalContact, MatchPair, MatchType};
use std::collections::HashMap;
use tracing::debug;

/// Opening of the free-text identifier marker, e.g. `[memory-id:abc-123]`
pub const ID_MARKER_PREFIX: &str = "[memory-id:";
const ID_MARKER_SUFFIX: char = ']';

/// Render the free-text marker for an internal identifier
pub fn id_marker(id: &str) -> String {
    format!("{}{}{}", ID_MARKER_PREFIX, id, ID_MARKER_SUFFIX)
}

/// Look up the internal identifier embedded in an external record
///
/// Checks the dedicated field first, then parses the first well-formed marker
/// in the note. Absence yields `None`.
pub fn extract_internal_id(external: &ExternalContact) -> Option<String> {
    if let Some(id) = external.internal_id.as_deref().map(str::trim) {
        if !id.is_empty() {
            return Some(id.to_string());
        }
    }
    parse_id_marker(&external.note)
}

/// Parse the first `[memory-id:...]` marker in free text
pub fn parse_id_marker(text: &str) -> Option<String> {
    let start = text.find(ID_MARKER_PREFIX)? + ID_MARKER_PREFIX.len();
    let rest = &text[start..];
    let end = rest.find(ID_MARKER_SUFFIX)?;
    let id = rest[..end].trim();
    if id.is_empty() || id.contains(char::is_whitespace) {
        None
    } else {
        Some(id.to_string())
    }
}

/// Remove every identifier marker from free text
pub fn strip_id_markers(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find(ID_MARKER_PREFIX) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos..];
        match after.find(ID_MARKER_SUFFIX) {
            Some(end) => rest = &after[end + 1..],
            None => {
                rest = after;
                break;
            }
        }
    }
    out.push_str(rest);
    out.trim().to_string()
}

/// Matcher output: pairs plus the two unmatched partitions
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matched: Vec<MatchPair>,
    pub unmatched_internal: Vec<InternalContact>,
    pub unmatched_external: Vec<ExternalContact>,
}

impl MatchOutcome {
    pub fn count_by_type(&self, match_type: MatchType) -> usize {
        self.matched.iter().filter(|p| p.match_type == match_type).count()
    }
}

/// Tiered claim-exclusive matcher
#[derive(Debug, Default)]
pub struct Matcher;

impl Matcher {
    pub fn new() -> Self {
        Self
    }

    /// Partition both record sets into matched pairs and unmatched remainders
    pub fn match_contacts(
        &self,
        internal: Vec<InternalContact>,
        external: Vec<ExternalContact>,
    ) -> MatchOutcome {
        let mut state = ClaimState::new(internal.len(), external.len());

        state.run_pass(
            &internal,
            &external,
            MatchType::Identifier,
            |c| vec![c.id.trim().to_string()],
            |e| extract_internal_id(e).into_iter().collect(),
        );
        state.run_pass(
            &internal,
            &external,
            MatchType::Email,
            |c| c.primary_email().and_then(normalize_email).into_iter().collect(),
            |e| e.primary_email().and_then(normalize_email).into_iter().collect(),
        );
        state.run_pass(
            &internal,
            &external,
            MatchType::Phone,
            |c| c.phones.iter().filter_map(|p| normalize_phone(p)).collect(),
            |e| e.phones.iter().filter_map(|p| normalize_phone(p)).collect(),
        );
        state.run_pass(
            &internal,
            &external,
            MatchType::Name,
            |c| normalize_name(&c.name).into_iter().collect(),
            |e| normalize_name(&e.display_name).into_iter().collect(),
        );

        let ClaimState {
            internal_claimed,
            external_claimed,
            pairs,
        } = state;

        let mut internal_slots: Vec<Option<InternalContact>> = internal.into_iter().map(Some).collect();
        let mut external_slots: Vec<Option<ExternalContact>> = external.into_iter().map(Some).collect();

        let mut matched = Vec::with_capacity(pairs.len());
        for (i, e, match_type) in pairs {
            if let (Some(int), Some(ext)) = (internal_slots[i].take(), external_slots[e].take()) {
                matched.push(MatchPair::new(int, ext, match_type));
            }
        }

        let unmatched_internal: Vec<InternalContact> = internal_slots
            .into_iter()
            .zip(internal_claimed)
            .filter_map(|(slot, claimed)| if claimed { None } else { slot })
            .collect();
        let unmatched_external: Vec<ExternalContact> = external_slots
            .into_iter()
            .zip(external_claimed)
            .filter_map(|(slot, claimed)| if claimed { None } else { slot })
            .collect();

        debug!(
            matched = matched.len(),
            unmatched_internal = unmatched_internal.len(),
            unmatched_external = unmatched_external.len(),
            "Matching complete"
        );

        MatchOutcome {
            matched,
            unmatched_internal,
            unmatched_external,
        }
    }
}

struct ClaimState {
    internal_claimed: Vec<bool>,
    external_claimed: Vec<bool>,
    pairs: Vec<(usize, usize, MatchType)>,
}

impl ClaimState {
    fn new(internal: usize, external: usize) -> Self {
        Self {
            internal_claimed: vec![false; internal],
            external_claimed: vec![false; external],
            pairs: Vec::new(),
        }
    }

    fn run_pass<KI, KE>(
        &mut self,
        internal: &[InternalContact],
        external: &[ExternalContact],
        match_type: MatchType,
        internal_keys: KI,
        external_keys: KE,
    ) where
        KI: Fn(&InternalContact) -> Vec<String>,
        KE: Fn(&ExternalContact) -> Vec<String>,
    {
        // key -> unclaimed internal indices, in input order
        let mut index: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, contact) in internal.iter().enumerate() {
            if self.internal_claimed[i] {
                continue;
            }
            for key in internal_keys(contact) {
                if key.is_empty() {
                    continue;
                }
                let slot = index.entry(key).or_default();
                if !slot.contains(&i) {
                    slot.push(i);
                }
            }
        }

        let before = self.pairs.len();
        for (e, contact) in external.iter().enumerate() {
            if self.external_claimed[e] {
                continue;
            }
            let hit = external_keys(contact).into_iter().find_map(|key| {
                index
                    .get(&key)?
                    .iter()
                    .copied()
                    .find(|&i| !self.internal_claimed[i])
            });
            if let Some(i) = hit {
                self.internal_claimed[i] = true;
                self.external_claimed[e] = true;
                self.pairs.push((i, e, match_type));
            }
        }

        debug!(
            pass = ?match_type,
            pairs = self.pairs.len() - before,
            "Match pass complete"
        );
    }
}
