//! Conflict Resolver
//!
//! Reconciles field-level divergence for matched or confirmed-duplicate pairs.
//!
//! # Merge policy
//! - Identifier, owner, entity type and creation time: internal (provenance)
//! - Name: external when present. Display names are edited by hand in the
//!   address book far more often than in the store.
//! - Email / phone: union; the canonical first value is the internal primary
//!   when there is one, otherwise the external primary. Remaining values are
//!   ordered lexicographically by their normalized form.
//! - Organization / title / website: whichever side is non-empty, internal
//!   when both are
//! - Address: external when present
//! - Notes: concatenated with a provenance marker when both sides differ
//! - Tags: union
//! - Relationship / importance / interaction history: internal only
//! - Modification time: always fresh

use crate::matcher::strip_id_markers;
use crate::normalize::{normalize_email, normalize_phone};
use crate::types::{ConflictResolution, ContactFields, ExternalContact, InternalContact, MergedContact};
use chrono::Utc;
use ctsync_common::config::ConflictStrategy;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Separator placed between internal and external notes on merge
pub const MERGED_NOTES_MARKER: &str = "--- Merged from address book ---";

#[derive(Debug, Clone, Copy, Default)]
pub struct ResolverConfig {
    pub strategy: ConflictStrategy,
    /// Force field-by-field merge regardless of strategy
    pub auto_merge: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    config: ResolverConfig,
}

impl ConflictResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> ResolverConfig {
        self.config
    }

    /// True only if name, first email, first phone or organization literally differ
    pub fn has_conflict(&self, internal: &InternalContact, external: &ExternalContact) -> bool {
        literal(Some(&internal.name)) != literal(Some(&external.display_name))
            || literal(internal.primary_email()) != literal(external.primary_email())
            || literal(internal.primary_phone()) != literal(external.primary_phone())
            || literal(internal.company.as_deref()) != literal(external.organization.as_deref())
    }

    /// Decide how to reconcile a pair; `None` when there is nothing to reconcile
    pub fn resolve(&self, internal: &InternalContact, external: &ExternalContact) -> Option<ConflictResolution> {
        if !self.has_conflict(internal, external) {
            return None;
        }

        let resolution = if self.config.auto_merge {
            ConflictResolution::Merge(self.merge(internal, external))
        } else {
            match self.config.strategy {
                ConflictStrategy::Prompt => ConflictResolution::Skip,
                ConflictStrategy::Merge => ConflictResolution::Merge(self.merge(internal, external)),
                ConflictStrategy::Newest | ConflictStrategy::Oldest => {
                    match external.modified_at.map(|ext| internal.updated_at.cmp(&ext)) {
                        None | Some(Ordering::Equal) => {
                            ConflictResolution::Merge(self.merge(internal, external))
                        }
                        Some(order) => {
                            let internal_newer = order == Ordering::Greater;
                            let keep_internal = match self.config.strategy {
                                ConflictStrategy::Newest => internal_newer,
                                _ => !internal_newer,
                            };
                            if keep_internal {
                                ConflictResolution::UseInternal
                            } else {
                                ConflictResolution::UseExternal
                            }
                        }
                    }
                }
            }
        };

        debug!(
            internal_id = %internal.id,
            strategy = ?self.config.strategy,
            auto_merge = self.config.auto_merge,
            resolution = resolution_label(&resolution),
            "Conflict resolved"
        );

        Some(resolution)
    }

    /// Field-by-field merge
    pub fn merge(&self, internal: &InternalContact, external: &ExternalContact) -> MergedContact {
        let name = non_empty(Some(&external.display_name))
            .unwrap_or_else(|| internal.name.trim().to_string());

        let emails = union_canonical(&internal.emails, &external.emails, |e| normalize_email(e));
        let phones = union_canonical(&internal.phones, &external.phones, phone_key);

        let address = external
            .address
            .as_ref()
            .and_then(|a| a.to_line())
            .or_else(|| non_empty(internal.address.as_deref()));

        let tags: BTreeSet<String> = internal
            .tags
            .iter()
            .chain(external.categories.iter())
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        let fields = ContactFields {
            name,
            emails,
            phones,
            company: prefer_non_empty(internal.company.as_deref(), external.organization.as_deref()),
            title: prefer_non_empty(internal.title.as_deref(), external.title.as_deref()),
            address,
            website: prefer_non_empty(internal.website.as_deref(), external.url.as_deref()),
            notes: merge_notes(&internal.notes, &strip_id_markers(&external.note)),
            tags,
        };

        MergedContact {
            id: internal.id.clone(),
            owner_id: internal.owner_id.clone(),
            entity_type: internal.entity_type.clone(),
            created_at: internal.created_at,
            fields,
            relationship: internal.relationship.clone(),
            importance: internal.importance,
            last_interaction: internal.last_interaction,
            updated_at: Utc::now(),
        }
    }
}

pub fn resolution_label(resolution: &ConflictResolution) -> &'static str {
    match resolution {
        ConflictResolution::UseInternal => "use_internal",
        ConflictResolution::UseExternal => "use_external",
        ConflictResolution::Merge(_) => "merge",
        ConflictResolution::Skip => "skip",
    }
}

/// Trimmed value with blank treated as absent
fn literal(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<String> {
    literal(value).map(str::to_string)
}

fn prefer_non_empty(internal: Option<&str>, external: Option<&str>) -> Option<String> {
    non_empty(internal).or_else(|| non_empty(external))
}

fn phone_key(raw: &str) -> Option<String> {
    normalize_phone(raw).or_else(|| {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            None
        } else {
            Some(digits)
        }
    })
}

/// Union two value lists, deduplicated by normalized key
///
/// The first internal value (else first external value) stays first; the rest
/// follow in lexicographic order of their keys, keeping the first spelling seen.
fn union_canonical<K>(internal: &[String], external: &[String], key: K) -> Vec<String>
where
    K: Fn(&str) -> Option<String>,
{
    let mut all = internal.iter().chain(external.iter()).filter_map(|v| {
        let trimmed = v.trim();
        key(trimmed).map(|k| (k, trimmed.to_string()))
    });

    let Some((canonical_key, canonical)) = all.next() else {
        return Vec::new();
    };

    let mut rest: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in all {
        if k != canonical_key {
            rest.entry(k).or_insert(v);
        }
    }

    std::iter::once(canonical).chain(rest.into_values()).collect()
}

fn merge_notes(internal: &str, external: &str) -> String {
    let internal = internal.trim();
    let external = external.trim();

    if external.is_empty() || internal == external || internal.contains(external) {
        internal.to_string()
    } else if internal.is_empty() {
        external.to_string()
    } else {
        format!("{}\n\n{}\n{}", internal, MERGED_NOTES_MARKER, external)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExternalAddress;
    use chrono::{Duration, TimeZone};

    fn internal() -> InternalContact {
        InternalContact {
            id: "mem-1".into(),
            owner_id: "owner".into(),
            entity_type: "person".into(),
            name: "Bob".into(),
            emails: vec!["b@x.com".into()],
            phones: vec![],
            company: Some(String::new()),
            title: None,
            address: Some("old address".into()),
            website: None,
            notes: "Met at conference".into(),
            tags: ["friend".to_string()].into_iter().collect(),
            relationship: Some("colleague".into()),
            importance: Some(4),
            last_interaction: Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()),
            created_at: Utc.with_ymd_and_hms(2023, 5, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        }
    }

    fn external() -> ExternalContact {
        ExternalContact {
            display_name: "Robert".into(),
            emails: vec!["b@x.com".into()],
            organization: Some("Acme".into()),
            categories: ["work".to_string()].into_iter().collect(),
            ..Default::default()
        }
    }

    fn resolver(strategy: ConflictStrategy, auto_merge: bool) -> ConflictResolver {
        ConflictResolver::new(ResolverConfig { strategy, auto_merge })
    }

    #[test]
    fn test_merge_provenance() {
        let merged = resolver(ConflictStrategy::Merge, false).merge(&internal(), &external());
        assert_eq!(merged.fields.name, "Robert");
        assert_eq!(merged.fields.emails, vec!["b@x.com".to_string()]);
        assert_eq!(merged.fields.company.as_deref(), Some("Acme"));
        assert_eq!(merged.id, "mem-1");
        assert_eq!(merged.owner_id, "owner");
        assert_eq!(merged.created_at, internal().created_at);
        assert_eq!(merged.relationship.as_deref(), Some("colleague"));
        assert_eq!(merged.importance, Some(4));
        assert!(merged.updated_at > internal().updated_at);
    }

    #[test]
    fn test_no_conflict_is_noop() {
        let int = internal();
        let ext = ExternalContact {
            display_name: "Bob".into(),
            emails: vec!["b@x.com".into()],
            title: Some("ignored for conflicts".into()),
            ..Default::default()
        };
        let r = resolver(ConflictStrategy::Merge, false);
        assert!(!r.has_conflict(&int, &ext));
        assert_eq!(r.resolve(&int, &ext), None);
    }

    #[test]
    fn test_prompt_always_skips() {
        let r = resolver(ConflictStrategy::Prompt, false);
        assert_eq!(r.resolve(&internal(), &external()), Some(ConflictResolution::Skip));
    }

    #[test]
    fn test_auto_merge_overrides_prompt() {
        let r = resolver(ConflictStrategy::Prompt, true);
        assert!(matches!(r.resolve(&internal(), &external()), Some(ConflictResolution::Merge(_))));
    }

    #[test]
    fn test_newest_and_oldest() {
        let int = internal();
        let mut ext = external();

        ext.modified_at = Some(int.updated_at + Duration::days(1));
        assert_eq!(
            resolver(ConflictStrategy::Newest, false).resolve(&int, &ext),
            Some(ConflictResolution::UseExternal)
        );
        assert_eq!(
            resolver(ConflictStrategy::Oldest, false).resolve(&int, &ext),
            Some(ConflictResolution::UseInternal)
        );

        ext.modified_at = Some(int.updated_at - Duration::days(1));
        assert_eq!(
            resolver(ConflictStrategy::Newest, false).resolve(&int, &ext),
            Some(ConflictResolution::UseInternal)
        );
    }

    #[test]
    fn test_missing_or_tied_timestamp_merges() {
        let int = internal();
        let mut ext = external();
        let r = resolver(ConflictStrategy::Newest, false);

        ext.modified_at = None;
        assert!(matches!(r.resolve(&int, &ext), Some(ConflictResolution::Merge(_))));

        ext.modified_at = Some(int.updated_at);
        assert!(matches!(r.resolve(&int, &ext), Some(ConflictResolution::Merge(_))));
    }

    #[test]
    fn test_union_keeps_canonical_first_then_lexicographic() {
        let mut int = internal();
        int.emails = vec!["Zed@x.com".into(), "b@x.com".into()];
        int.phones = vec!["555-000-1111".into()];
        let mut ext = external();
        ext.emails = vec!["a@x.com".into(), "zed@X.com".into()];
        ext.phones = vec!["(555) 000-1111".into(), "555-999-2222".into()];

        let merged = resolver(ConflictStrategy::Merge, false).merge(&int, &ext);
        assert_eq!(merged.fields.emails, vec!["Zed@x.com", "a@x.com", "b@x.com"]);
        assert_eq!(merged.fields.phones, vec!["555-000-1111", "555-999-2222"]);
    }

    #[test]
    fn test_canonical_from_external_when_internal_empty() {
        let mut int = internal();
        int.emails.clear();
        let mut ext = external();
        ext.emails = vec!["z@x.com".into(), "a@x.com".into()];

        let merged = resolver(ConflictStrategy::Merge, false).merge(&int, &ext);
        assert_eq!(merged.fields.emails, vec!["z@x.com", "a@x.com"]);
    }

    #[test]
    fn test_notes_tags_and_address() {
        let mut ext = external();
        ext.note = "Likes tea [memory-id:mem-1]".into();
        ext.address = Some(ExternalAddress {
            city: Some("Lisbon".into()),
            ..Default::default()
        });

        let merged = resolver(ConflictStrategy::Merge, false).merge(&internal(), &ext);
        assert_eq!(
            merged.fields.notes,
            format!("Met at conference\n\n{}\nLikes tea", MERGED_NOTES_MARKER)
        );
        assert_eq!(merged.fields.address.as_deref(), Some("Lisbon"));
        assert!(merged.fields.tags.contains("friend"));
        assert!(merged.fields.tags.contains("work"));
    }

    #[test]
    fn test_same_notes_not_duplicated() {
        let mut ext = external();
        ext.note = "Met at conference\n[memory-id:mem-1]".into();
        let merged = resolver(ConflictStrategy::Merge, false).merge(&internal(), &ext);
        assert_eq!(merged.fields.notes, "Met at conference");
        // no external address keeps internal
        assert_eq!(merged.fields.address.as_deref(), Some("old address"));
    }

    #[test]
    fn test_merge_of_merge_has_no_conflict() {
        let r = resolver(ConflictStrategy::Merge, false);
        let merged = r.merge(&internal(), &external()).into_internal();
        let mut ext = external();
        ext.emails = merged.emails.clone();
        ext.organization = merged.company.clone();
        assert!(!r.has_conflict(&merged, &ext));
    }
}
