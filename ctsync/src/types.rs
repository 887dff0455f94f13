//! Contact records and pass-scoped reconciliation types
//!
//! `InternalContact` and `ExternalContact` persist across passes; every other
//! type here lives only for the duration of one pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// Persistent records
// ============================================================================

/// Entity record owned by the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalContact {
    /// Stable opaque identifier; authoritative once synced
    pub id: String,
    pub owner_id: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: String,
    pub name: String,
    /// First element is the canonical address
    #[serde(default)]
    pub emails: Vec<String>,
    /// First element is the canonical number
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    // Internal-only metadata; never sourced from the external side
    #[serde(default)]
    pub relationship: Option<String>,
    #[serde(default)]
    pub importance: Option<u8>,
    #[serde(default)]
    pub last_interaction: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_entity_type() -> String {
    "person".to_string()
}

impl InternalContact {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }
}

/// Structured postal address of an external record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAddress {
    #[serde(default)]
    pub street: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl ExternalAddress {
    /// Single-line rendering, `None` when every part is blank
    pub fn to_line(&self) -> Option<String> {
        let parts: Vec<&str> = [
            &self.street,
            &self.city,
            &self.region,
            &self.postal_code,
            &self.country,
        ]
        .into_iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    /// Inverse of `to_line` for the common "street, city, region, postal, country" shape
    pub fn from_line(line: &str) -> Self {
        let mut parts = line.split(',').map(|p| p.trim().to_string()).filter(|p| !p.is_empty());
        Self {
            street: parts.next(),
            city: parts.next(),
            region: parts.next(),
            postal_code: parts.next(),
            country: parts.next(),
        }
    }
}

/// Portable contact record from the external address book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalContact {
    /// Bridge-assigned record key, absent for records not yet created
    #[serde(default)]
    pub uid: Option<String>,
    pub display_name: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub address: Option<ExternalAddress>,
    #[serde(default)]
    pub url: Option<String>,
    /// Free text; may carry the `[memory-id:...]` marker
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub categories: BTreeSet<String>,
    /// Dedicated field for the embedded internal identifier
    #[serde(default)]
    pub internal_id: Option<String>,
    /// Not guaranteed to be reliable or present
    #[serde(default)]
    pub modified_at: Option<DateTime<Utc>>,
}

impl ExternalContact {
    pub fn primary_email(&self) -> Option<&str> {
        self.emails.first().map(String::as_str)
    }

    pub fn primary_phone(&self) -> Option<&str> {
        self.phones.first().map(String::as_str)
    }
}

/// Field values for creating or patching an internal record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactFields {
    pub name: String,
    pub emails: Vec<String>,
    pub phones: Vec<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub notes: String,
    pub tags: BTreeSet<String>,
}

impl ContactFields {
    /// Apply onto an existing record, stamping a fresh modification time
    pub fn apply_to(&self, contact: &mut InternalContact) {
        contact.name = self.name.clone();
        contact.emails = self.emails.clone();
        contact.phones = self.phones.clone();
        contact.company = self.company.clone();
        contact.title = self.title.clone();
        contact.address = self.address.clone();
        contact.website = self.website.clone();
        contact.notes = self.notes.clone();
        contact.tags = self.tags.clone();
        contact.updated_at = Utc::now();
    }
}

// ============================================================================
// Pass-scoped types
// ============================================================================

/// Matcher tier that produced a pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    Identifier,
    Email,
    Phone,
    Name,
}

impl MatchType {
    /// Fixed confidence per tier; never recomputed
    pub fn confidence(self) -> u8 {
        match self {
            Self::Identifier => 100,
            Self::Email => 95,
            Self::Phone => 90,
            Self::Name => 70,
        }
    }
}

/// High-confidence association between one internal and one external record
#[derive(Debug, Clone)]
pub struct MatchPair {
    pub internal: InternalContact,
    pub external: ExternalContact,
    pub match_type: MatchType,
    pub confidence: u8,
}

impl MatchPair {
    pub fn new(internal: InternalContact, external: ExternalContact, match_type: MatchType) -> Self {
        Self {
            internal,
            external,
            match_type,
            confidence: match_type.confidence(),
        }
    }
}

/// Unconfirmed potential duplicate between the two unmatched partitions
#[derive(Debug, Clone)]
pub struct CandidatePair {
    /// Index into the unmatched internal partition
    pub internal_index: usize,
    /// Index into the unmatched external partition
    pub external_index: usize,
    pub internal: InternalContact,
    pub external: ExternalContact,
    /// Heuristic pre-filter score (21-100)
    pub score: u8,
}

/// Judgment on one candidate pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicationVerdict {
    pub confidence: u8,
    #[serde(rename = "isDuplicate")]
    pub is_duplicate: bool,
    pub reasoning: String,
}

/// Outcome of conflict resolution for one pair
#[derive(Debug, Clone, PartialEq)]
pub enum ConflictResolution {
    /// Internal values win; external gets overwritten
    UseInternal,
    /// External values win; internal gets overwritten
    UseExternal,
    /// Field-by-field merge
    Merge(MergedContact),
    /// Leave both sides untouched
    Skip,
}

/// Merged result; provenance fields always come from the internal side
#[derive(Debug, Clone, PartialEq)]
pub struct MergedContact {
    pub id: String,
    pub owner_id: String,
    pub entity_type: String,
    pub created_at: DateTime<Utc>,
    pub fields: ContactFields,
    pub relationship: Option<String>,
    pub importance: Option<u8>,
    pub last_interaction: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl MergedContact {
    pub fn into_internal(self) -> InternalContact {
        let f = self.fields;
        InternalContact {
            id: self.id,
            owner_id: self.owner_id,
            entity_type: self.entity_type,
            name: f.name,
            emails: f.emails,
            phones: f.phones,
            company: f.company,
            title: f.title,
            address: f.address,
            website: f.website,
            notes: f.notes,
            tags: f.tags,
            relationship: self.relationship,
            importance: self.importance,
            last_interaction: self.last_interaction,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}
