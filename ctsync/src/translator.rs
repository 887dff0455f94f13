//! Portable format translator
//!
//! Converts between internal records and the external address-book form.
//! Every exported record carries its internal identifier twice: in the
//! dedicated `internal_id` field and as a `[memory-id:...]` marker appended to
//! the note, so the identifier survives applications that drop unknown fields.

use crate::matcher::{id_marker, strip_id_markers};
use crate::ports::FormatTranslator;
use crate::types::{ContactFields, ExternalAddress, ExternalContact, InternalContact};

#[derive(Debug, Clone, Copy, Default)]
pub struct PortableTranslator;

impl PortableTranslator {
    pub fn new() -> Self {
        Self
    }
}

/// Note text with the identifier marker appended on its own paragraph
pub fn note_with_marker(notes: &str, id: &str) -> String {
    let body = strip_id_markers(notes);
    if body.is_empty() {
        id_marker(id)
    } else {
        format!("{}\n\n{}", body, id_marker(id))
    }
}

fn clean_list(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn clean_opt(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn is_well_formed_email(raw: &str) -> bool {
    let email = raw.trim();
    if email.contains(char::is_whitespace) {
        return false;
    }
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

impl FormatTranslator for PortableTranslator {
    fn to_external(&self, contact: &InternalContact) -> ExternalContact {
        ExternalContact {
            uid: None,
            display_name: contact.name.trim().to_string(),
            emails: clean_list(&contact.emails),
            phones: clean_list(&contact.phones),
            organization: clean_opt(contact.company.as_deref()),
            title: clean_opt(contact.title.as_deref()),
            address: contact
                .address
                .as_deref()
                .map(ExternalAddress::from_line)
                .filter(|a| a.to_line().is_some()),
            url: clean_opt(contact.website.as_deref()),
            note: note_with_marker(&contact.notes, &contact.id),
            categories: contact.tags.clone(),
            internal_id: Some(contact.id.clone()),
            modified_at: Some(contact.updated_at),
        }
    }

    fn from_external(&self, contact: &ExternalContact) -> ContactFields {
        ContactFields {
            name: contact.display_name.trim().to_string(),
            emails: clean_list(&contact.emails),
            phones: clean_list(&contact.phones),
            company: clean_opt(contact.organization.as_deref()),
            title: clean_opt(contact.title.as_deref()),
            address: contact.address.as_ref().and_then(ExternalAddress::to_line),
            website: clean_opt(contact.url.as_deref()),
            notes: strip_id_markers(&contact.note),
            tags: contact
                .categories
                .iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
        }
    }

    fn validate(&self, contact: &ExternalContact) -> Vec<String> {
        let mut problems = Vec::new();

        let has_name = !contact.display_name.trim().is_empty();
        let has_email = contact.emails.iter().any(|e| !e.trim().is_empty());
        let has_phone = contact.phones.iter().any(|p| !p.trim().is_empty());
        if !has_name && !has_email && !has_phone {
            problems.push("record has no name, email or phone".to_string());
        }

        for email in contact.emails.iter().filter(|e| !e.trim().is_empty()) {
            if !is_well_formed_email(email) {
                problems.push(format!("malformed email '{}'", email.trim()));
            }
        }

        problems
    }
}
