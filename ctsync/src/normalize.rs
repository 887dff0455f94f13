//! Field Normalizer
//!
//! Pure canonicalization of contact fields. Absent or unusable input yields
//! `None` ("no signal"); nothing here fails.

/// Phone numbers with fewer digits than this are non-comparable
pub const MIN_PHONE_DIGITS: usize = 10;

/// Strip everything but ASCII digits; `None` when under `MIN_PHONE_DIGITS`
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < MIN_PHONE_DIGITS {
        None
    } else {
        Some(digits)
    }
}

/// Trimmed, lowercased address; `None` when blank
pub fn normalize_email(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Lowercased with runs of whitespace collapsed to one space; `None` when blank
pub fn normalize_name(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed.to_lowercase())
    }
}

/// Case- and whitespace-insensitive text comparison; absent never equals anything
pub fn text_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a.and_then(normalize_name), b.and_then(normalize_name)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Lowercased name tokens, punctuation trimmed
pub fn name_tokens(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .map(|t| {
            t.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|t| !t.is_empty())
        .collect()
}

/// First letter of each name token, e.g. "Robert J. Smith" -> "rjs"
pub fn initials(raw: &str) -> Option<String> {
    let initials: String = name_tokens(raw)
        .iter()
        .filter_map(|t| t.chars().next())
        .collect();
    if initials.is_empty() {
        None
    } else {
        Some(initials)
    }
}

/// Lowercased domain part of an address
pub fn email_domain(raw: &str) -> Option<String> {
    let email = normalize_email(raw)?;
    let (_, domain) = email.rsplit_once('@')?;
    if domain.is_empty() {
        None
    } else {
        Some(domain.to_string())
    }
}

/// True when both numbers normalize to the same digits
pub fn phones_equal(a: &str, b: &str) -> bool {
    match (normalize_phone(a), normalize_phone(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// True when the digits of one number contain the other's
pub fn phone_contains(a: &str, b: &str) -> bool {
    match (normalize_phone(a), normalize_phone(b)) {
        (Some(a), Some(b)) => a.contains(&b) || b.contains(&a),
        _ => false,
    }
}

/// True when both addresses normalize to the same value
pub fn emails_equal(a: &str, b: &str) -> bool {
    match (normalize_email(a), normalize_email(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
