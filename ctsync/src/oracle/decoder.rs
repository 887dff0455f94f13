//! Strict oracle response decoder
//!
//! The only place oracle text is interpreted. Yields either a validated
//! verdict or a typed `DecodeError`; never a partially trusted object.

use crate::error::DecodeError;
use crate::types::DuplicationVerdict;
use serde_json::Value;

const FENCE: &str = "```";

/// Remove one enclosing code fence (with optional language tag), if present
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if !trimmed.starts_with(FENCE) || !trimmed.ends_with(FENCE) || trimmed.len() < 2 * FENCE.len() {
        return trimmed;
    }

    let inner = trimmed[FENCE.len()..trimmed.len() - FENCE.len()].trim_start();
    // Drop the language tag ("json", "JSON", ...), on its own line or not
    inner.trim_start_matches(|c: char| c.is_ascii_alphabetic()).trim()
}

/// Decode `{"confidence": int, "isDuplicate": bool, "reasoning": string}`
pub fn decode_verdict(text: &str) -> Result<DuplicationVerdict, DecodeError> {
    let body = strip_code_fence(text);
    if body.is_empty() {
        return Err(DecodeError::Empty);
    }

    let value: Value =
        serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
    let object = value.as_object().ok_or_else(|| DecodeError::InvalidJson("expected a JSON object".to_string()))?;

    let confidence = object.get("confidence").ok_or(DecodeError::MissingField("confidence"))?;
    let confidence = confidence.as_i64().ok_or_else(|| DecodeError::WrongType {
        field: "confidence",
        detail: format!("expected integer, got {}", confidence),
    })?;
    if !(0..=100).contains(&confidence) {
        return Err(DecodeError::ConfidenceOutOfRange(confidence));
    }

    let is_duplicate = object.get("isDuplicate").ok_or(DecodeError::MissingField("isDuplicate"))?;
    let is_duplicate = is_duplicate.as_bool().ok_or_else(|| DecodeError::WrongType {
        field: "isDuplicate",
        detail: format!("expected boolean, got {}", is_duplicate),
    })?;

    let reasoning = object.get("reasoning").ok_or(DecodeError::MissingField("reasoning"))?;
    let reasoning = reasoning.as_str().ok_or_else(|| DecodeError::WrongType {
        field: "reasoning",
        detail: format!("expected string, got {}", reasoning),
    })?;

    Ok(DuplicationVerdict {
        confidence: confidence as u8,
        is_duplicate,
        reasoning: reasoning.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_json() {
        let v = decode_verdict(r#"{"confidence": 92, "isDuplicate": true, "reasoning": "same email"}"#).unwrap();
        assert_eq!(v.confidence, 92);
        assert!(v.is_duplicate);
        assert_eq!(v.reasoning, "same email");
    }

    #[test]
    fn test_fenced_json_with_language_tag() {
        let text = "```json\n{\"confidence\": 10, \"isDuplicate\": false, \"reasoning\": \"different people\"}\n```";
        let v = decode_verdict(text).unwrap();
        assert_eq!(v.confidence, 10);
        assert!(!v.is_duplicate);
    }

    #[test]
    fn test_fenced_json_with_inline_tag() {
        let text = "```json {\"confidence\": 77, \"isDuplicate\": true, \"reasoning\": \"same phone\"}```";
        let v = decode_verdict(text).unwrap();
        assert_eq!(v.confidence, 77);
        assert!(v.is_duplicate);
    }

    #[test]
    fn test_fenced_json_without_tag() {
        let text = "```{\"confidence\": 50, \"isDuplicate\": false, \"reasoning\": \"\"}```";
        assert_eq!(decode_verdict(text).unwrap().confidence, 50);
    }

    #[test]
    fn test_rejects_prose() {
        assert!(matches!(decode_verdict("These look like the same person."), Err(DecodeError::InvalidJson(_))));
        assert_eq!(decode_verdict("   "), Err(DecodeError::Empty));
    }

    #[test]
    fn test_rejects_missing_and_mistyped_fields() {
        assert_eq!(
            decode_verdict(r#"{"confidence": 90, "reasoning": "x"}"#),
            Err(DecodeError::MissingField("isDuplicate"))
        );
        assert!(matches!(
            decode_verdict(r#"{"confidence": "90", "isDuplicate": true, "reasoning": "x"}"#),
            Err(DecodeError::WrongType { field: "confidence", .. })
        ));
        assert!(matches!(
            decode_verdict(r#"{"confidence": 90.5, "isDuplicate": true, "reasoning": "x"}"#),
            Err(DecodeError::WrongType { field: "confidence", .. })
        ));
        assert!(matches!(
            decode_verdict(r#"{"confidence": 90, "isDuplicate": "yes", "reasoning": "x"}"#),
            Err(DecodeError::WrongType { field: "isDuplicate", .. })
        ));
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        assert_eq!(
            decode_verdict(r#"{"confidence": 101, "isDuplicate": true, "reasoning": "x"}"#),
            Err(DecodeError::ConfidenceOutOfRange(101))
        );
        assert_eq!(
            decode_verdict(r#"{"confidence": -1, "isDuplicate": true, "reasoning": "x"}"#),
            Err(DecodeError::ConfidenceOutOfRange(-1))
        );
    }

    #[test]
    fn test_rejects_array() {
        assert!(matches!(decode_verdict("[1, 2]"), Err(DecodeError::InvalidJson(_))));
    }
}
