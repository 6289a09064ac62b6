//! JSON recovery from free-form model output.
//!
//! Models wrap JSON in prose, markdown fences or both. Candidates are tried
//! in a fixed order and the first one that deserializes wins:
//!
//! 1. the whole response
//! 2. the body of each fenced code block
//! 3. the left-most opening delimiter up to the right-most closing one

use crate::models::{Result, RiskError, RiskStatement};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").ok());

/// Expected top-level JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Array,
    Object,
}

impl Shape {
    fn delimiters(self) -> (char, char) {
        match self {
            Shape::Array => ('[', ']'),
            Shape::Object => ('{', '}'),
        }
    }

    fn name(self) -> &'static str {
        match self {
            Shape::Array => "array",
            Shape::Object => "object",
        }
    }
}

/// Deserialize the first candidate of `raw` that fits `T`.
pub fn recover_json<T: DeserializeOwned>(raw: &str, shape: Shape) -> Result<T> {
    let mut last_error: Option<serde_json::Error> = None;

    for candidate in candidates(raw, shape) {
        match serde_json::from_str::<T>(candidate) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e),
        }
    }

    let reason = match last_error {
        Some(e) => format!("no candidate parsed as a JSON {}: {e}", shape.name()),
        None => format!("no JSON {} found", shape.name()),
    };
    Err(RiskError::unparsable(reason, raw))
}

/// Candidate substrings in the order they are tried.
fn candidates(raw: &str, shape: Shape) -> Vec<&str> {
    let mut out = Vec::new();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return out;
    }
    out.push(trimmed);

    if let Some(fence) = FENCE.as_ref() {
        out.extend(
            fence
                .captures_iter(raw)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str().trim())
                .filter(|s| !s.is_empty()),
        );
    }

    let (open, close) = shape.delimiters();
    if let (Some(start), Some(end)) = (raw.find(open), raw.rfind(close)) {
        if start < end {
            out.push(&raw[start..=end]);
        }
    }

    out
}

/// Recover the list of risk statements from an extraction response.
///
/// Statements keep their order of appearance; surrounding whitespace is trimmed.
pub fn parse_risk_list(raw: &str) -> Result<Vec<RiskStatement>> {
    let risks: Vec<String> = recover_json(raw, Shape::Array)?;
    Ok(risks.into_iter().map(|r| r.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Map, Value};

    #[test]
    fn test_plain_array() {
        let risks = parse_risk_list(r#"["Liquidity risk", "Cyber attack"]"#).unwrap();
        assert_eq!(risks, vec!["Liquidity risk", "Cyber attack"]);
    }

    #[test]
    fn test_array_inside_prose() {
        let risks = parse_risk_list(r#"Here is the list: ["A risk", "Another risk"]"#).unwrap();
        assert_eq!(risks, vec!["A risk", "Another risk"]);
    }

    #[test]
    fn test_array_inside_fence() {
        let raw = "Sure!\n```json\n[\"Regulatory change\",\n \"Key person dependency\"]\n```\nLet me know.";
        let risks = parse_risk_list(raw).unwrap();
        assert_eq!(risks, vec!["Regulatory change", "Key person dependency"]);
    }

    #[test]
    fn test_fence_tried_before_span() {
        // The bracket span runs from the footnote marker to the array end and
        // does not parse; the fenced body does.
        let raw = "See note [1] below.\n```json\n[\"Going concern\"]\n```";
        let risks = parse_risk_list(raw).unwrap();
        assert_eq!(risks, vec!["Going concern"]);
    }

    #[test]
    fn test_span_is_greedy() {
        // Nested brackets inside statements survive because the span runs to
        // the last closing bracket.
        let raw = r#"Risks: ["Debt covenants [see note 7]", "FX exposure"] end"#;
        let risks = parse_risk_list(raw).unwrap();
        assert_eq!(risks, vec!["Debt covenants [see note 7]", "FX exposure"]);
    }

    #[test]
    fn test_no_brackets_is_unparsable() {
        match parse_risk_list("no brackets here") {
            Err(RiskError::UnparsableResponse { raw, .. }) => assert_eq!(raw, "no brackets here"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_broken_array_is_unparsable() {
        assert!(matches!(
            parse_risk_list(r#"["unterminated", "#),
            Err(RiskError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn test_non_string_items_are_unparsable() {
        assert!(matches!(
            parse_risk_list("[1, 2, 3]"),
            Err(RiskError::UnparsableResponse { .. })
        ));
    }

    #[test]
    fn test_empty_response_is_unparsable() {
        assert!(parse_risk_list("   ").is_err());
    }

    #[test]
    fn test_order_and_duplicates_preserved() {
        let risks = parse_risk_list(r#"[" b ", "a", "b"]"#).unwrap();
        assert_eq!(risks, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_object_direct() {
        let obj: Map<String, Value> =
            recover_json(r#"{ "likelihood": 3, "impact": 2 }"#, Shape::Object).unwrap();
        assert_eq!(obj["likelihood"], 3);
    }

    #[test]
    fn test_object_in_json_fence() {
        let raw = "```json\n{\"likelihood\": 6, \"impact\": 7}\n```";
        let obj: Map<String, Value> = recover_json(raw, Shape::Object).unwrap();
        assert_eq!(obj["impact"], 7);
    }

    #[test]
    fn test_object_in_prose() {
        let raw = r#"Based on the risk, my answer is {"likelihood": 9, "impact": 10}."#;
        let obj: Map<String, Value> = recover_json(raw, Shape::Object).unwrap();
        assert_eq!(obj["likelihood"], 9);
    }

    #[test]
    fn test_object_shape_rejects_array() {
        let result: Result<Map<String, Value>> = recover_json("[1, 2]", Shape::Object);
        assert!(matches!(result, Err(RiskError::UnparsableResponse { .. })));
    }
}
