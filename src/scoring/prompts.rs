//! Scoring prompt.

use crate::models::Band;
use crate::text::fill;

const SCORING_TEMPLATE: &str = r#"You are a financial risk analyst scoring risks for a risk matrix.

Score the following business risk on a scale from 1 to 10 for:
- Likelihood: (1 = very unlikely, 10 = very likely)
- Impact: (1 = negligible loss, 10 = catastrophic loss)

{BAND_RULE}
Respond ONLY with JSON: { "likelihood": X, "impact": Y }

Risk: "{RISK}""#;

/// Instruction pinning both values to the band range.
pub fn band_rule(band: Band) -> String {
    let range = band.range();
    format!(
        "Likelihood and Impact must be between {} and {}.",
        range.start(),
        range.end()
    )
}

/// Build the scoring prompt for one risk.
pub fn build_scoring_prompt(risk: &str, band: Band) -> String {
    fill(
        SCORING_TEMPLATE,
        &[("BAND_RULE", &band_rule(band)), ("RISK", risk)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_band_and_risk() {
        let prompt = build_scoring_prompt("Loss of a major customer", Band::Medium);
        assert!(prompt.contains("between 5 and 8"));
        assert!(prompt.contains(r#"Risk: "Loss of a major customer""#));
        assert!(prompt.contains(r#"{ "likelihood": X, "impact": Y }"#));
        assert!(!prompt.contains("{BAND_RULE}"));
    }

    #[test]
    fn test_band_rules() {
        assert_eq!(
            band_rule(Band::Low),
            "Likelihood and Impact must be between 1 and 4."
        );
        assert_eq!(
            band_rule(Band::High),
            "Likelihood and Impact must be between 9 and 10."
        );
    }
}
