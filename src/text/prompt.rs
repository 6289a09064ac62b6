//! Prompt templates and placeholder substitution.

use crate::models::{Result, RiskError};
use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

/// Longest value, in characters, bound into a single placeholder.
pub const MAX_BINDING_CHARS: usize = 4000;

static PLACEHOLDER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").ok());

/// Default filing extraction prompt.
pub const FILING_TEMPLATE: &str = r#"You are a financial risk analyst reviewing an annual report (10-K) of {COMPANY_NAME}.

Read the filing excerpt below and list every distinct business risk it describes.
Write each risk as one short, self-contained sentence.

Respond ONLY with a JSON array of strings, for example:
["Dependence on a single supplier for key components", "Exposure to foreign exchange fluctuations"]

Filing excerpt:
{FILING_TEXT}"#;

/// Default news extraction prompt.
pub const NEWS_TEMPLATE: &str = r#"You are a financial risk analyst monitoring news coverage of {COMPANY_NAME}.

From the headlines below, list the business risks they suggest for the company.
Write each risk as one short, self-contained sentence.

Respond ONLY with a JSON array of strings.

Headlines:
{HEADLINES}"#;

/// Substitute `{NAME}` placeholders with their bound values.
///
/// Values are cut to their first [`MAX_BINDING_CHARS`] characters. Unbound
/// placeholders stay verbatim and substituted text is not scanned again.
pub fn fill(template: &str, bindings: &[(&str, &str)]) -> String {
    let Some(re) = PLACEHOLDER.as_ref() else {
        return template.to_string();
    };

    re.replace_all(template, |caps: &Captures<'_>| {
        match bindings.iter().find(|(name, _)| *name == &caps[1]) {
            Some((_, value)) => truncate_chars(value, MAX_BINDING_CHARS).to_string(),
            None => caps[0].to_string(),
        }
    })
    .into_owned()
}

/// Prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Load a template file, or fall back to the built-in one.
pub fn load_template(path: Option<&Path>, default: &str) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RiskError::NotFound(format!("prompt template {}", p.display()))
            } else {
                RiskError::io(format!("reading prompt template {}", p.display()), e)
            }
        }),
        None => Ok(default.to_string()),
    }
}
