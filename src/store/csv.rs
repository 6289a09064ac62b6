//! Minimal CSV codec for risk tables.
//!
//! Fields containing a comma, quote or line break are wrapped in double
//! quotes with inner quotes doubled. The reader accepts the same dialect,
//! including quoted line breaks.

use crate::models::{Action, ClassifiedRisk, Result, RiskError, ScoredRisk};

pub const MATRIX_HEADER: [&str; 3] = ["Risk", "Likelihood", "Impact"];
pub const CLASSIFIED_HEADER: [&str; 5] = ["risk", "likelihood", "impact", "risk_score", "action"];

/// Quote a field unconditionally.
pub fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Quote a field only when the dialect requires it.
pub fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        quote(field)
    } else {
        field.to_string()
    }
}

fn push_line(out: &mut String, fields: &[String]) {
    out.push_str(&fields.join(","));
    out.push('\n');
}

/// Scored matrix: `Risk,Likelihood,Impact`, risk text always quoted.
pub fn matrix_csv(risks: &[ScoredRisk]) -> String {
    let mut out = String::new();
    push_line(&mut out, &MATRIX_HEADER.map(String::from));
    for r in risks {
        push_line(
            &mut out,
            &[quote(&r.risk), r.likelihood.to_string(), r.impact.to_string()],
        );
    }
    out
}

/// Classified register with lowercase headers.
pub fn classified_csv(risks: &[ClassifiedRisk]) -> String {
    let mut out = String::new();
    push_line(&mut out, &CLASSIFIED_HEADER.map(String::from));
    for r in risks {
        push_line(
            &mut out,
            &[
                escape(&r.risk),
                r.likelihood.to_string(),
                r.impact.to_string(),
                r.risk_score.to_string(),
                r.action.to_string(),
            ],
        );
    }
    out
}

/// Split CSV text into records.
///
/// Blank lines between records are skipped.
pub fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = true;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                if field_started || !field.is_empty() {
                    record.push(std::mem::take(&mut field));
                    records.push(std::mem::take(&mut record));
                }
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(RiskError::Malformed {
            context: "CSV".into(),
            reason: "unterminated quoted field".into(),
        });
    }
    if field_started || !field.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

/// Column lookup by case-insensitive header name.
struct Columns {
    header: Vec<String>,
}

impl Columns {
    fn index(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| malformed(format!("missing column '{name}'")))
    }
}

fn malformed(reason: String) -> RiskError {
    RiskError::Malformed {
        context: "risk table".into(),
        reason,
    }
}

fn field<'a>(row: &'a [String], index: usize, line: usize) -> Result<&'a str> {
    row.get(index)
        .map(String::as_str)
        .ok_or_else(|| malformed(format!("row {line} has {} fields", row.len())))
}

fn number<T: std::str::FromStr>(row: &[String], index: usize, line: usize) -> Result<T> {
    let raw = field(row, index, line)?;
    raw.trim()
        .parse()
        .map_err(|_| malformed(format!("row {line}: '{raw}' is not a number")))
}

/// Read a classified register back.
pub fn parse_classified(text: &str) -> Result<Vec<ClassifiedRisk>> {
    let mut records = parse_records(text)?.into_iter();
    let Some(header) = records.next() else {
        return Ok(Vec::new());
    };
    let columns = Columns { header };
    let [risk, likelihood, impact, risk_score, action] =
        CLASSIFIED_HEADER.map(|name| columns.index(name));
    let (risk, likelihood, impact, risk_score, action) =
        (risk?, likelihood?, impact?, risk_score?, action?);

    records
        .enumerate()
        .map(|(i, row)| {
            let line = i + 2;
            Ok(ClassifiedRisk {
                risk: field(&row, risk, line)?.to_string(),
                likelihood: number(&row, likelihood, line)?,
                impact: number(&row, impact, line)?,
                risk_score: number(&row, risk_score, line)?,
                action: field(&row, action, line)?
                    .parse::<Action>()
                    .map_err(|e| malformed(format!("row {line}: {e}")))?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Score;
    use crate::scoring::classify;

    #[test]
    fn test_matrix_layout() {
        let csv = matrix_csv(&[
            ScoredRisk::new("Plain risk", Score { likelihood: 3, impact: 2 }),
            ScoredRisk::new(r#"Risk with "quotes", commas"#, Score { likelihood: 9, impact: 10 }),
        ]);
        assert_eq!(
            csv,
            "Risk,Likelihood,Impact\n\"Plain risk\",3,2\n\"Risk with \"\"quotes\"\", commas\",9,10\n"
        );
    }

    #[test]
    fn test_escape_only_when_needed() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("line\nbreak"), "\"line\nbreak\"");
    }

    #[test]
    fn test_parse_quoted_fields() {
        let records = parse_records("a,\"b,c\",\"d \"\"e\"\"\"\r\n\"multi\nline\",,x\n\n").unwrap();
        assert_eq!(
            records,
            vec![
                vec!["a", "b,c", "d \"e\""],
                vec!["multi\nline", "", "x"],
            ]
        );
    }

    #[test]
    fn test_unterminated_quote() {
        assert!(matches!(
            parse_records("\"open,1,2\n"),
            Err(RiskError::Malformed { .. })
        ));
    }

    #[test]
    fn test_classified_survives_write_and_read() {
        let classified: Vec<_> = [
            ScoredRisk::new("Cyber, ransomware", Score { likelihood: 9, impact: 9 }),
            ScoredRisk::new("Key \"person\" loss", Score { likelihood: 5, impact: 8 }),
        ]
        .iter()
        .map(classify)
        .collect();
        let parsed = parse_classified(&classified_csv(&classified)).unwrap();
        assert_eq!(parsed, classified);
    }

    #[test]
    fn test_missing_column_and_bad_number() {
        assert!(parse_classified("risk,likelihood\nx,1\n").is_err());
        let bad = "risk,likelihood,impact,risk_score,action\nx,high,1,1,Tolerate\n";
        assert!(matches!(parse_classified(bad), Err(RiskError::Malformed { .. })));
        let bad_action = "risk,likelihood,impact,risk_score,action\nx,1,1,1,Ignore\n";
        assert!(parse_classified(bad_action).is_err());
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_classified("").unwrap().is_empty());
    }
}
