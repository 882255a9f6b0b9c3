//! Parsing semi-structured model output into typed records.
//!
//! Two independent parsers, matching the two things a VLM is asked to emit:
//!
//! * [`parse_object`] — JSON-ish text → `serde_json::Value`. Strict parsing
//!   first; when that fails, a repair pass recovers near-valid output
//!   (prose around the object, trailing commas, bare keys, single-quoted
//!   strings, truncated braces) before giving up with a typed error.
//!
//! * [`parse_table`] — markdown-ish text → [`TableResult`]. The first
//!   `|`-delimited span is interpreted as a GFM pipe table; everything the
//!   model wrote around it is ignored.
//!
//! Neither parser logs or swallows anything: malformed input yields
//! [`ExtractError::Parse`] and the orchestrator decides the fallback.

use crate::error::ExtractError;
use crate::output::TableResult;
use serde_json::Value;
use tracing::{debug, warn};

// ── JSON objects ─────────────────────────────────────────────────────────

/// Parse model output expected to be a JSON object or array of objects.
pub fn parse_object(text: &str) -> Result<Value, ExtractError> {
    let candidate = json_span(text).unwrap_or_else(|| text.trim());

    if let Ok(value) = serde_json::from_str::<Value>(candidate) {
        if value.is_object() || value.is_array() {
            return Ok(value);
        }
    }

    let repaired = repair_json(candidate);
    debug!("Strict JSON parse failed, trying repaired candidate");
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) if value.is_object() || value.is_array() => Ok(value),
        Ok(other) => Err(ExtractError::Parse {
            detail: format!("expected a JSON object or array, got {other}"),
        }),
        Err(e) => Err(ExtractError::Parse {
            detail: format!("not valid JSON even after repair: {e}"),
        }),
    }
}

/// Normalise a parsed value into one mapping per document.
///
/// A top-level object is a single document; a top-level array contributes
/// one document per object element. This boundary inference is best-effort:
/// the model has no documented contract for separating batched documents.
pub fn document_maps(value: Value) -> Vec<serde_json::Map<String, Value>> {
    match value {
        Value::Object(map) => vec![map],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(map) => Some(map),
                other => {
                    warn!("Skipping non-object document entry: {other}");
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Render a JSON answer value as the cell string for the result table.
pub fn answer_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// The span from the first `{`/`[` to the last `}`/`]`, if one exists.
fn json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let end = text.rfind(['}', ']'])?;
    if end > start {
        Some(&text[start..=end])
    } else {
        Some(&text[start..])
    }
}

/// Best-effort repair of near-valid JSON.
///
/// Handles the malformations VLMs actually produce: trailing commas, bare
/// (unquoted) keys, single-quoted strings, and output truncated mid-object
/// by the token limit. Works as a single scan with a bracket stack; content
/// inside string literals is copied untouched.
fn repair_json(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                // Copy the string literal, normalising quote style.
                let quote = c;
                out.push('"');
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        // `\'` is not a JSON escape; emit the apostrophe bare.
                        if chars[i + 1] != '\'' {
                            out.push(chars[i]);
                        }
                        out.push(chars[i + 1]);
                        i += 2;
                        continue;
                    }
                    if chars[i] == '"' {
                        // Inner double quote in a single-quoted string.
                        out.push('\\');
                    }
                    out.push(chars[i]);
                    i += 1;
                }
                out.push('"');
                i += 1; // closing quote, or past-the-end when truncated
            }
            '{' | '[' => {
                stack.push(c);
                out.push(c);
                i += 1;
            }
            '}' | ']' => {
                stack.pop();
                out.push(c);
                i += 1;
            }
            ',' => {
                // Drop trailing commas before a closer or at end of input.
                let mut j = i + 1;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                if j >= chars.len() || chars[j] == '}' || chars[j] == ']' {
                    i += 1;
                } else {
                    out.push(',');
                    i += 1;
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                // A bare identifier: quote it when it is a key, keep JSON
                // literals (true/false/null) as-is otherwise.
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let mut j = i;
                while j < chars.len() && chars[j].is_whitespace() {
                    j += 1;
                }
                let is_key = j < chars.len() && chars[j] == ':';
                if is_key || !matches!(word.as_str(), "true" | "false" | "null") {
                    out.push('"');
                    out.push_str(&word);
                    out.push('"');
                } else {
                    out.push_str(&word);
                }
            }
            _ => {
                out.push(c);
                i += 1;
            }
        }
    }

    // Close whatever the token limit cut off.
    while let Some(opener) = stack.pop() {
        out.push(if opener == '{' { '}' } else { ']' });
    }
    out
}

// ── Markdown tables ──────────────────────────────────────────────────────

/// Parse the first pipe-table span of the response into a [`TableResult`].
///
/// Body rows are padded with empty cells or truncated to the header width,
/// so every returned row has exactly `columns.len()` cells.
pub fn parse_table(text: &str) -> Result<TableResult, ExtractError> {
    let start = text.find('|').ok_or_else(|| ExtractError::Parse {
        detail: "response contains no pipe-delimited table".into(),
    })?;
    let end = text.rfind('|').unwrap_or(start);
    let span = &text[start..=end];

    let mut rows: Vec<Vec<String>> = span
        .lines()
        .filter(|line| line.contains('|'))
        .map(split_row)
        .filter(|cells| !cells.iter().all(String::is_empty))
        .collect();

    if rows.is_empty() {
        return Err(ExtractError::Parse {
            detail: "pipe-delimited span contains no table rows".into(),
        });
    }

    let columns = rows.remove(0);
    let width = columns.len();
    let body: Vec<Vec<String>> = rows
        .into_iter()
        .filter(|cells| !is_separator_row(cells))
        .map(|mut cells| {
            cells.resize(width, String::new());
            cells
        })
        .collect();

    Ok(TableResult {
        columns,
        rows: body,
    })
}

/// Split one markdown table line into trimmed cells.
fn split_row(line: &str) -> Vec<String> {
    line.trim()
        .trim_start_matches('|')
        .trim_end_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// The `| --- | :---: |` alignment row (and any stray repetition of it).
fn is_separator_row(cells: &[String]) -> bool {
    cells.iter().all(|cell| {
        !cell.is_empty() && cell.chars().all(|c| c == '-' || c == ':' || c == ' ')
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ── parse_object ─────────────────────────────────────────────────────

    #[test]
    fn strict_object() {
        let v = parse_object(r#"{"invoice_number": "INV-1", "total": "42.00"}"#).unwrap();
        assert_eq!(v["invoice_number"], "INV-1");
    }

    #[test]
    fn object_wrapped_in_prose_and_fences() {
        let v = parse_object(
            "Here is the extracted data:\n```json\n{\"total\": \"42.00\"}\n```\nLet me know!",
        )
        .unwrap();
        assert_eq!(v["total"], "42.00");
    }

    #[test]
    fn trailing_comma_repaired() {
        let v = parse_object(r#"{"a": "1", "b": "2",}"#).unwrap();
        assert_eq!(v["b"], "2");
    }

    #[test]
    fn bare_keys_repaired() {
        let v = parse_object(r#"{invoice_number: "INV-1", total: "9"}"#).unwrap();
        assert_eq!(v["invoice_number"], "INV-1");
    }

    #[test]
    fn single_quoted_strings_repaired() {
        let v = parse_object(r#"{'seller': 'ACME Corp'}"#).unwrap();
        assert_eq!(v["seller"], "ACME Corp");
    }

    #[test]
    fn truncated_brace_repaired() {
        let v = parse_object(r#"{"invoice_number": "INV-1", "invoice_date": "2024-01-01"#).unwrap();
        assert_eq!(v["invoice_date"], "2024-01-01");
    }

    #[test]
    fn truncated_array_repaired() {
        let v = parse_object(r#"[{"a": "1"}, {"a": "2""#).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn literals_survive_repair() {
        let v = parse_object(r#"{flag: true, missing: null, count: 3,}"#).unwrap();
        assert_eq!(v["flag"], true);
        assert_eq!(v["missing"], Value::Null);
        assert_eq!(v["count"], 3);
    }

    #[test]
    fn hopeless_input_is_parse_error() {
        let err = parse_object("I could not read the document, sorry.").unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn scalar_top_level_is_parse_error() {
        assert!(matches!(
            parse_object("42"),
            Err(ExtractError::Parse { .. })
        ));
    }

    // ── document_maps / answer_text ──────────────────────────────────────

    #[test]
    fn single_object_is_one_document() {
        let docs = document_maps(json!({"a": "1"}));
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["a"], "1");
    }

    #[test]
    fn array_is_one_document_per_object() {
        let docs = document_maps(json!([{"a": "1"}, {"a": "2"}, "junk"]));
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1]["a"], "2");
    }

    #[test]
    fn answer_rendering() {
        assert_eq!(answer_text(None), "");
        assert_eq!(answer_text(Some(&Value::Null)), "");
        assert_eq!(answer_text(Some(&json!("INV-1"))), "INV-1");
        assert_eq!(answer_text(Some(&json!(42.5))), "42.5");
        assert_eq!(answer_text(Some(&json!(true))), "true");
    }

    // ── parse_table ──────────────────────────────────────────────────────

    #[test]
    fn basic_table() {
        let table = parse_table(
            "Here are the line items:\n\
             | item | qty | price |\n\
             | --- | --- | --- |\n\
             | widget | 2 | 9.99 |\n\
             | gadget | 1 | 12.50 |\n\
             That is all.",
        )
        .unwrap();
        assert_eq!(table.columns, vec!["item", "qty", "price"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "price"), Some("12.50"));
    }

    #[test]
    fn table_without_separator_row() {
        let table = parse_table("| a | b |\n| 1 | 2 |").unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows, vec![vec!["1".to_string(), "2".to_string()]]);
    }

    #[test]
    fn ragged_rows_padded_and_truncated() {
        let table = parse_table(
            "| a | b | c |\n| --- | --- | --- |\n| 1 | 2 |\n| 1 | 2 | 3 | 4 |",
        )
        .unwrap();
        assert_eq!(table.rows[0], vec!["1", "2", ""]);
        assert_eq!(table.rows[1], vec!["1", "2", "3"]);
    }

    #[test]
    fn alignment_markers_are_skipped() {
        let table = parse_table("| a | b |\n| :--- | ---: |\n| 1 | 2 |").unwrap();
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn no_pipes_is_parse_error() {
        let err = parse_table("No table was found in this document.").unwrap_err();
        assert!(matches!(err, ExtractError::Parse { .. }));
    }

    #[test]
    fn round_trip_with_table_result() {
        let original = TableResult {
            columns: vec!["item".into(), "qty".into(), "price".into()],
            rows: vec![
                vec!["widget".into(), "2".into(), "9.99".into()],
                vec!["gadget".into(), "1".into(), "12.50".into()],
                vec!["doohickey".into(), "7".into(), "0.35".into()],
            ],
        };
        let parsed = parse_table(&original.to_markdown()).unwrap();
        assert_eq!(parsed, original);
    }
}
