//! Prompt construction for field, table, and confidence requests.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how fields are enumerated or how
//!    the confidence rating is phrased requires editing exactly one place.
//!
//! 2. **Testability** — unit tests inspect the built message sequences
//!    directly without a real VLM, so prompt regressions are cheap to catch.
//!
//! Field and column names are enumerated deterministically, in request
//! order, so the keys of the model's JSON (and the headers of its table)
//! are addressable by exact name during parsing.

use crate::error::ExtractError;
use crate::pipeline::encode::image_part;
use crate::pipeline::gateway::{ChatMessage, ContentPart};
use crate::schema::{ColumnSpec, FieldSpec};
use std::fmt::Write as _;
use std::path::PathBuf;

const FIELDS_PREAMBLE: &str = "You are an expert document analyst. Extract the requested fields \
from the attached document images.\n\nFields to extract:";

const FIELDS_RULES: &str = "\nRules:\n\
- Answer with a single JSON object whose keys are exactly the field names above.\n\
- If several separate documents are attached, answer with a JSON array containing \
one object per document, in the order the images appear.\n\
- Every value must be a string. Use \"\" when a field is not present.\n\
- Output ONLY the JSON, with no commentary.";

const TABLES_PREAMBLE: &str = "You are an expert document analyst. Extract the line-item table \
from the attached document images.\n\nColumns to extract:";

const TABLES_RULES: &str = "\nRules:\n\
- Answer with a single markdown pipe table whose header row contains exactly \
the column names above, in the same order.\n\
- One table row per line item found in the documents.\n\
- Use an empty cell when a value is not present.\n\
- Output ONLY the table, with no commentary.";

/// Enumerate `name: description` lines in request order.
fn enumerate_specs<'a>(specs: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut out = String::new();
    for (name, description) in specs {
        if description.is_empty() {
            let _ = writeln!(out, "- {name}");
        } else {
            let _ = writeln!(out, "- {name}: {description}");
        }
    }
    out
}

fn attach_images(
    mut parts: Vec<ContentPart>,
    images: &[PathBuf],
) -> Result<Vec<ContentPart>, ExtractError> {
    for path in images {
        parts.push(image_part(path)?);
    }
    Ok(parts)
}

/// Build the field-extraction request: one user turn carrying the
/// instruction text followed by every document image.
pub fn field_messages(
    fields: &[FieldSpec],
    images: &[PathBuf],
) -> Result<Vec<ChatMessage>, ExtractError> {
    let listing = enumerate_specs(
        fields
            .iter()
            .map(|f| (f.name.as_str(), f.description.as_str())),
    );
    let text = format!("{FIELDS_PREAMBLE}\n{listing}{FIELDS_RULES}");
    let parts = attach_images(vec![ContentPart::text(text)], images)?;
    Ok(vec![ChatMessage::user(parts)])
}

/// Build the table-extraction request.
pub fn table_messages(
    columns: &[&ColumnSpec],
    images: &[PathBuf],
) -> Result<Vec<ChatMessage>, ExtractError> {
    let listing = enumerate_specs(
        columns
            .iter()
            .map(|c| (c.name.as_str(), c.description.as_str())),
    );
    let text = format!("{TABLES_PREAMBLE}\n{listing}{TABLES_RULES}");
    let parts = attach_images(vec![ContentPart::text(text)], images)?;
    Ok(vec![ChatMessage::user(parts)])
}

/// Chain the confidence request onto the field conversation.
///
/// The prior messages and the model's own answer are echoed back so the
/// model grades what it actually said — a two-pass self-critique, not a
/// fresh extraction.
pub fn confidence_messages(
    prior: &[ChatMessage],
    prior_answer: &str,
    field_names: &[&str],
) -> Vec<ChatMessage> {
    let listing = enumerate_specs(field_names.iter().map(|n| (*n, "")));
    let text = format!(
        "Rate the reliability of each field you just extracted.\n\n\
         Fields:\n{listing}\n\
         Answer with a single JSON object whose keys are exactly the field \
         names above and whose values are \"High\" or \"Low\". Use \"High\" \
         only when the value is clearly legible in the document and matches \
         your answer. Output ONLY the JSON."
    );

    let mut messages = prior.to_vec();
    messages.push(ChatMessage::assistant(prior_answer));
    messages.push(ChatMessage::user(vec![ContentPart::text(text)]));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn sample_image(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("doc.png");
        RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        path
    }

    fn first_text(messages: &[ChatMessage]) -> &str {
        messages[0].content[0].as_text().unwrap()
    }

    #[test]
    fn field_prompt_enumerates_names_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let img = sample_image(&dir);
        let fields = vec![
            FieldSpec::with_description("invoice_number", "Invoice number"),
            FieldSpec::new("seller_name"),
        ];
        let messages = field_messages(&fields, &[img]).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
        let text = first_text(&messages);
        let a = text.find("invoice_number").unwrap();
        let b = text.find("seller_name").unwrap();
        assert!(a < b, "fields must appear in request order");
        assert!(text.contains("- invoice_number: Invoice number"));
        assert!(text.contains("- seller_name\n"));
        // The OpenAI json_object hint keys off this word being present.
        assert!(text.to_lowercase().contains("json"));
        // Instruction first, then one image part.
        assert_eq!(messages[0].content.len(), 2);
    }

    #[test]
    fn field_prompt_attaches_every_image() {
        let dir = tempfile::tempdir().unwrap();
        let img = sample_image(&dir);
        let messages =
            field_messages(&[FieldSpec::new("total")], &[img.clone(), img.clone(), img]).unwrap();
        assert_eq!(messages[0].content.len(), 4);
    }

    #[test]
    fn table_prompt_names_columns() {
        let dir = tempfile::tempdir().unwrap();
        let img = sample_image(&dir);
        let columns = vec![
            ColumnSpec::table("Quantity", "Total quantity"),
            ColumnSpec::table("Unit Price", ""),
        ];
        let refs: Vec<&ColumnSpec> = columns.iter().collect();
        let messages = table_messages(&refs, &[img]).unwrap();
        let text = first_text(&messages);
        assert!(text.contains("- Quantity: Total quantity"));
        assert!(text.contains("- Unit Price"));
        assert!(text.contains("markdown pipe table"));
    }

    #[test]
    fn confidence_prompt_chains_prior_conversation() {
        let prior = vec![ChatMessage::user(vec![ContentPart::text("extract stuff")])];
        let answer = r#"{"total": "42.00"}"#;
        let messages = confidence_messages(&prior, answer, &["total"]);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content[0].as_text(), Some(answer));
        let grading = messages[2].content[0].as_text().unwrap();
        assert!(grading.contains("\"High\" or \"Low\""));
        assert!(grading.contains("- total"));
    }
}
