//! Result tables returned by an extraction call.
//!
//! Two shapes come back from [`crate::extract::Extractor::extract`]:
//!
//! * [`FieldTable`] — one [`FieldRow`] per `(document_index, field)` pair,
//!   sorted by that key. A successful field path always contains exactly
//!   `documents_detected × fields` rows; a missing model answer is an empty
//!   string, never a missing row.
//!
//! * [`TableResult`] — free-form columns matching the requested table column
//!   names, zero or more rows. The model may batch several documents into
//!   one table; no per-document split is attempted.
//!
//! Both degrade to their empty-but-well-shaped form when the owning path
//! fails, so callers can always iterate without `Option` gymnastics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary self-rating the model assigns to its own prior answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Confidence {
    High,
    /// Anything the model did not explicitly rate `High`, including parse
    /// failures of the confidence round-trip.
    #[default]
    Low,
}

impl FromStr for Confidence {
    type Err = ();

    /// Lenient: unknown ratings collapse to `Low` rather than erroring, so a
    /// chatty model ("high!", "very low") cannot break row assembly.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("high") {
            Ok(Confidence::High)
        } else {
            Ok(Confidence::Low)
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confidence::High => write!(f, "High"),
            Confidence::Low => write!(f, "Low"),
        }
    }
}

/// One extracted scalar value for one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRow {
    /// Requested field name.
    pub field: String,
    /// Model answer, possibly empty.
    pub answer: String,
    /// Self-rated reliability from the confidence pass.
    pub confidence: Confidence,
    /// Zero-based index of the document the answer belongs to.
    pub document_index: usize,
}

/// The field-extraction result table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTable {
    pub rows: Vec<FieldRow>,
}

impl FieldTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Look up one answer by document index and field name.
    pub fn answer(&self, document_index: usize, field: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.document_index == document_index && r.field == field)
            .map(|r| r.answer.as_str())
    }
}

/// The table-extraction result: named columns, string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    /// Header names in model output order.
    pub columns: Vec<String>,
    /// Body rows; every row has exactly `columns.len()` cells.
    pub rows: Vec<Vec<String>>,
}

impl TableResult {
    /// An empty table carrying the requested column shape, used when the
    /// table path degrades on failure.
    pub fn empty_with_columns(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Cell lookup by row index and column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Serialise as a GFM pipe table (header, separator, body).
    ///
    /// Round-trips through [`crate::pipeline::parse::parse_table`] for cell
    /// content that contains no `|` or newline.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str("| ");
        out.push_str(&self.columns.join(" | "));
        out.push_str(" |\n| ");
        out.push_str(
            &self
                .columns
                .iter()
                .map(|_| "---")
                .collect::<Vec<_>>()
                .join(" | "),
        );
        out.push_str(" |\n");
        for row in &self.rows {
            out.push_str("| ");
            out.push_str(&row.join(" | "));
            out.push_str(" |\n");
        }
        out
    }
}
