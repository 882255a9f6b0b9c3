//! Extraction schema: what to pull out of the documents.
//!
//! A request names scalar *fields* (one value per document) and *table
//! columns* (zero or more rows per document batch). Both forms the original
//! configuration surface accepted are supported: an explicit pair of lists
//! ([`ExtractionRequest::new`]) and a unified tabular source where every row
//! carries a kind tag ([`ExtractionRequest::from_rows`]).
//!
//! Validation is strict and happens before any file or network I/O: an entry
//! without a name is caller misuse and fails the whole request.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};

/// One scalar value to extract per document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key the model is asked to answer under. Unique within a request.
    pub name: String,
    /// Optional hint shown to the model, e.g. "Return in format YYYY-MM-DD".
    #[serde(default)]
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

/// Whether a unified schema row describes a scalar field or a table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Field,
    Table,
}

/// A unified schema entry. Only `Table`-tagged entries participate in table
/// extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    #[serde(default)]
    pub description: String,
}

impl ColumnSpec {
    pub fn table(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Table,
            description: description.into(),
        }
    }
}

/// The validated schema pair driving one extraction call.
///
/// Invariant: every entry has a non-empty name. Construction is the only way
/// to obtain one, so downstream code never re-checks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub fields: Vec<FieldSpec>,
    pub tables: Vec<ColumnSpec>,
}

impl ExtractionRequest {
    /// Build from explicit field and table-column lists.
    pub fn new(fields: Vec<FieldSpec>, tables: Vec<ColumnSpec>) -> Result<Self, ExtractError> {
        let request = Self { fields, tables };
        request.validate()?;
        Ok(request)
    }

    /// Build from a unified tabular source: every row is `(name, kind,
    /// description)`. `Field` rows become [`FieldSpec`]s, `Table` rows stay
    /// as table columns, in source order.
    pub fn from_rows(rows: Vec<ColumnSpec>) -> Result<Self, ExtractError> {
        let mut fields = Vec::new();
        let mut tables = Vec::new();
        for row in rows {
            match row.kind {
                ColumnKind::Field => fields.push(FieldSpec {
                    name: row.name,
                    description: row.description,
                }),
                ColumnKind::Table => tables.push(row),
            }
        }
        Self::new(fields, tables)
    }

    /// Neither fields nor table columns were requested.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.table_columns().next().is_none()
    }

    /// The entries that participate in table extraction.
    pub fn table_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.tables.iter().filter(|c| c.kind == ColumnKind::Table)
    }

    /// Requested field names, in order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    fn validate(&self) -> Result<(), ExtractError> {
        for (i, field) in self.fields.iter().enumerate() {
            if field.name.trim().is_empty() {
                return Err(ExtractError::Validation(format!(
                    "field {i} has an empty name"
                )));
            }
        }
        for (i, column) in self.tables.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(ExtractError::Validation(format!(
                    "table column {i} has an empty name"
                )));
            }
        }
        Ok(())
    }
}

// ── Built-in templates ───────────────────────────────────────────────────

/// Ready-made schemas for common document types.
pub mod templates {
    use super::*;

    /// Invoice header fields: number, date, amount, currency, parties, tax ids.
    pub fn invoice_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::with_description("invoice_number", "Invoice number"),
            FieldSpec::with_description("invoice_date", "Invoice date"),
            FieldSpec::with_description("invoice_amount", "Invoice amount"),
            FieldSpec::with_description(
                "invoice_currency",
                "Invoice currency. If not explicitly mentioned, return ''",
            ),
            FieldSpec::with_description(
                "seller_name",
                "Seller name. If not explicitly mentioned, return ''",
            ),
            FieldSpec::with_description("buyer_name", "Buyer name"),
            FieldSpec::with_description("seller_tax_id", "Seller tax id"),
            FieldSpec::with_description("buyer_tax_id", "Buyer tax id"),
        ]
    }

    /// Invoice line-item columns.
    pub fn invoice_line_items() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::table("Quantity", "Total quantity of the product"),
            ColumnSpec::table("items_description", "Description of the product"),
            ColumnSpec::table("Unit Price", "Unit price of the product"),
            ColumnSpec::table("Total Price", "Total price of the product"),
        ]
    }

    /// Passport data-page fields.
    pub fn passport_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::with_description("full_name", "Full name"),
            FieldSpec::with_description("date_of_birth", "Date of birth. Return in format YYYY-MM-DD"),
            FieldSpec::with_description("passport_number", "Passport number"),
            FieldSpec::with_description("date_of_issue", "Date of issue. Return in format YYYY-MM-DD"),
            FieldSpec::with_description("date_of_expiry", "Date of expiry. Return in format YYYY-MM-DD"),
            FieldSpec::with_description("nationality", "Nationality"),
            FieldSpec::with_description("gender", "Gender"),
        ]
    }
}
