//! # docharvest
//!
//! Extract structured data — named scalar fields and tabular line items —
//! from scanned documents (images, PDFs) using a Vision Language Model.
//!
//! ## Why a VLM?
//!
//! Classic OCR plus regexes breaks on every new invoice layout. A VLM reads
//! the page as a human would, so the caller only declares *what* to extract
//! (a schema of field and column names) and the model finds the values
//! regardless of layout. The crate's job is everything around that call:
//! building prompts from the schema, shipping the images, and turning the
//! model's half-structured text back into typed tables.
//!
//! ## Pipeline Overview
//!
//! ```text
//! files (PDF / images)
//!  │
//!  ├─ 1. Prepare   validate, rasterise PDFs via pdfium, cap image sizes
//!  ├─ 2. Prompt    schema + base64 images → role-tagged message sequence
//!  ├─ 3. Gateway   OpenAI-compatible chat-completions call (temperature 0)
//!  ├─ 4. Parse     JSON repair for fields, pipe-table parsing for tables
//!  └─ 5. Assemble  (document_index, field) rows + confidence round-trip
//! ```
//!
//! The field path and the table path run concurrently when both are
//! requested. A path that fails on the provider or the parser degrades to
//! an empty, correctly-shaped table — callers always get two tables back,
//! and only invalid input (bad schema, unsupported file) is an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docharvest::{extract, ExtractionConfig, ExtractionRequest, FieldSpec};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoint and credential from VLM_MODEL_URL / API_KEY
//!     let config = ExtractionConfig::from_env();
//!     let request = ExtractionRequest::new(
//!         vec![
//!             FieldSpec::with_description("invoice_number", "Invoice number"),
//!             FieldSpec::with_description("invoice_date", "Invoice date"),
//!         ],
//!         vec![],
//!     )?;
//!     let (fields, _tables) = extract(&["invoice.pdf".into()], &config, &request).await?;
//!     for row in &fields.rows {
//!         println!("doc {} {} = {} ({})", row.document_index, row.field, row.answer, row.confidence);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Confidence
//!
//! Every field answer carries a binary High/Low rating obtained by a second
//! model call that replays the first conversation and asks the model to
//! grade its own answers. When that round-trip fails for any reason, the
//! answers are kept and every rating defaults to Low.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod resources;
pub mod schema;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConfidencePadding, ExtractionConfig, ExtractionConfigBuilder, Provider};
pub use error::ExtractError;
pub use extract::{extract, Extractor};
pub use output::{Confidence, FieldRow, FieldTable, TableResult};
pub use pipeline::gateway::{ChatMessage, ContentPart, HttpGateway, ModelGateway, ResponseSchema};
pub use resources::TempRegistry;
pub use schema::{templates, ColumnKind, ColumnSpec, ExtractionRequest, FieldSpec};
