//! Pipeline stages for document extraction.
//!
//! Each submodule implements exactly one transformation step, so each is
//! independently testable and swappable without touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! prepare ──▶ encode ──▶ gateway ──▶ parse
//! (pdfium,    (base64)   (VLM HTTP)  (JSON repair,
//!  resize)                            pipe tables)
//! ```
//!
//! 1. [`prepare`] — validate inputs, rasterise PDFs, cap image sizes; runs
//!    before either extraction path starts
//! 2. [`encode`]  — image file → base64 data-URI content part
//! 3. [`gateway`] — the [`gateway::ModelGateway`] trait and its reqwest
//!    implementation; the only stage with network I/O
//! 4. [`parse`]   — model text → typed records, with a repair pass for
//!    near-valid JSON

pub mod encode;
pub mod gateway;
pub mod parse;
pub mod prepare;
