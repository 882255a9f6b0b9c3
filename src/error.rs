//! Error types for the docharvest library.
//!
//! One enum, six kinds, two propagation policies:
//!
//! * [`ExtractError::Validation`] — caller misuse (bad schema, unsupported
//!   file). Always propagates out of [`crate::extract::Extractor::extract`].
//!
//! * Everything else (`Configuration`, `Connectivity`, `Auth`, `Provider`,
//!   `Parse`) is caught at the extraction-path boundary inside the
//!   orchestrator: the failed path degrades to an empty, correctly-shaped
//!   table and the error is logged. Callers of `extract` never see these.
//!
//! Keeping the full taxonomy visible in one enum (rather than collapsing to a
//! string early) makes the degrade-on-failure policy testable: tests assert
//! on the variant a mock gateway produced, not on message substrings.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the docharvest library.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Input errors (propagate to the caller) ────────────────────────────
    /// The requested schema or input file list is malformed.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// The file extension is outside the supported raster/PDF set.
    #[error("Unsupported file format '{extension}' for '{path}'\nSupported: {supported}")]
    UnsupportedFormat {
        path: PathBuf,
        extension: String,
        supported: String,
    },

    // ── Gateway errors (caught at the path boundary) ──────────────────────
    /// A required setting is missing, e.g. no endpoint for a self-hosted model.
    #[error("Missing configuration: {0}")]
    Configuration(String),

    /// The model endpoint could not be reached.
    #[error("Could not connect to model server at '{endpoint}': {detail}\nEnsure the server is running and accessible.")]
    Connectivity { endpoint: String, detail: String },

    /// The credential was rejected (HTTP 401/403).
    #[error("Authentication failed for model '{model}'. Check your API_KEY configuration.")]
    Auth { model: String },

    /// Any other upstream failure (5xx, malformed envelope, rate limit).
    #[error("Model provider error: {0}")]
    Provider(String),

    // ── Parse errors (caught at the path boundary) ────────────────────────
    /// Model output could not be interpreted even after the repair pass.
    #[error("Could not parse model response: {detail}")]
    Parse { detail: String },

    // ── Supporting I/O ────────────────────────────────────────────────────
    /// PDF rasterisation failed for a page.
    #[error("Rasterisation failed for '{path}' page {page}: {detail}")]
    Rasterisation {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    /// Reading, resizing, or writing an image failed.
    #[error("Image processing failed for '{path}': {detail}")]
    Image { path: PathBuf, detail: String },

    /// Unexpected internal error (task join, temp file creation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// Whether this error indicates caller misuse and must propagate out of
    /// the top-level extraction entry point instead of being degraded.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ExtractError::Validation(_)
                | ExtractError::FileNotFound { .. }
                | ExtractError::UnsupportedFormat { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_classification() {
        assert!(ExtractError::Validation("field 2 has no name".into()).is_validation());
        assert!(ExtractError::FileNotFound {
            path: "/tmp/x.png".into()
        }
        .is_validation());
        assert!(!ExtractError::Provider("HTTP 500".into()).is_validation());
        assert!(!ExtractError::Parse {
            detail: "no JSON object".into()
        }
        .is_validation());
    }

    #[test]
    fn connectivity_display_names_endpoint() {
        let e = ExtractError::Connectivity {
            endpoint: "http://localhost:8000".into(),
            detail: "connection refused".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("localhost:8000"), "got: {msg}");
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn auth_display_does_not_leak_key() {
        let e = ExtractError::Auth {
            model: "hosted_vllm/nanonets/Nanonets-OCR-s".into(),
        };
        assert!(e.to_string().contains("API_KEY"));
    }

    #[test]
    fn unsupported_format_display() {
        let e = ExtractError::UnsupportedFormat {
            path: "/tmp/doc.docx".into(),
            extension: ".docx".into(),
            supported: ".jpg, .pdf".into(),
        };
        assert!(e.to_string().contains(".docx"));
    }
}
