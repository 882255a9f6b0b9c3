//! Extraction orchestration: the top-level coordinator.
//!
//! [`Extractor::extract`] validates the request, prepares the documents,
//! then runs the field path and the table path — concurrently when both are
//! requested, since neither depends on the other and each owns its own copy
//! of the schema slice and document list.
//!
//! ## Failure policy
//!
//! Each path returns an explicit `Result`; the orchestrator alone decides
//! what a failure means. Validation errors propagate to the caller (they
//! indicate misuse), every other error is logged and the owning path
//! degrades to an empty table of the correct shape. Partial success — one
//! populated table, one empty — is the normal degraded outcome, not a
//! doubly-failed call.
//!
//! ## Field path
//!
//! Two sequential model calls: extract, then self-rate. The confidence call
//! chains off the first call's messages and answer, so it cannot be
//! parallelised. If the confidence call fails (transport or parse), the
//! answers are kept and every confidence defaults to `Low` — a missing
//! rating is not worth discarding a good extraction.

use crate::config::{ConfidencePadding, ExtractionConfig};
use crate::error::ExtractError;
use crate::output::{Confidence, FieldRow, FieldTable, TableResult};
use crate::pipeline::gateway::{ChatMessage, HttpGateway, ModelGateway, ResponseSchema};
use crate::pipeline::{parse, prepare};
use crate::prompts;
use crate::resources::TempRegistry;
use crate::schema::{ColumnSpec, ExtractionRequest, FieldSpec};
use serde_json::Map;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates document preparation and the two extraction paths.
pub struct Extractor {
    config: ExtractionConfig,
    /// Injected gateway, used as-is when present. Lets tests (or callers
    /// with custom middleware) bypass the HTTP implementation.
    gateway: Option<Arc<dyn ModelGateway>>,
    registry: TempRegistry,
}

impl Extractor {
    /// An extractor that builds an [`HttpGateway`] from the configuration
    /// on first use.
    pub fn new(config: ExtractionConfig) -> Self {
        let registry = TempRegistry::with_cleanup(config.cleanup_temp_files);
        Self {
            config,
            gateway: None,
            registry,
        }
    }

    /// An extractor with a caller-supplied gateway.
    pub fn with_gateway(config: ExtractionConfig, gateway: Arc<dyn ModelGateway>) -> Self {
        let registry = TempRegistry::with_cleanup(config.cleanup_temp_files);
        Self {
            config,
            gateway: Some(gateway),
            registry,
        }
    }

    /// Share an externally owned temp-file registry instead of the
    /// extractor's private one.
    pub fn with_registry(mut self, registry: TempRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// The registry tracking intermediate page images.
    pub fn registry(&self) -> &TempRegistry {
        &self.registry
    }

    fn resolve_gateway(&self) -> Result<Arc<dyn ModelGateway>, ExtractError> {
        match &self.gateway {
            Some(gateway) => Ok(Arc::clone(gateway)),
            None => Ok(Arc::new(HttpGateway::from_config(&self.config)?)),
        }
    }

    /// Extract the requested fields and table rows from `files`.
    ///
    /// # Returns
    /// Always a `(FieldTable, TableResult)` pair. A path that fails on the
    /// provider or parser degrades to an empty table of the correct shape.
    ///
    /// # Errors
    /// Only for invalid input: an unreadable or unsupported file. Schema
    /// validation happens at [`ExtractionRequest`] construction.
    pub async fn extract(
        &self,
        files: &[PathBuf],
        request: &ExtractionRequest,
    ) -> Result<(FieldTable, TableResult), ExtractError> {
        let requested_columns: Vec<String> = request
            .table_columns()
            .map(|c| c.name.clone())
            .collect();
        let empty_pair = || {
            (
                FieldTable::default(),
                TableResult::empty_with_columns(requested_columns.clone()),
            )
        };

        if request.is_empty() {
            warn!("No fields or table columns requested; nothing to extract");
            return Ok(empty_pair());
        }
        if files.is_empty() {
            warn!("No files provided; nothing to extract");
            return Ok(empty_pair());
        }

        prepare::validate_paths(files)?;

        info!(
            "Extracting {} field(s) and {} table column(s) from {} file(s) with '{}'",
            request.fields.len(),
            requested_columns.len(),
            files.len(),
            self.config.model
        );

        // All image I/O happens up front; both paths then read the same
        // immutable document list.
        let documents =
            match prepare::prepare_documents(files, self.config.max_image_size, &self.registry)
                .await
            {
                Ok(docs) => docs,
                Err(e) => {
                    warn!("Document preparation failed: {e}");
                    return Ok(empty_pair());
                }
            };

        let gateway = match self.resolve_gateway() {
            Ok(gw) => gw,
            Err(e) => {
                warn!("Gateway configuration failed: {e}");
                return Ok(empty_pair());
            }
        };

        let do_fields = !request.fields.is_empty();
        let do_tables = !requested_columns.is_empty();

        let (field_result, table_result) = if do_fields && do_tables {
            // Two independent tasks; each owns its own schema slice and
            // document list copy.
            let fields_task = tokio::spawn(field_path(
                Arc::clone(&gateway),
                self.config.clone(),
                request.fields.clone(),
                documents.clone(),
            ));
            let tables_task = tokio::spawn(table_path(
                Arc::clone(&gateway),
                self.config.clone(),
                request.table_columns().cloned().collect(),
                documents.clone(),
            ));
            let (fields, tables) = futures::future::join(fields_task, tables_task).await;
            (flatten_join(fields), flatten_join(tables))
        } else if do_fields {
            let fields = field_path(
                gateway,
                self.config.clone(),
                request.fields.clone(),
                documents,
            )
            .await;
            (fields, Err(ExtractError::Internal("not requested".into())))
        } else {
            let tables = table_path(
                gateway,
                self.config.clone(),
                request.table_columns().cloned().collect(),
                documents,
            )
            .await;
            (Err(ExtractError::Internal("not requested".into())), tables)
        };

        let field_table = match (do_fields, field_result) {
            (true, Ok(table)) => {
                debug!("Field path produced {} row(s)", table.len());
                table
            }
            (true, Err(e)) => {
                warn!("Field extraction failed, returning empty table: {e}");
                FieldTable::default()
            }
            (false, _) => FieldTable::default(),
        };

        let table_table = match (do_tables, table_result) {
            (true, Ok(table)) => {
                debug!("Table path produced {} row(s)", table.len());
                table
            }
            (true, Err(e)) => {
                warn!("Table extraction failed, returning empty table: {e}");
                TableResult::empty_with_columns(requested_columns)
            }
            (false, _) => TableResult::empty_with_columns(requested_columns),
        };

        Ok((field_table, table_table))
    }

    /// Probe the configured model with a one-token request.
    pub async fn check_model_availability(&self) -> bool {
        let gateway = match self.resolve_gateway() {
            Ok(gw) => gw,
            Err(e) => {
                warn!("Model '{}' is not available: {e}", self.config.model);
                return false;
            }
        };
        let ping = vec![ChatMessage::user(vec![
            crate::pipeline::gateway::ContentPart::text("Hello"),
        ])];
        match gateway.send(&ping, 1, 1, None).await {
            Ok(_) => {
                info!("Model '{}' is available", self.config.model);
                true
            }
            Err(e) => {
                warn!("Model '{}' is not available: {e}", self.config.model);
                false
            }
        }
    }
}

/// Convenience wrapper: build an [`Extractor`] and run one extraction.
pub async fn extract(
    files: &[PathBuf],
    config: &ExtractionConfig,
    request: &ExtractionRequest,
) -> Result<(FieldTable, TableResult), ExtractError> {
    Extractor::new(config.clone()).extract(files, request).await
}

fn flatten_join<T>(
    joined: Result<Result<T, ExtractError>, tokio::task::JoinError>,
) -> Result<T, ExtractError> {
    match joined {
        Ok(inner) => inner,
        Err(e) => Err(ExtractError::Internal(format!(
            "extraction task panicked: {e}"
        ))),
    }
}

// ── Field path ───────────────────────────────────────────────────────────

async fn field_path(
    gateway: Arc<dyn ModelGateway>,
    config: ExtractionConfig,
    fields: Vec<FieldSpec>,
    documents: Vec<PathBuf>,
) -> Result<FieldTable, ExtractError> {
    let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();

    // Call #1: extraction.
    let messages = prompts::field_messages(&fields, &documents)?;
    let schema = ResponseSchema::string_object(&names);
    let answer = gateway
        .send(&messages, config.max_tokens, config.completions, Some(&schema))
        .await?;
    debug!("Field extraction response: {} bytes", answer.len());

    let extracted = parse::document_maps(parse::parse_object(&answer)?);

    // Call #2: self-rated confidence, chained off call #1. A failure here
    // downgrades every rating instead of discarding the answers.
    let confidences = match confidence_pass(&gateway, &config, &messages, &answer, &names).await {
        Ok(maps) => maps,
        Err(e) => {
            warn!("Confidence pass failed, defaulting every field to Low: {e}");
            Vec::new()
        }
    };
    let confidences = normalize_confidences(confidences, extracted.len(), config.confidence_padding);

    let mut rows = Vec::with_capacity(extracted.len() * names.len());
    for (document_index, doc) in extracted.iter().enumerate() {
        let conf = confidences.get(document_index);
        for name in &names {
            rows.push(FieldRow {
                field: (*name).to_string(),
                answer: parse::answer_text(doc.get(*name)),
                confidence: confidence_for(conf, name),
                document_index,
            });
        }
    }
    rows.sort_by(|a, b| {
        (a.document_index, a.field.as_str()).cmp(&(b.document_index, b.field.as_str()))
    });

    Ok(FieldTable { rows })
}

async fn confidence_pass(
    gateway: &Arc<dyn ModelGateway>,
    config: &ExtractionConfig,
    prior: &[ChatMessage],
    prior_answer: &str,
    names: &[&str],
) -> Result<Vec<Map<String, serde_json::Value>>, ExtractError> {
    let messages = prompts::confidence_messages(prior, prior_answer, names);
    let schema = ResponseSchema::enum_object(names, &["High", "Low"]);
    let response = gateway
        .send(&messages, config.max_tokens, config.completions, Some(&schema))
        .await?;
    debug!("Confidence response: {} bytes", response.len());
    Ok(parse::document_maps(parse::parse_object(&response)?))
}

/// Align the confidence maps with the detected documents.
///
/// A single map is broadcast across every document; a shortfall is padded
/// per the configured policy. The model signals no document boundary
/// contract here, so this alignment is best-effort.
fn normalize_confidences(
    mut maps: Vec<Map<String, serde_json::Value>>,
    document_count: usize,
    padding: ConfidencePadding,
) -> Vec<Map<String, serde_json::Value>> {
    if maps.is_empty() {
        return Vec::new();
    }
    if maps.len() == 1 && document_count > 1 {
        let only = maps[0].clone();
        maps.resize(document_count, only);
        return maps;
    }
    if maps.len() < document_count {
        let filler = match padding {
            ConfidencePadding::RepeatFirst => maps[0].clone(),
            ConfidencePadding::LowFill => Map::new(),
        };
        maps.resize(document_count, filler);
    }
    maps.truncate(document_count);
    maps
}

fn confidence_for(map: Option<&Map<String, serde_json::Value>>, field: &str) -> Confidence {
    map.and_then(|m| m.get(field))
        .and_then(|v| v.as_str())
        .map(|s| s.parse().unwrap_or(Confidence::Low))
        .unwrap_or(Confidence::Low)
}

// ── Table path ───────────────────────────────────────────────────────────

async fn table_path(
    gateway: Arc<dyn ModelGateway>,
    config: ExtractionConfig,
    columns: Vec<ColumnSpec>,
    documents: Vec<PathBuf>,
) -> Result<TableResult, ExtractError> {
    let refs: Vec<&ColumnSpec> = columns.iter().collect();
    let messages = prompts::table_messages(&refs, &documents)?;
    // No structured-output constraint: the expected shape is a markdown
    // table, not JSON.
    let response = gateway
        .send(&messages, config.max_tokens, config.completions, None)
        .await?;
    debug!("Table extraction response: {} bytes", response.len());
    parse::parse_table(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn broadcast_single_confidence_map() {
        let map = json!({"a": "High"}).as_object().unwrap().clone();
        let out = normalize_confidences(vec![map], 3, ConfidencePadding::LowFill);
        assert_eq!(out.len(), 3);
        assert_eq!(out[2]["a"], "High");
    }

    #[test]
    fn repeat_first_padding() {
        let first = json!({"a": "High"}).as_object().unwrap().clone();
        let second = json!({"a": "Low"}).as_object().unwrap().clone();
        let out = normalize_confidences(vec![first, second], 4, ConfidencePadding::RepeatFirst);
        assert_eq!(out.len(), 4);
        assert_eq!(out[3]["a"], "High");
    }

    #[test]
    fn low_fill_padding() {
        let first = json!({"a": "High"}).as_object().unwrap().clone();
        let second = json!({"a": "Low"}).as_object().unwrap().clone();
        let out = normalize_confidences(vec![first, second], 4, ConfidencePadding::LowFill);
        assert_eq!(out.len(), 4);
        assert!(out[3].is_empty());
        assert_eq!(confidence_for(Some(&out[3]), "a"), Confidence::Low);
    }

    #[test]
    fn surplus_confidence_maps_truncated() {
        let maps: Vec<_> = (0..5)
            .map(|_| json!({"a": "High"}).as_object().unwrap().clone())
            .collect();
        let out = normalize_confidences(maps, 2, ConfidencePadding::RepeatFirst);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn confidence_lookup_defaults_to_low() {
        let map = json!({"a": "High", "b": 3}).as_object().unwrap().clone();
        assert_eq!(confidence_for(Some(&map), "a"), Confidence::High);
        // Non-string value and missing key both collapse to Low.
        assert_eq!(confidence_for(Some(&map), "b"), Confidence::Low);
        assert_eq!(confidence_for(Some(&map), "c"), Confidence::Low);
        assert_eq!(confidence_for(None, "a"), Confidence::Low);
    }
}
