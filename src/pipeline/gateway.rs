//! The request/response boundary to the vision-language model.
//!
//! [`ModelGateway`] is the one trait seam in the pipeline: the orchestrator
//! only ever sees "messages in, text out". [`HttpGateway`] implements it over
//! an OpenAI-compatible chat-completions endpoint with reqwest; tests swap in
//! a canned-response mock.
//!
//! ## Request shaping
//!
//! The [`Provider`](crate::config::Provider) variant chosen at configuration
//! time decides how a structured-output constraint travels: Ollama takes a
//! JSON schema under `format`, OpenRouter under `response_format`, hosted
//! OpenAI-compatible APIs only accept the generic
//! `{"type": "json_object"}` hint (and reject it unless the prompt mentions
//! JSON), and self-hosted vLLM gets no constraint at all — the parser's
//! repair pass covers it.
//!
//! Decoding is pinned to `temperature: 0` so repeated calls with identical
//! input are expected to be stable. Credentials are attached as a bearer
//! header and never logged.

use crate::config::{ExtractionConfig, Provider};
use crate::error::ExtractError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

/// Default endpoint bases for providers where the caller did not set one.
const OPENAI_BASE: &str = "https://api.openai.com";
const OPENROUTER_BASE: &str = "https://openrouter.ai/api";

// ── Wire types ───────────────────────────────────────────────────────────

/// A base64 data URI (or plain URL) image reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// One block of a multimodal message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }

    /// The text of a `Text` part, if any.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text { text } => Some(text),
            ContentPart::ImageUrl { .. } => None,
        }
    }
}

/// A role-tagged message in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: "user".into(),
            content,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: vec![ContentPart::text(text)],
        }
    }
}

/// A JSON-schema-shaped structured-output constraint.
#[derive(Debug, Clone, Serialize)]
pub struct ResponseSchema(pub serde_json::Value);

impl ResponseSchema {
    /// An object with one free-form string property per field name.
    pub fn string_object(field_names: &[&str]) -> Self {
        let properties: serde_json::Map<String, serde_json::Value> = field_names
            .iter()
            .map(|name| (name.to_string(), json!({"type": "string"})))
            .collect();
        Self(json!({"type": "object", "properties": properties}))
    }

    /// An object with one enum-constrained string property per field name.
    pub fn enum_object(field_names: &[&str], allowed: &[&str]) -> Self {
        let properties: serde_json::Map<String, serde_json::Value> = field_names
            .iter()
            .map(|name| (name.to_string(), json!({"type": "string", "enum": allowed})))
            .collect();
        Self(json!({"type": "object", "properties": properties}))
    }
}

// ── Completion envelope ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompletionEnvelope {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

// ── Gateway trait ────────────────────────────────────────────────────────

/// Request/response boundary to the VLM.
///
/// Implementations normalise every failure into one of the four gateway
/// error kinds (`Configuration`, `Connectivity`, `Auth`, `Provider`) — no
/// failure is ever swallowed.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Send a message sequence and return the first choice's content text.
    async fn send(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        completions: usize,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, ExtractError>;
}

// ── HTTP implementation ──────────────────────────────────────────────────

/// reqwest-backed [`ModelGateway`] for OpenAI-compatible endpoints.
pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    wire_model: String,
    provider: Provider,
    api_key: String,
}

impl HttpGateway {
    /// Resolve endpoint and credential from the configuration.
    ///
    /// Fails with [`ExtractError::Configuration`] when a self-hosted or
    /// Ollama model identifier is configured without an endpoint.
    pub fn from_config(config: &ExtractionConfig) -> Result<Self, ExtractError> {
        let provider = config.provider();
        let endpoint = match config.resolved_endpoint()? {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => match provider {
                Provider::OpenRouterCompatible => OPENROUTER_BASE.to_string(),
                _ => OPENAI_BASE.to_string(),
            },
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| ExtractError::Internal(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            model: config.model.clone(),
            wire_model: strip_routing_prefix(&config.model).to_string(),
            provider,
            api_key: config.credential().to_string(),
        })
    }

    /// Build the request body, applying the provider's constraint policy.
    fn request_body(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        completions: usize,
        schema: Option<&ResponseSchema>,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": self.wire_model,
            "messages": messages,
            "max_tokens": max_tokens,
            "n": completions,
            "temperature": 0,
        });

        if let Some(schema) = schema {
            match self.provider {
                Provider::SelfHosted => {}
                Provider::OllamaCompatible => {
                    body["format"] = schema.0.clone();
                }
                Provider::OpenRouterCompatible => {
                    body["response_format"] = schema.0.clone();
                }
                Provider::OpenAiCompatible => {
                    // The generic hint is rejected unless some prompt text
                    // actually says "json".
                    if prompt_mentions_json(messages) {
                        body["response_format"] = json!({"type": "json_object"});
                    }
                }
            }
        }

        body
    }
}

/// litellm-style routing prefixes are not part of the wire model name.
fn strip_routing_prefix(model: &str) -> &str {
    for prefix in ["hosted_vllm/", "ollama/", "openrouter/"] {
        if let Some(rest) = model.strip_prefix(prefix) {
            return rest;
        }
    }
    model
}

fn prompt_mentions_json(messages: &[ChatMessage]) -> bool {
    messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(ContentPart::as_text)
        .any(|t| t.to_lowercase().contains("json"))
}

#[async_trait]
impl ModelGateway for HttpGateway {
    async fn send(
        &self,
        messages: &[ChatMessage],
        max_tokens: usize,
        completions: usize,
        schema: Option<&ResponseSchema>,
    ) -> Result<String, ExtractError> {
        let url = format!("{}/v1/chat/completions", self.endpoint);
        let body = self.request_body(messages, max_tokens, completions, schema);
        debug!(
            "Dispatching {} message(s) to '{}' at {}",
            messages.len(),
            self.model,
            self.endpoint
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ExtractError::Connectivity {
                        endpoint: self.endpoint.clone(),
                        detail: sanitize_reqwest_error(&e),
                    }
                } else {
                    ExtractError::Provider(sanitize_reqwest_error(&e))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ExtractError::Auth {
                model: self.model.clone(),
            });
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!("Model request failed: HTTP {status}");
            return Err(ExtractError::Provider(format!(
                "HTTP {status}: {}",
                truncate(&detail, 500)
            )));
        }

        let envelope: CompletionEnvelope = response
            .json()
            .await
            .map_err(|e| ExtractError::Provider(format!("malformed completion envelope: {e}")))?;

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ExtractError::Provider("completion contained no choices".into()))
    }
}

/// reqwest error strings can embed the full request URL; keep only the
/// error chain so credentials in query strings can never leak into logs.
fn sanitize_reqwest_error(e: &reqwest::Error) -> String {
    let mut detail = e.to_string();
    let mut source: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(e);
    while let Some(s) = source {
        detail = s.to_string();
        source = std::error::Error::source(s);
    }
    detail
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway_for(model: &str, endpoint: Option<&str>) -> HttpGateway {
        let mut builder = ExtractionConfig::builder().model(model);
        if let Some(url) = endpoint {
            builder = builder.endpoint(url);
        }
        HttpGateway::from_config(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn self_hosted_requires_endpoint() {
        let config = ExtractionConfig::builder()
            .model("hosted_vllm/nanonets/Nanonets-OCR-s")
            .build()
            .unwrap();
        assert!(matches!(
            HttpGateway::from_config(&config),
            Err(ExtractError::Configuration(_))
        ));
    }

    #[test]
    fn routing_prefix_stripped_from_wire_model() {
        assert_eq!(
            strip_routing_prefix("hosted_vllm/nanonets/Nanonets-OCR-s"),
            "nanonets/Nanonets-OCR-s"
        );
        assert_eq!(strip_routing_prefix("ollama/llama3.2-vision"), "llama3.2-vision");
        assert_eq!(strip_routing_prefix("gpt-4o"), "gpt-4o");
    }

    #[test]
    fn body_is_deterministic() {
        let gw = gateway_for("hosted_vllm/nanonets/Nanonets-OCR-s", Some("http://localhost:8000"));
        let messages = vec![ChatMessage::user(vec![ContentPart::text("hello")])];
        let body = gw.request_body(&messages, 5000, 1, None);
        assert_eq!(body["temperature"], 0);
        assert_eq!(body["n"], 1);
        assert_eq!(body["max_tokens"], 5000);
        assert_eq!(body["model"], "nanonets/Nanonets-OCR-s");
    }

    #[test]
    fn self_hosted_omits_constraint() {
        let gw = gateway_for("hosted_vllm/m", Some("http://localhost:8000"));
        let schema = ResponseSchema::string_object(&["total"]);
        let messages = vec![ChatMessage::user(vec![ContentPart::text("Return JSON")])];
        let body = gw.request_body(&messages, 100, 1, Some(&schema));
        assert!(body.get("format").is_none());
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn ollama_sends_format_key() {
        let gw = gateway_for("ollama/llama3.2-vision", Some("http://localhost:11434"));
        let schema = ResponseSchema::string_object(&["total"]);
        let messages = vec![ChatMessage::user(vec![ContentPart::text("extract")])];
        let body = gw.request_body(&messages, 100, 1, Some(&schema));
        assert_eq!(body["format"]["type"], "object");
        assert!(body["format"]["properties"].get("total").is_some());
    }

    #[test]
    fn openrouter_sends_response_format() {
        let gw = gateway_for("openrouter/qwen/qwen2.5-vl-72b", None);
        let schema = ResponseSchema::enum_object(&["total"], &["High", "Low"]);
        let messages = vec![ChatMessage::user(vec![ContentPart::text("extract")])];
        let body = gw.request_body(&messages, 100, 1, Some(&schema));
        assert_eq!(
            body["response_format"]["properties"]["total"]["enum"],
            json!(["High", "Low"])
        );
    }

    #[test]
    fn openai_hint_depends_on_prompt_text() {
        let gw = gateway_for("gpt-4o", None);
        let schema = ResponseSchema::string_object(&["total"]);

        let plain = vec![ChatMessage::user(vec![ContentPart::text("extract the total")])];
        let body = gw.request_body(&plain, 100, 1, Some(&schema));
        assert!(body.get("response_format").is_none());

        let with_json = vec![ChatMessage::user(vec![ContentPart::text(
            "Return a JSON object with the total",
        )])];
        let body = gw.request_body(&with_json, 100, 1, Some(&schema));
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn enum_schema_shape() {
        let schema = ResponseSchema::enum_object(&["a", "b"], &["High", "Low"]);
        assert_eq!(schema.0["properties"]["a"]["enum"][0], "High");
        assert_eq!(schema.0["properties"]["b"]["type"], "string");
    }

    #[test]
    fn message_serialisation_matches_wire_shape() {
        let msg = ChatMessage::user(vec![
            ContentPart::text("describe"),
            ContentPart::image("data:image/png;base64,AAAA"),
        ]);
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"][0]["type"], "text");
        assert_eq!(v["content"][1]["type"], "image_url");
        assert_eq!(v["content"][1]["image_url"]["url"], "data:image/png;base64,AAAA");
    }
}
