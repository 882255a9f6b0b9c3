//! Configuration for document extraction.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`] or loaded from the environment with
//! [`ExtractionConfig::from_env`]. Keeping every knob in one struct makes it
//! trivial to share configs across the two extraction paths and to diff two
//! runs to understand why their outputs differ.
//!
//! # Provider capabilities
//!
//! The model identifier decides, once, which [`Provider`] variant shapes the
//! request: whether an endpoint is mandatory, which credential is attached,
//! and how a structured-output constraint is encoded. Downstream code matches
//! on the variant rather than re-inspecting the identifier string.

use crate::error::ExtractError;
use serde::{Deserialize, Serialize};

/// Recognised environment variables.
const ENV_MODEL_URL: &str = "VLM_MODEL_URL";
const ENV_API_KEY: &str = "API_KEY";
const ENV_MAX_IMAGE_SIZE: &str = "MAX_IMAGE_SIZE";
const ENV_CLEANUP: &str = "CLEANUP_TEMP_FILES";

/// Placeholder credential sent to self-hosted servers that ignore auth.
const PLACEHOLDER_API_KEY: &str = "EMPTY";

/// Request-shaping capability class of a model endpoint.
///
/// Selected once from the model identifier at configuration time; each
/// variant carries its own policy for endpoints, credentials, and
/// structured-output constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    /// vLLM or similar OpenAI-compatible server run by the caller
    /// (`hosted_vllm/...`). Requires an endpoint; no constraint support
    /// assumed, the parser's repair pass covers it.
    SelfHosted,
    /// Ollama server (`ollama/...`). Requires an endpoint; accepts a JSON
    /// schema via the `format` request key.
    OllamaCompatible,
    /// OpenAI or compatible hosted API. Endpoint optional; accepts
    /// `response_format: {"type": "json_object"}` when the prompt mentions
    /// JSON.
    OpenAiCompatible,
    /// OpenRouter aggregator (`openrouter/...`). Endpoint optional; accepts
    /// a full JSON schema via `response_format`.
    OpenRouterCompatible,
}

impl Provider {
    /// Classify a model identifier.
    pub fn from_model(model: &str) -> Self {
        if model.starts_with("hosted_vllm/") {
            Provider::SelfHosted
        } else if model.starts_with("ollama/") {
            Provider::OllamaCompatible
        } else if model.starts_with("openrouter/") {
            Provider::OpenRouterCompatible
        } else {
            Provider::OpenAiCompatible
        }
    }

    /// Whether this provider cannot work without a configured endpoint base.
    pub fn requires_endpoint(&self) -> bool {
        matches!(self, Provider::SelfHosted | Provider::OllamaCompatible)
    }
}

/// How to pad per-document confidence maps when the model returned fewer
/// confidence objects than extracted documents.
///
/// The model has no documented contract for signalling document boundaries,
/// so the padding is best-effort and the policy is a caller decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfidencePadding {
    /// Repeat the first confidence map for the remaining documents.
    #[default]
    RepeatFirst,
    /// Mark every field of the remaining documents as low confidence.
    LowFill,
}

/// Configuration for an extraction run.
///
/// # Example
/// ```rust
/// use docharvest::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .model("hosted_vllm/nanonets/Nanonets-OCR-s")
///     .endpoint("http://localhost:8000")
///     .max_image_size(1024)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Model identifier, e.g. `hosted_vllm/nanonets/Nanonets-OCR-s` or
    /// `gpt-4o`. Decides the [`Provider`] capability class.
    pub model: String,

    /// Endpoint base URL for self-hosted or Ollama servers
    /// (`VLM_MODEL_URL`). Optional for hosted APIs.
    pub endpoint: Option<String>,

    /// API credential (`API_KEY`). Defaults to a placeholder accepted by
    /// servers that do not check auth. Masked in logs.
    pub api_key: Option<String>,

    /// Longest allowed image edge in pixels (`MAX_IMAGE_SIZE`). Default: 1024.
    ///
    /// Caps what the preparer sends to the model: VLM accuracy plateaus
    /// around 1k–2k px while request size grows quadratically.
    pub max_image_size: u32,

    /// Maximum tokens the model may generate per call. Default: 5000.
    ///
    /// Extraction answers are short but table responses can run long;
    /// setting this too low truncates the markdown table mid-row.
    pub max_tokens: usize,

    /// Number of completions requested per call (`n`). Default: 1.
    pub completions: usize,

    /// Per-call HTTP timeout in seconds. Default: 120.
    ///
    /// There is no cancellation support in the extraction paths; a hung
    /// request blocks its path until this transport timeout fires.
    pub api_timeout_secs: u64,

    /// Whether temp files created during preparation are removed when the
    /// registry is dropped (`CLEANUP_TEMP_FILES`). Default: true.
    pub cleanup_temp_files: bool,

    /// Padding policy for short confidence responses. Default: repeat first.
    pub confidence_padding: ConfidencePadding,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: "hosted_vllm/nanonets/Nanonets-OCR-s".to_string(),
            endpoint: None,
            api_key: None,
            max_image_size: 1024,
            max_tokens: 5000,
            completions: 1,
            api_timeout_secs: 120,
            cleanup_temp_files: true,
            confidence_padding: ConfidencePadding::default(),
        }
    }
}

impl ExtractionConfig {
    /// Create a new builder.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load endpoint, credential, image cap, and cleanup flag from the
    /// environment, keeping defaults for everything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(ENV_MODEL_URL) {
            if !url.is_empty() {
                config.endpoint = Some(url);
            }
        }
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }
        if let Ok(size) = std::env::var(ENV_MAX_IMAGE_SIZE) {
            if let Ok(px) = size.parse::<u32>() {
                config.max_image_size = px.max(64);
            }
        }
        if let Ok(flag) = std::env::var(ENV_CLEANUP) {
            config.cleanup_temp_files = flag.to_lowercase() == "true";
        }
        config
    }

    /// The provider capability class for the configured model.
    pub fn provider(&self) -> Provider {
        Provider::from_model(&self.model)
    }

    /// The credential to attach, falling back to the placeholder.
    pub fn credential(&self) -> &str {
        self.api_key.as_deref().unwrap_or(PLACEHOLDER_API_KEY)
    }

    /// Endpoint base, validated against the provider's requirements.
    pub fn resolved_endpoint(&self) -> Result<Option<&str>, ExtractError> {
        match (&self.endpoint, self.provider().requires_endpoint()) {
            (Some(url), _) => Ok(Some(url.as_str())),
            (None, false) => Ok(None),
            (None, true) => Err(ExtractError::Configuration(format!(
                "{ENV_MODEL_URL} is required for model '{}'. \
                 Set it to the URL of your VLM/Ollama server \
                 (e.g. 'http://localhost:8000').",
                self.model
            ))),
        }
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn max_image_size(mut self, px: u32) -> Self {
        self.config.max_image_size = px.max(64);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn completions(mut self, n: usize) -> Self {
        self.config.completions = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn cleanup_temp_files(mut self, v: bool) -> Self {
        self.config.cleanup_temp_files = v;
        self
    }

    pub fn confidence_padding(mut self, policy: ConfidencePadding) -> Self {
        self.config.confidence_padding = policy;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.model.is_empty() {
            return Err(ExtractError::Validation(
                "model identifier must not be empty".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ExtractError::Validation("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_classification() {
        assert_eq!(
            Provider::from_model("hosted_vllm/nanonets/Nanonets-OCR-s"),
            Provider::SelfHosted
        );
        assert_eq!(
            Provider::from_model("ollama/llama3.2-vision"),
            Provider::OllamaCompatible
        );
        assert_eq!(
            Provider::from_model("openrouter/qwen/qwen2.5-vl-72b"),
            Provider::OpenRouterCompatible
        );
        assert_eq!(Provider::from_model("gpt-4o"), Provider::OpenAiCompatible);
        assert_eq!(
            Provider::from_model("claude-sonnet-4"),
            Provider::OpenAiCompatible
        );
    }

    #[test]
    fn endpoint_required_for_self_hosted() {
        let config = ExtractionConfig::builder()
            .model("hosted_vllm/nanonets/Nanonets-OCR-s")
            .build()
            .unwrap();
        let err = config.resolved_endpoint().unwrap_err();
        assert!(matches!(err, ExtractError::Configuration(_)));
        assert!(err.to_string().contains("VLM_MODEL_URL"));
    }

    #[test]
    fn endpoint_optional_for_hosted_api() {
        let config = ExtractionConfig::builder().model("gpt-4o").build().unwrap();
        assert_eq!(config.resolved_endpoint().unwrap(), None);
    }

    #[test]
    fn credential_defaults_to_placeholder() {
        let config = ExtractionConfig::default();
        assert_eq!(config.credential(), "EMPTY");

        let config = ExtractionConfig::builder()
            .api_key("sk-test")
            .build()
            .unwrap();
        assert_eq!(config.credential(), "sk-test");
    }

    #[test]
    fn builder_rejects_empty_model() {
        let result = ExtractionConfig::builder().model("").build();
        assert!(matches!(result, Err(ExtractError::Validation(_))));
    }

    #[test]
    fn image_size_floor() {
        let config = ExtractionConfig::builder().max_image_size(1).build().unwrap();
        assert_eq!(config.max_image_size, 64);
    }
}
