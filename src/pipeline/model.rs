//! The generative model behind menu structuring.
//!
//! The structurer needs one capability: *given a prompt, return a string that
//! should be JSON*. [`MenuModel`] is exactly that, so the rest of the crate
//! never sees provider SDKs and tests can swap in a canned reply.
//!
//! Two adapters are provided:
//!
//! - [`GeminiModel`] talks to the Gemini `generateContent` REST endpoint
//!   directly so it can request `responseMimeType: application/json`, which
//!   makes the model emit bare JSON.
//! - [`ProviderModel`] wraps any `edgequake-llm` provider (OpenAI, Anthropic,
//!   Ollama, ...). Those providers have no portable JSON mode, so a JSON-only
//!   system message is sent instead.
//!
//! [`resolve_model`] picks one from the pipeline configuration.

use crate::config::PipelineConfig;
use crate::error::MenuError;
use crate::prompts::JSON_ONLY_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Model used when only `GEMINI_API_KEY` is available.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";

/// Model used for a named non-Gemini provider when none is configured.
pub const DEFAULT_PROVIDER_MODEL: &str = "gpt-4.1-mini";

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// What shape of reply the caller expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseFormat {
    /// A single JSON document.
    #[default]
    Json,
    /// Free text.
    Text,
}

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOptions {
    pub response_format: ResponseFormat,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl GenerationOptions {
    /// JSON output with the configured temperature and token cap.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            response_format: ResponseFormat::Json,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            response_format: ResponseFormat::Json,
            temperature: 0.2,
            max_tokens: 8192,
        }
    }
}

/// A text-generation capability: prompt in, reply text out.
///
/// Implementations make exactly one request per call and never retry.
#[async_trait]
pub trait MenuModel: Send + Sync {
    /// Provider label for logs and errors, e.g. `gemini/gemini-1.5-flash`.
    fn name(&self) -> &str;

    /// Whether [`ResponseFormat::Json`] is enforced by the provider itself,
    /// so a reply is always a bare JSON document.
    fn native_json_mode(&self) -> bool {
        false
    }

    /// Send `prompt` and return the raw reply text.
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, MenuError>;
}

// ── edgequake-llm adapter ────────────────────────────────────────────────

/// Any `edgequake-llm` chat provider as a [`MenuModel`].
pub struct ProviderModel {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderModel {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

/// The chat turns sent for one structuring request.
fn build_messages(prompt: &str, format: ResponseFormat) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if format == ResponseFormat::Json {
        messages.push(ChatMessage::system(JSON_ONLY_SYSTEM_PROMPT));
    }
    messages.push(ChatMessage::user(prompt));
    messages
}

#[async_trait]
impl MenuModel for ProviderModel {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, MenuError> {
        let messages = build_messages(prompt, options.response_format);
        let completion = CompletionOptions {
            temperature: Some(options.temperature),
            max_tokens: Some(options.max_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&completion))
            .await
            .map_err(|e| MenuError::ModelCallFailed {
                provider: self.label.clone(),
                detail: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

// ── Native Gemini ────────────────────────────────────────────────────────

/// Gemini `generateContent` over REST.
#[derive(Debug, Clone)]
pub struct GeminiModel {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    label: String,
}

impl GeminiModel {
    /// `timeout_secs` bounds the whole HTTP exchange; the structurer applies
    /// its own timeout on top.
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self, MenuError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| MenuError::Internal(format!("HTTP client: {e}")))?;
        let model = model.into();
        Ok(Self {
            http,
            api_key: api_key.into(),
            label: format!("gemini/{model}"),
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Point the client at another endpoint (a proxy or a local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

/// The `generateContent` request body.
pub(crate) fn gemini_request_body(prompt: &str, options: &GenerationOptions) -> Value {
    let mut generation_config = json!({
        "temperature": options.temperature,
        "maxOutputTokens": options.max_tokens,
    });
    if options.response_format == ResponseFormat::Json {
        generation_config["responseMimeType"] = json!("application/json");
    }
    json!({
        "contents": [
            {
                "role": "user",
                "parts": [{ "text": prompt }]
            }
        ],
        "generationConfig": generation_config,
    })
}

/// Concatenate the text parts of the first candidate.
pub(crate) fn gemini_candidate_text(body: &Value) -> Option<String> {
    let parts = body
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .and_then(|item| item.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[async_trait]
impl MenuModel for GeminiModel {
    fn name(&self) -> &str {
        &self.label
    }

    fn native_json_mode(&self) -> bool {
        true
    }

    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, MenuError> {
        let failed = |detail: String| MenuError::ModelCallFailed {
            provider: self.label.clone(),
            detail,
        };

        let response = self
            .http
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&gemini_request_body(prompt, options))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    failed("request timed out".to_string())
                } else {
                    failed(format!("network error: {e}"))
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(failed("authentication rejected; check GEMINI_API_KEY".into()));
            }
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(failed("rate limited or quota exhausted".into()));
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                let body: String = body.chars().take(500).collect();
                return Err(failed(format!("status {status}: {body}")));
            }
            _ => {}
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| failed(format!("response body is not JSON: {e}")))?;

        if let Some(usage) = body.get("usageMetadata") {
            let prompt_tokens = usage.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0);
            let reply_tokens = usage
                .get("candidatesTokenCount")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            debug!(
                "{}: {} prompt tokens, {} candidate tokens",
                self.label, prompt_tokens, reply_tokens
            );
        }

        gemini_candidate_text(&body).ok_or_else(|| {
            let reason = body
                .pointer("/promptFeedback/blockReason")
                .or_else(|| body.pointer("/candidates/0/finishReason"))
                .and_then(Value::as_str)
                .unwrap_or("no text candidate");
            failed(format!("empty response ({reason})"))
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

fn create_provider(name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, MenuError> {
    ProviderFactory::create_llm_provider(name, model).map_err(|e| MenuError::ProviderNotConfigured {
        provider: name.to_string(),
        hint: format!("{e}"),
    })
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn gemini_from_env(model: &str, timeout_secs: u64) -> Result<Arc<dyn MenuModel>, MenuError> {
    let key = env_nonempty("GEMINI_API_KEY")
        .or_else(|| env_nonempty("GOOGLE_API_KEY"))
        .ok_or_else(|| MenuError::ProviderNotConfigured {
            provider: "gemini".to_string(),
            hint: "Set GEMINI_API_KEY (or GOOGLE_API_KEY).".to_string(),
        })?;
    Ok(Arc::new(GeminiModel::new(key, model, timeout_secs)?))
}

/// Pick the structuring model, from most to least specific:
///
/// 1. `config.model_client`, used as-is.
/// 2. `config.provider_name`: `gemini` uses [`GeminiModel`], anything else
///    goes through `ProviderFactory::create_llm_provider`.
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set.
/// 4. `GEMINI_API_KEY`, with `config.model` or [`DEFAULT_GEMINI_MODEL`].
/// 5. `ProviderFactory::from_env()` auto-detection.
pub fn resolve_model(config: &PipelineConfig) -> Result<Arc<dyn MenuModel>, MenuError> {
    if let Some(ref client) = config.model_client {
        return Ok(Arc::clone(client));
    }

    if let Some(ref name) = config.provider_name {
        if name.eq_ignore_ascii_case("gemini") {
            let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
            return gemini_from_env(model, config.api_timeout_secs);
        }
        let model = config.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
        let provider = create_provider(name, model)?;
        return Ok(Arc::new(ProviderModel::new(provider, format!("{name}/{model}"))));
    }

    if let (Some(prov), Some(model)) = (
        env_nonempty("EDGEQUAKE_LLM_PROVIDER"),
        env_nonempty("EDGEQUAKE_MODEL"),
    ) {
        if prov.eq_ignore_ascii_case("gemini") {
            return gemini_from_env(&model, config.api_timeout_secs);
        }
        let provider = create_provider(&prov, &model)?;
        return Ok(Arc::new(ProviderModel::new(provider, format!("{prov}/{model}"))));
    }

    if env_nonempty("GEMINI_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_GEMINI_MODEL);
        info!("Using Gemini ({}) from GEMINI_API_KEY", model);
        return gemini_from_env(model, config.api_timeout_secs);
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| MenuError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!(
            "No LLM provider could be auto-detected from environment.\n\
            Set GEMINI_API_KEY, OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
            Error: {}",
            e
        ),
    })?;
    Ok(Arc::new(ProviderModel::new(llm, "auto")))
}

/// Pick a vision-capable provider for [`crate::pipeline::ocr::VisionOcr`].
///
/// Same chain as [`resolve_model`] minus the pre-built client and native
/// Gemini steps; returns the provider with a label.
pub fn resolve_vision_provider(
    config: &PipelineConfig,
) -> Result<(Arc<dyn LLMProvider>, String), MenuError> {
    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_PROVIDER_MODEL);
        return Ok((create_provider(name, model)?, format!("{name}/{model}")));
    }

    if let (Some(prov), Some(model)) = (
        env_nonempty("EDGEQUAKE_LLM_PROVIDER"),
        env_nonempty("EDGEQUAKE_MODEL"),
    ) {
        return Ok((create_provider(&prov, &model)?, format!("{prov}/{model}")));
    }

    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| MenuError::ProviderNotConfigured {
        provider: "auto".to_string(),
        hint: format!("No vision provider could be auto-detected from environment: {e}"),
    })?;
    Ok((llm, "auto".to_string()))
}
