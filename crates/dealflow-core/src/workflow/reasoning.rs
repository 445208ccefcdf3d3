//! Reasoning service — the outbound contract every step and the classifier
//! call through, plus a reference HTTP client.
//!
//! The engine only ever sees [`ReasoningService`]: a template id and a set
//! of named input fields go in, text comes out. [`HttpReasoningClient`]
//! resolves the template id against a [`PromptLibrary`] and calls either the
//! Anthropic Messages API or an OpenAI-compatible chat completions endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflow::prompts::PromptLibrary;

/// Value of one input field. Fields a step declares but the context cannot
/// supply are passed explicitly as `NotAvailable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "value")]
pub enum FieldValue {
    Available(String),
    NotAvailable,
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Available(v) => Some(v.as_str()),
            Self::NotAvailable => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputField {
    pub name: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReasoningRequest {
    pub template_id: String,
    pub fields: Vec<InputField>,
}

impl ReasoningRequest {
    pub fn new(template_id: impl Into<String>) -> Self {
        Self {
            template_id: template_id.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.fields.push(InputField {
            name: name.into(),
            value: match value {
                Some(v) => FieldValue::Available(v.to_string()),
                None => FieldValue::NotAvailable,
            },
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Render the fields as the user message of a chat call.
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(|f| {
                format!(
                    "## {}\n{}",
                    f.name,
                    f.value.as_str().unwrap_or("Not available")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ReasoningError {
    #[error("Reasoning call timed out after {0} ms")]
    Timeout(u64),

    #[error("Reasoning service rate limited: {0}")]
    RateLimited(String),

    #[error("Reasoning service unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid reasoning request: {0}")]
    InvalidInput(String),

    #[error("Malformed reasoning output: {0}")]
    MalformedOutput(String),
}

impl ReasoningError {
    /// Transient failures are worth one more attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Unavailable(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::RateLimited(_) => "rate_limited",
            Self::Unavailable(_) => "unavailable",
            Self::InvalidInput(_) => "invalid_input",
            Self::MalformedOutput(_) => "malformed_output",
        }
    }
}

/// Anything that can turn a template id plus input fields into text.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}

// ─── HTTP client ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Anthropic Messages API (`POST {base}/v1/messages`).
    Anthropic,
    /// OpenAI-compatible chat completions (`POST {base}/chat/completions`).
    OpenAi,
}

impl Provider {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "openai-compatible" => Some(Self::OpenAi),
            _ => None,
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com/v1",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-sonnet-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReasoningConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: u32,
    /// Transport-level timeout. The step invoker applies its own, usually
    /// shorter, per-call bound on top.
    pub request_timeout: Duration,
}

impl ReasoningConfig {
    /// Build a config from the process environment.
    ///
    /// `DEALFLOW_PROVIDER` selects `openai` (default) or `anthropic`; the key
    /// is read from `OPENAI_API_KEY` or `ANTHROPIC_API_KEY` accordingly.
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let provider = match get("DEALFLOW_PROVIDER") {
            Some(p) => Provider::from_str(&p)
                .ok_or_else(|| format!("Unknown DEALFLOW_PROVIDER '{}'", p))?,
            None => Provider::OpenAi,
        };

        let api_key = get(provider.api_key_var()).ok_or_else(|| {
            format!(
                "No API key found. Set {} for the '{}' provider.",
                provider.api_key_var(),
                match provider {
                    Provider::Anthropic => "anthropic",
                    Provider::OpenAi => "openai",
                }
            )
        })?;

        let temperature = match get("DEFAULT_TEMPERATURE") {
            Some(t) => Some(
                t.parse::<f64>()
                    .map_err(|_| format!("Invalid DEFAULT_TEMPERATURE '{}'", t))?,
            ),
            None => Some(0.7),
        };

        let request_timeout = match get("DEALFLOW_REQUEST_TIMEOUT_SECS") {
            Some(s) => Duration::from_secs(
                s.parse::<u64>()
                    .map_err(|_| format!("Invalid DEALFLOW_REQUEST_TIMEOUT_SECS '{}'", s))?,
            ),
            None => Duration::from_secs(300),
        };

        Ok(Self {
            provider,
            base_url: get("DEALFLOW_BASE_URL")
                .unwrap_or_else(|| provider.default_base_url().to_string()),
            api_key,
            model: get("DEFAULT_MODEL").unwrap_or_else(|| provider.default_model().to_string()),
            temperature,
            max_tokens: 4096,
            request_timeout,
        })
    }
}

/// Calls a hosted model over HTTP.
pub struct HttpReasoningClient {
    client: reqwest::Client,
    config: ReasoningConfig,
    prompts: PromptLibrary,
}

impl HttpReasoningClient {
    pub fn new(config: ReasoningConfig, prompts: PromptLibrary) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.request_timeout)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            prompts,
        }
    }

    pub fn config(&self) -> &ReasoningConfig {
        &self.config
    }

    async fn call_anthropic(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ReasoningError> {
        let url = format!("{}/v1/messages", self.config.base_url.trim_end_matches('/'));

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "system": system_prompt,
            "messages": [
                { "role": "user", "content": user_prompt }
            ]
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!(
            "[Reasoning] Calling Anthropic API: {} (model: {})",
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.config.request_timeout))?;

        let json = read_json(response, self.config.request_timeout).await?;
        extract_anthropic_text(&json).ok_or_else(|| {
            ReasoningError::MalformedOutput("response has no text content blocks".to_string())
        })
    }

    async fn call_openai(
        &self,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, ReasoningError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );

        let mut body = serde_json::json!({
            "model": self.config.model,
            "max_tokens": self.config.max_tokens,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_prompt }
            ]
        });
        if let Some(temp) = self.config.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        tracing::debug!(
            "[Reasoning] Calling OpenAI-compatible API: {} (model: {})",
            url,
            self.config.model
        );

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.config.request_timeout))?;

        let json = read_json(response, self.config.request_timeout).await?;
        extract_openai_text(&json).ok_or_else(|| {
            ReasoningError::MalformedOutput("response has no message content".to_string())
        })
    }
}

#[async_trait]
impl ReasoningService for HttpReasoningClient {
    async fn invoke(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let template = self.prompts.get(&request.template_id).ok_or_else(|| {
            ReasoningError::InvalidInput(format!(
                "Unknown instruction template '{}'",
                request.template_id
            ))
        })?;
        let user_prompt = request.render();

        match self.config.provider {
            Provider::Anthropic => self.call_anthropic(&template.system_prompt, &user_prompt).await,
            Provider::OpenAi => self.call_openai(&template.system_prompt, &user_prompt).await,
        }
    }
}

async fn read_json(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<serde_json::Value, ReasoningError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| map_transport_error(e, timeout))?;

    if !status.is_success() {
        return Err(classify_status(status.as_u16(), &text));
    }

    serde_json::from_str(&text)
        .map_err(|e| ReasoningError::MalformedOutput(format!("response is not JSON: {}", e)))
}

fn map_transport_error(e: reqwest::Error, timeout: Duration) -> ReasoningError {
    if e.is_timeout() {
        ReasoningError::Timeout(timeout.as_millis() as u64)
    } else if e.is_builder() {
        ReasoningError::InvalidInput(e.to_string())
    } else {
        ReasoningError::Unavailable(e.to_string())
    }
}

/// Map a non-success HTTP status to a reasoning error.
fn classify_status(status: u16, body: &str) -> ReasoningError {
    let detail = format!("HTTP {}: {}", status, truncate(body, 300));
    match status {
        429 => ReasoningError::RateLimited(detail),
        408 => ReasoningError::Timeout(0),
        s if s >= 500 => ReasoningError::Unavailable(detail),
        _ => ReasoningError::InvalidInput(detail),
    }
}

fn extract_anthropic_text(json: &serde_json::Value) -> Option<String> {
    json.get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| {
            blocks
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
                .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
                .map(str::to_string)
                .reduce(|a, b| format!("{}\n{}", a, b))
        })
}

fn extract_openai_text(json: &serde_json::Value) -> Option<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_render_marks_missing_fields() {
        let request = ReasoningRequest::new("valuer")
            .with_field("query", Some("Value Acme"))
            .with_field("deal_size", None);
        assert_eq!(
            request.render(),
            "## query\nValue Acme\n\n## deal_size\nNot available"
        );
        assert_eq!(request.field("deal_size"), Some(&FieldValue::NotAvailable));
    }

    #[test]
    fn test_transient_errors() {
        assert!(ReasoningError::Timeout(10).is_transient());
        assert!(ReasoningError::RateLimited("slow down".into()).is_transient());
        assert!(ReasoningError::Unavailable("503".into()).is_transient());
        assert!(!ReasoningError::InvalidInput("bad".into()).is_transient());
        assert!(!ReasoningError::MalformedOutput("empty".into()).is_transient());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(classify_status(429, ""), ReasoningError::RateLimited(_)));
        assert!(matches!(classify_status(503, ""), ReasoningError::Unavailable(_)));
        assert!(matches!(classify_status(500, ""), ReasoningError::Unavailable(_)));
        assert!(matches!(classify_status(400, "bad"), ReasoningError::InvalidInput(_)));
        assert!(matches!(classify_status(401, ""), ReasoningError::InvalidInput(_)));
    }

    #[test]
    fn test_extract_anthropic_text() {
        let json = serde_json::json!({
            "content": [
                { "type": "text", "text": "first" },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": "second" }
            ]
        });
        assert_eq!(extract_anthropic_text(&json).as_deref(), Some("first\nsecond"));
        assert_eq!(extract_anthropic_text(&serde_json::json!({})), None);
    }

    #[test]
    fn test_extract_openai_text() {
        let json = serde_json::json!({
            "choices": [ { "message": { "role": "assistant", "content": "buyer_ma" } } ]
        });
        assert_eq!(extract_openai_text(&json).as_deref(), Some("buyer_ma"));
        assert_eq!(extract_openai_text(&serde_json::json!({ "choices": [] })), None);
    }

    #[test]
    fn test_config_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("DEALFLOW_PROVIDER", "anthropic"),
            ("ANTHROPIC_API_KEY", "sk-test"),
            ("DEFAULT_TEMPERATURE", "0.2"),
        ]
        .into_iter()
        .collect();
        let config =
            ReasoningConfig::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.provider, Provider::Anthropic);
        assert_eq!(config.api_key, "sk-test");
        assert_eq!(config.base_url, "https://api.anthropic.com");
        assert_eq!(config.temperature, Some(0.2));
    }

    #[test]
    fn test_config_requires_key_for_provider() {
        let err = ReasoningConfig::from_lookup(|k| match k {
            "ANTHROPIC_API_KEY" => Some("sk-ant".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(err.contains("OPENAI_API_KEY"));

        let err = ReasoningConfig::from_lookup(|k| match k {
            "DEALFLOW_PROVIDER" => Some("mystery".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(err.contains("mystery"));
    }

    #[tokio::test]
    async fn test_unknown_template_is_invalid_input() {
        let config = ReasoningConfig::from_lookup(|k| match k {
            "OPENAI_API_KEY" => Some("sk-test".to_string()),
            "DEALFLOW_BASE_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .unwrap();
        let client = HttpReasoningClient::new(config, PromptLibrary::builtin());
        let err = client
            .invoke(&ReasoningRequest::new("no_such_template"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReasoningError::InvalidInput(_)));
    }
}
