//! Hosted language-model clients.
//!
//! - `"groq"` — [`GroqModel`], the OpenAI-compatible chat completions API.
//! - `"gemini"` — [`GeminiModel`], Google's `generateContent` API.
//! - `"disabled"` — [`DisabledModel`], which fails every call with
//!   [`LlmError::NotConfigured`].
//!
//! A provider whose API key is missing from the environment is replaced by a
//! [`DisabledModel`], so the service still starts and answers with the
//! configuration message instead of crashing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use sportello_core::llm::{GenerationParams, LanguageModel, LlmError};

use crate::config::LlmConfig;

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| LlmError::Http(e.to_string()))
}

async fn post_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<serde_json::Value, LlmError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(provider, %status, "language model request rejected");
        return Err(LlmError::Status {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::Http(e.to_string()))
}

/// Groq chat completions client. Requires `GROQ_API_KEY`.
pub struct GroqModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GroqModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GROQ_BASE_URL.to_string()),
            model: config.model_name(),
        })
    }
}

#[async_trait]
impl LanguageModel for GroqModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": params.temperature,
            "top_p": params.top_p,
            "max_tokens": params.max_tokens,
        });
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "groq request");

        let request = self.client.post(&url).bearer_auth(&self.api_key);
        let json = post_json("groq", request, &body).await?;
        parse_chat_completion(&json)
    }
}

/// Extract `choices[0].message.content`.
pub fn parse_chat_completion(json: &serde_json::Value) -> Result<String, LlmError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .ok_or(LlmError::EmptyResponse { provider: "groq" })
}

/// Gemini `generateContent` client. Requires `GEMINI_API_KEY`.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            model: config.model_name(),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "temperature": params.temperature,
                "topP": params.top_p,
                "maxOutputTokens": params.max_tokens,
            },
        });
        debug!(model = %self.model, prompt_chars = prompt.chars().count(), "gemini request");

        let request = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key);
        let json = post_json("gemini", request, &body).await?;
        parse_gemini_response(&json)
    }
}

/// Concatenate the text parts of the first candidate.
pub fn parse_gemini_response(json: &serde_json::Value) -> Result<String, LlmError> {
    let text: String = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(LlmError::EmptyResponse { provider: "gemini" });
    }
    Ok(text.to_string())
}

/// Stand-in used when no provider is usable.
pub struct DisabledModel {
    provider: &'static str,
}

impl DisabledModel {
    pub fn new(provider: &'static str) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl LanguageModel for DisabledModel {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured {
            provider: self.provider,
        })
    }
}

/// Build the model named by `llm.provider`, reading its key from the
/// environment.
pub fn create_model(config: &LlmConfig) -> Arc<dyn LanguageModel> {
    create_model_with_key(config, |var| std::env::var(var).ok())
}

fn create_model_with_key(
    config: &LlmConfig,
    key_for: impl Fn(&str) -> Option<String>,
) -> Arc<dyn LanguageModel> {
    let (provider, key_var): (&'static str, &str) = match config.provider.as_str() {
        "groq" => ("groq", "GROQ_API_KEY"),
        "gemini" => ("gemini", "GEMINI_API_KEY"),
        _ => return Arc::new(DisabledModel::new("llm")),
    };

    let Some(api_key) = key_for(key_var).filter(|k| !k.trim().is_empty()) else {
        warn!(provider, "{} not set, answers will report a configuration error", key_var);
        return Arc::new(DisabledModel::new(provider));
    };

    let built: Result<Arc<dyn LanguageModel>, LlmError> = match provider {
        "gemini" => GeminiModel::new(config, api_key).map(|m| Arc::new(m) as Arc<dyn LanguageModel>),
        _ => GroqModel::new(config, api_key).map(|m| Arc::new(m) as Arc<dyn LanguageModel>),
    };
    match built {
        Ok(model) => model,
        Err(e) => {
            warn!(provider, error = %e, "failed to build language model client");
            Arc::new(DisabledModel::new(provider))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_completion() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "  Il CUP è attivo 24/7. "}}]
        });
        assert_eq!(parse_chat_completion(&json).unwrap(), "Il CUP è attivo 24/7.");

        let empty = serde_json::json!({"choices": [{"message": {"content": ""}}]});
        assert!(matches!(
            parse_chat_completion(&empty),
            Err(LlmError::EmptyResponse { .. })
        ));
    }

    #[test]
    fn test_parse_gemini_joins_parts() {
        let json = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "Secondo il documento, "}, {"text": "sì."}]}}]
        });
        assert_eq!(parse_gemini_response(&json).unwrap(), "Secondo il documento, sì.");
        assert!(parse_gemini_response(&serde_json::json!({"candidates": []})).is_err());
    }

    #[tokio::test]
    async fn test_missing_key_yields_not_configured() {
        let config = LlmConfig::default();
        let model = create_model_with_key(&config, |_| None);
        let err = model
            .generate("ciao", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { provider: "groq" }));
    }

    #[test]
    fn test_provider_selection() {
        let mut config = LlmConfig::default();
        let key = |_: &str| Some("k".to_string());
        assert_eq!(create_model_with_key(&config, key).name(), "llama-3.3-70b-versatile");

        config.provider = "gemini".to_string();
        assert_eq!(create_model_with_key(&config, key).name(), "gemini-1.5-flash");

        config.provider = "disabled".to_string();
        assert_eq!(create_model_with_key(&config, key).name(), "disabled");
    }
}
