//! Language-model abstraction.
//!
//! The answer pipeline only needs "prompt in, text out". Hosted providers
//! (Groq, Gemini) are implemented in the app crate; [`ScriptedModel`] is a
//! deterministic stand-in for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// No API key (or provider) configured.
    #[error("{provider} is not configured")]
    NotConfigured { provider: &'static str },

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("{provider} returned status {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

/// Sampling parameters for one generation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    /// Near-deterministic sampling with a bounded output.
    fn default() -> Self {
        Self {
            temperature: 0.1,
            top_p: 0.1,
            max_tokens: 1024,
        }
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;
}

/// A model that replays queued replies and records every prompt it sees.
///
/// Once the queue is exhausted it answers with `default_reply`, or fails
/// when built with [`ScriptedModel::failing`].
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    replies: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
    default_reply: Option<String>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into_iter().map(|r| Ok(r.to_string())).collect())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            default_reply: Some("VALID".to_string()),
        }
    }

    pub fn failing() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            default_reply: None,
        }
    }

    /// Queue a failing call after the replies already queued.
    #[must_use]
    pub fn then_fail(self, message: &str) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(message.to_string()));
        }
        self
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String, LlmError> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(LlmError::Other(message)),
            None => self
                .default_reply
                .clone()
                .ok_or_else(|| LlmError::Other("scripted model failure".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replays_in_order() {
        let m = ScriptedModel::new(vec!["uno", "due"]).then_fail("boom");
        let p = GenerationParams::default();
        assert_eq!(m.generate("a", &p).await.unwrap(), "uno");
        assert_eq!(m.generate("b", &p).await.unwrap(), "due");
        assert!(m.generate("c", &p).await.is_err());
        assert_eq!(m.generate("d", &p).await.unwrap(), "VALID");
        assert_eq!(m.prompts(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_failing_model() {
        let m = ScriptedModel::failing();
        assert!(m.generate("x", &GenerationParams::default()).await.is_err());
        assert_eq!(m.calls(), 1);
    }
}
