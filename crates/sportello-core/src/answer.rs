//! Grounded answer composition.
//!
//! [`Answerer::answer`] turns retrieved passages into the reply shown to the
//! user:
//!
//! 1. No passages: fixed "nothing found" text, the model is never called.
//! 2. Score confidence, build the grounded prompt, call the model.
//! 3. Depending on [`ValidationMode`], ask the model to judge the draft.
//! 4. If the draft was judged invalid, or was not judged while confidence is
//!    low, replace it with the extractive composer's output.
//! 5. Below the confidence threshold, prefix a reliability annotation.
//!
//! Model failures never escape: they become a user-facing error string.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::confidence;
use crate::llm::{GenerationParams, LanguageModel, LlmError};
use crate::models::{ConversationTurn, RetrievedPassage};
use crate::prompt;

/// When to run the second, judging model call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    Always,
    /// Only when confidence is below the threshold.
    #[default]
    LowConfidence,
    Never,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnswerConfig {
    /// Passages included in the prompt.
    pub context_passages: usize,
    /// Previous turns included in the prompt.
    pub history_turns: usize,
    pub validation: ValidationMode,
    pub confidence_threshold: f64,
    pub extractive_fallback: bool,
    /// Sentences kept per passage by the extractive composer.
    pub extractive_sentences: usize,
    pub generation: GenerationParams,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            context_passages: 3,
            history_turns: 3,
            validation: ValidationMode::default(),
            confidence_threshold: 0.6,
            extractive_fallback: true,
            extractive_sentences: 2,
            generation: GenerationParams::default(),
        }
    }
}

/// How the final text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStrategy {
    Generated,
    Extractive,
    NothingFound,
    Failed,
}

impl AnswerStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Extractive => "extractive",
            Self::NothingFound => "nothing_found",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnswerOutcome {
    pub text: String,
    pub confidence: f64,
    pub strategy: AnswerStrategy,
    /// Judge verdict; `None` when no judgment was made.
    pub validated: Option<bool>,
    pub passages: Vec<RetrievedPassage>,
}

pub struct Answerer {
    model: Arc<dyn LanguageModel>,
    config: AnswerConfig,
}

impl Answerer {
    pub fn new(model: Arc<dyn LanguageModel>, config: AnswerConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &AnswerConfig {
        &self.config
    }

    pub async fn answer(
        &self,
        question: &str,
        recent_turns: &[ConversationTurn],
        passages: Vec<RetrievedPassage>,
    ) -> AnswerOutcome {
        if passages.is_empty() {
            return AnswerOutcome {
                text: prompt::NOTHING_FOUND.to_string(),
                confidence: 0.0,
                strategy: AnswerStrategy::NothingFound,
                validated: None,
                passages,
            };
        }

        let cfg = &self.config;
        let confidence = confidence::score(&passages);
        let low_confidence = confidence < cfg.confidence_threshold;

        let turns_from = recent_turns.len().saturating_sub(cfg.history_turns);
        let answer_prompt = prompt::build_answer_prompt(
            question,
            &recent_turns[turns_from..],
            &passages,
            cfg.context_passages,
        );

        let draft = match self.model.generate(&answer_prompt, &cfg.generation).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => {
                return self.failed(
                    LlmError::EmptyResponse { provider: "model" },
                    confidence,
                    passages,
                )
            }
            Err(e) => return self.failed(e, confidence, passages),
        };

        let should_validate = match cfg.validation {
            ValidationMode::Always => true,
            ValidationMode::LowConfidence => low_confidence,
            ValidationMode::Never => false,
        };
        let validated = if should_validate {
            Some(self.judge(&draft, &passages).await)
        } else {
            None
        };

        let use_extractive = cfg.extractive_fallback
            && (validated == Some(false) || (validated.is_none() && low_confidence));

        let (mut text, strategy) = if use_extractive {
            let text = prompt::extractive_answer(
                question,
                &passages,
                cfg.context_passages,
                cfg.extractive_sentences,
            )
            .unwrap_or_else(|| prompt::NO_SPECIFIC_INFO.to_string());
            (text, AnswerStrategy::Extractive)
        } else {
            (draft, AnswerStrategy::Generated)
        };

        if low_confidence {
            text = prompt::annotate_confidence(&text, confidence);
        }

        info!(
            confidence,
            strategy = strategy.as_str(),
            validated = ?validated,
            passages = passages.len(),
            "answer composed"
        );

        AnswerOutcome {
            text,
            confidence,
            strategy,
            validated,
            passages,
        }
    }

    /// Any reply other than a leading `VALID`, and any call failure, is invalid.
    async fn judge(&self, draft: &str, passages: &[RetrievedPassage]) -> bool {
        let judge_prompt =
            prompt::build_validation_prompt(draft, passages, self.config.context_passages);
        match self.model.generate(&judge_prompt, &self.config.generation).await {
            Ok(reply) => {
                let valid = prompt::parse_verdict(&reply);
                debug!(valid, "validation verdict");
                valid
            }
            Err(e) => {
                warn!(error = %e, "validation call failed, treating draft as invalid");
                false
            }
        }
    }

    fn failed(&self, error: LlmError, confidence: f64, passages: Vec<RetrievedPassage>) -> AnswerOutcome {
        let text = match &error {
            LlmError::NotConfigured { .. } => prompt::MODEL_NOT_CONFIGURED.to_string(),
            other => format!("❌ Errore durante la generazione della risposta: {}", other),
        };
        warn!(error = %error, model = self.model.name(), "answer generation failed");
        AnswerOutcome {
            text,
            confidence,
            strategy: AnswerStrategy::Failed,
            validated: None,
            passages,
        }
    }
}
