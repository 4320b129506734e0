//! Configuration parsing and validation.
//!
//! Sportello is configured via a TOML file (default: `config/sportello.toml`).
//! Only `[db]` is required; every other section falls back to the defaults
//! used in production.
//!
//! # Example
//!
//! ```toml
//! [db]
//! path = "./data/sportello.sqlite"
//!
//! [chunking.text]
//! chunk_size = 1000
//! overlap = 200
//! min_chars = 50
//! batch_size = 20
//!
//! [retrieval]
//! k = 10
//! distance_margin = 0.4
//!
//! [answer]
//! validation = "low_confidence"   # always | low_confidence | never
//! confidence_threshold = 0.6
//!
//! [llm]
//! provider = "groq"               # groq | gemini | disabled
//!
//! [embedding]
//! provider = "trigram"            # trigram | openai
//!
//! [notify]
//! kind = "webhook"                # webhook | log | disabled
//! url = "https://hooks.example.org/helpdesk"
//! recipient = "helpdesk@example.org"
//!
//! [server]
//! bind = "0.0.0.0:5000"
//! ```
//!
//! API keys never live in the file: they are read from `GROQ_API_KEY`,
//! `GEMINI_API_KEY`, `OPENAI_API_KEY`, and `NOTIFY_TOKEN`. The `PORT`
//! environment variable overrides the port of `server.bind`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use sportello_core::answer::{AnswerConfig, ValidationMode};
use sportello_core::chunk::ChunkParams;
use sportello_core::llm::GenerationParams;
use sportello_core::models::DocumentKind;
use sportello_core::retrieve::RetrievalParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerSettings,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub ticket: TicketConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Chunking settings for one document kind.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct KindChunking {
    pub chunk_size: usize,
    pub overlap: usize,
    pub min_chars: usize,
    /// Chunks per store insert.
    pub batch_size: usize,
}

impl KindChunking {
    pub fn params(&self) -> ChunkParams {
        ChunkParams {
            chunk_size: self.chunk_size,
            overlap: self.overlap,
            min_chars: self.min_chars,
        }
    }
}

/// Per-kind chunking. CSV rows are never split, so only `min_chars` and
/// `batch_size` apply to `[chunking.csv]`.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ChunkingConfig {
    #[serde(default = "default_text_chunking")]
    pub text: KindChunking,
    #[serde(default = "default_pdf_chunking")]
    pub pdf: KindChunking,
    #[serde(default = "default_csv_chunking")]
    pub csv: KindChunking,
}

impl ChunkingConfig {
    pub fn for_kind(&self, kind: DocumentKind) -> &KindChunking {
        match kind {
            DocumentKind::Text => &self.text,
            DocumentKind::Pdf => &self.pdf,
            DocumentKind::Csv => &self.csv,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            text: default_text_chunking(),
            pdf: default_pdf_chunking(),
            csv: default_csv_chunking(),
        }
    }
}

fn default_text_chunking() -> KindChunking {
    KindChunking {
        chunk_size: 1000,
        overlap: 200,
        min_chars: 50,
        batch_size: 20,
    }
}
fn default_pdf_chunking() -> KindChunking {
    KindChunking {
        chunk_size: 800,
        overlap: 100,
        min_chars: 50,
        batch_size: 20,
    }
}
fn default_csv_chunking() -> KindChunking {
    KindChunking {
        chunk_size: 1000,
        overlap: 0,
        min_chars: 20,
        batch_size: 50,
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default = "default_distance_margin")]
    pub distance_margin: f64,
    #[serde(default = "default_fallback_threshold")]
    pub fallback_threshold: f64,
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    #[serde(default = "default_dedup_jaccard")]
    pub dedup_jaccard: f64,
    #[serde(default = "default_dedup_prefix_words")]
    pub dedup_prefix_words: usize,
    #[serde(default = "default_expansion_words")]
    pub expansion_words: usize,
    #[serde(default = "default_expansion_min_word_chars")]
    pub expansion_min_word_chars: usize,
}

fn default_k() -> usize {
    10
}
fn default_distance_margin() -> f64 {
    0.4
}
fn default_fallback_threshold() -> f64 {
    1.5
}
fn default_min_content_chars() -> usize {
    50
}
fn default_dedup_jaccard() -> f64 {
    0.7
}
fn default_dedup_prefix_words() -> usize {
    20
}
fn default_expansion_words() -> usize {
    3
}
fn default_expansion_min_word_chars() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            distance_margin: default_distance_margin(),
            fallback_threshold: default_fallback_threshold(),
            min_content_chars: default_min_content_chars(),
            dedup_jaccard: default_dedup_jaccard(),
            dedup_prefix_words: default_dedup_prefix_words(),
            expansion_words: default_expansion_words(),
            expansion_min_word_chars: default_expansion_min_word_chars(),
        }
    }
}

impl RetrievalConfig {
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            k: self.k,
            distance_margin: self.distance_margin,
            fallback_threshold: self.fallback_threshold,
            min_content_chars: self.min_content_chars,
            dedup_jaccard: self.dedup_jaccard,
            dedup_prefix_words: self.dedup_prefix_words,
            expansion_words: self.expansion_words,
            expansion_min_word_chars: self.expansion_min_word_chars,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerSettings {
    #[serde(default = "default_context_passages")]
    pub context_passages: usize,
    #[serde(default = "default_history_turns")]
    pub history_turns: usize,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub validation: ValidationMode,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_true")]
    pub extractive_fallback: bool,
}

fn default_context_passages() -> usize {
    3
}
fn default_history_turns() -> usize {
    3
}
fn default_history_capacity() -> usize {
    10
}
fn default_confidence_threshold() -> f64 {
    0.6
}
fn default_true() -> bool {
    true
}

impl Default for AnswerSettings {
    fn default() -> Self {
        Self {
            context_passages: default_context_passages(),
            history_turns: default_history_turns(),
            history_capacity: default_history_capacity(),
            validation: ValidationMode::default(),
            confidence_threshold: default_confidence_threshold(),
            extractive_fallback: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_llm_provider() -> String {
    "groq".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: None,
            base_url: None,
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn generation(&self) -> GenerationParams {
        GenerationParams {
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
        }
    }

    /// Configured model, or the provider's default.
    pub fn model_name(&self) -> String {
        if let Some(m) = &self.model {
            return m.clone();
        }
        match self.provider.as_str() {
            "gemini" => "gemini-1.5-flash".to_string(),
            _ => "llama-3.3-70b-versatile".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            base_url: None,
        }
    }
}

fn default_embedding_provider() -> String {
    "trigram".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default = "default_notify_kind")]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_notify_kind() -> String {
    "log".to_string()
}
fn default_notify_timeout() -> u64 {
    10
}
fn default_queue_capacity() -> usize {
    64
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            kind: default_notify_kind(),
            url: None,
            recipient: None,
            timeout_secs: default_notify_timeout(),
            queue_capacity: default_queue_capacity(),
            max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TicketConfig {
    #[serde(default = "default_trigger")]
    pub trigger: String,
}

fn default_trigger() -> String {
    sportello_core::ticket::DEFAULT_TRIGGER.to_string()
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Directory holding a custom `index.html` chat page.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Sessions idle longer than this are dropped.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_max_body_bytes() -> usize {
    64 * 1024
}
fn default_session_ttl_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            static_dir: None,
            max_body_bytes: default_max_body_bytes(),
            session_ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl ServerConfig {
    /// Bind address with the `PORT` environment variable applied.
    pub fn bind_addr(&self) -> String {
        with_port_override(&self.bind, std::env::var("PORT").ok().as_deref())
    }
}

/// Replace the port of `bind` with `port` when one is given.
pub fn with_port_override(bind: &str, port: Option<&str>) -> String {
    match port.map(str::trim).filter(|p| !p.is_empty()) {
        Some(port) => {
            let host = bind.rsplit_once(':').map(|(h, _)| h).unwrap_or(bind);
            format!("{}:{}", host, port)
        }
        None => bind.to_string(),
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    /// Document loaded at start-up and by `/force-load`.
    #[serde(default = "default_document_path")]
    pub default_path: PathBuf,
    /// Directory listed by `/debug` and `/force-load` diagnostics.
    #[serde(default = "default_scan_dir")]
    pub scan_dir: PathBuf,
    #[serde(default = "default_true")]
    pub autoload: bool,
}

fn default_document_path() -> PathBuf {
    PathBuf::from("documento.txt")
}
fn default_scan_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            default_path: default_document_path(),
            scan_dir: default_scan_dir(),
            autoload: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    /// Append-only JSONL interaction log.
    #[serde(default)]
    pub interactions: Option<PathBuf>,
}

impl Config {
    pub fn answer_config(&self) -> AnswerConfig {
        AnswerConfig {
            context_passages: self.answer.context_passages,
            history_turns: self.answer.history_turns,
            validation: self.answer.validation,
            confidence_threshold: self.answer.confidence_threshold,
            extractive_fallback: self.answer.extractive_fallback,
            generation: self.llm.generation(),
            ..AnswerConfig::default()
        }
    }
}

impl EmbeddingConfig {
    /// Vector dimensionality, with the trigram default applied.
    pub fn effective_dims(&self) -> usize {
        self.dims
            .unwrap_or(sportello_core::embedding::DEFAULT_TRIGRAM_DIMS)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate TOML configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    for (name, kind) in [("text", &config.chunking.text), ("pdf", &config.chunking.pdf)] {
        if kind.chunk_size == 0 {
            anyhow::bail!("chunking.{}.chunk_size must be > 0", name);
        }
        if kind.overlap >= kind.chunk_size {
            anyhow::bail!(
                "chunking.{}.overlap ({}) must be smaller than chunking.{}.chunk_size ({})",
                name,
                kind.overlap,
                name,
                kind.chunk_size
            );
        }
    }
    for (name, kind) in [
        ("text", &config.chunking.text),
        ("pdf", &config.chunking.pdf),
        ("csv", &config.chunking.csv),
    ] {
        if kind.batch_size == 0 {
            anyhow::bail!("chunking.{}.batch_size must be >= 1", name);
        }
    }

    // Validate retrieval
    if config.retrieval.k < 1 {
        anyhow::bail!("retrieval.k must be >= 1");
    }
    if config.retrieval.distance_margin < 0.0 {
        anyhow::bail!("retrieval.distance_margin must be >= 0.0");
    }
    if !(0.0..=1.0).contains(&config.retrieval.dedup_jaccard) {
        anyhow::bail!("retrieval.dedup_jaccard must be in [0.0, 1.0]");
    }

    // Validate answer
    if !(0.0..=1.0).contains(&config.answer.confidence_threshold) {
        anyhow::bail!("answer.confidence_threshold must be in [0.0, 1.0]");
    }
    if config.answer.context_passages == 0 {
        anyhow::bail!("answer.context_passages must be >= 1");
    }

    // Validate llm
    match config.llm.provider.as_str() {
        "groq" | "gemini" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown llm provider: '{}'. Must be groq, gemini, or disabled.",
            other
        ),
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "trigram" => {}
        "openai" => {
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                anyhow::bail!("embedding.dims must be > 0 when provider is 'openai'");
            }
            if config.embedding.model.is_none() {
                anyhow::bail!("embedding.model must be specified when provider is 'openai'");
            }
        }
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be trigram or openai.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    // Validate notify
    match config.notify.kind.as_str() {
        "webhook" => {
            if config.notify.url.is_none() {
                anyhow::bail!("notify.url must be specified when kind is 'webhook'");
            }
        }
        "log" | "disabled" => {}
        other => anyhow::bail!(
            "Unknown notify kind: '{}'. Must be webhook, log, or disabled.",
            other
        ),
    }
    if config.notify.queue_capacity == 0 {
        anyhow::bail!("notify.queue_capacity must be >= 1");
    }
    if config.notify.max_attempts == 0 {
        anyhow::bail!("notify.max_attempts must be >= 1");
    }

    if config.ticket.trigger.trim().is_empty() {
        anyhow::bail!("ticket.trigger must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let cfg = parse_config("[db]\npath = \"./data/s.sqlite\"\n").unwrap();
        assert_eq!(cfg.chunking.text.params().chunk_size, 1000);
        assert_eq!(cfg.chunking.pdf.overlap, 100);
        assert_eq!(cfg.chunking.csv.batch_size, 50);
        assert_eq!(cfg.retrieval.k, 10);
        assert_eq!(cfg.answer.validation, ValidationMode::LowConfidence);
        assert_eq!(cfg.llm.provider, "groq");
        assert_eq!(cfg.embedding.effective_dims(), 384);
        assert_eq!(cfg.notify.kind, "log");
        assert_eq!(cfg.ticket.trigger, "apertura ticket");
        assert_eq!(cfg.server.bind, "0.0.0.0:5000");
        assert!(cfg.documents.autoload);
        assert!(cfg.log.interactions.is_none());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk_size() {
        let err = parse_config(
            "[db]\npath = \"x\"\n[chunking.text]\nchunk_size = 100\noverlap = 100\nmin_chars = 10\nbatch_size = 5\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("chunking.text.overlap"));
    }

    #[test]
    fn test_validation_mode_parses() {
        let cfg = parse_config("[db]\npath = \"x\"\n[answer]\nvalidation = \"always\"\n").unwrap();
        assert_eq!(cfg.answer.validation, ValidationMode::Always);
        assert!(parse_config("[db]\npath = \"x\"\n[answer]\nvalidation = \"sometimes\"\n").is_err());
    }

    #[test]
    fn test_unknown_providers_rejected() {
        assert!(parse_config("[db]\npath = \"x\"\n[llm]\nprovider = \"gpt\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse_config("[db]\npath = \"x\"\n[notify]\nkind = \"webhook\"\n").is_err());
    }

    #[test]
    fn test_port_override() {
        assert_eq!(with_port_override("0.0.0.0:5000", Some("8080")), "0.0.0.0:8080");
        assert_eq!(with_port_override("0.0.0.0:5000", None), "0.0.0.0:5000");
        assert_eq!(with_port_override("0.0.0.0:5000", Some(" ")), "0.0.0.0:5000");
    }

    #[test]
    fn test_answer_config_carries_generation_params() {
        let cfg = parse_config("[db]\npath = \"x\"\n[llm]\ntemperature = 0.3\nmax_tokens = 256\n").unwrap();
        let a = cfg.answer_config();
        assert_eq!(a.generation.max_tokens, 256);
        assert!((a.generation.temperature - 0.3).abs() < 1e-6);
        assert_eq!(a.context_passages, 3);
    }
}
