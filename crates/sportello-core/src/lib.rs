//! # Sportello Core
//!
//! Pure logic for the Sportello help-desk assistant: data models, the
//! section-aware chunker, the [`store::Store`] abstraction, the retriever,
//! the confidence heuristic, grounded answer composition, and the
//! conversational ticket-intake state machine.
//!
//! This crate contains no tokio, sqlx, HTTP client, or filesystem I/O.
//! The application crate supplies concrete stores, language models, and
//! the transport.
//!
//! ```text
//!  question ──▶ retrieve::search ──▶ confidence::score ──▶ answer::Answerer
//!                    │                                         │
//!                    ▼                                         ▼
//!              store::Store                           llm::LanguageModel
//! ```

pub mod answer;
pub mod chunk;
pub mod confidence;
pub mod embedding;
pub mod history;
pub mod llm;
pub mod models;
pub mod prompt;
pub mod retrieve;
pub mod store;
pub mod ticket;
