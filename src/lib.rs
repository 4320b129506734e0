//! # Sportello
//!
//! A document-grounded help-desk assistant. Staff questions are answered
//! from the manuals, CSV directories, and PDFs loaded into a local vector
//! store; a short conversational form collects support tickets and forwards
//! them to a webhook.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Documents  │──▶│   Loader    │──▶│  SQLite  │
//! │ TXT/CSV/PDF │   │ Chunk+Embed │   │ vectors  │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │ retrieve
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐      ┌──────────┐
//!                 │   CLI    │       │   HTTP   │─────▶│ Webhook  │
//!                 │(sportello│       │  (chat)  │ ticket│ notifier │
//!                 └──────────┘       └──────────┘      └──────────┘
//! ```
//!
//! The pure logic (chunking, retrieval, confidence, prompting, ticket
//! flow) lives in the `sportello-core` crate; this crate adds storage,
//! HTTP clients, the server, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`db`] / [`migrate`] | SQLite connection and schema |
//! | [`sqlite_store`] | SQLite implementation of the core `Store` trait |
//! | [`embedding`] | Embedding providers |
//! | [`extract`] | Text extraction per document kind |
//! | [`loader`] | Extract → chunk → replace in store |
//! | [`llm`] | Groq and Gemini clients |
//! | [`notify`] | Ticket notification worker |
//! | [`session`] | Per-conversation state |
//! | [`interaction_log`] | JSONL record of answered questions |
//! | [`chat`] | One chat turn, end to end |
//! | [`server`] | HTTP server |

pub mod chat;
pub mod config;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod interaction_log;
pub mod llm;
pub mod loader;
pub mod logging;
pub mod migrate;
pub mod notify;
pub mod server;
pub mod session;
pub mod sqlite_store;
