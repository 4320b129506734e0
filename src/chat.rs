//! One chat turn, end to end.
//!
//! [`ChatService::handle`] is shared by the HTTP server and `sportello ask`.
//! Routing order for a message:
//!
//! 1. empty → fixed prompt, nothing else touched
//! 2. ticket flow (an active form swallows every message)
//! 3. small talk
//! 4. retrieval → answer → history → interaction log
//!
//! Failed and empty-result turns are logged but kept out of the history.

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use sportello_core::answer::{AnswerOutcome, AnswerStrategy, Answerer};
use sportello_core::llm::LanguageModel;
use sportello_core::prompt;
use sportello_core::retrieve::{self, RetrievalParams};
use sportello_core::store::Store;
use sportello_core::ticket::TicketStep;

use crate::config::Config;
use crate::interaction_log::{InteractionLog, InteractionRecord};
use crate::llm;
use crate::notify::{self, NotificationQueue};
use crate::session::SessionStore;
use crate::sqlite_store::open_store;

pub const EMPTY_MESSAGE_REPLY: &str = "Per favore, scrivi una domanda.";
pub const GREETING_REPLY: &str = "Ciao 😊 io sono il tuo assistente, fammi pure delle richieste!";
pub const HOW_ARE_YOU_REPLY: &str = "Sto bene, grazie! 😊 E tu?";

/// Canned reply for a bare greeting. Trailing punctuation is ignored;
/// anything longer goes to retrieval.
pub fn small_talk(message: &str) -> Option<&'static str> {
    let normalized = message
        .trim()
        .trim_end_matches(['!', '?', '.', ' '])
        .to_lowercase();
    match normalized.as_str() {
        "ciao" | "buongiorno" | "salve" => Some(GREETING_REPLY),
        "come stai" => Some(HOW_ARE_YOU_REPLY),
        _ => None,
    }
}

pub struct ChatService {
    store: Arc<dyn Store>,
    answerer: Answerer,
    retrieval: RetrievalParams,
    sessions: Arc<SessionStore>,
    notifications: Option<NotificationQueue>,
    interactions: Option<InteractionLog>,
}

impl ChatService {
    pub fn new(store: Arc<dyn Store>, model: Arc<dyn LanguageModel>, config: &Config) -> Self {
        Self {
            store,
            answerer: Answerer::new(model, config.answer_config()),
            retrieval: config.retrieval.params(),
            sessions: Arc::new(SessionStore::new(
                config.answer.history_capacity,
                &config.ticket.trigger,
            )),
            notifications: None,
            interactions: config.log.interactions.clone().map(InteractionLog::new),
        }
    }

    /// Wire the service from configuration: SQLite store, language model,
    /// and (when enabled) the notification worker.
    pub async fn open(config: &Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(open_store(config).await?);
        let model = llm::create_model(&config.llm);
        info!(provider = %config.llm.provider, model = model.name(), "language model ready");

        let mut service = Self::new(store, model, config);
        if let Some(notifier) = notify::create_notifier(&config.notify)? {
            let (queue, _worker) = NotificationQueue::from_config(notifier, &config.notify);
            service = service.with_notifications(queue);
        }
        Ok(service)
    }

    #[must_use]
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Produce the reply to `message` in `session_id`. Never fails: internal
    /// errors become a user-facing message.
    pub async fn handle(&self, session_id: &str, message: &str) -> String {
        if message.trim().is_empty() {
            return EMPTY_MESSAGE_REPLY.to_string();
        }

        let step = self
            .sessions
            .with_session(session_id, |s| s.ticket.handle(message));
        match step {
            TicketStep::Started(prompt) => {
                info!(session = session_id, "ticket intake started");
                return prompt;
            }
            TicketStep::Next(prompt) => return prompt,
            TicketStep::Completed(record) => {
                let reply = record.summary();
                match &self.notifications {
                    Some(queue) => match queue.enqueue(record) {
                        Ok(ticket_id) => info!(session = session_id, ticket_id = %ticket_id, "ticket completed"),
                        Err(e) => warn!(session = session_id, error = %e, "ticket notification not queued"),
                    },
                    None => info!(session = session_id, "ticket completed, notifications disabled"),
                }
                return reply;
            }
            TicketStep::NotHandled => {}
        }

        if let Some(reply) = small_talk(message) {
            return reply.to_string();
        }

        match self.answer_question(session_id, message).await {
            Ok(outcome) => outcome.text,
            Err(e) => {
                warn!(session = session_id, error = %e, "chat turn failed");
                format!("❌ Errore durante la ricerca: {}", e)
            }
        }
    }

    async fn answer_question(&self, session_id: &str, question: &str) -> Result<AnswerOutcome> {
        let passages = retrieve::search(self.store.as_ref(), question, &self.retrieval).await?;

        let outcome = if passages.is_empty() && self.store.count().await? > 0 {
            AnswerOutcome {
                text: prompt::NOTHING_RELEVANT.to_string(),
                confidence: 0.0,
                strategy: AnswerStrategy::NothingFound,
                validated: None,
                passages,
            }
        } else {
            let turns = self.sessions.with_session(session_id, |s| {
                s.history.recent(self.answerer.config().history_turns)
            });
            self.answerer.answer(question, &turns, passages).await
        };

        // only grounded answers become context for later turns
        if matches!(outcome.strategy, AnswerStrategy::Generated | AnswerStrategy::Extractive) {
            self.sessions
                .with_session(session_id, |s| s.history.push(question, outcome.text.clone()));
        }

        if let Some(log) = &self.interactions {
            let record = InteractionRecord::new(session_id, question, &outcome);
            if let Err(e) = log.append(&record).await {
                warn!(path = %log.path().display(), error = %e, "failed to write interaction log");
            }
        }

        Ok(outcome)
    }
}

/// `sportello ask`: answer one question and print the reply.
pub async fn run_ask(config: &Config, session_id: &str, question: &str) -> Result<()> {
    let service = ChatService::open(config).await?;
    println!("{}", service.handle(session_id, question).await);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, ChunkingConfig};
    use crate::loader;
    use crate::notify::{Notifier, NotifyError};
    use async_trait::async_trait;
    use sportello_core::llm::ScriptedModel;
    use sportello_core::models::{Chunk, DocumentKind, StoreStats};
    use sportello_core::store::memory::InMemoryStore;
    use sportello_core::store::StoreHit;
    use sportello_core::ticket::TicketRecord;
    use std::sync::Mutex;
    use std::time::Duration;

    const CUP_DOC: &str = "13 CUP 2.0\nIl CUP 2.0 è attivo 24/7. Telefono: 055-123456.";

    fn config() -> Config {
        parse_config("[db]\npath = \"unused.sqlite\"\n").unwrap()
    }

    fn service(store: Arc<dyn Store>, model: &ScriptedModel) -> ChatService {
        ChatService::new(store, Arc::new(model.clone()), &config())
    }

    struct BrokenStore;

    #[async_trait]
    impl Store for BrokenStore {
        async fn delete_source(&self, _: &str) -> Result<u64> {
            Ok(0)
        }
        async fn add(&self, _: &[Chunk]) -> Result<()> {
            Ok(())
        }
        async fn query(&self, _: &str, _: usize) -> Result<Vec<StoreHit>> {
            anyhow::bail!("database is locked")
        }
        async fn stats(&self) -> Result<StoreStats> {
            Ok(StoreStats::default())
        }
    }

    struct Collecting {
        received: Mutex<Vec<TicketRecord>>,
        done: tokio::sync::Notify,
    }

    #[async_trait]
    impl Notifier for Collecting {
        async fn send(&self, _ticket_id: &str, record: &TicketRecord) -> Result<(), NotifyError> {
            self.received.lock().unwrap().push(record.clone());
            self.done.notify_one();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_section_is_retrieved_whole() {
        let store = Arc::new(InMemoryStore::default());
        loader::load(store.as_ref(), "documento.txt", CUP_DOC.as_bytes(), DocumentKind::Text, &ChunkingConfig::default())
            .await
            .unwrap();
        let model = ScriptedModel::new(vec!["Il CUP 2.0 è attivo 24/7. Telefono: 055-123456."]);
        let chat = service(store, &model);

        let reply = chat.handle("u1", "parlami del CUP 2.0").await;
        assert!(reply.contains("Il CUP 2.0 è attivo 24/7."));
        assert!(model.prompts()[0].contains(CUP_DOC));
        assert!(model.prompts()[0].contains("[Fonte: documento.txt]"));
    }

    #[tokio::test]
    async fn test_empty_message_touches_nothing() {
        let model = ScriptedModel::new(vec![]);
        let chat = service(Arc::new(BrokenStore), &model);
        assert_eq!(chat.handle("u1", "   ").await, EMPTY_MESSAGE_REPLY);
        assert_eq!(model.calls(), 0);
        assert!(chat.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_ticket_flow_then_retrieval() {
        let model = ScriptedModel::new(vec![]);
        let notifier = Arc::new(Collecting {
            received: Mutex::new(Vec::new()),
            done: tokio::sync::Notify::new(),
        });
        let (queue, _worker) =
            NotificationQueue::spawn(notifier.clone(), 8, 1, Duration::from_millis(1));
        let chat = service(Arc::new(InMemoryStore::default()), &model).with_notifications(queue);

        let first = chat.handle("u1", "apertura ticket").await;
        assert!(first.contains("Come ti chiami"));
        let values = ["Mario Rossi", "Radiologia", "Careggi", "055-999", "Stampante inceppata"];
        let mut last = String::new();
        for v in values {
            last = chat.handle("u1", v).await;
        }
        for (label, v) in ["Nome", "Reparto", "Sede", "Telefono", "Descrizione"].iter().zip(values) {
            assert!(last.contains(&format!("• {}: {}", label, v)), "missing {label}");
        }

        // flow is reset: the next message goes to retrieval
        assert_eq!(chat.handle("u1", "orari del CUP").await, prompt::NOTHING_FOUND);

        tokio::time::timeout(Duration::from_secs(5), notifier.done.notified())
            .await
            .unwrap();
        assert_eq!(notifier.received.lock().unwrap().len(), 1);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_ticket_state_is_per_session() {
        let model = ScriptedModel::new(vec![]);
        let chat = service(Arc::new(InMemoryStore::default()), &model);
        chat.handle("a", "apertura ticket").await;
        // another session is unaffected
        assert_eq!(chat.handle("b", "Mario").await, prompt::NOTHING_FOUND);
        assert!(chat.handle("a", "Mario").await.contains("reparto"));
    }

    #[tokio::test]
    async fn test_empty_store_skips_model() {
        let model = ScriptedModel::new(vec![]);
        let chat = service(Arc::new(InMemoryStore::default()), &model);
        assert_eq!(chat.handle("u1", "dove si trova la radiologia?").await, prompt::NOTHING_FOUND);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_nothing_relevant_when_store_not_empty() {
        let store = Arc::new(InMemoryStore::default());
        store
            .add(&[Chunk::new("nota.txt", DocumentKind::Text, 0, "Breve nota.".into())])
            .await
            .unwrap();
        let model = ScriptedModel::new(vec![]);
        let chat = service(store, &model);
        assert_eq!(chat.handle("u1", "dove si trova la radiologia?").await, prompt::NOTHING_RELEVANT);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_turn_stays_out_of_history() {
        let store = Arc::new(InMemoryStore::default());
        loader::load(store.as_ref(), "documento.txt", CUP_DOC.as_bytes(), DocumentKind::Text, &ChunkingConfig::default())
            .await
            .unwrap();
        let model = ScriptedModel::failing();
        let chat = service(store, &model);

        let first = chat.handle("u1", "telefono del CUP 2.0").await;
        assert!(first.starts_with("❌ Errore durante la generazione"));
        assert_eq!(chat.sessions().with_session("u1", |s| s.history.len()), 0);

        chat.handle("u1", "orari del CUP 2.0").await;
        let second_prompt = &model.prompts()[1];
        assert!(!second_prompt.contains("telefono del CUP 2.0"));
        assert!(!second_prompt.contains("❌"));
    }

    #[tokio::test]
    async fn test_blank_message_during_ticket_is_not_recorded() {
        let model = ScriptedModel::new(vec![]);
        let chat = service(Arc::new(InMemoryStore::default()), &model);
        chat.handle("u1", "apertura ticket").await;

        assert_eq!(chat.handle("u1", "   ").await, EMPTY_MESSAGE_REPLY);
        let (active, collected) = chat
            .sessions()
            .with_session("u1", |s| (s.ticket.is_active(), s.ticket.collected().len()));
        assert!(active);
        assert_eq!(collected, 0);
        // the form still waits for the name
        assert!(chat.handle("u1", "Mario Rossi").await.contains("reparto"));
    }

    #[tokio::test]
    async fn test_small_talk() {
        let model = ScriptedModel::new(vec![]);
        let chat = service(Arc::new(BrokenStore), &model);
        assert_eq!(chat.handle("u1", "Ciao!").await, GREETING_REPLY);
        assert_eq!(chat.handle("u1", "come stai?").await, HOW_ARE_YOU_REPLY);
        assert!(small_talk("ciao, come si prenota una visita?").is_none());
    }

    #[tokio::test]
    async fn test_store_error_is_reported() {
        let model = ScriptedModel::new(vec![]);
        let chat = service(Arc::new(BrokenStore), &model);
        let reply = chat.handle("u1", "orari del CUP").await;
        assert!(reply.starts_with("❌ Errore durante la ricerca:"));
        assert!(reply.contains("database is locked"));
    }

    #[tokio::test]
    async fn test_history_and_interaction_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_path = dir.path().join("interactions.jsonl");
        let cfg = parse_config(&format!(
            "[db]\npath = \"unused.sqlite\"\n[answer]\nvalidation = \"never\"\nconfidence_threshold = 0.0\n[log]\ninteractions = \"{}\"\n",
            log_path.display()
        ))
        .unwrap();

        let store = Arc::new(InMemoryStore::default());
        loader::load(store.as_ref(), "documento.txt", CUP_DOC.as_bytes(), DocumentKind::Text, &cfg.chunking)
            .await
            .unwrap();
        let model = ScriptedModel::new(vec!["Risposta uno.", "Risposta due."]);
        let chat = ChatService::new(store, Arc::new(model.clone()), &cfg);

        assert_eq!(chat.handle("u1", "telefono del CUP 2.0").await, "Risposta uno.");
        assert_eq!(chat.handle("u1", "orari del CUP 2.0").await, "Risposta due.");
        assert!(model.prompts()[1].contains("telefono del CUP 2.0"));
        assert!(model.prompts()[1].contains("Risposta uno."));
        assert_eq!(chat.sessions().with_session("u1", |s| s.history.len()), 2);

        let content = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(content.lines().count(), 2);
        let rec: serde_json::Value = serde_json::from_str(content.lines().next().unwrap()).unwrap();
        assert_eq!(rec["strategy"], "generated");
        assert_eq!(rec["passages"][0]["source_id"], "documento.txt");
    }
}
