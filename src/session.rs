//! Per-conversation state.
//!
//! Every conversation owns its history and its ticket flow, keyed by a
//! session id. Clients pass the id in the `X-Session-Id` header or the
//! `session_id` body field; requests without one share the `"default"`
//! session.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::debug;

use sportello_core::history::ConversationHistory;
use sportello_core::ticket::TicketFlow;

pub const DEFAULT_SESSION: &str = "default";
pub const SESSION_HEADER: &str = "x-session-id";

pub struct Session {
    pub history: ConversationHistory,
    pub ticket: TicketFlow,
    last_seen: Instant,
}

/// Concurrent map of live sessions.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    history_capacity: usize,
    trigger: String,
}

impl SessionStore {
    pub fn new(history_capacity: usize, trigger: &str) -> Self {
        Self {
            sessions: DashMap::new(),
            history_capacity,
            trigger: trigger.to_string(),
        }
    }

    /// Run `f` on the session, creating it on first use. The session stays
    /// locked for the duration of `f`, so `f` must not await.
    pub fn with_session<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut entry = self.sessions.entry(id.to_string()).or_insert_with(|| Session {
            history: ConversationHistory::new(self.history_capacity),
            ticket: TicketFlow::new(&self.trigger),
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        f(entry.value_mut())
    }

    /// Forget the session's turns. Unknown sessions are a no-op.
    pub fn clear_history(&self, id: &str) {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.history.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle for longer than `ttl`. Returns how many were removed.
    pub fn sweep(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_seen.elapsed() <= ttl);
        before.saturating_sub(self.sessions.len())
    }
}

/// Sweep idle sessions every `ttl / 4` (at least once a second).
pub fn spawn_sweeper(store: Arc<SessionStore>, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let removed = store.sweep(ttl);
            if removed > 0 {
                debug!(removed, remaining = store.len(), "swept idle sessions");
            }
        }
    })
}

/// Header first, then body, then the shared default.
pub fn resolve_session_id(header: Option<&str>, body: Option<&str>) -> String {
    header
        .into_iter()
        .chain(body)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}
