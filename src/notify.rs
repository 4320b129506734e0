//! Ticket notifications.
//!
//! Completed tickets are handed to a [`NotificationQueue`]: a bounded
//! channel drained by one background worker that delivers each ticket
//! through a [`Notifier`], retrying with backoff. The chat path only ever
//! calls [`NotificationQueue::enqueue`], which never blocks; delivery
//! failures end up in the log, never in a reply.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use sportello_core::ticket::TicketRecord;

use crate::config::NotifyConfig;

pub const TICKET_SUBJECT: &str = "Nuovo ticket di assistenza";

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(String),
    #[error("notification endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("notification queue is closed")]
    QueueClosed,
}

/// JSON body POSTed by [`WebhookNotifier`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketPayload {
    pub ticket_id: String,
    pub recipient: Option<String>,
    pub subject: String,
    /// Field label → value, keys exactly the ticket field labels.
    pub fields: serde_json::Map<String, serde_json::Value>,
    pub text: String,
}

pub fn ticket_payload(record: &TicketRecord, recipient: Option<&str>, ticket_id: &str) -> TicketPayload {
    let fields = record
        .fields()
        .into_iter()
        .map(|(label, value)| (label.to_string(), serde_json::Value::String(value.to_string())))
        .collect();
    TicketPayload {
        ticket_id: ticket_id.to_string(),
        recipient: recipient.map(str::to_string),
        subject: TICKET_SUBJECT.to_string(),
        fields,
        text: format!("{}:\n{}", TICKET_SUBJECT, record.bullet_list()),
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, ticket_id: &str, record: &TicketRecord) -> Result<(), NotifyError>;
}

/// POSTs [`TicketPayload`] as JSON. `NOTIFY_TOKEN`, when set, is sent as a
/// bearer token.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    recipient: Option<String>,
    token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: &str, recipient: Option<String>, token: Option<String>, timeout_secs: u64) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
            recipient,
            token,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, ticket_id: &str, record: &TicketRecord) -> Result<(), NotifyError> {
        let payload = ticket_payload(record, self.recipient.as_deref(), ticket_id);
        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

/// Writes the ticket to the log. Used when no webhook is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, ticket_id: &str, record: &TicketRecord) -> Result<(), NotifyError> {
        let fields: Vec<String> = record
            .fields()
            .into_iter()
            .map(|(label, value)| format!("{}={}", label, value))
            .collect();
        info!(ticket_id, fields = %fields.join("; "), "ticket received");
        Ok(())
    }
}

/// Build the notifier named by `notify.kind`. `None` means notifications
/// are disabled.
pub fn create_notifier(config: &NotifyConfig) -> anyhow::Result<Option<Arc<dyn Notifier>>> {
    match config.kind.as_str() {
        "webhook" => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("notify.url required for webhook notifications"))?;
            let token = std::env::var("NOTIFY_TOKEN").ok().filter(|t| !t.is_empty());
            let notifier =
                WebhookNotifier::new(url, config.recipient.clone(), token, config.timeout_secs)?;
            Ok(Some(Arc::new(notifier)))
        }
        "log" => Ok(Some(Arc::new(LogNotifier))),
        "disabled" => Ok(None),
        other => anyhow::bail!("Unknown notify kind: {}", other),
    }
}

struct Job {
    ticket_id: String,
    record: TicketRecord,
}

/// Sender half of the notification worker.
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<Job>,
}

impl NotificationQueue {
    /// Start the worker task. It exits once every queue handle is dropped.
    pub fn spawn(
        notifier: Arc<dyn Notifier>,
        capacity: usize,
        max_attempts: u32,
        backoff: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_worker(rx, notifier, max_attempts.max(1), backoff));
        (Self { tx }, handle)
    }

    pub fn from_config(notifier: Arc<dyn Notifier>, config: &NotifyConfig) -> (Self, JoinHandle<()>) {
        Self::spawn(
            notifier,
            config.queue_capacity,
            config.max_attempts,
            Duration::from_secs(1),
        )
    }

    /// Queue a ticket for delivery and return its id. Never waits: a full
    /// queue drops the notification and logs it.
    pub fn enqueue(&self, record: TicketRecord) -> Result<String, NotifyError> {
        let ticket_id = uuid::Uuid::new_v4().to_string();
        let job = Job {
            ticket_id: ticket_id.clone(),
            record,
        };
        match self.tx.try_send(job) {
            Ok(()) => {
                debug!(ticket_id = %ticket_id, "ticket notification queued");
                Ok(ticket_id)
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                error!(ticket_id = %job.ticket_id, "notification queue full, ticket notification dropped");
                Ok(ticket_id)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(NotifyError::QueueClosed),
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<Job>,
    notifier: Arc<dyn Notifier>,
    max_attempts: u32,
    backoff: Duration,
) {
    while let Some(job) = rx.recv().await {
        deliver(notifier.as_ref(), &job, max_attempts, backoff).await;
    }
    debug!("notification worker stopped");
}

async fn deliver(notifier: &dyn Notifier, job: &Job, max_attempts: u32, backoff: Duration) {
    for attempt in 1..=max_attempts {
        match notifier.send(&job.ticket_id, &job.record).await {
            Ok(()) => {
                info!(ticket_id = %job.ticket_id, attempt, "ticket notification delivered");
                return;
            }
            Err(e) if attempt < max_attempts => {
                warn!(ticket_id = %job.ticket_id, attempt, error = %e, "ticket notification failed, retrying");
                tokio::time::sleep(backoff * (1 << (attempt - 1).min(5))).await;
            }
            Err(e) => {
                error!(ticket_id = %job.ticket_id, attempts = attempt, error = %e, "ticket notification abandoned");
            }
        }
    }
}
