//! Conversational ticket intake.
//!
//! A linear form: the trigger phrase starts it, each following message fills
//! the next field verbatim, and the last field completes the ticket.
//!
//! ```text
//! Idle ──trigger──▶ Awaiting(0) ──msg──▶ Awaiting(1) ── … ──▶ Awaiting(4) ──msg──▶ Idle (+ TicketRecord)
//!   ▲                    ▲
//!   └── any other msg    └── trigger (from any state)
//! ```
//!
//! While a ticket is being collected every message belongs to the form and
//! never reaches retrieval.

use serde::Serialize;

pub const DEFAULT_TRIGGER: &str = "apertura ticket";

/// Ticket fields, in collection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TicketField {
    Nome,
    Reparto,
    Sede,
    Telefono,
    Descrizione,
}

impl TicketField {
    pub const ALL: [TicketField; 5] = [
        TicketField::Nome,
        TicketField::Reparto,
        TicketField::Sede,
        TicketField::Telefono,
        TicketField::Descrizione,
    ];

    /// Label used in summaries and notification payloads.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Nome => "Nome",
            Self::Reparto => "Reparto",
            Self::Sede => "Sede",
            Self::Telefono => "Telefono",
            Self::Descrizione => "Descrizione",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Nome => "📝 Apertura ticket. Come ti chiami? (nome e cognome)",
            Self::Reparto => "🏥 In quale reparto lavori?",
            Self::Sede => "📍 In quale sede si trova il reparto?",
            Self::Telefono => "📞 A quale numero di telefono possiamo ricontattarti?",
            Self::Descrizione => "🛠️ Descrivi il problema riscontrato.",
        }
    }
}

/// A completed ticket: one value per [`TicketField`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    values: Vec<(TicketField, String)>,
}

impl TicketRecord {
    /// `(label, value)` pairs in field order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        self.values
            .iter()
            .map(|(f, v)| (f.label(), v.as_str()))
            .collect()
    }

    pub fn get(&self, field: TicketField) -> Option<&str> {
        self.values
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, v)| v.as_str())
    }

    /// Bulleted list of the collected values.
    pub fn bullet_list(&self) -> String {
        self.fields()
            .into_iter()
            .map(|(label, value)| format!("• {}: {}", label, value))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Confirmation shown to the user once the ticket is complete.
    pub fn summary(&self) -> String {
        format!(
            "✅ Ticket registrato! Ecco il riepilogo:\n{}\n\nIl supporto tecnico ti contatterà al più presto.",
            self.bullet_list()
        )
    }
}

/// Outcome of feeding one message to the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketStep {
    /// The flow is idle and the message is not the trigger.
    NotHandled,
    /// The trigger (re)started the form; carries the first prompt.
    Started(String),
    /// A field was recorded; carries the next prompt.
    Next(String),
    Completed(TicketRecord),
}

/// Per-session ticket state.
#[derive(Debug, Clone)]
pub struct TicketFlow {
    trigger: String,
    /// Index of the field being awaited; `None` when idle.
    active: Option<usize>,
    collected: Vec<(TicketField, String)>,
}

impl TicketFlow {
    pub fn new(trigger: &str) -> Self {
        Self {
            trigger: trigger.trim().to_lowercase(),
            active: None,
            collected: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The field currently awaited, if any.
    pub fn awaiting(&self) -> Option<TicketField> {
        self.active.map(|i| TicketField::ALL[i])
    }

    pub fn collected(&self) -> &[(TicketField, String)] {
        &self.collected
    }

    pub fn reset(&mut self) {
        self.active = None;
        self.collected.clear();
    }

    pub fn handle(&mut self, message: &str) -> TicketStep {
        if message.trim().to_lowercase() == self.trigger {
            self.collected.clear();
            self.active = Some(0);
            return TicketStep::Started(TicketField::ALL[0].prompt().to_string());
        }

        let Some(index) = self.active else {
            return TicketStep::NotHandled;
        };

        self.collected.push((TicketField::ALL[index], message.to_string()));
        let next = index + 1;
        if next < TicketField::ALL.len() {
            self.active = Some(next);
            return TicketStep::Next(TicketField::ALL[next].prompt().to_string());
        }

        let record = TicketRecord {
            values: std::mem::take(&mut self.collected),
        };
        self.active = None;
        TicketStep::Completed(record)
    }
}

impl Default for TicketFlow {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(flow: &mut TicketFlow) -> TicketRecord {
        assert!(matches!(flow.handle("apertura ticket"), TicketStep::Started(_)));
        for v in ["Mario Rossi", "Cardiologia", "Careggi", "055-1234", "La stampante non funziona"] {
            if let TicketStep::Completed(r) = flow.handle(v) {
                return r;
            }
        }
        panic!("ticket did not complete");
    }

    #[test]
    fn test_idle_ignores_messages() {
        let mut flow = TicketFlow::default();
        assert_eq!(flow.handle("orari del CUP"), TicketStep::NotHandled);
        assert!(!flow.is_active());
    }

    #[test]
    fn test_trigger_is_trimmed_and_case_folded() {
        let mut flow = TicketFlow::default();
        assert_eq!(
            flow.handle("  Apertura TICKET "),
            TicketStep::Started(TicketField::Nome.prompt().to_string())
        );
        assert_eq!(flow.awaiting(), Some(TicketField::Nome));
        // not an exact match
        let mut other = TicketFlow::default();
        assert_eq!(other.handle("vorrei un'apertura ticket"), TicketStep::NotHandled);
    }

    #[test]
    fn test_full_flow_and_reset() {
        let mut flow = TicketFlow::default();
        let record = complete(&mut flow);
        assert!(!flow.is_active());
        assert!(flow.collected().is_empty());

        let labels: Vec<&str> = record.fields().iter().map(|(l, _)| *l).collect();
        assert_eq!(labels, vec!["Nome", "Reparto", "Sede", "Telefono", "Descrizione"]);
        assert_eq!(record.get(TicketField::Sede), Some("Careggi"));

        let summary = record.summary();
        assert!(summary.contains("• Nome: Mario Rossi"));
        assert!(summary.contains("• Descrizione: La stampante non funziona"));

        // a sixth message is not captured
        assert_eq!(flow.handle("orari del CUP"), TicketStep::NotHandled);
    }

    #[test]
    fn test_trigger_restarts_mid_flow() {
        let mut flow = TicketFlow::default();
        flow.handle("apertura ticket");
        flow.handle("Mario");
        flow.handle("Radiologia");
        assert_eq!(flow.collected().len(), 2);
        assert!(matches!(flow.handle("APERTURA TICKET"), TicketStep::Started(_)));
        assert!(flow.collected().is_empty());
        assert_eq!(flow.awaiting(), Some(TicketField::Nome));
    }

    #[test]
    fn test_values_recorded_verbatim() {
        let mut flow = TicketFlow::default();
        flow.handle("apertura ticket");
        flow.handle("  Anna  ");
        assert_eq!(flow.collected()[0], (TicketField::Nome, "  Anna  ".to_string()));
    }

    #[test]
    fn test_collected_is_prefix_of_fields() {
        let mut flow = TicketFlow::default();
        flow.handle("apertura ticket");
        for (i, v) in ["a", "b", "c", "d"].iter().enumerate() {
            flow.handle(v);
            let keys: Vec<TicketField> = flow.collected().iter().map(|(f, _)| *f).collect();
            assert_eq!(keys, TicketField::ALL[..=i].to_vec());
        }
    }
}
