//! Prompt construction, verdict parsing, and the extractive composer.
//!
//! Everything user-facing here is Italian: the assistant serves the staff
//! of a regional health service.

use crate::confidence::as_percent;
use crate::models::{ConversationTurn, RetrievedPassage};

/// Retrieval produced nothing at all.
pub const NOTHING_FOUND: &str = "🔍 Nessun documento trovato nel database.";
/// The store has documents but none passed the relevance filter.
pub const NOTHING_RELEVANT: &str =
    "🤔 Non ho trovato informazioni sufficientemente rilevanti. Prova a riformulare la domanda!";
/// The extractive composer matched no sentence.
pub const NO_SPECIFIC_INFO: &str =
    "Non ho trovato informazioni specifiche nei documenti per rispondere a questa domanda.";
/// No language model is configured.
pub const MODEL_NOT_CONFIGURED: &str =
    "❌ Errore: modello linguistico non configurato correttamente. Controlla la chiave API.";

pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

const RULES: &str = "\
REGOLE (da seguire alla lettera):
1. Rispondi SOLO con le informazioni presenti nei documenti qui sopra. Non inventare nulla.
2. Leggi tutto il testo dei documenti, non fermarti alla prima riga.
3. Se la risposta è nel documento, riportala parola per parola, senza modifiche, omissioni o riscritture.
4. Elenca sempre tutte le informazioni richieste, anche i dettagli minori (telefono, codici, note).
5. Se l'informazione non c'è, dillo chiaramente: \"Non ho trovato questa informazione nei documenti.\"
6. Cita sempre la fonte (es. \"Secondo il documento X, sezione Y...\").
7. Non usare conoscenze esterne ai documenti.
8. Non riassumere e non combinare informazioni di sezioni diverse in affermazioni nuove.
9. Usa elenchi puntati se aiutano la chiarezza e mantieni un tono cordiale e professionale.";

/// Render the top `max_passages` passages, each tagged with its source.
pub fn format_context(passages: &[RetrievedPassage], max_passages: usize) -> String {
    passages
        .iter()
        .take(max_passages)
        .map(|p| format!("[Fonte: {}]\n{}", p.chunk.source_id, p.chunk.text.trim()))
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}

fn format_history(turns: &[ConversationTurn]) -> String {
    let mut out = String::new();
    for turn in turns {
        out.push_str(&format!(
            "UTENTE: {}\nASSISTENTE: {}\n\n",
            turn.question, turn.answer
        ));
    }
    out
}

/// Build the grounded-answer prompt.
pub fn build_answer_prompt(
    question: &str,
    turns: &[ConversationTurn],
    passages: &[RetrievedPassage],
    max_passages: usize,
) -> String {
    let history = format_history(turns);
    let context = format_context(passages, max_passages);
    let mut prompt = String::from(
        "Sei l'assistente documentale del servizio sanitario regionale. \
         Rispondi in italiano basandoti SOLO sui documenti forniti.\n\n",
    );
    if !history.is_empty() {
        prompt.push_str("CONVERSAZIONE RECENTE:\n");
        prompt.push_str(&history);
    }
    prompt.push_str(&format!("DOMANDA: {}\n\n", question));
    prompt.push_str(&format!("DOCUMENTI RILEVANTI:\n{}\n\n", context));
    prompt.push_str(RULES);
    prompt.push_str("\n\nRISPOSTA:\n");
    prompt
}

/// Build the judge prompt asking whether `answer` is fully supported by
/// the passages.
pub fn build_validation_prompt(answer: &str, passages: &[RetrievedPassage], max_passages: usize) -> String {
    format!(
        "Verifica se ogni affermazione della RISPOSTA è un estratto verificabile dei DOCUMENTI.\n\
         Rispondi con una sola parola: VALID se tutte le affermazioni sono presenti nei documenti, \
         INVALID altrimenti.\n\n\
         DOCUMENTI:\n{}\n\nRISPOSTA:\n{}\n\nVERDETTO:",
        format_context(passages, max_passages),
        answer.trim()
    )
}

/// `true` only when the first word of the judge reply is `VALID`.
///
/// Empty or unparseable replies count as invalid.
pub fn parse_verdict(reply: &str) -> bool {
    reply
        .split_whitespace()
        .next()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .is_some_and(|w| w.eq_ignore_ascii_case("VALID"))
}

/// Lower-cased question words longer than three characters.
pub fn question_keywords(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Split on sentence-ending punctuation (`.`, `!`, `?`) followed by
/// whitespace or end of text. Decimal points such as `2.0` do not split.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0usize;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_boundary = iter.peek().map_or(true, |(_, next)| next.is_whitespace());
            if at_boundary {
                let end = i + c.len_utf8();
                let s = text[start..end].trim();
                if !s.is_empty() {
                    sentences.push(s);
                }
                start = end;
            }
        }
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Compose an answer from verbatim passage sentences that mention a
/// question keyword: at most `per_passage` sentences from each of the first
/// `max_passages` passages, each group attributed to its source.
///
/// Returns `None` when no sentence matches.
pub fn extractive_answer(
    question: &str,
    passages: &[RetrievedPassage],
    max_passages: usize,
    per_passage: usize,
) -> Option<String> {
    let keywords = question_keywords(question);
    if keywords.is_empty() {
        return None;
    }

    let parts: Vec<String> = passages
        .iter()
        .take(max_passages)
        .filter_map(|p| {
            let matched: Vec<&str> = split_sentences(&p.chunk.text)
                .into_iter()
                .filter(|s| {
                    let lower = s.to_lowercase();
                    keywords.iter().any(|k| lower.contains(k.as_str()))
                })
                .take(per_passage)
                .collect();
            if matched.is_empty() {
                None
            } else {
                Some(format!("Secondo {}: {}", p.chunk.source_id, matched.join(" ")))
            }
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}

/// Prefix `text` with a visible reliability annotation.
pub fn annotate_confidence(text: &str, confidence: f64) -> String {
    format!("⚠️ Affidabilità: {}%\n\n{}", as_percent(confidence), text)
}
