//! Text extraction, one parser per [`DocumentKind`].
//!
//! Text and PDF documents come out as one string for the chunker; CSV files
//! come out as one serialized line per data row (`"column: value | …"`),
//! since each row is stored as its own chunk.

use std::path::Path;

use thiserror::Error;

use sportello_core::chunk::csv_row_text;
use sportello_core::models::DocumentKind;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported document type: {0}")]
    Unsupported(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("CSV parsing failed: {0}")]
    Csv(String),
    #[error("document is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Extracted document content, shaped for the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Free text to be chunked.
    Text(String),
    /// Pre-serialized CSV rows, one chunk each.
    Rows(Vec<String>),
}

/// Infer the kind from `path`'s extension.
pub fn kind_for_path(path: &Path) -> Result<DocumentKind, ExtractError> {
    let name = path.to_string_lossy();
    DocumentKind::from_path(&name).ok_or_else(|| ExtractError::Unsupported(name.into_owned()))
}

pub fn extract(kind: DocumentKind, bytes: &[u8]) -> Result<Extracted, ExtractError> {
    match kind {
        DocumentKind::Text => extract_plain(bytes).map(Extracted::Text),
        DocumentKind::Pdf => extract_pdf(bytes).map(Extracted::Text),
        DocumentKind::Csv => csv_rows(&extract_plain(bytes)?).map(Extracted::Rows),
    }
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = String::from_utf8(bytes.to_vec())?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Serialize every data row of a CSV document (first record is the header).
pub fn csv_rows(text: &str) -> Result<Vec<String>, ExtractError> {
    let mut records = parse_csv(text)?.into_iter();
    let Some(headers) = records.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
    Ok(records.map(|row| csv_row_text(&headers, &row)).collect())
}

/// Parse CSV with double-quoted fields (`""` escapes a quote, quoted fields
/// may span lines). Blank lines are skipped.
pub fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    fn end_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>, field: &mut String) {
        record.push(std::mem::take(field));
        let row = std::mem::take(record);
        if !(row.len() == 1 && row[0].is_empty()) {
            records.push(row);
        }
    }

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' | '\r' => {
                line += 1;
                end_record(&mut records, &mut record, &mut field);
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ExtractError::Csv(format!("unterminated quoted field at line {}", line)));
    }
    if !field.is_empty() || !record.is_empty() {
        end_record(&mut records, &mut record, &mut field);
    }
    Ok(records)
}
