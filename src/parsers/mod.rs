//! EntityParser family. One parser per entity type, all satisfying the
//! same small capability interface instead of a base-class hierarchy:
//! `parse` stages rows into the parser's own buffers, `flush_ready`/
//! `flush_all` hand buffers over threshold (or all of them, at file end)
//! to the writer.

mod author;
mod concept;
mod funder;
mod institution;
mod publisher;
mod source;
mod topic;
mod work;

pub use author::AuthorParser;
pub use concept::ConceptParser;
pub use funder::FunderParser;
pub use institution::InstitutionParser;
pub use publisher::PublisherParser;
pub use source::SourceParser;
pub use topic::TopicParser;
pub use work::WorkParser;

use crate::batch::BatchBuffer;
use crate::error::ExtractError;
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

#[async_trait::async_trait]
pub trait EntityParser: Send {
    fn name(&self) -> &'static str;
    fn tables(&self) -> &'static [&'static str];

    /// processes one decoded JSON record. On success, rows are staged into
    /// this parser's buffers; nothing is written to the database yet. An
    /// `Err` means the record had no usable primary identifier and was
    /// entirely skipped — no partial writes.
    fn parse(&mut self, record: &Value) -> Result<(), ExtractError>;

    /// flushes whichever buffers are currently over threshold.
    async fn flush_ready(&mut self, writer: &dyn Writer) -> Result<WriteOutcome, crate::error::WriteError>;

    /// flushes every buffer regardless of threshold, for end-of-file.
    async fn flush_all(&mut self, writer: &dyn Writer) -> Result<WriteOutcome, crate::error::WriteError>;
}

/// shared buffer-flush logic so individual parsers only declare their
/// column layout and extraction, not flush bookkeeping.
pub(crate) async fn flush_ready(
    buffers: &mut HashMap<&'static str, BatchBuffer>,
    writer: &dyn Writer,
) -> Result<WriteOutcome, crate::error::WriteError> {
    let mut combined = WriteOutcome::default();
    for buffer in buffers.values_mut() {
        if buffer.over_threshold() {
            combined.merge(buffer.flush(writer).await?);
        }
    }
    Ok(combined)
}

pub(crate) async fn flush_all(
    buffers: &mut HashMap<&'static str, BatchBuffer>,
    writer: &dyn Writer,
) -> Result<WriteOutcome, crate::error::WriteError> {
    let mut combined = WriteOutcome::default();
    for buffer in buffers.values_mut() {
        combined.merge(buffer.flush(writer).await?);
    }
    Ok(combined)
}

pub fn extract_id(record: &Value, field: &str) -> Option<String> {
    crate::id::normalise(record.get(field).and_then(Value::as_str))
}

pub fn extract_str(record: &Value, field: &str) -> Option<String> {
    record.get(field).and_then(Value::as_str).map(str::to_string)
}

pub fn extract_f64(record: &Value, field: &str) -> Option<f64> {
    record.get(field).and_then(Value::as_f64)
}

pub fn extract_i64(record: &Value, field: &str) -> Option<i64> {
    record.get(field).and_then(Value::as_i64)
}

pub fn extract_bool(record: &Value, field: &str) -> Option<bool> {
    record.get(field).and_then(Value::as_bool)
}

pub fn extract_array<'a>(record: &'a Value, field: &str) -> &'a [Value] {
    record
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

pub fn fmt_f64(v: Option<f64>) -> Option<String> {
    v.map(|x| x.to_string())
}

pub fn fmt_i64(v: Option<i64>) -> Option<String> {
    v.map(|x| x.to_string())
}

pub fn fmt_bool(v: Option<bool>) -> Option<String> {
    v.map(|b| b.to_string())
}

/// splits a display name into (forename, surname) using a last-token-is-
/// surname heuristic. Never fails the enclosing record — a name with no
/// spaces yields a surname-only result, an empty name yields `(None, None)`.
pub fn split_display_name(display_name: &str) -> (Option<String>, Option<String>) {
    let trimmed = display_name.trim();
    if trimmed.is_empty() {
        return (None, None);
    }
    let mut parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() < 2 {
        return (None, Some(trimmed.to_string()));
    }
    let surname = parts.pop().unwrap().to_string();
    let forename = parts.join(" ");
    (Some(forename), Some(surname))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_two_token_name() {
        assert_eq!(
            split_display_name("Ada Lovelace"),
            (Some("Ada".to_string()), Some("Lovelace".to_string()))
        );
    }

    #[test]
    fn splits_multi_token_name_last_is_surname() {
        assert_eq!(
            split_display_name("Maria Goeppert Mayer"),
            (Some("Maria Goeppert".to_string()), Some("Mayer".to_string()))
        );
    }

    #[test]
    fn single_token_name_is_surname_only() {
        assert_eq!(split_display_name("Cher"), (None, Some("Cher".to_string())));
    }

    #[test]
    fn empty_name_is_none() {
        assert_eq!(split_display_name("  "), (None, None));
    }
}
