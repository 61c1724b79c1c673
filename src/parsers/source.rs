use super::{extract_f64, extract_id, extract_str, fmt_f64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const SOURCES: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::varchar("issn_l", 16),
    Column::varchar("type", 64),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

const SOURCE_PUBLISHERS: &[Column] = &[Column::text("source_id"), Column::text("publisher_id")];

pub struct SourceParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl SourceParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("sources", BatchBuffer::new("sources", SOURCES, batch_size));
        buffers.insert(
            "source_publishers",
            BatchBuffer::new("source_publishers", SOURCE_PUBLISHERS, batch_size),
        );
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for SourceParser {
    fn name(&self) -> &'static str {
        "sources"
    }

    fn tables(&self) -> &'static [&'static str] {
        &["sources", "source_publishers"]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;
        self.buffers.get_mut("sources").unwrap().add(vec![
            Some(id.clone()),
            extract_str(record, "display_name"),
            extract_str(record, "issn_l"),
            extract_str(record, "type"),
            fmt_f64(extract_f64(record, "works_count")),
            fmt_f64(extract_f64(record, "cited_by_count")),
        ]);

        if let Some(publisher_id) = record
            .get("host_organization")
            .and_then(Value::as_str)
            .and_then(|raw| crate::id::normalise(Some(raw)))
        {
            self.buffers
                .get_mut("source_publishers")
                .unwrap()
                .add(vec![Some(id), Some(publisher_id)]);
        }
        Ok(())
    }

    async fn flush_ready(&mut self, writer: &dyn Writer) -> Result<WriteOutcome, WriteError> {
        super::flush_ready(&mut self.buffers, writer).await
    }

    async fn flush_all(&mut self, writer: &dyn Writer) -> Result<WriteOutcome, WriteError> {
        super::flush_all(&mut self.buffers, writer).await
    }
}
