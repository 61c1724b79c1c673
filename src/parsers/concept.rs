use super::{extract_f64, extract_id, extract_str, fmt_f64, fmt_i64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const CONCEPTS: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::text("description"),
    Column::bigint("level"),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

pub struct ConceptParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl ConceptParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("concepts", BatchBuffer::new("concepts", CONCEPTS, batch_size));
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for ConceptParser {
    fn name(&self) -> &'static str {
        "concepts"
    }

    fn tables(&self) -> &'static [&'static str] {
        &["concepts"]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;
        self.buffers.get_mut("concepts").unwrap().add(vec![
            Some(id),
            extract_str(record, "display_name"),
            extract_str(record, "description"),
            fmt_i64(record.get("level").and_then(Value::as_i64)),
            fmt_f64(extract_f64(record, "works_count")),
            fmt_f64(extract_f64(record, "cited_by_count")),
        ]);
        Ok(())
    }

    async fn flush_ready(&mut self, writer: &dyn Writer) -> Result<WriteOutcome, WriteError> {
        super::flush_ready(&mut self.buffers, writer).await
    }

    async fn flush_all(&mut self, writer: &dyn Writer) -> Result<WriteOutcome, WriteError> {
        super::flush_all(&mut self.buffers, writer).await
    }
}
