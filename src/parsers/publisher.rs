use super::{extract_f64, extract_id, extract_str, fmt_f64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const PUBLISHERS: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::text("country_codes"),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

pub struct PublisherParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl PublisherParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert(
            "publishers",
            BatchBuffer::new("publishers", PUBLISHERS, batch_size),
        );
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for PublisherParser {
    fn name(&self) -> &'static str {
        "publishers"
    }

    fn tables(&self) -> &'static [&'static str] {
        &["publishers"]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;
        let country_codes = record
            .get("country_codes")
            .and_then(Value::as_array)
            .map(|codes| {
                codes
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join(",")
            });
        self.buffers.get_mut("publishers").unwrap().add(vec![
            Some(id),
            extract_str(record, "display_name"),
            country_codes,
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
