use super::{extract_f64, extract_id, extract_str, fmt_f64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const FUNDERS: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::varchar("country_code", 8),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

pub struct FunderParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl FunderParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("funders", BatchBuffer::new("funders", FUNDERS, batch_size));
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for FunderParser {
    fn name(&self) -> &'static str {
        "funders"
    }

    fn tables(&self) -> &'static [&'static str] {
        &["funders"]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;
        self.buffers.get_mut("funders").unwrap().add(vec![
            Some(id),
            extract_str(record, "display_name"),
            extract_str(record, "country_code"),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::EntityParser;

    #[test]
    fn extracts_flat_record() {
        let mut parser = FunderParser::new(10);
        let record: Value = serde_json::from_str(
            r#"{"id": "https://openalex.org/F1", "display_name": "NSF", "country_code": "US"}"#,
        )
        .unwrap();
        parser.parse(&record).unwrap();
        assert_eq!(parser.buffers["funders"].size(), 1);
    }
}
