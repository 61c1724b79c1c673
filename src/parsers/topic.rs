use super::{extract_f64, extract_id, extract_str, fmt_f64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const TOPICS: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::text("description"),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

const TOPIC_HIERARCHY: &[Column] = &[
    Column::text("topic_id"),
    Column::text("domain_id"),
    Column::text("field_id"),
    Column::text("subfield_id"),
];

pub struct TopicParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl TopicParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("topics", BatchBuffer::new("topics", TOPICS, batch_size));
        buffers.insert(
            "topic_hierarchy",
            BatchBuffer::new("topic_hierarchy", TOPIC_HIERARCHY, batch_size),
        );
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for TopicParser {
    fn name(&self) -> &'static str {
        "topics"
    }

    fn tables(&self) -> &'static [&'static str] {
        &["topics", "topic_hierarchy"]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;

        self.buffers.get_mut("topics").unwrap().add(vec![
            Some(id.clone()),
            extract_str(record, "display_name"),
            extract_str(record, "description"),
            fmt_f64(extract_f64(record, "works_count")),
            fmt_f64(extract_f64(record, "cited_by_count")),
        ]);

        if let Some(hierarchy) = record.get("hierarchy") {
            let domain = extract_id(hierarchy, "domain_id").or_else(|| {
                hierarchy
                    .get("domain")
                    .and_then(|d| extract_id(d, "id"))
            });
            let field = extract_id(hierarchy, "field_id").or_else(|| {
                hierarchy.get("field").and_then(|d| extract_id(d, "id"))
            });
            let subfield = extract_id(hierarchy, "subfield_id").or_else(|| {
                hierarchy
                    .get("subfield")
                    .and_then(|d| extract_id(d, "id"))
            });
            if domain.is_some() || field.is_some() || subfield.is_some() {
                self.buffers
                    .get_mut("topic_hierarchy")
                    .unwrap()
                    .add(vec![Some(id), domain, field, subfield]);
            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::EntityParser;

    #[test]
    fn extracts_main_row_and_hierarchy() {
        let mut parser = TopicParser::new(10);
        let record: Value = serde_json::from_str(
            r#"{
                "id": "https://openalex.org/T1",
                "display_name": "Machine Learning",
                "works_count": 100,
                "hierarchy": {
                    "domain": {"id": "https://openalex.org/D1"},
                    "field": {"id": "https://openalex.org/F1"},
                    "subfield": {"id": "https://openalex.org/S1"}
                }
            }"#,
        )
        .unwrap();
        parser.parse(&record).unwrap();
        assert_eq!(parser.buffers["topics"].size(), 1);
        assert_eq!(parser.buffers["topic_hierarchy"].size(), 1);
    }

    #[test]
    fn missing_id_is_skipped_entirely() {
        let mut parser = TopicParser::new(10);
        let record: Value = serde_json::from_str(r#"{"display_name": "Orphan"}"#).unwrap();
        assert!(parser.parse(&record).is_err());
        assert_eq!(parser.buffers["topics"].size(), 0);
    }
}
