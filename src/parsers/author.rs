//! optional authors-snapshot parser, disabled by default via
//! `Config::authors_enabled`; the works-derived `author_names` table is
//! canonical regardless.

use super::{extract_array, extract_f64, extract_id, extract_str, fmt_f64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const AUTHORS: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::real("works_count"),
    Column::real("cited_by_count"),
    Column::text("last_known_institution"),
];

const AUTHOR_TOPICS: &[Column] = &[Column::text("author_id"), Column::text("topic_id")];
const AUTHOR_CONCEPTS: &[Column] = &[
    Column::text("author_id"),
    Column::text("concept_id"),
    Column::real("score"),
];
const AUTHOR_INSTITUTIONS: &[Column] =
    &[Column::text("author_id"), Column::text("institution_id")];
const AUTHORS_WORKS_BY_YEAR: &[Column] = &[
    Column::text("author_id"),
    Column::bigint("year"),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

pub struct AuthorParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl AuthorParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert("authors", BatchBuffer::new("authors", AUTHORS, batch_size));
        buffers.insert(
            "author_topics",
            BatchBuffer::new("author_topics", AUTHOR_TOPICS, batch_size),
        );
        buffers.insert(
            "author_concepts",
            BatchBuffer::new("author_concepts", AUTHOR_CONCEPTS, batch_size),
        );
        buffers.insert(
            "author_institutions",
            BatchBuffer::new("author_institutions", AUTHOR_INSTITUTIONS, batch_size),
        );
        buffers.insert(
            "authors_works_by_year",
            BatchBuffer::new("authors_works_by_year", AUTHORS_WORKS_BY_YEAR, batch_size),
        );
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for AuthorParser {
    fn name(&self) -> &'static str {
        "authors"
    }

    fn tables(&self) -> &'static [&'static str] {
        &[
            "authors",
            "author_topics",
            "author_concepts",
            "author_institutions",
            "authors_works_by_year",
        ]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;

        let last_known_institution = record
            .get("last_known_institutions")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|inst| extract_id(inst, "id"));

        self.buffers.get_mut("authors").unwrap().add(vec![
            Some(id.clone()),
            extract_str(record, "display_name"),
            fmt_f64(extract_f64(record, "works_count")),
            fmt_f64(extract_f64(record, "cited_by_count")),
            last_known_institution,
        ]);

        for topic in extract_array(record, "topics") {
            if let Some(topic_id) = extract_id(topic, "id") {
                self.buffers
                    .get_mut("author_topics")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(topic_id)]);
            }
        }

        for concept in extract_array(record, "x_concepts") {
            if let Some(concept_id) = extract_id(concept, "id") {
                self.buffers.get_mut("author_concepts").unwrap().add(vec![
                    Some(id.clone()),
                    Some(concept_id),
                    fmt_f64(extract_f64(concept, "score")),
                ]);
            }
        }

        for affiliation in extract_array(record, "affiliations") {
            let institution_id = affiliation
                .get("institution")
                .and_then(|inst| extract_id(inst, "id"));
            if let Some(institution_id) = institution_id {
                self.buffers
                    .get_mut("author_institutions")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(institution_id)]);
            }
        }

        for yearly in extract_array(record, "counts_by_year") {
            self.buffers
                .get_mut("authors_works_by_year")
                .unwrap()
                .add(vec![
                    Some(id.clone()),
                    yearly
                        .get("year")
                        .and_then(Value::as_i64)
                        .map(|y| y.to_string()),
                    fmt_f64(extract_f64(yearly, "works_count")),
                    fmt_f64(extract_f64(yearly, "cited_by_count")),
                ]);
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
    fn extracts_author_and_relationships() {
        let mut parser = AuthorParser::new(10);
        let record: Value = serde_json::from_str(
            r#"{
                "id": "https://openalex.org/A999",
                "display_name": "Jane Doe",
                "topics": [{"id": "https://openalex.org/T1"}],
                "affiliations": [{"institution": {"id": "https://openalex.org/I5"}}]
            }"#,
        )
        .unwrap();
        parser.parse(&record).unwrap();
        assert_eq!(parser.buffers["authors"].size(), 1);
        assert_eq!(parser.buffers["author_topics"].size(), 1);
        assert_eq!(parser.buffers["author_institutions"].size(), 1);
    }
}
