//! Works parser. The heaviest of the family: one main row plus up to a
//! dozen relationship tables per record, all propagating the work's bare
//! identifier.

use super::{
    extract_array, extract_bool, extract_f64, extract_i64, extract_id, extract_str,
    split_display_name, fmt_bool, fmt_f64, fmt_i64,
};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const WORKS: &[Column] = &[
    Column::text("id"),
    Column::varchar("title", 2048),
    Column::bigint("publication_year"),
    Column::varchar("publication_date", 32),
    Column::varchar("type", 64),
    Column::real("cited_by_count"),
    Column::boolean("is_retracted"),
    Column::varchar("language", 16),
];

const AUTHORSHIP: &[Column] = &[
    Column::text("work_id"),
    Column::text("author_id"),
    Column::varchar("author_display_name", 512),
    Column::varchar("raw_author_name", 512),
    Column::varchar("position", 16),
    Column::boolean("is_corresponding"),
];

const AUTHORSHIP_INSTITUTIONS: &[Column] = &[
    Column::text("work_id"),
    Column::text("author_id"),
    Column::text("institution_id"),
    Column::varchar("country_code", 8),
];

const AUTHORSHIP_COUNTRIES: &[Column] = &[
    Column::text("work_id"),
    Column::text("author_id"),
    Column::varchar("country_code", 8),
];

const AUTHOR_NAMES: &[Column] = &[
    Column::text("work_id"),
    Column::text("author_id"),
    Column::varchar("forename", 256),
    Column::varchar("surname", 256),
];

const WORK_TOPICS: &[Column] = &[
    Column::text("work_id"),
    Column::text("topic_id"),
    Column::real("score"),
];

const WORK_CONCEPTS: &[Column] = &[
    Column::text("work_id"),
    Column::text("concept_id"),
    Column::real("score"),
];

const WORK_SOURCES: &[Column] = &[Column::text("work_id"), Column::text("source_id")];

const WORK_KEYWORDS: &[Column] = &[Column::text("work_id"), Column::varchar("keyword", 256)];

const WORK_FUNDERS: &[Column] = &[Column::text("work_id"), Column::text("funder_id")];

const CITATIONS_BY_YEAR: &[Column] = &[
    Column::text("work_id"),
    Column::bigint("year"),
    Column::real("cited_by_count"),
];

const REFERENCED_WORKS: &[Column] =
    &[Column::text("work_id"), Column::text("referenced_work_id")];

const RELATED_WORKS: &[Column] = &[Column::text("work_id"), Column::text("related_work_id")];

const WORK_LOCATIONS: &[Column] = &[
    Column::text("work_id"),
    Column::text("source_id"),
    Column::text("landing_page_url"),
    Column::boolean("is_oa"),
];

pub struct WorkParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl WorkParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        macro_rules! insert {
            ($name:literal, $columns:expr) => {
                buffers.insert($name, BatchBuffer::new($name, $columns, batch_size));
            };
        }
        insert!("works", WORKS);
        insert!("authorship", AUTHORSHIP);
        insert!("authorship_institutions", AUTHORSHIP_INSTITUTIONS);
        insert!("authorship_countries", AUTHORSHIP_COUNTRIES);
        insert!("author_names", AUTHOR_NAMES);
        insert!("work_topics", WORK_TOPICS);
        insert!("work_concepts", WORK_CONCEPTS);
        insert!("work_sources", WORK_SOURCES);
        insert!("work_keywords", WORK_KEYWORDS);
        insert!("work_funders", WORK_FUNDERS);
        insert!("citations_by_year", CITATIONS_BY_YEAR);
        insert!("referenced_works", REFERENCED_WORKS);
        insert!("related_works", RELATED_WORKS);
        insert!("work_locations", WORK_LOCATIONS);
        Self { buffers }
    }

    fn parse_authorships(&mut self, work_id: &str, record: &Value) {
        for authorship in extract_array(record, "authorships") {
            let Some(author) = authorship.get("author") else {
                continue;
            };
            let Some(author_id) = extract_id(author, "id") else {
                continue;
            };
            let display_name = extract_str(author, "display_name");
            let raw_name = extract_str(authorship, "raw_author_name");

            self.buffers.get_mut("authorship").unwrap().add(vec![
                Some(work_id.to_string()),
                Some(author_id.clone()),
                display_name.clone(),
                raw_name,
                extract_str(authorship, "author_position"),
                fmt_bool(extract_bool(authorship, "is_corresponding")),
            ]);

            let (forename, surname) = display_name
                .as_deref()
                .map(split_display_name)
                .unwrap_or((None, None));
            self.buffers.get_mut("author_names").unwrap().add(vec![
                Some(work_id.to_string()),
                Some(author_id.clone()),
                forename,
                surname,
            ]);

            let countries: Vec<String> = extract_array(authorship, "countries")
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();

            for institution in extract_array(authorship, "institutions") {
                if let Some(institution_id) = extract_id(institution, "id") {
                    self.buffers
                        .get_mut("authorship_institutions")
                        .unwrap()
                        .add(vec![
                            Some(work_id.to_string()),
                            Some(author_id.clone()),
                            Some(institution_id),
                            countries.first().cloned(),
                        ]);
                }
            }

            for country in &countries {
                self.buffers
                    .get_mut("authorship_countries")
                    .unwrap()
                    .add(vec![
                        Some(work_id.to_string()),
                        Some(author_id.clone()),
                        Some(country.clone()),
                    ]);
            }
        }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for WorkParser {
    fn name(&self) -> &'static str {
        "works"
    }

    fn tables(&self) -> &'static [&'static str] {
        &[
            "works",
            "authorship",
            "authorship_institutions",
            "authorship_countries",
            "author_names",
            "work_topics",
            "work_concepts",
            "work_sources",
            "work_keywords",
            "work_funders",
            "citations_by_year",
            "referenced_works",
            "related_works",
            "work_locations",
        ]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;

        self.buffers.get_mut("works").unwrap().add(vec![
            Some(id.clone()),
            extract_str(record, "title"),
            fmt_i64(extract_i64(record, "publication_year")),
            extract_str(record, "publication_date"),
            extract_str(record, "type"),
            fmt_f64(extract_f64(record, "cited_by_count")),
            fmt_bool(extract_bool(record, "is_retracted")),
            record
                .get("language")
                .or_else(|| record.get("primary_location").and_then(|l| l.get("language")))
                .and_then(Value::as_str)
                .map(str::to_string),
        ]);

        self.parse_authorships(&id, record);

        for topic in extract_array(record, "topics") {
            if let Some(topic_id) = extract_id(topic, "id") {
                self.buffers.get_mut("work_topics").unwrap().add(vec![
                    Some(id.clone()),
                    Some(topic_id),
                    fmt_f64(extract_f64(topic, "score")),
                ]);
            }
        }

        for concept in extract_array(record, "concepts") {
            if let Some(concept_id) = extract_id(concept, "id") {
                self.buffers.get_mut("work_concepts").unwrap().add(vec![
                    Some(id.clone()),
                    Some(concept_id),
                    fmt_f64(extract_f64(concept, "score")),
                ]);
            }
        }

        for location in extract_array(record, "locations") {
            let source_id = location.get("source").and_then(|s| extract_id(s, "id"));
            if let Some(source_id) = source_id.clone() {
                self.buffers
                    .get_mut("work_sources")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(source_id)]);
            }
            self.buffers.get_mut("work_locations").unwrap().add(vec![
                Some(id.clone()),
                source_id,
                extract_str(location, "landing_page_url"),
                fmt_bool(extract_bool(location, "is_oa")),
            ]);
        }

        for keyword in extract_array(record, "keywords") {
            let keyword = keyword
                .get("display_name")
                .or(Some(keyword))
                .and_then(Value::as_str);
            if let Some(keyword) = keyword {
                self.buffers
                    .get_mut("work_keywords")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(keyword.to_string())]);
            }
        }

        for grant in extract_array(record, "grants") {
            if let Some(funder_id) = grant.get("funder").and_then(Value::as_str).and_then(|s| crate::id::normalise(Some(s))) {
                self.buffers
                    .get_mut("work_funders")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(funder_id)]);
            }
        }

        for yearly in extract_array(record, "counts_by_year") {
            self.buffers.get_mut("citations_by_year").unwrap().add(vec![
                Some(id.clone()),
                yearly.get("year").and_then(Value::as_i64).map(|y| y.to_string()),
                fmt_f64(extract_f64(yearly, "cited_by_count")),
            ]);
        }

        for referenced in extract_array(record, "referenced_works") {
            if let Some(referenced_id) = referenced.as_str().and_then(|s| crate::id::normalise(Some(s))) {
                self.buffers
                    .get_mut("referenced_works")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(referenced_id)]);
            }
        }

        for related in extract_array(record, "related_works") {
            if let Some(related_id) = related.as_str().and_then(|s| crate::id::normalise(Some(s))) {
                self.buffers
                    .get_mut("related_works")
                    .unwrap()
                    .add(vec![Some(id.clone()), Some(related_id)]);
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
