use super::{extract_array, extract_f64, extract_id, extract_str, fmt_f64};
use crate::batch::{BatchBuffer, Column};
use crate::error::{ExtractError, WriteError};
use crate::writer::{WriteOutcome, Writer};
use serde_json::Value;
use std::collections::HashMap;

const INSTITUTIONS: &[Column] = &[
    Column::text("id"),
    Column::varchar("display_name", 512),
    Column::varchar("type", 64),
    Column::real("works_count"),
    Column::real("cited_by_count"),
];

const INSTITUTION_GEO: &[Column] = &[
    Column::text("institution_id"),
    Column::real("latitude"),
    Column::real("longitude"),
    Column::varchar("city", 256),
    Column::varchar("country_code", 8),
];

const INSTITUTION_HIERARCHY: &[Column] = &[
    Column::text("institution_id"),
    Column::text("ancestor_id"),
];

pub struct InstitutionParser {
    buffers: HashMap<&'static str, BatchBuffer>,
}

impl InstitutionParser {
    pub fn new(batch_size: usize) -> Self {
        let mut buffers = HashMap::new();
        buffers.insert(
            "institutions",
            BatchBuffer::new("institutions", INSTITUTIONS, batch_size),
        );
        buffers.insert(
            "institution_geo",
            BatchBuffer::new("institution_geo", INSTITUTION_GEO, batch_size),
        );
        buffers.insert(
            "institution_hierarchy",
            BatchBuffer::new("institution_hierarchy", INSTITUTION_HIERARCHY, batch_size),
        );
        Self { buffers }
    }
}

#[async_trait::async_trait]
impl super::EntityParser for InstitutionParser {
    fn name(&self) -> &'static str {
        "institutions"
    }

    fn tables(&self) -> &'static [&'static str] {
        &["institutions", "institution_geo", "institution_hierarchy"]
    }

    fn parse(&mut self, record: &Value) -> Result<(), ExtractError> {
        let id = extract_id(record, "id").ok_or(ExtractError::MissingPrimaryId)?;

        self.buffers.get_mut("institutions").unwrap().add(vec![
            Some(id.clone()),
            extract_str(record, "display_name"),
            extract_str(record, "type"),
            fmt_f64(extract_f64(record, "works_count")),
            fmt_f64(extract_f64(record, "cited_by_count")),
        ]);

        if let Some(geo) = record.get("geo") {
            self.buffers.get_mut("institution_geo").unwrap().add(vec![
                Some(id.clone()),
                fmt_f64(extract_f64(geo, "latitude")),
                fmt_f64(extract_f64(geo, "longitude")),
                extract_str(geo, "city"),
                extract_str(geo, "country_code"),
            ]);
        }

        for ancestor in extract_array(record, "lineage") {
            if let Some(ancestor_id) = ancestor.as_str().and_then(|raw| crate::id::normalise(Some(raw))) {
                if ancestor_id != id {
                    self.buffers
                        .get_mut("institution_hierarchy")
                        .unwrap()
                        .add(vec![Some(id.clone()), Some(ancestor_id)]);
                }
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
    fn extracts_geo_and_lineage() {
        let mut parser = InstitutionParser::new(10);
        let record: Value = serde_json::from_str(
            r#"{
                "id": "https://openalex.org/I1",
                "display_name": "MIT",
                "geo": {"latitude": 42.3, "longitude": -71.1, "city": "Cambridge", "country_code": "US"},
                "lineage": ["https://openalex.org/I1", "https://openalex.org/I100"]
            }"#,
        )
        .unwrap();
        parser.parse(&record).unwrap();
        assert_eq!(parser.buffers["institutions"].size(), 1);
        assert_eq!(parser.buffers["institution_geo"].size(), 1);
        // self-reference in lineage is excluded, leaving one ancestor
        assert_eq!(parser.buffers["institution_hierarchy"].size(), 1);
    }
}
