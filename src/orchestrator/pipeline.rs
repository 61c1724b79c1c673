//! Runs one parser to completion against its configured input directory,
//! checkpointing StateStore after every file.

use super::registry::ParserCtor;
use crate::config::Config;
use crate::error_sink::ErrorSink;
use crate::parsers::EntityParser;
use crate::reader;
use crate::state::{ParserState, State, StateStore, Status};
use crate::writer::{WriteOutcome, Writer};
use crate::ShutdownFlag;
use chrono::Utc;
use std::time::Instant;

fn record_outcome(sink: &ErrorSink, file: &str, outcome: &WriteOutcome) -> u64 {
    let mut lines = 0u64;
    for rejection in &outcome.rejected {
        sink.record(file, 0, "copy-reject", &rejection.reason);
        lines += 1;
    }
    if outcome.truncated > 0 {
        sink.record(
            file,
            0,
            "field-overflow",
            &format!("{} field(s) truncated to column width", outcome.truncated),
        );
        lines += 1;
    }
    lines
}

/// runs `name`'s parser over its configured directory, resuming after
/// `files_processed` if state already has progress for it. Returns `true`
/// if the parser reached `complete` without a file-level failure.
pub async fn run_entity(
    name: &'static str,
    ctor: ParserCtor,
    config: &Config,
    writer: &dyn Writer,
    store: &StateStore,
    shutdown: &ShutdownFlag,
) -> anyhow::Result<bool> {
    let Some(dir) = config.entity_dir(name) else {
        log::info!("{name}: no directory configured, skipping");
        return Ok(true);
    };

    let parts = reader::discover_parts(dir)?;
    let parts_len = parts.len();
    let mut progress = store.update(name, |p| {
        if p.started_at.is_none() {
            p.started_at = Some(Utc::now());
        }
        p.status = Status::Running;
        p.files_discovered = parts_len;
    })?;
    let skip = progress.files_processed;

    let error_sink = ErrorSink::open(&config.log_dir, name)?;
    let mut parser = ctor(config.batch_size);
    let mut failed = false;
    let bar = crate::progress(parts_len);
    bar.set_position(skip as u64);
    bar.set_message(name);

    for path in parts.iter().skip(skip) {
        if shutdown.requested() {
            log::warn!(
                "{name}: shutdown requested, stopping before {}",
                path.display()
            );
            break;
        }

        let file_name = path.file_name().unwrap().to_string_lossy().to_string();
        let started = Instant::now();
        let mut records_read = 0usize;
        let mut parsed_in_file = 0u64;

        let lines = match reader::GzLines::open(path) {
            Ok(lines) => lines,
            Err(e) => {
                log::error!("{name}: aborting {file_name}: {e}");
                failed = true;
                break;
            }
        };

        let mut io_failed = false;
        for (idx, line) in lines.enumerate() {
            if let Some(limit) = config.limit {
                if records_read >= limit {
                    break;
                }
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    log::error!("{name}: io error reading {file_name}: {e}");
                    io_failed = true;
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<serde_json::Value>(&line) {
                Ok(value) => {
                    records_read += 1;
                    match parser.parse(&value) {
                        Ok(()) => parsed_in_file += 1,
                        Err(_) => {
                            progress.errors += 1;
                            error_sink.record(&file_name, idx + 1, "missing-key", &line);
                        }
                    }
                }
                Err(_) => {
                    progress.errors += 1;
                    error_sink.record(&file_name, idx + 1, "json-parse", &line);
                }
            }

            let outcome = parser.flush_ready(writer).await?;
            progress.errors += record_outcome(&error_sink, &file_name, &outcome);

            let records_so_far = progress.records + parsed_in_file;
            if records_so_far > 0 && records_so_far as usize % config.progress_interval == 0 {
                log::info!("{name}: {records_so_far} records processed");
            }
        }

        if !io_failed {
            let outcome = parser.flush_all(writer).await?;
            progress.errors += record_outcome(&error_sink, &file_name, &outcome);
        }

        progress.records += parsed_in_file;
        if !io_failed {
            progress.files_processed += 1;
            progress.last_file = Some(file_name.clone());
        }
        progress.updated_at = Some(Utc::now());
        progress = store.update(name, |p| *p = progress.clone())?;

        if io_failed {
            failed = true;
            break;
        }
        bar.inc(1);
        log::debug!(
            "{name}: finished {file_name} in {:?} ({records_read} read, {parsed_in_file} parsed)",
            started.elapsed()
        );
    }
    bar.finish_and_clear();

    error_sink.flush()?;
    let completed_all = !failed && progress.files_processed >= parts_len;
    progress.status = if failed {
        Status::Failed
    } else if completed_all {
        Status::Done
    } else {
        Status::Pending
    };
    if completed_all {
        progress.finished_at = Some(Utc::now());
    }
    progress.updated_at = Some(Utc::now());
    store.update(name, |p| *p = progress.clone())?;

    Ok(!failed)
}

#[cfg(test)]
mod scenario_tests {
    use super::*;
    use crate::batch::{Column, RawRow};
    use crate::config::{DatabaseConfig, EntityConfig};
    use crate::parsers::{AuthorParser, TopicParser, WorkParser};
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::collections::HashMap;
    use std::io::Write as _;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    /// records every row handed to it, applying the same column-width
    /// truncation a real `CopyWriter` would, so tests can assert on the
    /// same outcome an operator would see without a live Postgres.
    #[derive(Default)]
    struct RecordingWriter {
        tables: Mutex<HashMap<String, Vec<RawRow>>>,
    }

    impl RecordingWriter {
        fn rows(&self, table: &str) -> Vec<RawRow> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait::async_trait]
    impl Writer for RecordingWriter {
        async fn write(
            &self,
            table: &str,
            columns: &[Column],
            mut rows: Vec<RawRow>,
        ) -> Result<WriteOutcome, crate::error::WriteError> {
            let truncated = crate::writer::truncate_overflowing(columns, &mut rows);
            let written = rows.len() as u64;
            self.tables
                .lock()
                .unwrap()
                .entry(table.to_string())
                .or_default()
                .extend(rows);
            Ok(WriteOutcome {
                written,
                rejected: Vec::new(),
                truncated,
            })
        }
    }

    fn write_gz(dir: &Path, name: &str, lines: &[String]) -> PathBuf {
        let path = dir.join(name);
        let file = std::fs::File::create(&path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        for line in lines {
            writeln!(encoder, "{line}").unwrap();
        }
        encoder.finish().unwrap();
        path
    }

    fn test_config(root: &Path, entity: &'static str, entity_dir: PathBuf) -> Config {
        let mut entities = HashMap::new();
        entities.insert(
            entity.to_string(),
            EntityConfig {
                directory: entity_dir,
                enabled: true,
            },
        );
        Config {
            database: DatabaseConfig {
                host: "localhost".into(),
                port: 5432,
                name: "openalex".into(),
                user: "oa".into(),
                password: String::new(),
            },
            snapshot_dir: root.to_path_buf(),
            entities,
            batch_size: 10,
            progress_interval: 1_000_000,
            parallel_parsers: 1,
            use_unlogged_tables: false,
            limit: None,
            state_file: root.join("state.json"),
            log_dir: root.join("logs"),
            max_retries: 1,
        }
    }

    fn topic_ctor(n: usize) -> Box<dyn EntityParser> {
        Box::new(TopicParser::new(n))
    }

    fn author_ctor(n: usize) -> Box<dyn EntityParser> {
        Box::new(AuthorParser::new(n))
    }

    fn work_ctor(n: usize) -> Box<dyn EntityParser> {
        Box::new(WorkParser::new(n))
    }

    fn bare(row: &RawRow, i: usize) -> &str {
        row[i].as_deref().unwrap()
    }

    /// S1 — topics happy path: 3 records, each with a full 4-level hierarchy.
    #[tokio::test]
    async fn s1_topics_happy_path() {
        let root = tempfile::tempdir().unwrap();
        let entity_dir = root.path().join("topics");
        std::fs::create_dir_all(&entity_dir).unwrap();
        let lines: Vec<String> = ["T1", "T2", "T3"]
            .iter()
            .map(|id| {
                format!(
                    r#"{{"id": "https://openalex.org/{id}", "display_name": "{id}", "hierarchy": {{"domain": {{"id": "https://openalex.org/D1"}}, "field": {{"id": "https://openalex.org/F1"}}, "subfield": {{"id": "https://openalex.org/S1"}}}}}}"#
                )
            })
            .collect();
        write_gz(&entity_dir, "part_000.gz", &lines);

        let config = test_config(root.path(), "topics", entity_dir);
        let store = StateStore::new(config.state_file.clone());
        let writer = RecordingWriter::default();
        let shutdown = ShutdownFlag::new();

        let ok = run_entity("topics", topic_ctor, &config, &writer, &store, &shutdown)
            .await
            .unwrap();
        assert!(ok);

        let topics = writer.rows("topics");
        assert_eq!(topics.len(), 3);
        let hierarchy = writer.rows("topic_hierarchy");
        assert_eq!(hierarchy.len(), 3);
        for row in &hierarchy {
            assert_eq!(bare(row, 1), "D1");
            assert_eq!(bare(row, 2), "F1");
            assert_eq!(bare(row, 3), "S1");
        }

        let state = store.load().unwrap();
        let progress = &state.parsers["topics"];
        assert_eq!(progress.status, Status::Done);
        assert_eq!(progress.files_processed, 1);
        assert_eq!(progress.records, 3);
        assert_eq!(progress.errors, 0);
    }

    /// S2 — author record with nested topic/institution references; every
    /// written identifier is bare, never the `https://openalex.org/` form.
    #[tokio::test]
    async fn s2_author_id_normalisation() {
        let root = tempfile::tempdir().unwrap();
        let entity_dir = root.path().join("authors");
        std::fs::create_dir_all(&entity_dir).unwrap();
        let line = r#"{"id": "https://openalex.org/A999", "display_name": "Jane Doe", "topics": [{"id": "https://openalex.org/T1"}], "affiliations": [{"institution": {"id": "https://openalex.org/I5"}}]}"#.to_string();
        write_gz(&entity_dir, "part_000.gz", &[line]);

        let config = test_config(root.path(), "authors", entity_dir);
        let store = StateStore::new(config.state_file.clone());
        let writer = RecordingWriter::default();
        let shutdown = ShutdownFlag::new();

        run_entity("authors", author_ctor, &config, &writer, &store, &shutdown)
            .await
            .unwrap();

        let authors = writer.rows("authors");
        assert_eq!(authors.len(), 1);
        assert_eq!(bare(&authors[0], 0), "A999");

        let topics = writer.rows("author_topics");
        assert_eq!(topics.len(), 1);
        assert_eq!(bare(&topics[0], 0), "A999");
        assert_eq!(bare(&topics[0], 1), "T1");

        let institutions = writer.rows("author_institutions");
        assert_eq!(institutions.len(), 1);
        assert_eq!(bare(&institutions[0], 1), "I5");
    }

    /// S3 — one work with three authorships carrying different shapes of
    /// institution/country data.
    #[tokio::test]
    async fn s3_work_multi_authorship() {
        let root = tempfile::tempdir().unwrap();
        let entity_dir = root.path().join("works");
        std::fs::create_dir_all(&entity_dir).unwrap();
        let line = r#"{"id": "https://openalex.org/W1", "authorships": [
            {"author": {"id": "https://openalex.org/A1", "display_name": "Alice Alpha"}, "author_position": "first", "is_corresponding": true, "institutions": [{"id": "https://openalex.org/I1"}, {"id": "https://openalex.org/I2"}], "countries": ["US"]},
            {"author": {"id": "https://openalex.org/A2", "display_name": "Bob Beta"}, "author_position": "middle", "institutions": [{"id": "https://openalex.org/I3"}], "countries": ["DE"]},
            {"author": {"id": "https://openalex.org/A3", "display_name": "Cher"}, "author_position": "last", "institutions": [], "countries": []}
        ]}"#.to_string();
        write_gz(&entity_dir, "part_000.gz", &[line]);

        let config = test_config(root.path(), "works", entity_dir);
        let store = StateStore::new(config.state_file.clone());
        let writer = RecordingWriter::default();
        let shutdown = ShutdownFlag::new();

        run_entity("works", work_ctor, &config, &writer, &store, &shutdown)
            .await
            .unwrap();

        assert_eq!(writer.rows("works").len(), 1);
        assert_eq!(writer.rows("authorship").len(), 3);
        assert_eq!(writer.rows("authorship_institutions").len(), 3);
        assert_eq!(writer.rows("authorship_countries").len(), 2);

        let names = writer.rows("author_names");
        assert_eq!(names.len(), 3);
        let alice = names.iter().find(|r| bare(r, 1) == "A1").unwrap();
        assert_eq!(alice[2].as_deref(), Some("Alice"));
        assert_eq!(alice[3].as_deref(), Some("Alpha"));
        let cher = names.iter().find(|r| bare(r, 1) == "A3").unwrap();
        assert_eq!(cher[2], None);
        assert_eq!(cher[3].as_deref(), Some("Cher"));
    }

    /// S4 — a malformed line and a line missing its primary id are each
    /// skipped and logged; every other record still lands.
    #[tokio::test]
    async fn s4_malformed_and_missing_id_lines() {
        let root = tempfile::tempdir().unwrap();
        let entity_dir = root.path().join("topics");
        std::fs::create_dir_all(&entity_dir).unwrap();

        let lines: Vec<String> = (1..=100)
            .map(|i| match i {
                42 => "not json".to_string(),
                77 => r#"{"display_name": "Orphan"}"#.to_string(),
                _ => format!(r#"{{"id": "https://openalex.org/T{i}", "display_name": "Topic {i}"}}"#),
            })
            .collect();
        write_gz(&entity_dir, "part_000.gz", &lines);

        let config = test_config(root.path(), "topics", entity_dir);
        let store = StateStore::new(config.state_file.clone());
        let writer = RecordingWriter::default();
        let shutdown = ShutdownFlag::new();

        run_entity("topics", topic_ctor, &config, &writer, &store, &shutdown)
            .await
            .unwrap();

        assert_eq!(writer.rows("topics").len(), 98);

        let state = store.load().unwrap();
        let progress = &state.parsers["topics"];
        assert_eq!(progress.records, 98);
        assert_eq!(progress.errors, 2);

        let log = std::fs::read_to_string(config.log_dir.join("topics.errors.tsv")).unwrap();
        assert_eq!(log.lines().count(), 2);
        assert!(log.contains("json-parse"));
        assert!(log.contains("missing-key"));
    }

    /// S5 — an over-long display name is truncated to the column's
    /// declared width rather than rejected, and the truncation is logged.
    #[tokio::test]
    async fn s5_column_overflow_is_truncated_not_dropped() {
        let root = tempfile::tempdir().unwrap();
        let entity_dir = root.path().join("topics");
        std::fs::create_dir_all(&entity_dir).unwrap();
        let long_name = "x".repeat(600);
        let line = format!(r#"{{"id": "https://openalex.org/T1", "display_name": "{long_name}"}}"#);
        write_gz(&entity_dir, "part_000.gz", &[line]);

        let config = test_config(root.path(), "topics", entity_dir);
        let store = StateStore::new(config.state_file.clone());
        let writer = RecordingWriter::default();
        let shutdown = ShutdownFlag::new();

        run_entity("topics", topic_ctor, &config, &writer, &store, &shutdown)
            .await
            .unwrap();

        let topics = writer.rows("topics");
        assert_eq!(topics.len(), 1);
        let name = topics[0][1].as_deref().unwrap();
        assert_eq!(name.len(), 512);

        let state = store.load().unwrap();
        let progress = &state.parsers["topics"];
        assert_eq!(progress.records, 1);

        let log = std::fs::read_to_string(config.log_dir.join("topics.errors.tsv")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("field-overflow"));
    }

    /// S6 — resuming after a mid-snapshot kill re-reads only the files that
    /// were never marked complete; already-finished files are not reopened.
    #[tokio::test]
    async fn s6_resume_skips_completed_files() {
        let root = tempfile::tempdir().unwrap();
        let entity_dir = root.path().join("topics");
        std::fs::create_dir_all(&entity_dir).unwrap();
        for (i, id) in ["T1", "T2", "T3"].iter().enumerate() {
            let line = format!(r#"{{"id": "https://openalex.org/{id}"}}"#);
            write_gz(&entity_dir, &format!("part_{i:03}.gz"), &[line]);
        }

        let config = test_config(root.path(), "topics", entity_dir);
        let store = StateStore::new(config.state_file.clone());

        // simulate a crash after part_000.gz and part_001.gz had already
        // been checkpointed as `Running` (mid-file-2, then killed).
        let mut state = State::default();
        state.parsers.insert(
            "topics".to_string(),
            ParserState {
                status: Status::Running,
                files_discovered: 3,
                files_processed: 2,
                records: 2,
                last_file: Some("part_001.gz".to_string()),
                ..Default::default()
            },
        );
        store.save(&state).unwrap();
        let resumed = store.prepare_resume().unwrap();
        store.save(&resumed).unwrap();

        let writer = RecordingWriter::default();
        let shutdown = ShutdownFlag::new();
        run_entity("topics", topic_ctor, &config, &writer, &store, &shutdown)
            .await
            .unwrap();

        // only part_002.gz (T3) should have been (re-)read this run.
        let topics = writer.rows("topics");
        assert_eq!(topics.len(), 1);
        assert_eq!(bare(&topics[0], 0), "T3");

        let final_state = store.load().unwrap();
        let progress = &final_state.parsers["topics"];
        assert_eq!(progress.status, Status::Done);
        assert_eq!(progress.files_processed, 3);
        assert_eq!(progress.records, 3);
    }
}
