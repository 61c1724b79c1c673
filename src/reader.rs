//! GzStreamReader. Streams `part_*.gz` files one JSON record at a time so
//! memory use stays flat regardless of snapshot size, and reports
//! per-file outcomes so the orchestrator can checkpoint progress between
//! files rather than within one.

use crate::error::ReadError;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// result of reading one `part_*.gz` file to completion (or to its limit).
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub records: usize,
    pub elapsed: Duration,
    pub errors: usize,
}

/// one decoded JSON line, or the malformed-line error it produced. Kept
/// distinct from a hard I/O error so a single bad line doesn't abort the
/// whole file.
pub enum Record {
    Line(serde_json::Value),
    Malformed { line: usize, source: serde_json::Error },
}

/// lists `part_*.gz` files under `dir` in lexicographic order, which is
/// also snapshot-chronological order for OpenAlex's naming convention.
pub fn discover_parts(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut parts = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(crate::PART_FILE_GLOB) && name.ends_with(".gz") {
            parts.push(path);
        }
    }
    parts.sort();
    Ok(parts)
}

/// a lazy line iterator over one gzip file, for callers (the Orchestrator)
/// that need to interleave reads with async work — flushing a buffer to
/// the writer — between records. [`read_part`] is the simpler,
/// synchronous-callback alternative used by the reader's own tests.
pub struct GzLines {
    path: PathBuf,
    lines: std::io::Lines<std::io::BufReader<flate2::read::MultiGzDecoder<std::fs::File>>>,
}

impl GzLines {
    pub fn open(path: &Path) -> Result<Self, ReadError> {
        let file = std::fs::File::open(path).map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let decoder = flate2::read::MultiGzDecoder::new(file);
        Ok(Self {
            path: path.to_path_buf(),
            lines: std::io::BufReader::new(decoder).lines(),
        })
    }
}

impl Iterator for GzLines {
    type Item = Result<String, ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next().map(|line| {
            line.map_err(|source| ReadError::Io {
                path: self.path.clone(),
                source,
            })
        })
    }
}

/// streams one gzip JSON-lines file, calling `on_record` for every line.
/// `limit` caps the number of records read, for `test --limit N` runs;
/// `None` reads the file to completion.
pub fn read_part(
    path: &Path,
    limit: Option<usize>,
    mut on_record: impl FnMut(Record),
) -> Result<FileOutcome, ReadError> {
    let started = Instant::now();
    let file = std::fs::File::open(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = flate2::read::MultiGzDecoder::new(file);
    let reader = std::io::BufReader::new(decoder);

    let mut records = 0;
    let mut errors = 0;
    for (idx, line) in reader.lines().enumerate() {
        if let Some(limit) = limit {
            if records >= limit {
                break;
            }
        }
        let line = line.map_err(|source| ReadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<serde_json::Value>(&line) {
            Ok(value) => {
                records += 1;
                on_record(Record::Line(value));
            }
            Err(source) => {
                errors += 1;
                on_record(Record::Malformed { line: idx + 1, source });
            }
        }
    }

    Ok(FileOutcome {
        path: path.to_path_buf(),
        records,
        elapsed: started.elapsed(),
        errors,
    })
}
