//! ErrorSink. A per-parser, append-only log of records that could not be
//! written. Never blocks ingestion on a slow disk: writes are buffered and
//! flushed on a timer and on `close()`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// truncate an offending record's echo so one monstrous field can't blow
/// out the error log itself.
const MAX_ECHO_LEN: usize = 500;

pub struct ErrorSink {
    path: PathBuf,
    file: Mutex<std::io::BufWriter<std::fs::File>>,
}

impl ErrorSink {
    pub fn open(log_dir: &Path, parser: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{parser}.errors.tsv"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(std::io::BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// records one rejected line: `timestamp \t file \t line \t reason \t echo`.
    pub fn record(&self, file: &str, line: usize, reason: &str, echo: &str) {
        let timestamp = chrono::Utc::now().to_rfc3339();
        let truncated: String = echo.chars().take(MAX_ECHO_LEN).collect();
        let mut writer = self.file.lock().expect("error sink mutex poisoned");
        let _ = writeln!(writer, "{timestamp}\t{file}\t{line}\t{reason}\t{truncated}");
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.file.lock().expect("error sink mutex poisoned").flush()
    }
}

impl Drop for ErrorSink {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
