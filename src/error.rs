//! Error taxonomy. Errors are classified by behaviour, not by where they
//! happened, so the orchestrator can decide retry vs. skip vs. abort
//! without matching on source-specific types.

/// how a [`WriteError`] should be handled by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// connection dropped, deadlock, timeout — retry with backoff.
    Transient,
    /// field too long, bad encoding — fall back to row-by-row insert.
    Data,
    /// retries exhausted or an unrecoverable condition — abort the parser.
    Fatal,
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed json on line {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("missing primary identifier")]
    MissingPrimaryId,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("database error: {source}")]
    Database {
        #[source]
        source: tokio_postgres::Error,
        classification: Classification,
    },
    #[error("row rejected during copy: {reason}")]
    RowRejected { reason: String },
}

impl WriteError {
    pub fn classify(source: tokio_postgres::Error) -> Self {
        let classification = if source.is_closed() {
            Classification::Transient
        } else if let Some(db_error) = source.as_db_error() {
            match db_error.code().code() {
                // connection_exception, deadlock_detected, serialization_failure
                "08000" | "08003" | "08006" | "40P01" | "40001" => Classification::Transient,
                // string_data_right_truncation, invalid_text_representation, etc.
                "22001" | "22P02" | "23502" => Classification::Data,
                _ => Classification::Fatal,
            }
        } else {
            Classification::Transient
        };
        WriteError::Database {
            source,
            classification,
        }
    }

    pub fn classification(&self) -> Classification {
        match self {
            WriteError::Database { classification, .. } => *classification,
            WriteError::RowRejected { .. } => Classification::Data,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("reading state file {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing state file {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("writing state file {path}: {source}")]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}
