//! Durable append-only event log
//!
//! One JSON object per line:
//!
//! ```text
//! {"kind":"alert","timestamp":"2026-01-01T12:00:00Z","payload":{...}}
//! ```
//!
//! The log has no read path, no rotation and no compaction. Writes are best
//! effort: callers log failures and carry on.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Result type alias for event log operations
pub type EventLogResult<T> = Result<T, EventLogError>;

/// Errors that can occur while appending to the event log
#[derive(Debug)]
pub enum EventLogError {
    /// The record could not be encoded
    SerializationError(serde_json::Error),

    /// Opening or writing the file failed
    IoError(std::io::Error),
}

impl fmt::Display for EventLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventLogError::SerializationError(err) => {
                write!(f, "event serialization error: {}", err)
            }
            EventLogError::IoError(err) => write!(f, "I/O error: {}", err),
        }
    }
}

impl std::error::Error for EventLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EventLogError::SerializationError(err) => Some(err),
            EventLogError::IoError(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for EventLogError {
    fn from(err: std::io::Error) -> Self {
        EventLogError::IoError(err)
    }
}

impl From<serde_json::Error> for EventLogError {
    fn from(err: serde_json::Error) -> Self {
        EventLogError::SerializationError(err)
    }
}

/// One line of the log
#[derive(Debug, Serialize)]
struct LogRecord<'a, T: Serialize> {
    kind: &'a str,
    timestamp: DateTime<Utc>,
    payload: &'a T,
}

/// Append-only JSON-lines file
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record. The file is created on first use.
    pub async fn append<T: Serialize>(
        &self,
        kind: &str,
        timestamp: DateTime<Utc>,
        payload: &T,
    ) -> EventLogResult<()> {
        let record = LogRecord {
            kind,
            timestamp,
            payload,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}
