use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::Local;
use serde::Serialize;

use crate::error::{ConvertError, ErrorKind};

/// Outcome of one attempt to process a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Success,
    Failed,
    Quarantined,
}

/// One entry of the [`ProcessingLog`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingRecord {
    pub source: PathBuf,
    pub status: RecordStatus,
    /// Local time the record was written, `%Y-%m-%dT%H:%M:%S%.3f`.
    pub timestamp: String,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Final location of the output document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Final location of the source file (raw archive or quarantine).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relocated_source: Option<PathBuf>,
}

impl ProcessingRecord {
    fn base(source: &Path, status: RecordStatus, attempt: u32) -> Self {
        Self {
            source: source.to_path_buf(),
            status,
            timestamp: Local::now().format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            attempt,
            error_kind: None,
            message: None,
            output: None,
            relocated_source: None,
        }
    }

    pub fn success(source: &Path, attempt: u32, output: PathBuf, raw: PathBuf) -> Self {
        Self {
            output: Some(output),
            relocated_source: Some(raw),
            ..Self::base(source, RecordStatus::Success, attempt)
        }
    }

    pub fn failed(source: &Path, attempt: u32, error: &ConvertError) -> Self {
        Self {
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            ..Self::base(source, RecordStatus::Failed, attempt)
        }
    }

    pub fn quarantined(
        source: &Path,
        attempt: u32,
        error: &ConvertError,
        destination: PathBuf,
    ) -> Self {
        Self {
            error_kind: Some(error.kind()),
            message: Some(error.to_string()),
            relocated_source: Some(destination),
            ..Self::base(source, RecordStatus::Quarantined, attempt)
        }
    }
}

/// Append-only record of processing outcomes, readable while the loop runs.
#[derive(Debug, Default)]
pub struct ProcessingLog {
    records: RwLock<Vec<ProcessingRecord>>,
}

impl ProcessingLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: ProcessingRecord) {
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Copy of every record written so far, oldest first.
    pub fn snapshot(&self) -> Vec<ProcessingRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Records for a single source path.
    pub fn for_source(&self, source: &Path) -> Vec<ProcessingRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|r| r.source == source)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
