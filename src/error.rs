use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::ingestion::IngestionSeverity;

/// Convenience result type for conversion operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Error type returned across schema loading, settings validation, extraction, resolution and
/// document building.
///
/// Schema and settings errors are fatal: they are raised before the ingestion loop starts and
/// prevent any processing. Every other variant is scoped to a single source file.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A document or definition could not be (de)serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The schema definition is malformed.
    #[error("schema error in {origin}: {message}")]
    Schema { origin: String, message: String },

    /// The settings document references an unknown schema path or a disallowed unit.
    #[error("settings error: {message}")]
    Settings { message: String },

    /// The source file does not match the single-header / single-payload contract.
    #[error("format error: {message}")]
    Format { message: String },

    /// A referenced source key is missing, or a value cannot be typed or converted.
    #[error("field error at '{path}': {message}")]
    Field { path: String, message: String },

    /// A required schema field has no resolvable value.
    #[error("missing required field '{path}'")]
    MissingRequiredField { path: String },
}

impl ConvertError {
    pub(crate) fn schema(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            origin: origin.into(),
            message: message.into(),
        }
    }

    pub(crate) fn settings(message: impl Into<String>) -> Self {
        Self::Settings {
            message: message.into(),
        }
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub(crate) fn field(path: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::Field {
            path: path.to_string(),
            message: message.into(),
        }
    }

    /// Stable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Json(_) => ErrorKind::Io,
            Self::Schema { .. } => ErrorKind::Schema,
            Self::Settings { .. } => ErrorKind::Settings,
            Self::Format { .. } => ErrorKind::Format,
            Self::Field { .. } => ErrorKind::Field,
            Self::MissingRequiredField { .. } => ErrorKind::MissingRequiredField,
        }
    }

    /// Fatal errors prevent the ingestion loop from starting.
    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    /// Severity used for observer callbacks and alert thresholds.
    pub fn severity(&self) -> IngestionSeverity {
        match self.kind() {
            ErrorKind::Format | ErrorKind::Field | ErrorKind::MissingRequiredField => {
                IngestionSeverity::Error
            }
            ErrorKind::Io | ErrorKind::Schema | ErrorKind::Settings => IngestionSeverity::Critical,
        }
    }
}

/// Error taxonomy, independent of the payload carried by each [`ConvertError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    Io,
    Schema,
    Settings,
    Format,
    Field,
    MissingRequiredField,
}

impl ErrorKind {
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Schema | Self::Settings)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Io => "IoError",
            Self::Schema => "SchemaError",
            Self::Settings => "SettingsError",
            Self::Format => "FormatError",
            Self::Field => "FieldError",
            Self::MissingRequiredField => "MissingRequiredField",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
