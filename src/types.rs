//! Core data model types shared by the resolver and the document builder.
//!
//! A [`SchemaPath`] addresses one node of a loaded [`crate::schema::SchemaTree`]; a
//! [`ResolvedField`] is the final typed value the resolver produced for that node.

use std::fmt;

use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};

/// Separator between schema path segments.
pub const PATH_DELIMITER: char = '/';

/// Prefix marking an attribute segment inside a [`SchemaPath`].
pub const ATTRIBUTE_MARKER: char = '@';

/// Declared value type of a dataset or attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// 64-bit floating point number.
    Number,
    /// UTF-8 text.
    Text,
    /// Date/time rendered as `YYYY-MM-DDTHH:MM:SS`.
    Timestamp,
    /// Flat numeric array.
    Array,
}

impl ValueType {
    /// Parse a declared type name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "number" => Some(Self::Number),
            "text" => Some(Self::Text),
            "timestamp" => Some(Self::Timestamp),
            "array" => Some(Self::Array),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::Array => "array",
        }
    }

    /// Value substituted when a field is unresolved or set to the none sentinel.
    ///
    /// Arrays have no default.
    pub fn default_value(self) -> Option<Value> {
        match self {
            Self::Number => Some(Value::Number(0.0)),
            Self::Text => Some(Value::Text(DEFAULT_TEXT.to_string())),
            Self::Timestamp => Some(Value::Timestamp(ZERO_TIMESTAMP.to_string())),
            Self::Array => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Default for text fields.
pub const DEFAULT_TEXT: &str = "N/A";

/// Default for timestamp fields.
pub const ZERO_TIMESTAMP: &str = "0000-00-00T00:00:00";

/// A single typed value.
///
/// Serializes as a bare JSON number, string or array. Non-finite numbers have no JSON form
/// and are written as the strings `"NaN"`, `"Infinity"` and `"-Infinity"`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Timestamp(String),
    Array(Vec<f64>),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(v) => JsonFloat(*v).serialize(serializer),
            Self::Text(s) | Self::Timestamp(s) => serializer.serialize_str(s),
            Self::Array(values) => {
                let mut seq = serializer.serialize_seq(Some(values.len()))?;
                for v in values {
                    seq.serialize_element(&JsonFloat(*v))?;
                }
                seq.end()
            }
        }
    }
}

struct JsonFloat(f64);

impl Serialize for JsonFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if v.is_finite() {
            serializer.serialize_f64(v)
        } else if v.is_nan() {
            serializer.serialize_str("NaN")
        } else if v > 0.0 {
            serializer.serialize_str("Infinity")
        } else {
            serializer.serialize_str("-Infinity")
        }
    }
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Number(_) => ValueType::Number,
            Self::Text(_) => ValueType::Text,
            Self::Timestamp(_) => ValueType::Timestamp,
            Self::Array(_) => ValueType::Array,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Timestamp(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl Value {
    /// Type raw text into a value of type `ty`.
    ///
    /// Numbers accept decimal and scientific notation, with `,` allowed as the decimal
    /// separator. Timestamps are normalized to `YYYY-MM-DDTHH:MM:SS`. Arrays accept
    /// `[a, b, c]` or whitespace/comma separated numbers.
    pub fn parse(raw: &str, ty: ValueType) -> Result<Self, String> {
        let raw = raw.trim();
        match ty {
            ValueType::Number => parse_number(raw).map(Value::Number),
            ValueType::Text => Ok(Value::Text(raw.to_string())),
            ValueType::Timestamp => parse_timestamp(raw).map(Value::Timestamp),
            ValueType::Array => {
                let inner = raw
                    .strip_prefix('[')
                    .and_then(|s| s.strip_suffix(']'))
                    .unwrap_or(raw);
                inner
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(parse_number)
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
        }
    }
}

fn parse_number(raw: &str) -> Result<f64, String> {
    let normalized = if raw.contains(',') && !raw.contains('.') && raw.matches(',').count() == 1 {
        raw.replace(',', ".")
    } else {
        raw.to_string()
    };
    normalized
        .parse::<f64>()
        .map_err(|_| format!("expected a number, got '{raw}'"))
}

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn parse_timestamp(raw: &str) -> Result<String, String> {
    use chrono::{DateTime, NaiveDateTime};

    if raw == ZERO_TIMESTAMP {
        return Ok(raw.to_string());
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.naive_local().format(TIMESTAMP_FORMAT).to_string());
    }
    // EDF headers carry asctime-style dates, e.g. `Tue Mar 25 09:53:00 2025`.
    for fmt in [
        TIMESTAMP_FORMAT,
        "%Y-%m-%d %H:%M:%S",
        "%a %b %e %H:%M:%S %Y",
        "%d/%m/%Y %H:%M:%S",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(dt.format(TIMESTAMP_FORMAT).to_string());
        }
    }
    Err(format!("expected a timestamp, got '{raw}'"))
}

/// Render a JSON literal (string, number, bool or array of those) as the raw text the
/// resolver types. Objects and `null` have no text form.
pub(crate) fn literal_text(v: &serde_json::Value) -> Option<String> {
    match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => {
            let parts = items.iter().map(literal_text).collect::<Option<Vec<_>>>()?;
            Some(format!("[{}]", parts.join(", ")))
        }
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}

/// Where a resolved value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// Literal value from the settings document.
    Static,
    /// Looked up in the source header.
    Dynamic,
    /// Type default or schema-declared default.
    Default,
}

/// Address of a node in a schema tree, e.g. `ENTRY/INSTRUMENT/DETECTOR/distance` or
/// `ENTRY/DATA/@signal` for an attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaPath(String);

impl SchemaPath {
    /// The empty path (the document root).
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Normalize a textual path: surrounding whitespace and leading/trailing delimiters are
    /// dropped, empty segments are collapsed.
    pub fn parse(raw: &str) -> Self {
        let joined = raw
            .trim()
            .split(PATH_DELIMITER)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path of a group or dataset child.
    pub fn child(&self, name: &str) -> Self {
        if self.0.is_empty() {
            Self(name.to_string())
        } else {
            Self(format!("{}{PATH_DELIMITER}{name}", self.0))
        }
    }

    /// Path of an attribute attached to the node at `self`.
    pub fn attribute(&self, name: &str) -> Self {
        self.child(&format!("{ATTRIBUTE_MARKER}{name}"))
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(PATH_DELIMITER).filter(|s| !s.is_empty())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SchemaPath {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

/// Final, typed and unit-correct value for one schema field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedField {
    pub path: SchemaPath,
    pub value: Value,
    /// Unit the value is expressed in; empty for unitless fields.
    pub unit: String,
    pub origin: Origin,
}
