//! Settings documents: the persisted mapping from schema fields to resolution rules.
//!
//! A settings document is produced by an external authoring tool and consumed here. Each
//! entry maps a schema path to either a static literal or a dynamic source-key reference,
//! plus the unit the value is expressed in:
//!
//! ```json
//! {
//!   "name": "xeuss-saxs",
//!   "schema": "NXcanSAS",
//!   "entries": {
//!     "ENTRY/title": { "mode": "static", "value": "Calibration run" },
//!     "ENTRY/INSTRUMENT/SDD": { "mode": "dynamic", "source_key": "SampleDistance", "unit": "m" }
//!   }
//! }
//! ```
//!
//! Documents are validated against the schema at load time; a document that references an
//! unknown path or a disallowed unit never reaches the resolver.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, ConvertResult};
use crate::schema::SchemaTree;
use crate::source::FILENAME_DELIMITER;
use crate::types::{SchemaPath, literal_text};

/// How a schema field obtains its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Literal value, kept as text until resolution.
    Static(String),
    /// Key to look up in the source header.
    Dynamic(String),
}

/// One field mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsEntry {
    pub path: SchemaPath,
    pub rule: Rule,
    /// Unit of the value; empty for unitless or already-canonical values.
    pub unit: String,
}

impl SettingsEntry {
    pub fn fixed(
        path: impl Into<SchemaPath>,
        value: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            rule: Rule::Static(value.into()),
            unit: unit.into(),
        }
    }

    pub fn from_header(
        path: impl Into<SchemaPath>,
        source_key: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            rule: Rule::Dynamic(source_key.into()),
            unit: unit.into(),
        }
    }
}

/// A named set of [`SettingsEntry`] values keyed by schema path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDocument {
    /// Configuration name; used as the file stem when saved.
    pub name: String,
    /// Name of the schema the document was authored against, if recorded.
    pub schema: Option<String>,
    entries: BTreeMap<SchemaPath, SettingsEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawDocument {
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema: Option<String>,
    #[serde(default)]
    entries: BTreeMap<String, RawEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawEntry {
    mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_key: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    unit: String,
}

impl SettingsDocument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            entries: BTreeMap::new(),
        }
    }

    /// Add or replace the entry for `entry.path`.
    pub fn insert(&mut self, entry: SettingsEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn with_entry(mut self, entry: SettingsEntry) -> Self {
        self.insert(entry);
        self
    }

    pub fn get(&self, path: &SchemaPath) -> Option<&SettingsEntry> {
        self.entries.get(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &SettingsEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a settings document from disk and validate it against `schema`.
    pub fn load(path: impl AsRef<Path>, schema: &SchemaTree) -> ConvertResult<Self> {
        let path = path.as_ref();
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        check_name(stem).map_err(|m| {
            ConvertError::settings(format!("settings file '{}': {m}", path.display()))
        })?;

        let text = fs::read_to_string(path).map_err(|e| {
            ConvertError::settings(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_json_str(&text, schema)
    }

    /// Parse a settings document from JSON and validate it against `schema`.
    pub fn from_json_str(input: &str, schema: &SchemaTree) -> ConvertResult<Self> {
        let raw: RawDocument = serde_json::from_str(input)
            .map_err(|e| ConvertError::settings(format!("invalid JSON: {e}")))?;

        let mut doc = Self::new(raw.name.unwrap_or_default());
        doc.schema = raw.schema;
        for (key, entry) in raw.entries {
            let path = SchemaPath::parse(&key);
            let rule = match entry.mode.trim().to_ascii_lowercase().as_str() {
                "static" => {
                    let value = entry
                        .value
                        .as_ref()
                        .and_then(literal_text)
                        .ok_or_else(|| {
                            ConvertError::settings(format!(
                                "static entry '{path}' has no literal value"
                            ))
                        })?;
                    Rule::Static(value)
                }
                "dynamic" => {
                    let key = entry
                        .source_key
                        .filter(|k| !k.trim().is_empty())
                        .ok_or_else(|| {
                            ConvertError::settings(format!(
                                "dynamic entry '{path}' has no source_key"
                            ))
                        })?;
                    Rule::Dynamic(key)
                }
                other => {
                    return Err(ConvertError::settings(format!(
                        "entry '{path}' has unknown mode '{other}'"
                    )));
                }
            };
            doc.insert(SettingsEntry {
                path,
                rule,
                unit: entry.unit.trim().to_string(),
            });
        }

        doc.validate(schema)?;
        Ok(doc)
    }

    /// Check every entry against `schema`.
    pub fn validate(&self, schema: &SchemaTree) -> ConvertResult<()> {
        check_name(&self.name).map_err(|m| {
            ConvertError::settings(format!("settings name '{}': {m}", self.name))
        })?;

        if let Some(expected) = &self.schema {
            if expected != &schema.name {
                return Err(ConvertError::settings(format!(
                    "document was authored for schema '{expected}', loaded schema is '{}'",
                    schema.name
                )));
            }
        }

        for entry in self.entries.values() {
            let node = schema.find(&entry.path).ok_or_else(|| {
                ConvertError::settings(format!("unknown schema path '{}'", entry.path))
            })?;
            if !node.is_leaf_value() {
                return Err(ConvertError::settings(format!(
                    "schema path '{}' is a group and cannot hold a value",
                    entry.path
                )));
            }
            if &entry.path == schema.payload_path() {
                return Err(ConvertError::settings(format!(
                    "schema path '{}' is the payload location and is filled from the source array",
                    entry.path
                )));
            }
            if node.is_derived() {
                return Err(ConvertError::settings(format!(
                    "schema path '{}' is computed from the payload and cannot be mapped",
                    entry.path
                )));
            }
            if !node.units.allows(&entry.unit) {
                return Err(ConvertError::settings(format!(
                    "unit '{}' is not allowed for '{}' (allowed: {:?})",
                    entry.unit, entry.path, node.units
                )));
            }
            if let Rule::Static(value) = &entry.rule {
                if node.filename_token && value.contains(FILENAME_DELIMITER) {
                    return Err(ConvertError::settings(format!(
                        "value '{value}' for '{}' contains the reserved delimiter \
                         '{FILENAME_DELIMITER}'",
                        entry.path
                    )));
                }
            }
        }
        Ok(())
    }

    /// Write the document to `<dir>/<name>.json` and return the written path.
    pub fn save(&self, dir: impl AsRef<Path>) -> ConvertResult<PathBuf> {
        check_name(&self.name).map_err(|m| {
            ConvertError::settings(format!("settings name '{}': {m}", self.name))
        })?;

        let raw = RawDocument {
            name: Some(self.name.clone()),
            schema: self.schema.clone(),
            entries: self
                .entries
                .values()
                .map(|e| {
                    let (mode, value, source_key) = match &e.rule {
                        Rule::Static(v) => {
                            ("static", Some(serde_json::Value::String(v.clone())), None)
                        }
                        Rule::Dynamic(k) => ("dynamic", None, Some(k.clone())),
                    };
                    (
                        e.path.to_string(),
                        RawEntry {
                            mode: mode.to_string(),
                            value,
                            source_key,
                            unit: e.unit.clone(),
                        },
                    )
                })
                .collect(),
        };

        let path = dir.as_ref().join(format!("{}.json", self.name));
        fs::write(&path, serde_json::to_string_pretty(&raw)?)?;
        Ok(path)
    }
}

fn check_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is empty".to_string());
    }
    if name.contains(FILENAME_DELIMITER) {
        return Err(format!("name contains the reserved delimiter '{FILENAME_DELIMITER}'"));
    }
    Ok(())
}
