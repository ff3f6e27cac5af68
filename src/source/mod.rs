//! Source extraction: one instrument file in, one [`SourceHeader`] and one [`SourcePayload`]
//! out.
//!
//! Header values are kept as text here. Typing happens during resolution, because the same
//! raw text may have to satisfy different target types depending on which schema field
//! references it.

mod edf;
mod name;

pub use edf::{EdfDataType, encode_edf, parse_source_from_bytes, parse_source_from_path};
pub use name::{FILENAME_DELIMITER, SourceName};

use std::collections::HashMap;

use crate::error::{ConvertError, ConvertResult};
use crate::types::SchemaPath;

/// Ordered key/text-value pairs from one source file. Keys are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceHeader {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl SourceHeader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a header from pairs, failing on the first duplicate key.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> ConvertResult<Self>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut header = Self::new();
        for (k, v) in pairs {
            header.insert(k, v)?;
        }
        Ok(header)
    }

    /// Append a pair. A key that is already present is a format error.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> ConvertResult<()> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(ConvertError::format(format!("duplicate header key '{key}'")));
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value.into()));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.index.get(key).map(|&i| self.entries[i].1.as_str())
    }

    /// Look up `key` on behalf of the schema field at `path`; a miss is a field error.
    pub fn require(&self, key: &str, path: &SchemaPath) -> ConvertResult<&str> {
        self.get(key).ok_or_else(|| {
            ConvertError::field(path, format!("source key '{key}' not found in header"))
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The single numeric array carried by a source file.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePayload {
    /// Values in file order (first dimension varies fastest).
    pub values: Vec<f64>,
    /// Dimensions as declared by the file (`Dim_1`, `Dim_2`, ...).
    pub dims: Vec<usize>,
    pub data_type: EdfDataType,
}

impl SourcePayload {
    pub fn new(values: Vec<f64>, dims: Vec<usize>, data_type: EdfDataType) -> Self {
        Self {
            values,
            dims,
            data_type,
        }
    }

    /// Row-major shape (slowest dimension first), as written into output documents.
    pub fn shape(&self) -> Vec<usize> {
        self.dims.iter().rev().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_rejects_duplicate_keys() {
        let err = SourceHeader::from_pairs([("Dim_1", "2"), ("Dim_1", "3")]).unwrap_err();
        assert!(err.to_string().contains("duplicate header key 'Dim_1'"));
    }

    #[test]
    fn header_keeps_insertion_order() {
        let header = SourceHeader::from_pairs([("b", "1"), ("a", "2")]).unwrap();
        assert_eq!(header.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec!["b", "a"]);
    }

    #[test]
    fn require_reports_missing_key_as_field_error() {
        let header = SourceHeader::new();
        let err = header.require("WaveLength", &SchemaPath::parse("ENTRY/wavelength")).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Field);
    }
}
