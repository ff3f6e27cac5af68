//! Field resolution: schema node + settings entry + source header → typed, unit-correct value.
//!
//! Resolution of one document is all-or-nothing: [`resolve_document`] either returns a value
//! for every resolvable field or the first error, and never a partial set.
//!
//! Policy per dataset/attribute node:
//!
//! - no settings entry: the schema-declared default if any; otherwise a required node fails
//!   with [`ConvertError::MissingRequiredField`]; otherwise the type default, or nothing for
//!   types without one
//! - static entry: the literal, typed to the node type
//! - dynamic entry: the header value for the source key (a missing key is a field error);
//!   a none-sentinel value (`none`, `default`, empty) falls back to the default
//! - units: `arbitrary` disables conversion; otherwise numbers and arrays are converted from
//!   the entry unit into the node's canonical unit. Nodes with listed units need a unit.
//!
//! Derived datasets are computed by the document builder and never resolved.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::{ConvertError, ConvertResult};
use crate::schema::{ARBITRARY_UNIT, SchemaNode, SchemaTree, UnitSet};
use crate::settings::{Rule, SettingsDocument, SettingsEntry};
use crate::source::{FILENAME_DELIMITER, SourceHeader};
use crate::types::{Origin, ResolvedField, SchemaPath, Value};
use crate::units;

/// Resolved values for one document, in schema pre-order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResolvedFields {
    fields: Vec<ResolvedField>,
    #[serde(skip)]
    index: HashMap<SchemaPath, usize>,
}

impl ResolvedFields {
    fn push(&mut self, field: ResolvedField) {
        self.index.insert(field.path.clone(), self.fields.len());
        self.fields.push(field);
    }

    pub fn get(&self, path: &SchemaPath) -> Option<&ResolvedField> {
        self.index.get(path).map(|&i| &self.fields[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// True for header values that stand for "no value".
pub fn is_none_sentinel(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "" | "none" | "default")
}

/// Resolve every dataset/attribute of `schema` except the payload location and derived
/// datasets.
pub fn resolve_document(
    schema: &SchemaTree,
    settings: &SettingsDocument,
    header: &SourceHeader,
) -> ConvertResult<ResolvedFields> {
    let mut out = ResolvedFields::default();
    for (path, node) in schema.walk() {
        if !node.is_leaf_value() || node.is_derived() || &path == schema.payload_path() {
            continue;
        }
        if let Some(field) = resolve_node(node, &path, settings.get(&path), header)? {
            out.push(field);
        }
    }
    Ok(out)
}

/// Resolve a single dataset or attribute node.
///
/// Returns `Ok(None)` for an optional field that has neither a value nor a usable default.
pub fn resolve_node(
    node: &SchemaNode,
    path: &SchemaPath,
    entry: Option<&SettingsEntry>,
    header: &SourceHeader,
) -> ConvertResult<Option<ResolvedField>> {
    let Some(ty) = node.value_type else {
        return Err(ConvertError::field(path, "groups do not carry values"));
    };

    let Some(entry) = entry else {
        return fallback(node, path);
    };

    let (raw, origin) = match &entry.rule {
        Rule::Static(value) => (value.as_str(), Origin::Static),
        Rule::Dynamic(key) => {
            let raw = header.require(key, path)?;
            if is_none_sentinel(raw) {
                return fallback_after_sentinel(node, path);
            }
            (raw, Origin::Dynamic)
        }
    };

    let value = Value::parse(raw, ty).map_err(|m| ConvertError::field(path, m))?;

    if node.filename_token {
        if let Some(text) = value.as_text() {
            if text.contains(FILENAME_DELIMITER) {
                return Err(ConvertError::field(
                    path,
                    format!(
                        "value '{text}' contains the reserved delimiter '{FILENAME_DELIMITER}'"
                    ),
                ));
            }
        }
    }

    let (value, unit) = apply_units(node, path, &entry.unit, value)?;
    Ok(Some(ResolvedField {
        path: path.clone(),
        value,
        unit,
        origin,
    }))
}

/// No settings entry for this node.
fn fallback(node: &SchemaNode, path: &SchemaPath) -> ConvertResult<Option<ResolvedField>> {
    if let Some(value) = &node.default {
        return Ok(Some(defaulted(node, path, value.clone())));
    }
    if node.required {
        return Err(ConvertError::MissingRequiredField {
            path: path.to_string(),
        });
    }
    Ok(node
        .value_type
        .and_then(|ty| ty.default_value())
        .map(|value| defaulted(node, path, value)))
}

/// The header explicitly said "none" for this node.
fn fallback_after_sentinel(
    node: &SchemaNode,
    path: &SchemaPath,
) -> ConvertResult<Option<ResolvedField>> {
    let value = node
        .default
        .clone()
        .or_else(|| node.value_type.and_then(|ty| ty.default_value()));
    match value {
        Some(value) => Ok(Some(defaulted(node, path, value))),
        None if node.required => Err(ConvertError::MissingRequiredField {
            path: path.to_string(),
        }),
        None => Ok(None),
    }
}

fn defaulted(node: &SchemaNode, path: &SchemaPath, value: Value) -> ResolvedField {
    ResolvedField {
        path: path.clone(),
        value,
        unit: node.units.canonical().unwrap_or_default().to_string(),
        origin: Origin::Default,
    }
}

fn apply_units(
    node: &SchemaNode,
    path: &SchemaPath,
    unit: &str,
    value: Value,
) -> ConvertResult<(Value, String)> {
    if unit == ARBITRARY_UNIT {
        return Ok((value, ARBITRARY_UNIT.to_string()));
    }

    match &node.units {
        UnitSet::None if unit.is_empty() => Ok((value, String::new())),
        UnitSet::None => Err(ConvertError::field(
            path,
            format!("field is unitless, got unit '{unit}'"),
        )),
        UnitSet::Arbitrary => Ok((value, unit.to_string())),
        UnitSet::Listed(units) if unit.is_empty() => Err(ConvertError::field(
            path,
            format!("no unit given, expected one of {units:?} or '{ARBITRARY_UNIT}'"),
        )),
        UnitSet::Listed(_) => {
            let canonical = node.units.canonical().unwrap_or_default();
            if unit == canonical {
                return Ok((value, canonical.to_string()));
            }
            let convert = |v: f64| {
                units::convert(v, unit, canonical)
                    .map_err(|e| ConvertError::field(path, e.to_string()))
            };
            let converted = match value {
                Value::Number(v) => Value::Number(convert(v)?),
                Value::Array(vs) => {
                    Value::Array(vs.into_iter().map(convert).collect::<ConvertResult<_>>()?)
                }
                other => {
                    return Err(ConvertError::field(
                        path,
                        format!(
                            "cannot convert a {} value from '{unit}' to '{canonical}'",
                            other.value_type()
                        ),
                    ));
                }
            };
            Ok((converted, canonical.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NodeKind;
    use crate::types::ValueType;

    fn node(ty: ValueType, required: bool, units: UnitSet) -> SchemaNode {
        SchemaNode {
            kind: NodeKind::Dataset,
            name: "x".to_string(),
            required,
            value_type: Some(ty),
            units,
            description: String::new(),
            nx_class: None,
            default: None,
            filename_token: false,
            derived: None,
            children: Vec::new(),
        }
    }

    fn path() -> SchemaPath {
        SchemaPath::parse("ENTRY/x")
    }

    #[test]
    fn static_number_is_converted_to_canonical_unit() {
        let n = node(ValueType::Number, true, UnitSet::Listed(vec!["mm".into(), "m".into()]));
        let entry = SettingsEntry::fixed(path(), "2", "m");
        let field = resolve_node(&n, &path(), Some(&entry), &SourceHeader::new())
            .unwrap()
            .unwrap();
        assert_eq!(field.value, Value::Number(2000.0));
        assert_eq!(field.unit, "mm");
        assert_eq!(field.origin, Origin::Static);
    }

    #[test]
    fn arbitrary_unit_bypasses_conversion() {
        let n = node(ValueType::Number, true, UnitSet::Listed(vec!["rad".into()]));
        let entry = SettingsEntry::fixed(path(), "90", ARBITRARY_UNIT);
        let field = resolve_node(&n, &path(), Some(&entry), &SourceHeader::new())
            .unwrap()
            .unwrap();
        assert_eq!(field.value, Value::Number(90.0));
        assert_eq!(field.unit, ARBITRARY_UNIT);
    }

    #[test]
    fn incompatible_unit_is_field_error() {
        let n = node(ValueType::Number, true, UnitSet::Listed(vec!["m".into(), "deg".into()]));
        let entry = SettingsEntry::fixed(path(), "1", "deg");
        let err = resolve_node(&n, &path(), Some(&entry), &SourceHeader::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Field);
    }

    #[test]
    fn listed_units_need_an_entry_unit() {
        let n = node(ValueType::Number, true, UnitSet::Listed(vec!["m".into()]));
        let entry = SettingsEntry::fixed(path(), "1", "");
        let err = resolve_node(&n, &path(), Some(&entry), &SourceHeader::new()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Field);
        assert!(err.to_string().contains("no unit given"), "{err}");
    }

    #[test]
    fn required_array_with_sentinel_value_is_missing() {
        let n = node(ValueType::Array, true, UnitSet::None);
        let entry = SettingsEntry::from_header(path(), "Profile", "");
        let header = SourceHeader::from_pairs([("Profile", "None")]).unwrap();
        let err = resolve_node(&n, &path(), Some(&entry), &header).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MissingRequiredField);
        assert!(err.to_string().contains("ENTRY/x"), "{err}");

        let optional = node(ValueType::Array, false, UnitSet::None);
        assert_eq!(resolve_node(&optional, &path(), Some(&entry), &header).unwrap(), None);
    }

    #[test]
    fn optional_array_without_entry_is_omitted() {
        let n = node(ValueType::Array, false, UnitSet::None);
        assert_eq!(resolve_node(&n, &path(), None, &SourceHeader::new()).unwrap(), None);
    }

    #[test]
    fn schema_default_permits_missing_required_field() {
        let mut n = node(ValueType::Text, true, UnitSet::None);
        n.default = Some(Value::Text("NXcanSAS".to_string()));
        let field = resolve_node(&n, &path(), None, &SourceHeader::new()).unwrap().unwrap();
        assert_eq!(field.value, Value::Text("NXcanSAS".to_string()));
        assert_eq!(field.origin, Origin::Default);
    }

    #[test]
    fn sentinel_recognizes_none_default_and_blank() {
        for raw in ["None", " none ", "DEFAULT", "", "   "] {
            assert!(is_none_sentinel(raw), "{raw:?}");
        }
        assert!(!is_none_sentinel("nonexistent"));
    }
}
