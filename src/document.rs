//! Output documents: a tree of groups, datasets and attributes that mirrors the schema,
//! populated with resolved values and the raw payload.
//!
//! [`build_document`] is pure: identical schema, resolved fields, payload and provenance
//! always produce an identical document. The build timestamp enters only through
//! [`Provenance`].
//!
//! Every dataset carries `EX_required` and `type` attributes, plus `units` and `docstring`
//! when known. Derived datasets (see [`Derived`]) are computed here from the payload; a
//! pixel grid whose inputs were not resolved is left out.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Local;
use serde::Serialize;

use crate::error::ConvertResult;
use crate::resolve::ResolvedFields;
use crate::schema::{Derived, NodeKind, SchemaNode, SchemaTree};
use crate::source::SourcePayload;
use crate::types::{SchemaPath, Value, ValueType};

/// Creator string written at the document root.
pub const CREATOR: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

/// Format of the `file_time` provenance attribute.
pub const FILE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub type Attributes = BTreeMap<String, Value>;

/// Root-level provenance attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub file_time: String,
    pub source_file: String,
    pub settings: String,
}

impl Provenance {
    /// Provenance stamped with the current local time.
    pub fn now(source_file: impl Into<String>, settings: impl Into<String>) -> Self {
        Self {
            file_time: Local::now().format(FILE_TIME_FORMAT).to_string(),
            source_file: source_file.into(),
            settings: settings.into(),
        }
    }
}

/// A group or dataset in an [`OutputDocument`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DocNode {
    Group {
        name: String,
        attributes: Attributes,
        children: Vec<DocNode>,
    },
    Dataset {
        name: String,
        #[serde(rename = "type")]
        value_type: ValueType,
        #[serde(skip_serializing_if = "Option::is_none")]
        shape: Option<Vec<usize>>,
        value: Value,
        attributes: Attributes,
    },
}

impl DocNode {
    pub fn name(&self) -> &str {
        match self {
            Self::Group { name, .. } | Self::Dataset { name, .. } => name,
        }
    }

    pub fn attributes(&self) -> &Attributes {
        match self {
            Self::Group { attributes, .. } | Self::Dataset { attributes, .. } => attributes,
        }
    }

    /// Value of a dataset; `None` for groups.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Dataset { value, .. } => Some(value),
            Self::Group { .. } => None,
        }
    }

    fn children(&self) -> &[DocNode] {
        match self {
            Self::Group { children, .. } => children,
            Self::Dataset { .. } => &[],
        }
    }
}

/// A fully built output document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputDocument {
    pub attributes: Attributes,
    pub children: Vec<DocNode>,
}

impl OutputDocument {
    /// Look up a group or dataset by path.
    pub fn get(&self, path: &SchemaPath) -> Option<&DocNode> {
        let mut segments = path.segments();
        let first = segments.next()?;
        let mut current = self.children.iter().find(|c| c.name() == first)?;
        for segment in segments {
            current = current.children().iter().find(|c| c.name() == segment)?;
        }
        Some(current)
    }

    /// Attribute `name` on the node at `path`; the root path addresses root attributes.
    pub fn attribute(&self, path: &SchemaPath, name: &str) -> Option<&Value> {
        if path.is_root() {
            return self.attributes.get(name);
        }
        self.get(path)?.attributes().get(name)
    }
}

/// Materialize the document for one source file.
pub fn build_document(
    schema: &SchemaTree,
    resolved: &ResolvedFields,
    payload: &SourcePayload,
    provenance: &Provenance,
) -> OutputDocument {
    let builder = DocBuilder {
        schema,
        resolved,
        payload,
    };
    let (children, _) = builder.level(&schema.nodes, &SchemaPath::root());

    let mut attributes = Attributes::new();
    attributes.insert("file_time".to_string(), Value::Text(provenance.file_time.clone()));
    attributes.insert("creator".to_string(), Value::Text(CREATOR.to_string()));
    attributes.insert("source_file".to_string(), Value::Text(provenance.source_file.clone()));
    attributes.insert("settings".to_string(), Value::Text(provenance.settings.clone()));
    let schema_label = if schema.version.is_empty() {
        schema.name.clone()
    } else {
        format!("{} {}", schema.name, schema.version)
    };
    attributes.insert("schema".to_string(), Value::Text(schema_label));

    OutputDocument { attributes, children }
}

struct DocBuilder<'a> {
    schema: &'a SchemaTree,
    resolved: &'a ResolvedFields,
    payload: &'a SourcePayload,
}

impl DocBuilder<'_> {
    /// Build the groups/datasets of one level, and collect the attributes that attach to the
    /// enclosing node.
    fn level(&self, nodes: &[SchemaNode], parent: &SchemaPath) -> (Vec<DocNode>, Attributes) {
        let mut children = Vec::new();
        let mut attributes = Attributes::new();

        for node in nodes {
            let path = node.path_under(parent);
            match node.kind {
                NodeKind::Attribute => {
                    if let Some(field) = self.resolved.get(&path) {
                        attributes.insert(node.name.clone(), field.value.clone());
                    }
                }
                NodeKind::Group => {
                    let (grand_children, mut attrs) = self.level(&node.children, &path);
                    if let Some(class) = &node.nx_class {
                        attrs
                            .entry("NX_class".to_string())
                            .or_insert_with(|| Value::Text(class.clone()));
                    }
                    children.push(DocNode::Group {
                        name: node.name.clone(),
                        attributes: attrs,
                        children: grand_children,
                    });
                }
                NodeKind::Dataset => {
                    if let Some(dataset) = self.dataset(node, &path) {
                        children.push(dataset);
                    }
                }
            }
        }
        (children, attributes)
    }

    fn dataset(&self, node: &SchemaNode, path: &SchemaPath) -> Option<DocNode> {
        let mut attributes = Attributes::new();

        let (value, shape) = if path == self.schema.payload_path() {
            attributes.insert(
                "source_type".to_string(),
                Value::Text(self.payload.data_type.as_str().to_string()),
            );
            if let Some(unit) = node.units.canonical() {
                attributes.insert("units".to_string(), Value::Text(unit.to_string()));
            }
            (Value::Array(self.payload.values.clone()), Some(self.payload.shape()))
        } else if let Some(derived) = &node.derived {
            let (values, shape, unit) = self.derive(derived)?;
            if let Some(unit) = unit {
                attributes.insert("units".to_string(), Value::Text(unit));
            }
            (Value::Array(values), Some(shape))
        } else {
            let field = self.resolved.get(path)?;
            if !field.unit.is_empty() {
                attributes.insert("units".to_string(), Value::Text(field.unit.clone()));
            }
            let shape = match &field.value {
                Value::Array(values) => Some(vec![values.len()]),
                _ => None,
            };
            (field.value.clone(), shape)
        };

        let value_type = node.value_type.unwrap_or(ValueType::Array);
        attributes.insert(
            "EX_required".to_string(),
            Value::Text(node.required.to_string()),
        );
        attributes.insert("type".to_string(), Value::Text(value_type.as_str().to_string()));
        if !node.description.is_empty() {
            attributes.insert("docstring".to_string(), Value::Text(node.description.clone()));
        }

        // Attributes declared in the schema override the generated ones.
        let (_, declared) = self.level(&node.children, path);
        attributes.extend(declared);

        Some(DocNode::Dataset {
            name: node.name.clone(),
            value_type,
            shape,
            value,
            attributes,
        })
    }

    /// Values, shape and unit of a derived dataset.
    fn derive(&self, derived: &Derived) -> Option<(Vec<f64>, Vec<usize>, Option<String>)> {
        let shape = self.payload.shape();
        match derived {
            Derived::Mask => {
                let values = self
                    .payload
                    .values
                    .iter()
                    .map(|&v| if v >= 0.0 { 0.0 } else { 1.0 })
                    .collect();
                Some((values, shape, None))
            }
            Derived::PixelGrid {
                center_x,
                center_y,
                pixel_x,
                pixel_y,
            } => {
                let number = |path: &SchemaPath| self.resolved.get(path)?.value.as_number();
                let (rows, cols) = match shape.as_slice() {
                    [cols] => (1, *cols),
                    [rows, cols] => (*rows, *cols),
                    _ => return None,
                };
                let xs = pixel_offsets(number(center_x)?, cols, number(pixel_x)?);
                let ys = pixel_offsets(number(center_y)?, rows, number(pixel_y)?);

                let mut values = Vec::with_capacity(rows * cols * 2);
                for y in &ys {
                    for x in &xs {
                        values.push(*x);
                        values.push(*y);
                    }
                }
                let unit = self
                    .resolved
                    .get(pixel_x)
                    .map(|f| f.unit.clone())
                    .filter(|u| !u.is_empty());
                Some((values, vec![rows, cols, 2], unit))
            }
        }
    }
}

/// `n` evenly spaced positions from `-center` to `n - center` (both ends included), scaled
/// by `pixel_size`.
fn pixel_offsets(center: f64, n: usize, pixel_size: f64) -> Vec<f64> {
    let start = -center;
    if n <= 1 {
        return vec![start * pixel_size; n];
    }
    let step = n as f64 / (n - 1) as f64;
    (0..n).map(|i| (start + i as f64 * step) * pixel_size).collect()
}

/// Serialize `doc` as pretty JSON at `path`, flushing it to disk before returning.
pub fn write_document(doc: &OutputDocument, path: impl AsRef<Path>) -> ConvertResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, doc)?;
    writer.write_all(b"\n")?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(())
}
