//! Schema definitions: the typed tree of groups, datasets and attributes an output document
//! must follow.
//!
//! Schemas are loaded once per run with [`load_schema_from_path`] and then shared read-only.

mod loader;

pub use loader::{load_schema_from_path, load_schema_from_str};

use crate::types::{SchemaPath, Value, ValueType};

/// Unit value that disables conversion for a field.
pub const ARBITRARY_UNIT: &str = "arbitrary";

/// Characters that may never appear in a node name.
///
/// `/` delimits path segments and `@` marks attributes; the rest would break file-system or
/// downstream path parsing.
pub const FORBIDDEN_NAME_CHARS: &[char] = &['/', '@', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Kind of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Group,
    Dataset,
    Attribute,
}

impl NodeKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "group" => Some(Self::Group),
            "dataset" => Some(Self::Dataset),
            "attribute" => Some(Self::Attribute),
            _ => None,
        }
    }
}

/// Units a node accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitSet {
    /// Unitless field.
    None,
    /// Any unit; values are never converted.
    Arbitrary,
    /// Explicit list. The first entry is the canonical unit values are converted to.
    Listed(Vec<String>),
}

impl UnitSet {
    /// Unit a converted value ends up in.
    pub fn canonical(&self) -> Option<&str> {
        match self {
            Self::Listed(units) => units.first().map(String::as_str),
            _ => None,
        }
    }

    /// Whether a settings entry may declare `unit` for this node.
    ///
    /// A listed node needs one of its units (or `arbitrary`); an empty unit is only valid on
    /// unitless nodes.
    pub fn allows(&self, unit: &str) -> bool {
        if unit == ARBITRARY_UNIT {
            return true;
        }
        match self {
            Self::None => unit.is_empty(),
            Self::Arbitrary => true,
            Self::Listed(units) => units.iter().any(|u| u == unit),
        }
    }
}

/// Array dataset computed from the payload while building a document, instead of being
/// resolved from the settings document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Derived {
    /// Same shape as the payload; `1` where a payload value is negative or not a number,
    /// `0` elsewhere.
    Mask,
    /// Physical `(x, y)` offset of every pixel from the beam center, shape
    /// `[rows, columns, 2]`, in the unit of the resolved pixel sizes.
    PixelGrid {
        center_x: SchemaPath,
        center_y: SchemaPath,
        pixel_x: SchemaPath,
        pixel_y: SchemaPath,
    },
}

impl Derived {
    /// Schema fields the computation reads.
    pub fn inputs(&self) -> Vec<&SchemaPath> {
        match self {
            Self::Mask => Vec::new(),
            Self::PixelGrid {
                center_x,
                center_y,
                pixel_x,
                pixel_y,
            } => vec![center_x, center_y, pixel_x, pixel_y],
        }
    }
}

/// One node of a [`SchemaTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaNode {
    pub kind: NodeKind,
    pub name: String,
    pub required: bool,
    /// Declared type; `None` for groups.
    pub value_type: Option<ValueType>,
    pub units: UnitSet,
    pub description: String,
    /// NeXus base class written on groups as `NX_class`.
    pub nx_class: Option<String>,
    /// Schema-declared default. Its presence permits defaulting a required field.
    pub default: Option<Value>,
    /// Value is embedded in output file names and so must not contain the reserved delimiter.
    pub filename_token: bool,
    /// Set on array datasets computed from the payload; such nodes are never resolved.
    pub derived: Option<Derived>,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    pub fn is_group(&self) -> bool {
        self.kind == NodeKind::Group
    }

    /// Datasets and attributes carry values; groups don't.
    pub fn is_leaf_value(&self) -> bool {
        matches!(self.kind, NodeKind::Dataset | NodeKind::Attribute)
    }

    pub fn is_derived(&self) -> bool {
        self.derived.is_some()
    }

    /// Path of this node given the path of its parent.
    pub fn path_under(&self, parent: &SchemaPath) -> SchemaPath {
        match self.kind {
            NodeKind::Attribute => parent.attribute(&self.name),
            _ => parent.child(&self.name),
        }
    }

    fn child_for_segment(&self, segment: &str) -> Option<&SchemaNode> {
        find_in(&self.children, segment)
    }
}

fn find_in<'a>(nodes: &'a [SchemaNode], segment: &str) -> Option<&'a SchemaNode> {
    match segment.strip_prefix(crate::types::ATTRIBUTE_MARKER) {
        Some(attr) => nodes
            .iter()
            .find(|n| n.kind == NodeKind::Attribute && n.name == attr),
        None => nodes
            .iter()
            .find(|n| n.kind != NodeKind::Attribute && n.name == segment),
    }
}

/// A loaded, validated schema definition.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaTree {
    pub name: String,
    pub version: String,
    /// Dataset the raw payload array is embedded at.
    pub payload: SchemaPath,
    /// Top-level nodes in declared order.
    pub nodes: Vec<SchemaNode>,
}

impl SchemaTree {
    /// Look up a node by path.
    pub fn find(&self, path: &SchemaPath) -> Option<&SchemaNode> {
        let mut segments = path.segments();
        let mut current = find_in(&self.nodes, segments.next()?)?;
        for segment in segments {
            current = current.child_for_segment(segment)?;
        }
        Some(current)
    }

    pub fn payload_path(&self) -> &SchemaPath {
        &self.payload
    }

    /// Every node with its path, in declared pre-order.
    pub fn walk(&self) -> Vec<(SchemaPath, &SchemaNode)> {
        fn visit<'a>(
            nodes: &'a [SchemaNode],
            parent: &SchemaPath,
            out: &mut Vec<(SchemaPath, &'a SchemaNode)>,
        ) {
            for node in nodes {
                let path = node.path_under(parent);
                out.push((path.clone(), node));
                visit(&node.children, &path, out);
            }
        }

        let mut out = Vec::new();
        visit(&self.nodes, &SchemaPath::root(), &mut out);
        out
    }

    /// Number of value-carrying nodes (datasets and attributes).
    pub fn leaf_count(&self) -> usize {
        self.walk().iter().filter(|(_, n)| n.is_leaf_value()).count()
    }
}
