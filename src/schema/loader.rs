//! Parsing and structural validation of schema definitions.
//!
//! A definition is JSON: a `name`, optional `version`, the `payload` dataset path and an
//! ordered list of `nodes`. Malformed definitions are fatal.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{
    ARBITRARY_UNIT, Derived, FORBIDDEN_NAME_CHARS, NodeKind, SchemaNode, SchemaTree, UnitSet,
};
use crate::error::{ConvertError, ConvertResult};
use crate::types::{SchemaPath, Value, ValueType, literal_text};

#[derive(Debug, Deserialize)]
struct RawTree {
    name: Option<String>,
    #[serde(default)]
    version: String,
    payload: Option<String>,
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    kind: Option<String>,
    name: Option<String>,
    #[serde(rename = "type")]
    value_type: Option<String>,
    #[serde(default)]
    required: bool,
    units: Option<RawUnits>,
    #[serde(default)]
    description: String,
    nx_class: Option<String>,
    default: Option<serde_json::Value>,
    #[serde(default)]
    filename_token: bool,
    derived: Option<RawDerived>,
    #[serde(default)]
    children: Vec<RawNode>,
}

/// `"derived": "mask"` or `"derived": {"pixel_grid": {...}}`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
enum RawDerived {
    Mask,
    PixelGrid {
        center_x: String,
        center_y: String,
        pixel_x: String,
        pixel_y: String,
    },
}

impl From<RawDerived> for Derived {
    fn from(raw: RawDerived) -> Self {
        match raw {
            RawDerived::Mask => Derived::Mask,
            RawDerived::PixelGrid {
                center_x,
                center_y,
                pixel_x,
                pixel_y,
            } => Derived::PixelGrid {
                center_x: SchemaPath::parse(&center_x),
                center_y: SchemaPath::parse(&center_y),
                pixel_x: SchemaPath::parse(&pixel_x),
                pixel_y: SchemaPath::parse(&pixel_y),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawUnits {
    One(String),
    Many(Vec<String>),
}

/// Load a schema definition from a JSON file.
pub fn load_schema_from_path(path: impl AsRef<Path>) -> ConvertResult<SchemaTree> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|e| {
        ConvertError::schema(path.display().to_string(), format!("failed to read file: {e}"))
    })?;
    load_schema(&text, &path.display().to_string())
}

/// Load a schema definition from an in-memory JSON string.
pub fn load_schema_from_str(input: &str) -> ConvertResult<SchemaTree> {
    load_schema(input, "<in-memory>")
}

fn load_schema(input: &str, origin: &str) -> ConvertResult<SchemaTree> {
    let raw: RawTree = serde_json::from_str(input)
        .map_err(|e| ConvertError::schema(origin, format!("invalid JSON: {e}")))?;

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ConvertError::schema(origin, "schema has no name"))?;

    let builder = Builder { origin };
    let nodes = builder.nodes(raw.nodes, &SchemaPath::root())?;
    if nodes.is_empty() {
        return Err(ConvertError::schema(origin, "schema declares no nodes"));
    }

    let payload = raw
        .payload
        .map(|p| SchemaPath::parse(&p))
        .filter(|p| !p.is_root())
        .ok_or_else(|| ConvertError::schema(origin, "schema declares no payload location"))?;

    let tree = SchemaTree {
        name,
        version: raw.version,
        payload,
        nodes,
    };

    match tree.find(&tree.payload) {
        Some(node) if node.is_derived() => {
            return Err(ConvertError::schema(
                origin,
                format!("payload location '{}' cannot be derived", tree.payload),
            ));
        }
        Some(node)
            if node.kind == NodeKind::Dataset && node.value_type == Some(ValueType::Array) => {}
        Some(_) => {
            return Err(ConvertError::schema(
                origin,
                format!("payload location '{}' is not an array dataset", tree.payload),
            ));
        }
        None => {
            return Err(ConvertError::schema(
                origin,
                format!("payload location '{}' does not exist", tree.payload),
            ));
        }
    }

    check_derived_inputs(&tree).map_err(|m| ConvertError::schema(origin, m))?;

    Ok(tree)
}

/// Every field a derived dataset reads must be a plain number dataset.
fn check_derived_inputs(tree: &SchemaTree) -> Result<(), String> {
    for (path, node) in tree.walk() {
        let Some(derived) = &node.derived else {
            continue;
        };
        for input in derived.inputs() {
            match tree.find(input) {
                Some(n)
                    if n.kind == NodeKind::Dataset
                        && n.value_type == Some(ValueType::Number)
                        && !n.is_derived() => {}
                Some(_) => {
                    return Err(format!(
                        "derived dataset '{path}' reads '{input}', which is not a number dataset"
                    ));
                }
                None => {
                    return Err(format!(
                        "derived dataset '{path}' reads '{input}', which does not exist"
                    ));
                }
            }
        }
    }
    Ok(())
}

struct Builder<'a> {
    origin: &'a str,
}

impl Builder<'_> {
    fn err(&self, message: impl Into<String>) -> ConvertError {
        ConvertError::schema(self.origin, message)
    }

    fn nodes(&self, raw: Vec<RawNode>, parent: &SchemaPath) -> ConvertResult<Vec<SchemaNode>> {
        let mut seen: HashSet<(bool, String)> = HashSet::new();
        let mut out = Vec::with_capacity(raw.len());

        for raw_node in raw {
            let node = self.node(raw_node, parent)?;
            if parent.is_root() && node.kind == NodeKind::Attribute {
                return Err(self.err(format!(
                    "attribute '{}' has no enclosing group or dataset",
                    node.name
                )));
            }
            let key = (node.kind == NodeKind::Attribute, node.name.clone());
            if !seen.insert(key) {
                return Err(self.err(format!(
                    "duplicate child name '{}' under '{}'",
                    node.name,
                    display_parent(parent)
                )));
            }
            out.push(node);
        }
        Ok(out)
    }

    fn node(&self, raw: RawNode, parent: &SchemaPath) -> ConvertResult<SchemaNode> {
        let name = raw.name.ok_or_else(|| {
            self.err(format!("node under '{}' has no name", display_parent(parent)))
        })?;
        validate_name(&name).map_err(|m| self.err(format!("invalid node name '{name}': {m}")))?;

        let location = parent.child(&name);
        let kind_name = raw
            .kind
            .ok_or_else(|| self.err(format!("node '{location}' has no kind")))?;
        let kind = NodeKind::from_name(&kind_name)
            .ok_or_else(|| self.err(format!("node '{location}' has unknown kind '{kind_name}'")))?;

        let value_type = match (kind, raw.value_type) {
            (NodeKind::Group, None) => None,
            (NodeKind::Group, Some(_)) => {
                return Err(self.err(format!("group '{location}' cannot declare a value type")));
            }
            (_, None) => return Err(self.err(format!("node '{location}' has no type"))),
            (_, Some(t)) => Some(ValueType::from_name(&t).ok_or_else(|| {
                self.err(format!("node '{location}' has unknown type '{t}'"))
            })?),
        };

        let units = match raw.units {
            None => UnitSet::None,
            Some(_) if kind == NodeKind::Group => {
                return Err(self.err(format!("group '{location}' cannot declare units")));
            }
            Some(RawUnits::One(u)) if u == ARBITRARY_UNIT => UnitSet::Arbitrary,
            Some(RawUnits::One(u)) => UnitSet::Listed(vec![u]),
            Some(RawUnits::Many(list)) if list.is_empty() => {
                return Err(self.err(format!("node '{location}' declares an empty unit list")));
            }
            Some(RawUnits::Many(list)) if list.iter().any(|u| u == ARBITRARY_UNIT) => {
                UnitSet::Arbitrary
            }
            Some(RawUnits::Many(list)) => UnitSet::Listed(list),
        };

        let default = match (raw.default, value_type) {
            (None, _) => None,
            (Some(_), None) => {
                return Err(self.err(format!("group '{location}' cannot declare a default")));
            }
            (Some(v), Some(ty)) => {
                let text = literal_text(&v).ok_or_else(|| {
                    self.err(format!("node '{location}' has a non-literal default"))
                })?;
                Some(Value::parse(&text, ty).map_err(|m| {
                    self.err(format!("node '{location}' has an invalid default: {m}"))
                })?)
            }
        };

        let derived = raw.derived.map(Derived::from);
        if derived.is_some() {
            if kind != NodeKind::Dataset || value_type != Some(ValueType::Array) {
                return Err(self.err(format!(
                    "only array datasets can be derived, '{location}' is not one"
                )));
            }
            if default.is_some() {
                return Err(self.err(format!(
                    "derived dataset '{location}' cannot declare a default"
                )));
            }
        }

        if kind == NodeKind::Attribute && !raw.children.is_empty() {
            return Err(self.err(format!("attribute '{location}' cannot have children")));
        }

        let path = match kind {
            NodeKind::Attribute => parent.attribute(&name),
            _ => location,
        };
        let children = self.nodes(raw.children, &path)?;

        Ok(SchemaNode {
            kind,
            name,
            required: raw.required,
            value_type,
            units,
            description: raw.description,
            nx_class: raw.nx_class,
            default,
            filename_token: raw.filename_token,
            derived,
            children,
        })
    }
}

fn display_parent(parent: &SchemaPath) -> String {
    if parent.is_root() {
        "<root>".to_string()
    } else {
        parent.to_string()
    }
}

fn validate_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("name is empty".to_string());
    }
    if let Some(c) = name.chars().find(|c| FORBIDDEN_NAME_CHARS.contains(c)) {
        return Err(format!("contains forbidden character '{c}'"));
    }
    if name.chars().any(char::is_whitespace) {
        return Err("contains whitespace".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wrap(nodes: &str) -> String {
        format!(
            r#"{{"name":"T","payload":"ENTRY/DATA/I","nodes":[
                {{"kind":"group","name":"ENTRY","children":[
                    {{"kind":"group","name":"DATA","children":[
                        {{"kind":"dataset","name":"I","type":"array"}}]}}
                    {nodes}
                ]}}]}}"#
        )
    }

    #[test]
    fn minimal_schema_loads() {
        let tree = load_schema_from_str(&wrap("")).unwrap();
        assert_eq!(tree.name, "T");
        assert_eq!(tree.payload_path().as_str(), "ENTRY/DATA/I");
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn rejects_slash_in_name() {
        let nodes = r#",{"kind":"dataset","name":"a/b","type":"text"}"#;
        let err = load_schema_from_str(&wrap(nodes)).unwrap_err();
        assert!(err.to_string().contains("forbidden character '/'"), "{err}");
    }

    #[test]
    fn rejects_dataset_without_type() {
        let nodes = r#",{"kind":"dataset","name":"title"}"#;
        let err = load_schema_from_str(&wrap(nodes)).unwrap_err();
        assert!(err.to_string().contains("has no type"), "{err}");
    }

    #[test]
    fn attribute_and_dataset_names_do_not_collide() {
        let tree = load_schema_from_str(&wrap(concat!(
            r#",{"kind":"dataset","name":"signal","type":"text"}"#,
            r#",{"kind":"attribute","name":"signal","type":"text"}"#,
        )))
        .unwrap();
        assert!(tree.find(&SchemaPath::parse("ENTRY/@signal")).is_some());
        assert!(tree.find(&SchemaPath::parse("ENTRY/signal")).is_some());
    }

    #[test]
    fn derived_datasets_load() {
        let tree = load_schema_from_str(&wrap(concat!(
            r#",{"kind":"dataset","name":"cx","type":"number"}"#,
            r#",{"kind":"dataset","name":"px","type":"number","units":["m"]}"#,
            r#",{"kind":"dataset","name":"mask","type":"array","derived":"mask"}"#,
            r#",{"kind":"dataset","name":"R","type":"array","derived":{"pixel_grid":{"#,
            r#""center_x":"ENTRY/cx","center_y":"ENTRY/cx","#,
            r#""pixel_x":"ENTRY/px","pixel_y":"ENTRY/px"}}}"#,
        )))
        .unwrap();
        let mask = tree.find(&SchemaPath::parse("ENTRY/mask")).unwrap();
        assert_eq!(mask.derived, Some(Derived::Mask));
        let grid = tree.find(&SchemaPath::parse("ENTRY/R")).unwrap();
        let inputs = grid.derived.as_ref().unwrap().inputs();
        assert_eq!(inputs[2], &SchemaPath::parse("ENTRY/px"));
    }

    #[test]
    fn derived_dataset_must_be_an_array() {
        let nodes = r#",{"kind":"dataset","name":"mask","type":"number","derived":"mask"}"#;
        let err = load_schema_from_str(&wrap(nodes)).unwrap_err();
        assert!(err.to_string().contains("only array datasets"), "{err}");
    }

    #[test]
    fn pixel_grid_inputs_must_be_number_datasets() {
        let err = load_schema_from_str(&wrap(concat!(
            r#",{"kind":"dataset","name":"label","type":"text"}"#,
            r#",{"kind":"dataset","name":"R","type":"array","derived":{"pixel_grid":{"#,
            r#""center_x":"ENTRY/label","center_y":"ENTRY/label","#,
            r#""pixel_x":"ENTRY/label","pixel_y":"ENTRY/missing"}}}"#,
        )))
        .unwrap_err();
        assert!(err.to_string().contains("not a number dataset"), "{err}");
    }
}
