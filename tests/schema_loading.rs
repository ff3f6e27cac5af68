mod common;

use nexus_ingest::ErrorKind;
use nexus_ingest::schema::{
    Derived, NodeKind, UnitSet, load_schema_from_path, load_schema_from_str,
};
use nexus_ingest::types::{SchemaPath, Value, ValueType};

fn err_message(json: &str) -> String {
    let err = load_schema_from_str(json).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(err.is_fatal());
    err.to_string()
}

#[test]
fn shipped_schemas_load() {
    let cansas = common::nxcansas();
    assert_eq!(cansas.name, "NXcanSAS");
    assert_eq!(cansas.payload_path().as_str(), "ENTRY/DATA/I");

    let sas = load_schema_from_path("schemas/nxsas.json").unwrap();
    assert_eq!(sas.name, "NXsas");
    assert_eq!(sas.payload_path().as_str(), "entry/instrument/detector/data");
}

#[test]
fn shipped_schema_declares_mask_and_pixel_grid() {
    let schema = common::nxcansas();
    let mask = schema.find(&SchemaPath::parse("ENTRY/DATA/mask")).unwrap();
    assert_eq!(mask.derived, Some(Derived::Mask));

    let grid = schema.find(&SchemaPath::parse("ENTRY/DATA/R")).unwrap();
    match &grid.derived {
        Some(Derived::PixelGrid { pixel_x, .. }) => {
            assert_eq!(pixel_x.as_str(), "ENTRY/INSTRUMENT/DETECTOR/x_pixel_size");
        }
        other => panic!("expected a pixel grid, got {other:?}"),
    }
}

#[test]
fn payload_cannot_be_derived() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[
            {"kind":"group","name":"E","children":[
                {"kind":"dataset","name":"I","type":"array","derived":"mask"}]}]}"#,
    );
    assert!(msg.contains("cannot be derived"), "{msg}");
}

#[test]
fn walk_preserves_declared_order() {
    let schema = common::nxcansas();
    let top: Vec<String> = schema
        .walk()
        .into_iter()
        .filter(|(p, _)| p.segments().count() == 2 && !p.as_str().contains('@'))
        .map(|(p, _)| p.to_string())
        .collect();
    assert_eq!(
        top,
        vec![
            "ENTRY/definition",
            "ENTRY/title",
            "ENTRY/run",
            "ENTRY/start_time",
            "ENTRY/INSTRUMENT",
            "ENTRY/SAMPLE",
            "ENTRY/DATA",
        ]
    );
}

#[test]
fn find_resolves_datasets_and_attributes() {
    let schema = common::nxcansas();

    let sdd = schema
        .find(&SchemaPath::parse("ENTRY/INSTRUMENT/DETECTOR/SDD"))
        .unwrap();
    assert_eq!(sdd.kind, NodeKind::Dataset);
    assert_eq!(sdd.value_type, Some(ValueType::Number));
    assert!(sdd.required);
    assert_eq!(sdd.units, UnitSet::Listed(vec!["m".to_string(), "mm".to_string()]));

    let signal = schema.find(&SchemaPath::parse("ENTRY/DATA/@signal")).unwrap();
    assert_eq!(signal.kind, NodeKind::Attribute);
    assert_eq!(signal.default, Some(Value::Text("I".to_string())));

    let payload = schema.find(schema.payload_path()).unwrap();
    assert_eq!(payload.units, UnitSet::Arbitrary);

    assert!(schema.find(&SchemaPath::parse("ENTRY/NOPE")).is_none());
}

#[test]
fn unknown_kind_is_schema_error() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"},
            {"kind":"link","name":"L"}]}]}"#,
    );
    assert!(msg.contains("unknown kind 'link'"), "{msg}");
}

#[test]
fn unknown_type_is_schema_error() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"},
            {"kind":"dataset","name":"x","type":"complex"}]}]}"#,
    );
    assert!(msg.contains("unknown type 'complex'"), "{msg}");
}

#[test]
fn duplicate_children_are_rejected() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"},
            {"kind":"dataset","name":"I","type":"number"}]}]}"#,
    );
    assert!(msg.contains("duplicate child name 'I' under 'E'"), "{msg}");
}

#[test]
fn attribute_children_and_top_level_attributes_are_rejected() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"},
            {"kind":"attribute","name":"a","type":"text","children":[
                {"kind":"attribute","name":"b","type":"text"}]}]}]}"#,
    );
    assert!(msg.contains("cannot have children"), "{msg}");

    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[
            {"kind":"attribute","name":"a","type":"text"},
            {"kind":"group","name":"E","children":[
                {"kind":"dataset","name":"I","type":"array"}]}]}"#,
    );
    assert!(msg.contains("no enclosing group or dataset"), "{msg}");
}

#[test]
fn names_with_reserved_characters_are_rejected() {
    for bad in ["with space", "a@b", "a:b", "star*"] {
        let json = format!(
            r#"{{"name":"T","payload":"E/I","nodes":[{{"kind":"group","name":"E","children":[
                {{"kind":"dataset","name":"I","type":"array"}},
                {{"kind":"dataset","name":"{bad}","type":"text"}}]}}]}}"#
        );
        let msg = err_message(&json);
        assert!(msg.contains("invalid node name"), "{bad}: {msg}");
    }
}

#[test]
fn payload_must_be_an_array_dataset() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"number"}]}]}"#,
    );
    assert!(msg.contains("is not an array dataset"), "{msg}");

    let msg = err_message(
        r#"{"name":"T","payload":"E/missing","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"}]}]}"#,
    );
    assert!(msg.contains("does not exist"), "{msg}");
}

#[test]
fn empty_unit_list_and_bad_defaults_are_rejected() {
    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"},
            {"kind":"dataset","name":"d","type":"number","units":[]}]}]}"#,
    );
    assert!(msg.contains("empty unit list"), "{msg}");

    let msg = err_message(
        r#"{"name":"T","payload":"E/I","nodes":[{"kind":"group","name":"E","children":[
            {"kind":"dataset","name":"I","type":"array"},
            {"kind":"dataset","name":"d","type":"number","default":"abc"}]}]}"#,
    );
    assert!(msg.contains("invalid default"), "{msg}");
}

#[test]
fn invalid_json_and_missing_file_are_schema_errors() {
    let msg = err_message("{not json");
    assert!(msg.contains("invalid JSON"), "{msg}");

    let err = load_schema_from_path("tests/fixtures/does_not_exist.json").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Schema);
}
