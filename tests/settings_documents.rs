mod common;

use std::fs;

use nexus_ingest::ErrorKind;
use nexus_ingest::settings::{Rule, SettingsDocument, SettingsEntry};
use nexus_ingest::types::SchemaPath;

fn settings_error(json: &str) -> String {
    let schema = common::nxcansas();
    let err = SettingsDocument::from_json_str(json, &schema).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Settings);
    assert!(err.is_fatal());
    err.to_string()
}

#[test]
fn fixture_loads_and_validates() {
    let schema = common::nxcansas();
    let settings = common::xeuss(&schema);
    assert_eq!(settings.name, "xeuss");
    assert_eq!(settings.schema.as_deref(), Some("NXcanSAS"));
    assert_eq!(settings.len(), 14);

    let sdd = settings
        .get(&SchemaPath::parse("ENTRY/INSTRUMENT/DETECTOR/SDD"))
        .unwrap();
    assert_eq!(sdd.rule, Rule::Dynamic("SampleDistance".to_string()));
    assert_eq!(sdd.unit, "m");

    let temperature = settings
        .get(&SchemaPath::parse("ENTRY/SAMPLE/temperature"))
        .unwrap();
    assert_eq!(temperature.rule, Rule::Static("25".to_string()));
}

#[test]
fn unknown_path_is_rejected() {
    let msg = settings_error(
        r#"{"name":"x","entries":{"ENTRY/INSTRUMENT/nope":{"mode":"static","value":"1"}}}"#,
    );
    assert!(msg.contains("unknown schema path 'ENTRY/INSTRUMENT/nope'"), "{msg}");
}

#[test]
fn disallowed_unit_is_rejected() {
    let msg = settings_error(
        r#"{"name":"x","entries":{
            "ENTRY/INSTRUMENT/DETECTOR/SDD":{"mode":"dynamic","source_key":"D","unit":"deg"}}}"#,
    );
    assert!(msg.contains("unit 'deg' is not allowed"), "{msg}");

    let msg = settings_error(
        r#"{"name":"x","entries":{"ENTRY/title":{"mode":"static","value":"t","unit":"m"}}}"#,
    );
    assert!(msg.contains("not allowed"), "{msg}");
}

#[test]
fn unit_is_required_for_fields_with_listed_units() {
    let msg = settings_error(
        r#"{"name":"x","entries":{
            "ENTRY/INSTRUMENT/DETECTOR/SDD":{"mode":"dynamic","source_key":"D"}}}"#,
    );
    assert!(msg.contains("unit '' is not allowed"), "{msg}");

    let msg = settings_error(
        r#"{"name":"x","entries":{
            "ENTRY/SAMPLE/temperature":{"mode":"static","value":25,"unit":""}}}"#,
    );
    assert!(msg.contains("ENTRY/SAMPLE/temperature"), "{msg}");
}

#[test]
fn arbitrary_unit_is_always_allowed() {
    let schema = common::nxcansas();
    let doc = SettingsDocument::from_json_str(
        r#"{"name":"x","entries":{
            "ENTRY/INSTRUMENT/DETECTOR/SDD":{"mode":"dynamic","source_key":"D","unit":"arbitrary"},
            "ENTRY/title":{"mode":"static","value":"t","unit":"arbitrary"}}}"#,
        &schema,
    )
    .unwrap();
    assert_eq!(doc.len(), 2);
}

#[test]
fn groups_and_payload_cannot_be_targeted() {
    let msg = settings_error(
        r#"{"name":"x","entries":{"ENTRY/SAMPLE":{"mode":"static","value":"s"}}}"#,
    );
    assert!(msg.contains("is a group"), "{msg}");

    let msg = settings_error(
        r#"{"name":"x","entries":{"ENTRY/DATA/I":{"mode":"dynamic","source_key":"Data"}}}"#,
    );
    assert!(msg.contains("payload location"), "{msg}");

    let msg = settings_error(
        r#"{"name":"x","entries":{"ENTRY/DATA/mask":{"mode":"static","value":"[0, 1]"}}}"#,
    );
    assert!(msg.contains("computed from the payload"), "{msg}");
}

#[test]
fn entries_need_a_value_or_source_key() {
    let msg = settings_error(r#"{"name":"x","entries":{"ENTRY/title":{"mode":"static"}}}"#);
    assert!(msg.contains("has no literal value"), "{msg}");

    let msg = settings_error(
        r#"{"name":"x","entries":{"ENTRY/title":{"mode":"dynamic","source_key":" "}}}"#,
    );
    assert!(msg.contains("has no source_key"), "{msg}");

    let msg = settings_error(r#"{"name":"x","entries":{"ENTRY/title":{"mode":"computed"}}}"#);
    assert!(msg.contains("unknown mode 'computed'"), "{msg}");
}

#[test]
fn reserved_delimiter_is_rejected_in_names_and_file_tokens() {
    let msg = settings_error(r#"{"name":"my_setup","entries":{}}"#);
    assert!(msg.contains("reserved delimiter"), "{msg}");

    let msg = settings_error(
        r#"{"name":"x","entries":{
            "ENTRY/SAMPLE/name":{"mode":"static","value":"silver_behenate"}}}"#,
    );
    assert!(msg.contains("reserved delimiter"), "{msg}");

    // Only values that end up in file names are restricted.
    let schema = common::nxcansas();
    SettingsDocument::from_json_str(
        r#"{"name":"x","entries":{"ENTRY/title":{"mode":"static","value":"run_1"}}}"#,
        &schema,
    )
    .unwrap();
}

#[test]
fn schema_name_mismatch_is_rejected() {
    let msg = settings_error(r#"{"name":"x","schema":"NXsas","entries":{}}"#);
    assert!(msg.contains("authored for schema 'NXsas'"), "{msg}");
}

#[test]
fn load_rejects_file_stem_with_delimiter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad_name.json");
    fs::write(&path, r#"{"name":"good","entries":{}}"#).unwrap();

    let schema = common::nxcansas();
    let err = SettingsDocument::load(&path, &schema).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Settings);
}

#[test]
fn save_then_load_preserves_entries() {
    let schema = common::nxcansas();
    let doc = SettingsDocument::new("beamline")
        .with_entry(SettingsEntry::fixed(
            SchemaPath::parse("ENTRY/title"),
            "Calibration",
            "",
        ))
        .with_entry(SettingsEntry::from_header(
            SchemaPath::parse("ENTRY/INSTRUMENT/DETECTOR/SDD"),
            "SampleDistance",
            "mm",
        ));
    doc.validate(&schema).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let written = doc.save(dir.path()).unwrap();
    assert_eq!(written, dir.path().join("beamline.json"));

    let loaded = SettingsDocument::load(&written, &schema).unwrap();
    assert_eq!(loaded, doc);
}
