#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use nexus_ingest::schema::{SchemaTree, load_schema_from_path};
use nexus_ingest::settings::SettingsDocument;
use nexus_ingest::source::{EdfDataType, SourceHeader, SourcePayload, encode_edf};

pub fn nxcansas() -> SchemaTree {
    load_schema_from_path("schemas/nxcansas.json").unwrap()
}

pub fn xeuss(schema: &SchemaTree) -> SettingsDocument {
    SettingsDocument::load("tests/fixtures/xeuss.json", schema).unwrap()
}

/// Header keys referenced by `tests/fixtures/xeuss.json`.
pub fn valid_pairs() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Title", "AgBh calibration"),
        ("Date", "Tue Mar 25 09:53:00 2025"),
        ("WaveLength", "1.54e-10"),
        ("SampleDistance", "2.0"),
        ("Center_1", "500"),
        ("Center_2", "510"),
        ("PSize_1", "7.5e-05"),
        ("PSize_2", "7.5e-05"),
        ("DetectorModel", "Dectris EIGER2 Si 1M, S/N E-02-0299"),
        ("ExposureTime", "30"),
        ("Sample", "dummySample"),
        ("alpha", "0.2"),
    ]
}

/// `valid_pairs` with `key` removed.
pub fn pairs_without(key: &str) -> Vec<(&'static str, &'static str)> {
    valid_pairs().into_iter().filter(|(k, _)| *k != key).collect()
}

/// `valid_pairs` with `key` set to `value`.
pub fn pairs_with(key: &'static str, value: &'static str) -> Vec<(&'static str, &'static str)> {
    valid_pairs()
        .into_iter()
        .map(|(k, v)| if k == key { (k, value) } else { (k, v) })
        .collect()
}

pub fn header(pairs: &[(&str, &str)]) -> SourceHeader {
    SourceHeader::from_pairs(pairs.iter().copied()).unwrap()
}

pub fn payload() -> SourcePayload {
    SourcePayload::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], vec![3, 2], EdfDataType::FloatValue)
}

pub fn edf_bytes(pairs: &[(&str, &str)]) -> Vec<u8> {
    encode_edf(&header(pairs), &payload())
}

pub fn write_edf(dir: &Path, file_name: &str, pairs: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, edf_bytes(pairs)).unwrap();
    path
}
