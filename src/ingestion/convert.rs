use std::path::Path;

use crate::document::{OutputDocument, Provenance, build_document};
use crate::error::ConvertResult;
use crate::resolve::{ResolvedFields, resolve_document};
use crate::schema::SchemaTree;
use crate::settings::SettingsDocument;
use crate::source::parse_source_from_path;

/// Result of converting one source file.
#[derive(Debug, Clone)]
pub struct Conversion {
    pub resolved: ResolvedFields,
    pub document: OutputDocument,
}

/// Extract, resolve and build the document for one source file.
///
/// No file-system side effects beyond reading `path`.
pub fn convert_file(
    schema: &SchemaTree,
    settings: &SettingsDocument,
    path: impl AsRef<Path>,
) -> ConvertResult<Conversion> {
    let path = path.as_ref();
    let (header, payload) = parse_source_from_path(path)?;
    let resolved = resolve_document(schema, settings, &header)?;

    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let provenance = Provenance::now(source_file, settings.name.clone());
    let document = build_document(schema, &resolved, &payload, &provenance);

    Ok(Conversion { resolved, document })
}
