//! Outbox layout and file relocation.
//!
//! ```text
//! <outbox>/
//!   .staging/                          outputs being written
//!   <sample>_<experiment>/nexus/       converted documents
//!   <sample>_<experiment>/raw/         archived source files
//!   quarantine/                        sources that exhausted their attempts
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use walkdir::WalkDir;

use crate::error::ConvertResult;
use crate::resolve::ResolvedFields;
use crate::schema::SchemaTree;
use crate::source::{FILENAME_DELIMITER, SourceName};
use crate::types::{DEFAULT_TEXT, Value};

pub const STAGING_DIR: &str = ".staging";
pub const QUARANTINE_DIR: &str = "quarantine";
pub const NEXUS_DIR: &str = "nexus";
pub const RAW_DIR: &str = "raw";
pub const OUTPUT_EXTENSION: &str = "nxs.json";

/// Timestamp embedded in output file names.
pub const OUTPUT_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S";

/// Moves files on behalf of the ingestion loop.
pub trait FileMover: Send + Sync {
    /// Move `from` to `to`, creating the parent directory of `to` when needed.
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }
}

/// [`FileMover`] backed by the local file system.
///
/// Never replaces an existing file: a taken destination fails with
/// [`io::ErrorKind::AlreadyExists`]. Falls back to copy-and-delete when a rename is not
/// possible, e.g. across mount points.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsMover;

impl FileMover for FsMover {
    fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        if to.exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to.display()),
            ));
        }
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(rename_err) => {
                if !from.is_file() {
                    return Err(rename_err);
                }
                tracing::debug!(
                    from = %from.display(),
                    %rename_err,
                    "rename failed, copying instead"
                );
                copy_then_unlink(from, to, |path| fs::remove_file(path))
            }
        }
    }
}

/// Copy `from` to `to`, then unlink `from`. On any failure `to` is removed again, so the
/// file only ever exists at one of the two places once this returns.
fn copy_then_unlink(
    from: &Path,
    to: &Path,
    unlink: impl Fn(&Path) -> io::Result<()>,
) -> io::Result<()> {
    let result = fs::copy(from, to).and_then(|_| unlink(from));
    if result.is_err() {
        if let Err(cleanup) = fs::remove_file(to) {
            if cleanup.kind() != io::ErrorKind::NotFound {
                tracing::error!(to = %to.display(), %cleanup, "could not remove partial copy");
            }
        }
    }
    result
}

/// Where a successfully converted file and its output end up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destinations {
    pub output: PathBuf,
    pub raw: PathBuf,
}

impl Destinations {
    pub fn new(outbox: &Path, name: &SourceName, output_file_name: &str) -> Self {
        let group = outbox.join(name.prefix());
        Self {
            output: group.join(NEXUS_DIR).join(output_file_name),
            raw: group.join(RAW_DIR).join(&name.file_name),
        }
    }
}

pub fn staging_path(outbox: &Path, output_file_name: &str) -> PathBuf {
    outbox.join(STAGING_DIR).join(output_file_name)
}

pub fn quarantine_path(outbox: &Path, name: &SourceName) -> PathBuf {
    outbox.join(QUARANTINE_DIR).join(&name.file_name)
}

/// `<sample-name>_img<index>_<timestamp>.nxs.json`.
///
/// The sample name is the first resolved `filename_token` field holding real text; files
/// whose settings never name the sample fall back to the sample token of the source name.
/// `<index>` is the whole index of the source name with delimiters turned into `-`, so two
/// sources sharing a prefix never map to the same output.
pub fn output_file_name(
    schema: &SchemaTree,
    resolved: &ResolvedFields,
    name: &SourceName,
    at: DateTime<Local>,
) -> String {
    let sample = schema
        .walk()
        .into_iter()
        .filter(|(_, node)| node.filename_token)
        .filter_map(|(path, _)| match resolved.get(&path).map(|f| &f.value) {
            Some(Value::Text(text)) if !text.trim().is_empty() && text != DEFAULT_TEXT => {
                Some(sanitize(text))
            }
            _ => None,
        })
        .next()
        .unwrap_or_else(|| name.sample.clone());

    format!(
        "{sample}{d}img{index}{d}{ts}.{OUTPUT_EXTENSION}",
        d = FILENAME_DELIMITER,
        index = name.index.replace(FILENAME_DELIMITER, "-"),
        ts = at.format(OUTPUT_TIME_FORMAT),
    )
}

/// Characters that are unsafe in file names become `-`.
fn sanitize(text: &str) -> String {
    text.trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '.' { c } else { '-' })
        .collect()
}

/// Move the staged output and the source to their destinations as one logical step.
///
/// The output moves first. If the source cannot follow, the output is removed again so that
/// neither file appears relocated.
pub fn relocate(
    mover: &dyn FileMover,
    staged: &Path,
    source: &Path,
    destinations: &Destinations,
) -> ConvertResult<()> {
    mover.move_file(staged, &destinations.output)?;
    if let Err(err) = mover.move_file(source, &destinations.raw) {
        if let Err(rollback) = mover.remove_file(&destinations.output) {
            tracing::error!(
                output = %destinations.output.display(),
                %rollback,
                "could not roll back relocated output"
            );
        }
        return Err(err.into());
    }
    Ok(())
}

/// Every converted document below `outbox`, sorted by path. Staging files are skipped.
pub fn list_outputs(outbox: impl AsRef<Path>) -> ConvertResult<Vec<PathBuf>> {
    let outbox = outbox.as_ref();
    let suffix = format!(".{OUTPUT_EXTENSION}");
    let mut out = Vec::new();
    for entry in WalkDir::new(outbox)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != STAGING_DIR)
    {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() && entry.file_name().to_string_lossy().ends_with(&suffix) {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}
