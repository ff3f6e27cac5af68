use std::fmt;
use std::path::Path;

/// Reserved separator between identity tokens in source file names.
///
/// It must never appear inside user-chosen values that end up in file names.
pub const FILENAME_DELIMITER: char = '_';

/// Sample/experiment identity parsed from a source file name such as
/// `sampleA_exp1_0001.edf`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceName {
    pub sample: String,
    pub experiment: String,
    /// Remaining tokens (frame index, detector, ...), joined with the delimiter.
    pub index: String,
    pub file_name: String,
}

impl SourceName {
    /// Parse a file name (or path). At least three non-empty delimiter-separated tokens are
    /// required in the stem.
    pub fn parse(file_name: impl AsRef<Path>) -> Option<Self> {
        let path = file_name.as_ref();
        let file_name = path.file_name()?.to_str()?.to_string();
        let stem = path.file_stem()?.to_str()?;

        let mut tokens = stem.splitn(3, FILENAME_DELIMITER);
        let sample = tokens.next().filter(|t| !t.is_empty())?;
        let experiment = tokens.next().filter(|t| !t.is_empty())?;
        let index = tokens.next().filter(|t| !t.is_empty())?;

        Some(Self {
            sample: sample.to_string(),
            experiment: experiment.to_string(),
            index: index.to_string(),
            file_name,
        })
    }

    /// `<sample>_<experiment>`, the key of this file's outbox directory.
    pub fn prefix(&self) -> String {
        format!("{}{FILENAME_DELIMITER}{}", self.sample, self.experiment)
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name)
    }
}
