//! `nexus-ingest` converts EDF detector files (a text header plus one binary array) into
//! NeXus-style hierarchical documents, driven by a schema definition and a settings document.
//!
//! A conversion always follows the same pipeline:
//!
//! 1. [`schema::load_schema_from_path`] loads the target tree (groups, datasets, attributes,
//!    allowed units, required flags).
//! 2. [`settings::SettingsDocument::load`] loads the per-field rules (static literal or header
//!    key, plus a unit) and validates them against the schema.
//! 3. [`source::parse_source_from_path`] splits a source file into a [`source::SourceHeader`]
//!    and a [`source::SourcePayload`].
//! 4. [`resolve::resolve_document`] turns every schema field into a typed, unit-correct value,
//!    or fails for the whole file.
//! 5. [`document::build_document`] materializes the output tree, which
//!    [`document::write_document`] serializes.
//!
//! [`ingestion::IngestionLoop`] runs this pipeline unattended over an inbox directory and files
//! converted documents and archived sources under an outbox.
//!
//! ## Quick example: convert one file
//!
//! ```no_run
//! use nexus_ingest::document::write_document;
//! use nexus_ingest::ingestion::convert_file;
//! use nexus_ingest::schema::load_schema_from_path;
//! use nexus_ingest::settings::SettingsDocument;
//!
//! # fn main() -> Result<(), nexus_ingest::ConvertError> {
//! let schema = load_schema_from_path("schemas/nxcansas.json")?;
//! let settings = SettingsDocument::load("xeuss.json", &schema)?;
//! let conversion = convert_file(&schema, &settings, "inbox/agbh_saxs_0_00001.edf")?;
//! write_document(&conversion.document, "agbh.nxs.json")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Quick example: watch an inbox
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use nexus_ingest::ingestion::{IngestConfig, IngestionLoop, TracingObserver};
//! use nexus_ingest::schema::load_schema_from_path;
//! use nexus_ingest::settings::SettingsDocument;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let schema = Arc::new(load_schema_from_path("schemas/nxcansas.json")?);
//! let settings = Arc::new(SettingsDocument::load("xeuss.json", &schema)?);
//! let config = IngestConfig::new("inbox", "outbox")
//!     .with_poll_interval(Duration::from_secs(2))
//!     .with_observer(Arc::new(TracingObserver));
//!
//! let handle = IngestionLoop::new(config, schema, settings)?.spawn()?;
//! // ... later
//! handle.stop();
//! let _ = handle.join();
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`schema`]: schema definitions and their validation
//! - [`settings`]: settings documents (field → rule) and their validation
//! - [`source`]: EDF parsing and source file naming
//! - [`units`]: unit conversion between compatible units
//! - [`resolve`]: the field resolution and default policy
//! - [`document`]: output documents
//! - [`ingestion`]: the polling loop, relocation, processing log and observers
//! - [`types`]: values, value types and schema paths shared by the modules above
//! - [`error`]: the error type used across the crate

pub mod document;
pub mod error;
pub mod ingestion;
pub mod resolve;
pub mod schema;
pub mod settings;
pub mod source;
pub mod types;
pub mod units;

pub use error::{ConvertError, ConvertResult, ErrorKind};
