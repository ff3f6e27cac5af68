//! Unattended ingestion: poll an inbox, convert each source file, file the results.
//!
//! Most callers should build an [`IngestionLoop`] from an [`IngestConfig`] and either drive it
//! with [`IngestionLoop::tick`] or hand it to its own thread with [`IngestionLoop::spawn`].
//! One-shot conversion without any relocation is available as [`convert_file`].
//!
//! Outcomes are:
//!
//! - appended to a [`ProcessingLog`] readable while the loop runs
//! - emitted as `tracing` events
//! - optionally reported to an [`IngestionObserver`], with `on_alert` for failures at or above
//!   [`IngestConfig::alert_at_or_above`]

pub mod config;
pub mod convert;
pub mod log;
pub mod observability;
pub mod relocate;
pub mod runner;
pub mod stop;

pub use config::{DEFAULT_PATTERN, IngestConfig};
pub use convert::{Conversion, convert_file};
pub use log::{ProcessingLog, ProcessingRecord, RecordStatus};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity,
    IngestionStats, TracingObserver,
};
pub use relocate::{Destinations, FileMover, FsMover, list_outputs, output_file_name};
pub use runner::{IngestionLoop, LoopHandle, LoopState, TickSummary};
pub use stop::StopSignal;
