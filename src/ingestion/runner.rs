use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use chrono::Local;

use crate::document::{OutputDocument, write_document};
use crate::error::{ConvertError, ConvertResult};
use crate::schema::SchemaTree;
use crate::settings::SettingsDocument;
use crate::source::SourceName;
use crate::types::Value;

use super::config::IngestConfig;
use super::convert::convert_file;
use super::log::{ProcessingLog, ProcessingRecord, RecordStatus};
use super::observability::{IngestionContext, IngestionSeverity, IngestionStats};
use super::relocate::{
    Destinations, FileMover, FsMover, QUARANTINE_DIR, STAGING_DIR, output_file_name,
    quarantine_path, relocate, staging_path,
};
use super::stop::StopSignal;

/// What the loop is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Scanning,
    Converting(PathBuf),
    Relocating(PathBuf),
    Stopped,
}

/// Counts for one scan-and-convert cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Candidates found in the inbox.
    pub scanned: usize,
    pub converted: usize,
    pub failed: usize,
    pub quarantined: usize,
    /// The cycle ended early because a stop was requested.
    pub interrupted: bool,
}

/// Polls an inbox, converts every source file it finds and files the results in the outbox.
///
/// Files are processed one at a time. A failing file stays in the inbox and is retried on the
/// next cycle; it never stops the loop.
pub struct IngestionLoop {
    config: IngestConfig,
    schema: Arc<SchemaTree>,
    settings: Arc<SettingsDocument>,
    mover: Arc<dyn FileMover>,
    log: Arc<ProcessingLog>,
    state: Arc<Mutex<LoopState>>,
    stop: Arc<StopSignal>,
    attempts: HashMap<PathBuf, u32>,
}

impl IngestionLoop {
    /// Validate the configuration against the schema and prepare the inbox/outbox directories.
    ///
    /// Fails with a fatal error when the config or settings are unusable; nothing is processed
    /// in that case.
    pub fn new(
        config: IngestConfig,
        schema: Arc<SchemaTree>,
        settings: Arc<SettingsDocument>,
    ) -> ConvertResult<Self> {
        config.validate()?;
        settings.validate(&schema)?;
        fs::create_dir_all(&config.inbox)?;
        fs::create_dir_all(config.outbox.join(STAGING_DIR))?;

        Ok(Self {
            config,
            schema,
            settings,
            mover: Arc::new(FsMover),
            log: Arc::new(ProcessingLog::new()),
            state: Arc::new(Mutex::new(LoopState::Idle)),
            stop: Arc::new(StopSignal::new()),
            attempts: HashMap::new(),
        })
    }

    /// Replace the file mover, e.g. to relocate onto another storage backend.
    pub fn with_mover(mut self, mover: Arc<dyn FileMover>) -> Self {
        self.mover = mover;
        self
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn log(&self) -> Arc<ProcessingLog> {
        Arc::clone(&self.log)
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.stop)
    }

    pub fn state(&self) -> LoopState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_state(&self, state: LoopState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Inbox files matching the pattern whose names parse as a [`SourceName`], sorted by name.
    pub fn scan(&self) -> ConvertResult<Vec<(PathBuf, SourceName)>> {
        let inbox = glob::Pattern::escape(&self.config.inbox.to_string_lossy());
        let pattern = Path::new(&inbox).join(&self.config.pattern);
        let pattern = pattern.to_string_lossy();
        let entries = glob::glob(&pattern)
            .map_err(|e| ConvertError::settings(format!("invalid pattern '{pattern}': {e}")))?;

        let mut candidates = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| e.into_error())?;
            if !path.is_file() {
                continue;
            }
            match SourceName::parse(&path) {
                Some(name) => candidates.push((path, name)),
                None => tracing::debug!(
                    path = %path.display(),
                    "skipping file without sample_experiment_index name"
                ),
            }
        }
        candidates.sort_by(|a, b| a.1.file_name.cmp(&b.1.file_name));
        Ok(candidates)
    }

    /// Run one scan-and-convert cycle.
    pub fn tick(&mut self) -> TickSummary {
        let mut summary = TickSummary::default();
        if self.stop.is_stopped() {
            summary.interrupted = true;
            self.set_state(LoopState::Stopped);
            return summary;
        }

        let span = tracing::info_span!("tick", inbox = %self.config.inbox.display());
        let _enter = span.enter();

        self.set_state(LoopState::Scanning);
        let candidates = match self.scan() {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!(%err, "inbox scan failed");
                self.set_state(LoopState::Idle);
                return summary;
            }
        };
        summary.scanned = candidates.len();

        // Forget attempt counts of files that left the inbox.
        self.attempts
            .retain(|path, _| candidates.iter().any(|(p, _)| p == path));

        for (path, name) in &candidates {
            if self.stop.is_stopped() {
                summary.interrupted = true;
                break;
            }
            match self.process(path, name) {
                RecordStatus::Success => summary.converted += 1,
                RecordStatus::Failed => summary.failed += 1,
                RecordStatus::Quarantined => summary.quarantined += 1,
            }
        }

        if summary.scanned > 0 {
            tracing::info!(
                scanned = summary.scanned,
                converted = summary.converted,
                failed = summary.failed,
                quarantined = summary.quarantined,
                "tick finished"
            );
        }
        self.set_state(if self.stop.is_stopped() {
            LoopState::Stopped
        } else {
            LoopState::Idle
        });
        summary
    }

    fn process(&mut self, path: &Path, name: &SourceName) -> RecordStatus {
        let attempt = self.attempts.get(path).copied().unwrap_or(0) + 1;
        let ctx = IngestionContext {
            path: path.to_path_buf(),
            attempt,
        };
        let span = tracing::info_span!("file", name = %name, attempt);
        let _enter = span.enter();

        match self.convert_and_relocate(path, name) {
            Ok((destinations, stats)) => {
                self.attempts.remove(path);
                if let Some(obs) = &self.config.observer {
                    obs.on_success(&ctx, &stats);
                }
                self.log.append(ProcessingRecord::success(
                    path,
                    attempt,
                    destinations.output,
                    destinations.raw,
                ));
                RecordStatus::Success
            }
            Err(err) => {
                self.attempts.insert(path.to_path_buf(), attempt);
                let exhausted = self.config.max_attempts.is_some_and(|max| attempt >= max);
                let quarantined = if exhausted { self.quarantine(path, name) } else { None };

                let severity = if quarantined.is_some() {
                    IngestionSeverity::Critical
                } else {
                    err.severity()
                };
                self.report_failure(&ctx, severity, &err);

                match quarantined {
                    Some(destination) => {
                        self.attempts.remove(path);
                        let record =
                            ProcessingRecord::quarantined(path, attempt, &err, destination);
                        self.log.append(record);
                        RecordStatus::Quarantined
                    }
                    None => {
                        self.log.append(ProcessingRecord::failed(path, attempt, &err));
                        RecordStatus::Failed
                    }
                }
            }
        }
    }

    fn convert_and_relocate(
        &self,
        path: &Path,
        name: &SourceName,
    ) -> ConvertResult<(Destinations, IngestionStats)> {
        self.set_state(LoopState::Converting(path.to_path_buf()));
        let conversion = convert_file(&self.schema, &self.settings, path)?;

        let file_name = output_file_name(&self.schema, &conversion.resolved, name, Local::now());
        let staged = staging_path(&self.config.outbox, &file_name);
        let destinations = Destinations::new(&self.config.outbox, name, &file_name);

        self.set_state(LoopState::Relocating(path.to_path_buf()));
        let result = write_document(&conversion.document, &staged)
            .and_then(|()| relocate(self.mover.as_ref(), &staged, path, &destinations));
        if let Err(err) = result {
            remove_if_present(&staged);
            return Err(err);
        }

        let stats = IngestionStats {
            fields: conversion.resolved.len(),
            values: payload_len(&conversion.document, &self.schema),
            output: destinations.output.clone(),
        };
        Ok((destinations, stats))
    }

    /// Move a file that exhausted its attempts out of the inbox. Returns its new location, or
    /// `None` when the move failed and the file stays in the inbox.
    fn quarantine(&self, path: &Path, name: &SourceName) -> Option<PathBuf> {
        let destination = quarantine_path(&self.config.outbox, name);
        match self.mover.move_file(path, &destination) {
            Ok(()) => {
                tracing::error!(
                    path = %path.display(),
                    destination = %destination.display(),
                    "moved to {QUARANTINE_DIR} after repeated failures"
                );
                Some(destination)
            }
            Err(err) => {
                tracing::error!(path = %path.display(), %err, "quarantine failed");
                None
            }
        }
    }

    fn report_failure(
        &self,
        ctx: &IngestionContext,
        severity: IngestionSeverity,
        err: &ConvertError,
    ) {
        tracing::warn!(path = %ctx.path.display(), kind = %err.kind(), "{err}");
        if let Some(obs) = &self.config.observer {
            obs.on_failure(ctx, severity, err);
            if severity >= self.config.alert_at_or_above {
                obs.on_alert(ctx, severity, err);
            }
        }
    }

    /// Tick until stopped, sleeping `poll_interval` between cycles.
    pub fn run(mut self) {
        tracing::info!(
            inbox = %self.config.inbox.display(),
            outbox = %self.config.outbox.display(),
            interval = ?self.config.poll_interval,
            "ingestion loop started"
        );
        while !self.stop.is_stopped() {
            self.tick();
            if self.stop.wait_timeout(self.config.poll_interval) {
                break;
            }
        }
        self.set_state(LoopState::Stopped);
        tracing::info!(records = self.log.len(), "ingestion loop stopped");
    }

    /// Move the loop onto its own thread.
    pub fn spawn(self) -> io::Result<LoopHandle> {
        let stop = self.stop_signal();
        let state = Arc::clone(&self.state);
        let log = self.log();
        let thread = thread::Builder::new()
            .name("nexus-ingest".to_string())
            .spawn(move || self.run())?;
        Ok(LoopHandle {
            stop,
            state,
            log,
            thread,
        })
    }
}

fn payload_len(document: &OutputDocument, schema: &SchemaTree) -> usize {
    match document.get(schema.payload_path()).and_then(|n| n.value()) {
        Some(Value::Array(values)) => values.len(),
        _ => 0,
    }
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => tracing::warn!(path = %path.display(), %err, "could not remove staged output"),
    }
}

/// Controls a loop running on its own thread.
#[derive(Debug)]
pub struct LoopHandle {
    stop: Arc<StopSignal>,
    state: Arc<Mutex<LoopState>>,
    log: Arc<ProcessingLog>,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    /// Ask the loop to stop; a sleeping loop wakes immediately.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_signal(&self) -> Arc<StopSignal> {
        Arc::clone(&self.stop)
    }

    pub fn status(&self) -> LoopState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn records(&self) -> Vec<ProcessingRecord> {
        self.log.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the loop thread to exit.
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}
