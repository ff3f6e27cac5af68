mod common;

use std::fs;
use std::sync::{Arc, Mutex};

use nexus_ingest::ConvertError;
use nexus_ingest::ingestion::{
    CompositeObserver, FileObserver, IngestConfig, IngestionContext, IngestionLoop,
    IngestionObserver, IngestionSeverity, IngestionStats,
};

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<IngestionStats>>,
    failures: Mutex<Vec<IngestionSeverity>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_success(&self, _ctx: &IngestionContext, stats: &IngestionStats) {
        self.successes.lock().unwrap().push(stats.clone());
    }

    fn on_failure(
        &self,
        _ctx: &IngestionContext,
        severity: IngestionSeverity,
        _error: &ConvertError,
    ) {
        self.failures.lock().unwrap().push(severity);
    }

    fn on_alert(
        &self,
        _ctx: &IngestionContext,
        severity: IngestionSeverity,
        _error: &ConvertError,
    ) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn run_once(
    pairs: &[(&str, &str)],
    config: impl FnOnce(IngestConfig) -> IngestConfig,
    ticks: usize,
) -> tempfile::TempDir {
    let root = tempfile::tempdir().unwrap();
    let inbox = root.path().join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    common::write_edf(&inbox, "sampleA_exp1_0001.edf", pairs);

    let schema = common::nxcansas();
    let settings = common::xeuss(&schema);
    let cfg = config(IngestConfig::new(&inbox, root.path().join("outbox")));
    let mut ingestion = IngestionLoop::new(cfg, Arc::new(schema), Arc::new(settings)).unwrap();
    for _ in 0..ticks {
        ingestion.tick();
    }
    root
}

#[test]
fn observer_receives_success_stats() {
    let obs = Arc::new(RecordingObserver::default());
    let _root = run_once(&common::valid_pairs(), |c| c.with_observer(obs.clone()), 1);

    let successes = obs.successes.lock().unwrap().clone();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].values, 6);
    assert!(successes[0].fields > 10);
    let output = successes[0].output.to_string_lossy().into_owned();
    assert!(output.ends_with(".nxs.json"), "{output}");
    assert!(successes[0].output.is_file());
    assert!(obs.failures.lock().unwrap().is_empty());
}

#[test]
fn observer_receives_failure_without_alert_for_field_error() {
    let obs = Arc::new(RecordingObserver::default());
    run_once(
        &common::pairs_without("Title"),
        |c| {
            c.with_observer(obs.clone())
                .with_alert_at_or_above(IngestionSeverity::Critical)
        },
        1,
    );

    assert_eq!(obs.failures.lock().unwrap().clone(), vec![IngestionSeverity::Error]);
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn lower_threshold_alerts_on_field_errors() {
    let obs = Arc::new(RecordingObserver::default());
    run_once(
        &common::pairs_without("Title"),
        |c| {
            c.with_observer(obs.clone())
                .with_alert_at_or_above(IngestionSeverity::Error)
        },
        1,
    );

    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Error]);
}

#[test]
fn quarantine_raises_a_critical_alert() {
    let obs = Arc::new(RecordingObserver::default());
    run_once(
        &common::pairs_without("Title"),
        |c| c.with_observer(obs.clone()).with_max_attempts(Some(1)),
        1,
    );

    assert_eq!(obs.failures.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
    assert_eq!(obs.alerts.lock().unwrap().clone(), vec![IngestionSeverity::Critical]);
}

#[test]
fn composite_fans_out_and_file_observer_appends() {
    let log_dir = tempfile::tempdir().unwrap();
    let log_path = log_dir.path().join("ingest.log");
    let recorder = Arc::new(RecordingObserver::default());
    let observers: Vec<Arc<dyn IngestionObserver>> =
        vec![recorder.clone(), Arc::new(FileObserver::new(&log_path))];
    let composite = CompositeObserver::new(observers);

    run_once(
        &common::pairs_without("Title"),
        |c| c.with_observer(Arc::new(composite)),
        2,
    );

    assert_eq!(recorder.failures.lock().unwrap().len(), 2);
    let log = fs::read_to_string(&log_path).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("fail severity=Error kind=FieldError"), "{}", lines[0]);
    assert!(lines[1].contains("attempt=2"), "{}", lines[1]);
}
