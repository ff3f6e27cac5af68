use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nexus_ingest::document::write_document;
use nexus_ingest::ingestion::{
    CompositeObserver, FileObserver, IngestConfig, IngestionLoop, IngestionObserver,
    IngestionSeverity, ProcessingRecord, RecordStatus, TracingObserver, convert_file, list_outputs,
    output_file_name,
};
use nexus_ingest::schema::{SchemaTree, load_schema_from_path};
use nexus_ingest::settings::SettingsDocument;
use nexus_ingest::source::SourceName;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "nexus-ingest")]
#[command(about = "Convert EDF detector files into NeXus-style documents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(clap::Args)]
struct Definitions {
    /// Schema definition (JSON).
    #[arg(long)]
    schema: PathBuf,

    /// Settings document (JSON).
    #[arg(long)]
    settings: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a schema and a settings document against each other.
    Check {
        #[command(flatten)]
        defs: Definitions,
    },
    /// Convert a single source file without touching the inbox/outbox.
    Convert {
        #[command(flatten)]
        defs: Definitions,

        file: PathBuf,

        #[arg(short = 'o', long, default_value = ".")]
        out: PathBuf,
    },
    /// Poll an inbox and convert every file that appears in it.
    Watch {
        #[command(flatten)]
        defs: Definitions,

        /// Loop configuration (JSON); flags below override it.
        #[arg(long)]
        config: Option<PathBuf>,

        #[arg(long)]
        inbox: Option<PathBuf>,

        #[arg(long)]
        outbox: Option<PathBuf>,

        /// Seconds between two scans.
        #[arg(long)]
        interval: Option<f64>,

        /// Quarantine a file after this many consecutive failures.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Append conversion events to this file.
        #[arg(long)]
        log_file: Option<PathBuf>,

        /// Write the processing records as JSON when the loop exits.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Run a single scan and exit.
        #[arg(long)]
        once: bool,
    },
    /// List converted documents below an outbox.
    Outputs { outbox: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Check { defs } => {
            let (schema, settings) = load_definitions(&defs)?;
            println!(
                "{} {}: {} fields, settings '{}' maps {}",
                schema.name,
                schema.version,
                schema.leaf_count(),
                settings.name,
                settings.len()
            );
        }
        Commands::Convert { defs, file, out } => {
            let (schema, settings) = load_definitions(&defs)?;
            let conversion = convert_file(&schema, &settings, &file)
                .with_context(|| format!("converting {}", file.display()))?;

            let file_name = match SourceName::parse(&file) {
                Some(name) => {
                    let now = chrono::Local::now();
                    output_file_name(&schema, &conversion.resolved, &name, now)
                }
                None => format!("{}.nxs.json", file_stem(&file)),
            };
            fs::create_dir_all(&out)?;
            let target = out.join(file_name);
            write_document(&conversion.document, &target)?;
            println!("Wrote {}", target.display());
        }
        Commands::Watch {
            defs,
            config,
            inbox,
            outbox,
            interval,
            max_attempts,
            log_file,
            report,
            once,
        } => {
            let (schema, settings) = load_definitions(&defs)?;

            let mut cfg = match &config {
                Some(path) => IngestConfig::from_json_path(path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => IngestConfig::default(),
            };
            if let Some(inbox) = inbox {
                cfg.inbox = inbox;
            }
            if let Some(outbox) = outbox {
                cfg.outbox = outbox;
            }
            if let Some(secs) = interval {
                cfg.poll_interval = Duration::try_from_secs_f64(secs)
                    .with_context(|| format!("invalid interval {secs}"))?;
            }
            if max_attempts.is_some() {
                cfg.max_attempts = max_attempts;
            }

            let mut observers: Vec<Arc<dyn IngestionObserver>> = vec![Arc::new(TracingObserver)];
            if let Some(path) = log_file {
                observers.push(Arc::new(FileObserver::new(path)));
            }
            let cfg = cfg
                .with_observer(Arc::new(CompositeObserver::new(observers)))
                .with_alert_at_or_above(IngestionSeverity::Critical);

            let mut ingestion = IngestionLoop::new(cfg, Arc::new(schema), Arc::new(settings))?;

            let records = if once {
                let summary = ingestion.tick();
                println!(
                    "scanned {} converted {} failed {} quarantined {}",
                    summary.scanned, summary.converted, summary.failed, summary.quarantined
                );
                ingestion.log().snapshot()
            } else {
                let stop = ingestion.stop_signal();
                ctrlc::set_handler(move || {
                    tracing::info!("interrupt received, stopping after the current file");
                    stop.stop();
                })?;
                let log = ingestion.log();
                let handle = ingestion.spawn()?;
                if handle.join().is_err() {
                    bail!("ingestion thread panicked");
                }
                log.snapshot()
            };

            if let Some(path) = report {
                write_report(&path, &records)?;
            }
        }
        Commands::Outputs { outbox } => {
            for path in list_outputs(&outbox)? {
                println!("{}", path.display());
            }
        }
    }

    Ok(())
}

fn load_definitions(defs: &Definitions) -> Result<(SchemaTree, SettingsDocument)> {
    let schema = load_schema_from_path(&defs.schema)?;
    let settings = SettingsDocument::load(&defs.settings, &schema)?;
    Ok((schema, settings))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

fn write_report(path: &Path, records: &[ProcessingRecord]) -> Result<()> {
    let failed = records
        .iter()
        .filter(|r| r.status != RecordStatus::Success)
        .count();
    fs::write(path, serde_json::to_string_pretty(records)?)?;
    println!(
        "Wrote {} ({} records, {} not converted)",
        path.display(),
        records.len(),
        failed
    );
    Ok(())
}
