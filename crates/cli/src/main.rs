use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use core_types::config::AppConfig;
use core_types::{BlobId, BlobRef, IngestId, MediaType};
use event_log::{EventRecorder, EventStore, IngestQuery};
use extract_dispatch::{ExtractParams, ExtractorRegistry};
use indicatif::{ProgressBar, ProgressStyle};
use ingest_status::{ExtractorState, FileStatus};
use ocr_engine::OcrEngine;
use service::{
    file_statuses, ExtractionPipeline, LogProgressNotifier, NoopSearchIndex, OcrExtractor,
};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Operator CLI for the OmniExtract ingestion/extraction service.
#[derive(Parser, Debug)]
#[command(name = "omniextract", version, about = "OmniExtract operator client")]
struct Cli {
    /// Path to a TOML config file; env overrides still apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the event-log database path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ingest files and run every capable extractor over each.
    Extract {
        /// Ingestion batch identifier.
        #[arg(long)]
        ingest: String,
        /// Override the detected media type for all given files.
        #[arg(long)]
        media_type: Option<String>,
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Reconstruct per-file status for a batch.
    Status {
        /// Ingest id, or a shared prefix with --prefix.
        ingest: String,
        /// Treat the identifier as a prefix spanning multiple batches.
        #[arg(long)]
        prefix: bool,
        /// Emit JSON instead of the styled table.
        #[arg(long)]
        json: bool,
    },
    /// Delete a blob's events and metadata; prints the removed-row count.
    Purge {
        /// Content-derived blob identifier.
        blob_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    service::init_tracing();

    let cli = Cli::parse();
    let mut cfg = match &cli.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::from_env(),
    };
    if let Some(db) = &cli.db {
        cfg.app.db_path.clone_from(db);
    }
    core_types::config::init_global(cfg.clone());

    match cli.command {
        Commands::Extract {
            ingest,
            media_type,
            files,
        } => run_extract(&cfg, &IngestId::new(ingest), media_type.as_deref(), &files).await,
        Commands::Status {
            ingest,
            prefix,
            json,
        } => {
            let query = if prefix {
                IngestQuery::Prefix(ingest)
            } else {
                IngestQuery::Exact(IngestId::new(ingest))
            };
            run_status(&cfg, &query, json)
        }
        Commands::Purge { blob_id } => run_purge(&cfg, &BlobId::new(blob_id)),
    }
}

async fn run_extract(
    cfg: &AppConfig,
    ingest: &IngestId,
    media_type: Option<&str>,
    files: &[PathBuf],
) -> Result<()> {
    let run_id = Uuid::new_v4();
    tracing::info!(%run_id, ingest = %ingest, files = files.len(), "extraction run starting");

    let store = Arc::new(
        EventStore::open(&cfg.app.db_path)
            .with_context(|| format!("opening event log {}", cfg.app.db_path.display()))?,
    );
    let recorder = Arc::new(EventRecorder::new(store, cfg.app.workspace.clone()));

    let engine = OcrEngine::from_config(&cfg.ocr, &cfg.app.scratch_dir)?;
    let mut registry = ExtractorRegistry::new();
    registry.register(Arc::new(OcrExtractor::new(
        engine,
        Arc::new(NoopSearchIndex),
        Arc::new(LogProgressNotifier),
        Duration::from_millis(cfg.index.timeout_ms),
    )));

    let pipeline = ExtractionPipeline::new(
        registry,
        recorder,
        ExtractParams {
            languages: cfg.ocr.languages.clone(),
            scratch_dir: cfg.app.scratch_dir.clone(),
        },
    );

    let bar = ProgressBar::new(files.len() as u64).with_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut failures = 0usize;
    for file in files {
        bar.set_message(file.display().to_string());
        let blob = blob_ref(file, media_type)?;
        let report = pipeline.ingest(&blob, ingest).await?;
        if report.interrupted {
            bar.abandon_with_message("interrupted; remaining files left for retry");
            println!(
                "{} worker terminated while extracting {}",
                style("interrupted:").yellow().bold(),
                blob.id
            );
            return Ok(());
        }
        for (extractor, failure) in report.failures() {
            failures += 1;
            println!(
                "{} {} {} {}",
                style("failed:").red().bold(),
                blob.id,
                style(extractor).dim(),
                failure
            );
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if failures == 0 {
        println!("{} {} file(s) extracted", style("ok:").green().bold(), files.len());
    } else {
        println!(
            "{} {} extraction failure(s) across {} file(s)",
            style("done with errors:").yellow().bold(),
            failures,
            files.len()
        );
    }
    Ok(())
}

fn run_status(cfg: &AppConfig, query: &IngestQuery, json: bool) -> Result<()> {
    let store = EventStore::open(&cfg.app.db_path)
        .with_context(|| format!("opening event log {}", cfg.app.db_path.display()))?;
    let statuses = file_statuses(&store, query)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if statuses.is_empty() {
        println!("no files recorded for this batch");
        return Ok(());
    }
    for status in &statuses {
        print_status(status);
    }
    Ok(())
}

fn print_status(status: &FileStatus) {
    let header = style(status.blob_id.as_str()).bold();
    if status.infinite_loop {
        println!(
            "{header}  {}",
            style("possibly stuck (event count over threshold)").red().bold()
        );
        return;
    }

    let media = status
        .media_types
        .iter()
        .map(MediaType::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    println!(
        "{header}  [{media}]  workspace={}",
        status.workspace.as_deref().unwrap_or("-")
    );
    for path in &status.paths {
        println!("    {} ({} bytes)", path.path, path.file_size);
    }
    for extractor in &status.extractors {
        let state = match extractor.latest() {
            ExtractorState::Success => style("success").green(),
            ExtractorState::Failure => style("failure").red(),
            ExtractorState::Started => style("started").yellow(),
            ExtractorState::Unknown => style("unknown").dim(),
        };
        println!(
            "    {:<12} {} ({} update(s))",
            extractor.extractor,
            state,
            extractor.updates.len()
        );
    }
    for error in &status.errors {
        println!("    {} {error}", style("error:").red());
    }
}

fn run_purge(cfg: &AppConfig, blob_id: &BlobId) -> Result<()> {
    let store = EventStore::open(&cfg.app.db_path)
        .with_context(|| format!("opening event log {}", cfg.app.db_path.display()))?;
    let removed = store.purge_blob(blob_id)?;
    println!("removed {removed} row(s) for {blob_id}");
    Ok(())
}

/// Hash the file bytes into a stable content-derived blob id and pair it
/// with its detected (or overridden) media type.
fn blob_ref(path: &Path, media_type: Option<&str>) -> Result<BlobRef> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let digest = Sha256::digest(&bytes);
    let media = media_type.map_or_else(|| guess_media_type(path), MediaType::new);
    Ok(BlobRef {
        id: BlobId::new(format!("{digest:x}")),
        path: path.to_path_buf(),
        media_type: media,
        size: bytes.len() as u64,
    })
}

/// Extension-based convenience guess; callers with a real detector pass
/// --media-type instead.
fn guess_media_type(path: &Path) -> MediaType {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("pdf") => MediaType::new(MediaType::PDF),
        Some("png") => MediaType::new("image/png"),
        Some("jpg" | "jpeg") => MediaType::new("image/jpeg"),
        Some("tif" | "tiff") => MediaType::new("image/tiff"),
        Some("bmp") => MediaType::new("image/bmp"),
        Some("gif") => MediaType::new("image/gif"),
        _ => MediaType::new("application/octet-stream"),
    }
}
