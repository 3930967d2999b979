//! Apply command - run a template's rule set over many PDFs.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use marca_core::{
    BatchApplier, BatchOptions, BatchSummary, DocumentLoader, DocumentRef, JsonRuleStore,
    LoadError, MergeError, PdfDocument, RecordPatch, RecordStore, RegionExtractor, RuleSetStore,
    StructuredRecord,
};

use super::load_config;

/// Arguments for the apply command.
#[derive(Args)]
pub struct ApplyArgs {
    /// Template whose rule set is applied
    #[arg(required = true)]
    template: String,

    /// Input PDFs as a glob pattern
    #[arg(required = true)]
    input: String,

    /// Record directory (default: storage.records_dir from the config)
    #[arg(long)]
    records: Option<PathBuf>,

    /// Rule set directory (default: storage.rules_dir from the config)
    #[arg(long)]
    rules_dir: Option<PathBuf>,

    /// Write a run summary (.json for the full summary, otherwise CSV of failures)
    #[arg(long)]
    summary: Option<PathBuf>,

    /// Per-document load timeout in seconds (0 disables)
    #[arg(long)]
    timeout: Option<u64>,
}

/// Loads PDFs from the local file system.
pub struct FsDocumentLoader;

impl DocumentLoader for FsDocumentLoader {
    type Document = PdfDocument;

    async fn load(&self, document: &DocumentRef) -> Result<PdfDocument, LoadError> {
        let data = tokio::fs::read(&document.location)
            .await
            .map_err(|e| LoadError::Read {
                reference: document.id.clone(),
                reason: e.to_string(),
            })?;

        PdfDocument::load(&data).map_err(|source| LoadError::Open {
            reference: document.id.clone(),
            source,
        })
    }
}

/// Records kept as one JSON object per document: `<dir>/<id>.json`.
pub struct JsonRecordStore {
    dir: PathBuf,
}

impl JsonRecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, document: &DocumentRef) -> PathBuf {
        self.dir.join(format!("{}.json", document.id))
    }

    async fn read(&self, document: &DocumentRef) -> Result<Option<StructuredRecord>, MergeError> {
        let path = self.path_for(document);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| MergeError::new(document.id.clone(), e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MergeError::new(document.id.clone(), e)),
        }
    }
}

impl RecordStore for JsonRecordStore {
    async fn fetch(&self, document: &DocumentRef) -> Result<Option<StructuredRecord>, MergeError> {
        self.read(document).await
    }

    async fn merge(&self, document: &DocumentRef, patch: RecordPatch) -> Result<bool, MergeError> {
        let mut record = self.read(document).await?.unwrap_or_default();
        let before = record.clone();
        patch.apply(&mut record);
        if record == before {
            return Ok(false);
        }

        let content = serde_json::to_string_pretty(&record)
            .map_err(|e| MergeError::new(document.id.clone(), e))?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| MergeError::new(document.id.clone(), e))?;
        tokio::fs::write(self.path_for(document), content)
            .await
            .map_err(|e| MergeError::new(document.id.clone(), e))?;

        debug!("Wrote record {}", document.id);
        Ok(true)
    }
}

pub async fn run(args: ApplyArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let rules_dir = args.rules_dir.clone().unwrap_or_else(|| config.storage.rules_dir.clone());
    let rule_set = JsonRuleStore::new(rules_dir).load(&args.template)?;

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    let documents = document_refs(&files)?;

    println!(
        "{} Applying {} rules of {} to {} files",
        style("ℹ").blue(),
        rule_set.rules.len(),
        rule_set.template_id,
        documents.len()
    );

    // Ctrl-C stops the run at the next document boundary
    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.store(true, Ordering::SeqCst);
            }
        });
    }

    let mut options = BatchOptions::from(&config.batch).with_stop_flag(interrupted);
    if let Some(seconds) = args.timeout {
        options.load_timeout = (seconds > 0).then(|| Duration::from_secs(seconds));
    }

    let extractor = RegionExtractor::new(&config)?;
    let applier = BatchApplier::new(extractor, options);
    let records = JsonRecordStore::new(args.records.clone().unwrap_or(config.storage.records_dir));

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("=>-"),
    );

    let summary = applier
        .run(&rule_set, &documents, &FsDocumentLoader, &records, |progress| {
            pb.set_position(progress.processed as u64);
            pb.set_message(progress.current.clone());
            ControlFlow::Continue(())
        })
        .await?;

    pb.finish_and_clear();

    if let Some(path) = &args.summary {
        write_summary(path, &summary)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            path.display()
        );
    }

    print_summary(&summary, start.elapsed());

    Ok(())
}

fn document_ref(path: &Path) -> DocumentRef {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document")
        .to_string();
    DocumentRef::new(id, path.to_string_lossy())
}

/// Records are keyed by file stem, so two inputs with the same stem would
/// write to the same record.
fn document_refs(files: &[PathBuf]) -> anyhow::Result<Vec<DocumentRef>> {
    let mut seen: HashMap<String, &Path> = HashMap::new();
    let mut documents = Vec::with_capacity(files.len());

    for path in files {
        let document = document_ref(path);
        if let Some(first) = seen.insert(document.id.clone(), path.as_path()) {
            anyhow::bail!(
                "{} and {} would both write record {}.json; rename one or narrow the pattern",
                first.display(),
                path.display(),
                document.id
            );
        }
        documents.push(document);
    }

    Ok(documents)
}

fn write_summary(path: &Path, summary: &BatchSummary) -> anyhow::Result<()> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
        return Ok(());
    }

    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["document", "stage", "error"])?;
    for failure in &summary.failures {
        wtr.write_record([
            failure.document.as_str(),
            &failure.stage.to_string(),
            failure.message.as_str(),
        ])?;
    }
    for error in &summary.rule_errors {
        wtr.write_record(["", "rule", &error.to_string()])?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_summary(summary: &BatchSummary, elapsed: Duration) {
    println!();
    if summary.cancelled {
        warn!("Run cancelled");
        println!(
            "{} Cancelled after {} of {} files",
            style("⚠").yellow(),
            summary.processed,
            summary.total
        );
    }
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        summary.processed,
        elapsed
    );
    println!(
        "   {} updated, {} unchanged, {} failed",
        style(summary.updated).green(),
        summary.succeeded() - summary.updated,
        style(summary.errors).red()
    );
    if summary.skipped_fields > 0 {
        println!("   {} field extractions skipped", style(summary.skipped_fields).yellow());
    }

    if !summary.rule_errors.is_empty() {
        println!();
        println!("{}", style("Skipped rules:").yellow());
        for error in &summary.rule_errors {
            println!("  - {}", error);
        }
    }

    if !summary.failures.is_empty() {
        println!();
        println!("{}", style("Failed files:").red());
        for failure in &summary.failures {
            println!("  - {} ({}): {}", failure.document, failure.stage, failure.message);
        }
    }
}
