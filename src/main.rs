// Command-line entry point: queue JPGs, convert them, write the PNGs

use pngsync::{
    core::{Config, EnvFile, ItemId, Progress, SourceFile, StatusKind},
    utils::{download_all, format_size, is_jpeg, png_file_name},
    BatchOrchestrator, Converter, GeminiInsightClient, ImageQueue, InsightProvider, Metrics,
    OfflineInsight, SharedQueue,
};

use anyhow::{Context, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "pngsync",
    version,
    about = "Fast, lossless conversion of JPGs to PNG with AI-powered quality insights"
)]
struct Cli {
    /// JPG files, or directories to scan (one level deep)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Directory the PNGs are written to (overrides OUTPUT_DIR)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// Skip the Gemini insight request for every image
    #[arg(long)]
    no_insights: bool,

    /// Gemini model used for insights (overrides INSIGHT_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Write a JSON batch report to this path
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::new().context("Failed to load configuration")?;
    if let Some(model) = &cli.model {
        config.insight.model = model.clone();
    }
    if let Some(out_dir) = &cli.out_dir {
        config.output.output_dir = out_dir.clone();
    }
    if cli.no_insights {
        config.insight.enabled = false;
    }
    config.validate().context("Invalid configuration")?;

    // Initialize logging
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::new(format!(
        "pngsync={},reqwest=warn",
        match config.log_level() {
            tracing::Level::TRACE => "trace",
            tracing::Level::DEBUG => "debug",
            tracing::Level::INFO => "info",
            tracing::Level::WARN => "warn",
            tracing::Level::ERROR => "error",
        }
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match &config.env_file {
        EnvFile::Loaded(path) => debug!("Loaded environment from {}", path.display()),
        EnvFile::Invalid(e) => warn!("Ignoring .env file: {}", e),
        EnvFile::Absent => {}
    }

    let files = collect_inputs(&cli.inputs).await?;
    if files.is_empty() {
        warn!("No JPG files found in the given inputs");
        return Ok(ExitCode::FAILURE);
    }

    let mut queue = ImageQueue::new();
    queue.ingest(files);
    print_queue(&queue);
    let queue = queue.into_shared();

    let metrics = Metrics::new();

    let use_gemini = config.insights_enabled() && config.api_key().is_some();
    if config.insights_enabled() && !use_gemini {
        warn!("GEMINI_API_KEY is not set, insights will use the default sentence");
    }

    if use_gemini {
        info!("Insights: {}", config.insight.model);
        let client = GeminiInsightClient::new(config.insight.clone(), Some(metrics.clone()))?;
        run(client, queue, &config, &cli, &metrics).await
    } else {
        run(OfflineInsight, queue, &config, &cli, &metrics).await
    }
}

/// Convert the queue, write the PNGs and print one card per item
async fn run<P: InsightProvider>(
    provider: P,
    queue: SharedQueue,
    config: &Config,
    cli: &Cli,
    metrics: &Metrics,
) -> Result<ExitCode> {
    let orchestrator = BatchOrchestrator::new(
        Arc::clone(&queue),
        Converter::new(provider, Some(metrics.clone())),
        Some(metrics.clone()),
    );

    // Progress overlay
    let mut progress = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        let mut tracker = ProgressLines::default();
        while progress.changed().await.is_ok() {
            let current = progress.borrow_and_update().clone();
            for line in tracker.lines(&current) {
                println!("{}", line);
            }
        }
    });

    let report = orchestrator.process_all().await?;
    drop(orchestrator);
    join_printer(printer).await;

    // The run is over; take the items out so no lock is held while writing
    let finished = std::mem::take(&mut *queue.write());

    // Download all
    let out_dir = &config.output.output_dir;
    let written: HashMap<ItemId, PathBuf> = if finished.has_completed() {
        download_all(out_dir, &finished).await?.into_iter().collect()
    } else {
        HashMap::new()
    };
    print_cards(&finished, &written);

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    debug!("Metrics: {:?}", metrics.snapshot());

    println!(
        "\n{} converted, {} failed in {:.2}s",
        report.completed,
        report.failed,
        report.processing_time_ms / 1000.0
    );

    Ok(if report.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Turns progress snapshots into console lines.
///
/// The watch channel only keeps the latest value, so an item's `Processing`
/// event can be replaced by its result before it is read. Every item index
/// seen for the first time gets its "Converting" line, whatever the status.
#[derive(Debug, Default)]
struct ProgressLines {
    announced: usize,
    finished: usize,
}

impl ProgressLines {
    fn lines(&mut self, progress: &Progress) -> Vec<String> {
        let mut lines = Vec::new();
        if progress.current == 0 {
            return lines;
        }

        if progress.current > self.announced {
            self.announced = progress.current;
            lines.push(format!(
                "Converting image {} of {} ({}%)",
                progress.current,
                progress.total,
                progress.percentage()
            ));
        }

        if let Some(status @ (StatusKind::Completed | StatusKind::Error)) = progress.last_status {
            if progress.current > self.finished {
                self.finished = progress.current;
                lines.push(format!("  image {} {}", progress.current, status));
            }
        }

        lines
    }
}

/// Wait for the progress printer; a panic there is logged, not propagated
async fn join_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Progress printer stopped abnormally: {}", e);
            false
        }
    }
}

/// Read every JPG named on the command line; directories are scanned one level deep
async fn collect_inputs(inputs: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut paths = Vec::new();

    for input in inputs {
        let metadata = tokio::fs::metadata(input)
            .await
            .with_context(|| format!("Cannot access {}", input.display()))?;

        if metadata.is_dir() {
            let mut entries = tokio::fs::read_dir(input)
                .await
                .with_context(|| format!("Cannot read directory {}", input.display()))?;
            let mut found = Vec::new();
            while let Some(entry) = entries.next_entry().await? {
                if entry.file_type().await?.is_file() {
                    found.push(entry.path());
                }
            }
            found.sort();
            paths.extend(found);
        } else {
            paths.push(input.clone());
        }
    }

    let mut files = Vec::new();
    for path in paths {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = display_name(&path);

        if !is_jpeg(&name, &bytes) {
            warn!("Skipping {}: not a JPG", path.display());
            continue;
        }
        files.push(SourceFile::new(name, bytes));
    }

    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn print_queue(queue: &ImageQueue) {
    println!("Queue ({})", queue.len());
    for item in queue.iter() {
        println!(
            "  {}  JPG {}",
            item.name(),
            format_size(item.original_size())
        );
    }
    println!();
}

fn print_cards(queue: &ImageQueue, written: &HashMap<ItemId, PathBuf>) {
    for item in queue.iter() {
        match item.status().kind() {
            StatusKind::Completed => {
                println!(
                    "✓ {}  JPG {} → PNG {}  {}",
                    item.name(),
                    format_size(item.original_size()),
                    format_size(item.converted_size().unwrap_or(0)),
                    written
                        .get(item.id())
                        .map(|path| path.display().to_string())
                        .unwrap_or_else(|| png_file_name(item.name()))
                );
                if let Some(insight) = item.insight() {
                    println!("  Gemini: {}", insight);
                }
            }
            StatusKind::Error => {
                println!(
                    "✗ {}  JPG {}  {}",
                    item.name(),
                    format_size(item.original_size()),
                    item.error_message().unwrap_or("conversion failed")
                );
            }
            other => println!("· {}  {}", item.name(), other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(current: usize, status: StatusKind) -> Progress {
        Progress {
            running: true,
            current,
            total: 3,
            current_id: None,
            last_status: Some(status),
        }
    }

    #[test]
    fn every_item_is_announced_once() {
        let mut tracker = ProgressLines::default();

        assert_eq!(
            tracker.lines(&progress(1, StatusKind::Processing)),
            vec!["Converting image 1 of 3 (33%)"]
        );
        assert_eq!(
            tracker.lines(&progress(1, StatusKind::Completed)),
            vec!["  image 1 completed"]
        );

        // Item 2's Processing event was overwritten before it was read
        assert_eq!(
            tracker.lines(&progress(2, StatusKind::Error)),
            vec!["Converting image 2 of 3 (67%)", "  image 2 error"]
        );

        // The closing snapshot repeats the last item and adds nothing
        let mut closing = progress(2, StatusKind::Error);
        closing.running = false;
        assert!(tracker.lines(&closing).is_empty());
    }

    #[test]
    fn initial_snapshot_prints_nothing() {
        let mut tracker = ProgressLines::default();
        let start = Progress {
            running: true,
            total: 3,
            ..Default::default()
        };
        assert!(tracker.lines(&start).is_empty());
    }

    #[tokio::test]
    async fn printer_panic_is_reported() {
        assert!(join_printer(tokio::spawn(async {})).await);

        let failing = tokio::spawn(async { panic!("stdout closed") });
        assert!(!join_printer(failing).await);
    }
}
