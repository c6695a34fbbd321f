use std::io::{self, Write};

use crossterm::style::Stylize;
use serde::Serialize;
use tracing::info;

use crate::aggregate::RunSummary;
use crate::app::{ProgressEvent, ProgressSink};
use crate::catalog::{Catalog, DatasetRecord, SkippedRow};
use crate::domain::CatalogFormat;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

/// What the `catalog` command reports about a parsed catalog.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogSummary {
    pub path: String,
    pub format: CatalogFormat,
    pub datasets: usize,
    pub total_cells: u64,
    pub skipped: Vec<SkippedRow>,
    pub records: Vec<DatasetRecord>,
}

impl CatalogSummary {
    pub fn new(path: impl Into<String>, format: CatalogFormat, catalog: &Catalog) -> Self {
        Self {
            path: path.into(),
            format,
            datasets: catalog.len(),
            total_cells: catalog.records().iter().map(|record| record.cell_count).sum(),
            skipped: catalog.skipped().to_vec(),
            records: catalog.records().to_vec(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_catalog(summary: &CatalogSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress to the tracing subscriber.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_catalog(summary: &CatalogSummary) {
        println!("{}", "kira-obs catalog".cyan().bold());
        println!("  source: {} ({})", summary.path, summary.format);
        println!(
            "  {}",
            format!("datasets: {}", summary.datasets).green()
        );
        println!("  cells: {}", summary.total_cells);
        Self::print_catalog_skips(&summary.skipped);
    }

    pub fn print_run(summary: &RunSummary) {
        println!("{}", format!("kira-obs {}", summary.transform).cyan().bold());
        println!(
            "  {}",
            format!(
                "processed {} of {} attempted",
                summary.processed.len(),
                summary.attempted
            )
            .green()
        );
        if !summary.skipped.is_empty() {
            println!(
                "  {}",
                format!("skipped datasets: {}", summary.skipped.len()).yellow()
            );
            for skipped in &summary.skipped {
                println!(
                    "    {} [{:?}] {}",
                    skipped.key,
                    skipped.stage,
                    skipped.reason.as_str().dark_grey()
                );
            }
        }
        Self::print_catalog_skips(&summary.catalog_skipped);
        for output in &summary.outputs {
            println!("  wrote {output}");
        }
    }

    fn print_catalog_skips(skipped: &[SkippedRow]) {
        if skipped.is_empty() {
            return;
        }
        println!(
            "  {}",
            format!("skipped catalog rows: {}", skipped.len()).yellow()
        );
        for row in skipped {
            println!("    {}: {}", row.row, row.reason.as_str().dark_grey());
        }
    }
}
