//! Read-only inventory of a tree: counts and sizes by extension and month,
//! plus the largest files, rendered as text, JSON or CSV.

use crate::actions::extension_bucket;
use crate::config::PathFilter;
use crate::output::OutputFormatter;
use crate::walker::TreeWalker;
use chrono::{DateTime, Local};
use clap::ValueEnum;
use log::warn;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
    Csv,
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to format report: {0}")]
    Format(#[from] fmt::Error),
    #[error("Failed to write CSV report: {0}")]
    Csv(String),
    #[error("Failed to write report to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionSummary {
    pub ext: String,
    pub count: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthSummary {
    pub month: String,
    pub count: u64,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LargestFile {
    pub path: String,
    pub size_bytes: u64,
}

/// Summary of every eligible file under a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Inventory {
    pub root: String,
    pub total_files: u64,
    pub total_size_bytes: u64,
    /// Sorted by extension.
    pub by_extension: Vec<ExtensionSummary>,
    /// Sorted by `YYYY-MM`.
    pub by_month: Vec<MonthSummary>,
    /// Largest first; equal sizes by path.
    pub top_largest: Vec<LargestFile>,
}

/// Walks `root` and tallies every eligible file. Unstat-able files are skipped.
pub fn build_inventory(root: &Path, filter: &PathFilter, top_n: usize) -> Inventory {
    let mut total_files = 0;
    let mut total_size = 0;
    let mut by_extension: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    let mut by_month: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    let mut largest: Vec<(u64, PathBuf)> = Vec::new();

    for entry in TreeWalker::new(root, filter) {
        let (size, modified) = match entry.size().and_then(|s| Ok((s, entry.modified()?))) {
            Ok(pair) => pair,
            Err(e) => {
                warn!("Skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };

        total_files += 1;
        total_size += size;

        let ext = by_extension.entry(extension_bucket(entry.path())).or_default();
        ext.0 += 1;
        ext.1 += size;

        let local: DateTime<Local> = modified.into();
        let month = by_month.entry(local.format("%Y-%m").to_string()).or_default();
        month.0 += 1;
        month.1 += size;

        largest.push((size, entry.into_path()));
    }

    largest.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    largest.truncate(top_n);

    Inventory {
        root: root.display().to_string(),
        total_files,
        total_size_bytes: total_size,
        by_extension: by_extension
            .into_iter()
            .map(|(ext, (count, size_bytes))| ExtensionSummary {
                ext,
                count,
                size_bytes,
            })
            .collect(),
        by_month: by_month
            .into_iter()
            .map(|(month, (count, size_bytes))| MonthSummary {
                month,
                count,
                size_bytes,
            })
            .collect(),
        top_largest: largest
            .into_iter()
            .map(|(size_bytes, path)| LargestFile {
                path: path.display().to_string(),
                size_bytes,
            })
            .collect(),
    }
}

/// `1536` becomes `1.50 KB`.
pub fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// Renders the inventory in `format`.
pub fn render_report(inventory: &Inventory, format: ReportFormat) -> Result<String, ReportError> {
    match format {
        ReportFormat::Json => Ok(serde_json::to_string_pretty(inventory)?),
        ReportFormat::Csv => render_csv(inventory),
        ReportFormat::Text => Ok(render_text(inventory)?),
    }
}

fn render_csv(inventory: &Inventory) -> Result<String, ReportError> {
    let csv_err = |e: csv::Error| ReportError::Csv(e.to_string());
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(["section", "key", "count", "size_bytes"])
        .map_err(csv_err)?;
    writer
        .write_record([
            "totals".to_string(),
            "total_files".to_string(),
            inventory.total_files.to_string(),
            inventory.total_size_bytes.to_string(),
        ])
        .map_err(csv_err)?;
    for item in &inventory.by_extension {
        writer
            .write_record([
                "by_extension".to_string(),
                item.ext.clone(),
                item.count.to_string(),
                item.size_bytes.to_string(),
            ])
            .map_err(csv_err)?;
    }
    for item in &inventory.by_month {
        writer
            .write_record([
                "by_month".to_string(),
                item.month.clone(),
                item.count.to_string(),
                item.size_bytes.to_string(),
            ])
            .map_err(csv_err)?;
    }
    for item in &inventory.top_largest {
        writer
            .write_record([
                "top_largest".to_string(),
                item.path.clone(),
                String::new(),
                item.size_bytes.to_string(),
            ])
            .map_err(csv_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Csv(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ReportError::Csv(e.to_string()))
}

fn render_text(inventory: &Inventory) -> Result<String, fmt::Error> {
    let mut out = String::new();
    writeln!(out, "Inventory Report")?;
    writeln!(out, "Root: {}", inventory.root)?;
    writeln!(out, "Total files: {}", inventory.total_files)?;
    writeln!(out, "Total size: {}", human_size(inventory.total_size_bytes))?;

    writeln!(out, "\nBy extension (top 20 by size):")?;
    let mut by_ext: Vec<_> = inventory.by_extension.iter().collect();
    by_ext.sort_by(|a, b| b.size_bytes.cmp(&a.size_bytes));
    for item in by_ext.into_iter().take(20) {
        writeln!(
            out,
            "  .{:<8} {:>6} files  {:>10}",
            item.ext,
            item.count,
            human_size(item.size_bytes)
        )?;
    }

    writeln!(out, "\nBy month (last 12 by date):")?;
    for item in inventory.by_month.iter().rev().take(12) {
        writeln!(
            out,
            "  {}: {:>6} files  {:>10}",
            item.month,
            item.count,
            human_size(item.size_bytes)
        )?;
    }

    writeln!(out, "\nTop largest files:")?;
    for item in &inventory.top_largest {
        writeln!(out, "  {:>10}  {}", human_size(item.size_bytes), item.path)?;
    }
    Ok(out)
}

/// Renders the inventory and prints it, or writes it to `output`.
pub fn emit_report(
    inventory: &Inventory,
    format: ReportFormat,
    output: Option<&Path>,
) -> Result<(), ReportError> {
    let rendered = render_report(inventory, format)?;
    let Some(path) = output else {
        print!("{}", rendered);
        if format == ReportFormat::Json {
            println!();
        }
        return Ok(());
    };

    let io_err = |source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, rendered).map_err(io_err)?;

    let label = match format {
        ReportFormat::Text => "text",
        ReportFormat::Json => "JSON",
        ReportFormat::Csv => "CSV",
    };
    OutputFormatter::success(&format!("Wrote {} report to {}", label, path.display()));
    Ok(())
}
