//! CSV and JSON export of finished runs.

use crate::domain::optimization::test_run::{IterationRecord, TestRun};
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const PARAM_PREFIX: &str = "__";
const INVALID_FILE_CHARS: [char; 4] = [':', '/', '\\', '%'];

/// `<ticker>:<tf> <strategy> - <cycles>_<max|min>_<metric>_<method>.csv`
/// with characters that are invalid in file names replaced by `_`.
pub fn results_file_name(run: &TestRun, ticker: &str) -> String {
    let name = format!(
        "{}:{} {} - {}_{}_{}_{}.csv",
        ticker,
        run.timeframe.as_deref().unwrap_or(""),
        run.strategy_name,
        run.cycles,
        if run.is_maximizing { "max" } else { "min" },
        run.target_metric,
        run.method
    );
    name.chars()
        .map(|c| if INVALID_FILE_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

fn exported_records(run: &TestRun) -> impl Iterator<Item = &IterationRecord> {
    run.performance_summary.iter().chain(run.filtered_summary.iter())
}

/// Column order: metrics in first-seen order, the comment, then `__<param>`.
fn columns(run: &TestRun) -> (Vec<String>, Vec<String>) {
    let mut metrics: Vec<String> = Vec::new();
    let mut params: Vec<String> = Vec::new();
    for record in exported_records(run) {
        for name in record.report.metrics.keys() {
            if !metrics.contains(name) {
                metrics.push(name.clone());
            }
        }
        for (name, _) in record.assignment.iter() {
            if !params.iter().any(|p| p == name) {
                params.push(name.to_string());
            }
        }
    }
    (metrics, params)
}

/// Writes accepted then filtered iterations, in append order.
pub fn write_csv<W: Write>(run: &TestRun, writer: W) -> Result<()> {
    let (metrics, params) = columns(run);
    let mut wtr = csv::WriterBuilder::new().from_writer(writer);

    let mut header: Vec<String> = metrics.clone();
    header.push("comment".to_string());
    header.extend(params.iter().map(|p| format!("{}{}", PARAM_PREFIX, p)));
    wtr.write_record(&header).context("Failed to write CSV header")?;

    for record in exported_records(run) {
        let mut row: Vec<String> = metrics
            .iter()
            .map(|m| record.report.get(m).map(ToString::to_string).unwrap_or_default())
            .collect();
        row.push(record.report.comment.clone().unwrap_or_default());
        row.extend(
            params
                .iter()
                .map(|p| record.assignment.get(p).map(ToString::to_string).unwrap_or_default()),
        );
        wtr.write_record(&row).context("Failed to write CSV row")?;
    }
    wtr.flush().context("Failed to flush CSV writer")?;
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    Ok(())
}

/// Writes the CSV into `dir` under [`results_file_name`].
pub fn export_csv(run: &TestRun, dir: &Path, ticker: &str) -> Result<PathBuf> {
    let path = dir.join(results_file_name(run, ticker));
    ensure_parent(&path)?;
    let file = fs::File::create(&path).with_context(|| format!("Failed to create {:?}", path))?;
    write_csv(run, file)?;
    info!("Export: results saved to {:?}", path);
    Ok(path)
}

/// Writes the whole run as JSON through a temporary file and a rename.
pub fn export_json(run: &TestRun, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(run).context("Failed to serialize run to JSON")?;
    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, json).with_context(|| format!("Failed to write {:?}", temp_path))?;
    fs::rename(&temp_path, path).with_context(|| format!("Failed to rename {:?}", temp_path))?;
    info!("Export: run saved to {:?}", path);
    Ok(())
}
