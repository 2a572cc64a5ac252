//! Export adapters over a finished [`ResultTable`].
//!
//! Exports only read the table. Exporting the same table twice produces
//! byte-identical files.

use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::SweepConfig;
use crate::result::ResultTable;
use crate::workload::WorkloadSize;

pub const CSV_FILE: &str = "benchmark_results.csv";
pub const CHART_FILE: &str = "benchmark_chart.json";

/// Written in place of a mean or spread for a failed cell.
pub const FAILURE_SENTINEL: &str = "nan";

/// One row flattened for tabular output: `(mean, stddev)` in seconds per
/// column, `None` for a failed cell.
#[derive(Debug, Clone, PartialEq)]
pub struct TabularRecord {
    pub size: WorkloadSize,
    pub cells: Vec<Option<(f64, f64)>>,
}

/// Flatten the table, one record per row, cells in column order.
pub fn tabular_records(table: &ResultTable) -> Vec<TabularRecord> {
    table
        .rows()
        .iter()
        .map(|row| TabularRecord {
            size: row.size(),
            cells: table
                .backends()
                .iter()
                .map(|name| {
                    row.get(name)
                        .and_then(|outcome| outcome.summary())
                        .map(|s| (s.mean, s.stddev))
                })
                .collect(),
        })
        .collect()
}

/// Write `qubits,{name}_time,{name}_std,...` followed by one line per row.
pub fn write_csv<W: Write>(table: &ResultTable, mut out: W) -> std::io::Result<()> {
    let mut header = vec!["qubits".to_string()];
    for name in table.backends() {
        header.push(format!("{name}_time"));
        header.push(format!("{name}_std"));
    }
    writeln!(out, "{}", header.join(","))?;

    for record in tabular_records(table) {
        let mut fields = vec![record.size.to_string()];
        for cell in &record.cells {
            match cell {
                Some((mean, stddev)) => {
                    fields.push(mean.to_string());
                    fields.push(stddev.to_string());
                }
                None => {
                    fields.push(FAILURE_SENTINEL.to_string());
                    fields.push(FAILURE_SENTINEL.to_string());
                }
            }
        }
        writeln!(out, "{}", fields.join(","))?;
    }
    out.flush()
}

/// One plotted point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub size: WorkloadSize,
    pub value: f64,
}

/// A named line on a chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub backend: String,
    pub points: Vec<Point>,
}

/// The two standard charts: absolute mean time and speedup over a
/// reference backend. Failed or undefined points are left out, never drawn
/// as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartData {
    pub reference: String,
    /// Mean seconds per backend, for a log-scale time axis.
    pub absolute: Vec<Series>,
    /// `mean(reference) / mean(backend)` per non-reference backend.
    pub speedup: Vec<Series>,
}

impl ChartData {
    pub fn from_table(table: &ResultTable, reference: &str) -> Self {
        let absolute = table
            .backends()
            .iter()
            .map(|name| Series {
                backend: name.clone(),
                points: table
                    .rows()
                    .iter()
                    .filter_map(|row| {
                        let stats = row.get(name)?.summary()?;
                        Some(Point {
                            size: row.size(),
                            value: stats.mean,
                        })
                    })
                    .collect(),
            })
            .collect();

        let has_reference = table.backends().iter().any(|b| b == reference);
        let speedup = table
            .backends()
            .iter()
            .filter(|name| has_reference && name.as_str() != reference)
            .map(|name| Series {
                backend: name.clone(),
                points: table
                    .sizes()
                    .filter_map(|size| {
                        table.speedup(size, reference, name).map(|value| Point { size, value })
                    })
                    .collect(),
            })
            .collect();

        Self {
            reference: reference.to_string(),
            absolute,
            speedup,
        }
    }
}

pub fn write_chart_data(table: &ResultTable, reference: &str, path: &Path) -> Result<()> {
    let chart = ChartData::from_table(table, reference);
    let json = serde_json::to_string_pretty(&chart).context("serializing chart data")?;
    std::fs::write(path, json)
        .with_context(|| format!("writing chart data to {}", path.display()))?;
    Ok(())
}

/// Write the exports enabled in `config` into its output directory.
///
/// Returns the paths written, in a fixed order (CSV, then chart data).
pub fn export_all(table: &ResultTable, config: &SweepConfig) -> Result<Vec<PathBuf>> {
    let dir = &config.output_dir;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;

    let mut written = Vec::new();

    if config.save_csv {
        let path = dir.join(CSV_FILE);
        let file = std::fs::File::create(&path)
            .with_context(|| format!("creating {}", path.display()))?;
        write_csv(table, std::io::BufWriter::new(file))
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "csv written");
        written.push(path);
    }

    if config.plots {
        let path = dir.join(CHART_FILE);
        write_chart_data(table, &config.reference_backend, &path)?;
        info!(path = %path.display(), "chart data written");
        written.push(path);
    }

    Ok(written)
}
