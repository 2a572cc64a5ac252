//! Trial outcomes and the result table every export reads from.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::error;

use crate::error::TableError;
use crate::workload::WorkloadSize;

/// Outcome of one backend at one size.
///
/// A `Success` always holds exactly the requested number of timed samples;
/// a run that faults part-way is a `Failure`, never a short `Success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TrialOutcome {
    Success {
        /// Timed samples in execution order.
        #[serde(with = "duration_vec_serde")]
        durations: Vec<Duration>,
    },
    Failure {
        message: String,
    },
}

impl TrialOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        TrialOutcome::Failure {
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TrialOutcome::Success { .. })
    }

    pub fn durations(&self) -> Option<&[Duration]> {
        match self {
            TrialOutcome::Success { durations } => Some(durations),
            TrialOutcome::Failure { .. } => None,
        }
    }

    pub fn failure_message(&self) -> Option<&str> {
        match self {
            TrialOutcome::Success { .. } => None,
            TrialOutcome::Failure { message } => Some(message),
        }
    }

    /// Statistics over the samples; `None` for failures.
    pub fn summary(&self) -> Option<SummaryStatistic> {
        self.durations().and_then(SummaryStatistic::from_durations)
    }
}

/// Mean and spread of a sample set, in seconds. Derived on read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SummaryStatistic {
    pub mean: f64,
    /// Population standard deviation (zero for a single sample).
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
}

impl SummaryStatistic {
    pub fn from_durations(samples: &[Duration]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let secs: Vec<f64> = samples.iter().map(Duration::as_secs_f64).collect();
        let n = secs.len() as f64;
        let mean = secs.iter().sum::<f64>() / n;
        let variance = secs.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        let min = secs.iter().copied().fold(f64::INFINITY, f64::min);
        let max = secs.iter().copied().fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            mean,
            stddev: variance.sqrt(),
            min,
            max,
            count: secs.len(),
        })
    }
}

/// One backend's outcome within a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultCell {
    pub backend: String,
    #[serde(flatten)]
    pub outcome: TrialOutcome,
}

/// All cells for one size, in backend registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRow {
    size: WorkloadSize,
    cells: Vec<ResultCell>,
}

impl ResultRow {
    pub fn size(&self) -> WorkloadSize {
        self.size
    }

    pub fn cells(&self) -> &[ResultCell] {
        &self.cells
    }

    pub fn get(&self, backend: &str) -> Option<&TrialOutcome> {
        self.cells
            .iter()
            .find(|c| c.backend == backend)
            .map(|c| &c.outcome)
    }
}

/// A row being filled during a sweep. Invisible to readers until committed.
#[derive(Debug)]
pub struct RowBuilder {
    size: WorkloadSize,
    cells: Vec<ResultCell>,
}

impl RowBuilder {
    pub fn size(&self) -> WorkloadSize {
        self.size
    }

    pub fn record(&mut self, backend: impl Into<String>, outcome: TrialOutcome) {
        self.cells.push(ResultCell {
            backend: backend.into(),
            outcome,
        });
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// A backend that never made it into the table, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedBackend {
    pub name: String,
    pub reason: String,
}

/// `size -> {backend -> outcome}`, rows in sweep order, columns in
/// registration order.
///
/// Only complete rows are ever appended, and appended rows are never
/// modified. Backends excluded at registry time are listed separately and
/// never appear as cell keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    backends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    excluded: Vec<ExcludedBackend>,
    repeats: usize,
    started_at: String,
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(backends: Vec<String>, excluded: Vec<ExcludedBackend>, repeats: usize) -> Self {
        Self {
            backends,
            excluded,
            repeats,
            started_at: timestamp_millis(),
            rows: Vec::new(),
        }
    }

    /// Load a table previously written as JSON.
    pub fn load(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Active backend names: the column order.
    pub fn backends(&self) -> &[String] {
        &self.backends
    }

    pub fn excluded(&self) -> &[ExcludedBackend] {
        &self.excluded
    }

    pub fn repeats(&self) -> usize {
        self.repeats
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn sizes(&self) -> impl Iterator<Item = WorkloadSize> + '_ {
        self.rows.iter().map(|r| r.size)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, size: WorkloadSize) -> Option<&ResultRow> {
        self.rows.iter().find(|r| r.size == size)
    }

    pub fn cell(&self, size: WorkloadSize, backend: &str) -> Option<&TrialOutcome> {
        self.row(size).and_then(|r| r.get(backend))
    }

    pub fn summary(&self, size: WorkloadSize, backend: &str) -> Option<SummaryStatistic> {
        self.cell(size, backend).and_then(TrialOutcome::summary)
    }

    /// `mean(reference) / mean(backend)` at `size`.
    ///
    /// `None` when either cell is missing or failed, or the ratio is not a
    /// finite number.
    pub fn speedup(&self, size: WorkloadSize, reference: &str, backend: &str) -> Option<f64> {
        let reference = self.summary(size, reference)?;
        let other = self.summary(size, backend)?;
        if other.mean <= 0.0 {
            return None;
        }
        let ratio = reference.mean / other.mean;
        ratio.is_finite().then_some(ratio)
    }

    /// Start a row for the next size.
    pub fn begin_row(&self, size: WorkloadSize) -> RowBuilder {
        RowBuilder {
            size,
            cells: Vec::with_capacity(self.backends.len()),
        }
    }

    /// Append a finished row.
    ///
    /// The row must hold exactly one cell per column, in column order, and
    /// its size must follow the last committed size.
    pub fn commit(&mut self, row: RowBuilder) -> Result<(), TableError> {
        if let Some(last) = self.rows.last() {
            if row.size <= last.size {
                return Err(TableError::SizeOutOfOrder {
                    last: last.size,
                    next: row.size,
                });
            }
        }
        if row.cells.len() != self.backends.len() {
            return Err(TableError::IncompleteRow {
                size: row.size,
                expected: self.backends.len(),
                found: row.cells.len(),
            });
        }
        for (cell, column) in row.cells.iter().zip(&self.backends) {
            if &cell.backend != column {
                return Err(TableError::ColumnMismatch {
                    size: row.size,
                    expected: column.clone(),
                    found: cell.backend.clone(),
                });
            }
        }
        if let Some(bad) = row.cells.iter().find(|c| match &c.outcome {
            TrialOutcome::Success { durations } => durations.len() != self.repeats,
            TrialOutcome::Failure { .. } => false,
        }) {
            error!(backend = %bad.backend, size = %row.size, "refusing short sample set");
            return Err(TableError::SampleCount {
                size: row.size,
                backend: bad.backend.clone(),
                expected: self.repeats,
            });
        }

        self.rows.push(ResultRow {
            size: row.size,
            cells: row.cells,
        });
        Ok(())
    }
}

/// Unix milliseconds, used as a compact unique timestamp.
fn timestamp_millis() -> String {
    let now = std::time::SystemTime::now();
    let since_epoch = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}", since_epoch.as_millis())
}

mod duration_vec_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(v: &[Duration], s: S) -> Result<S::Ok, S::Error> {
        v.iter()
            .map(|d| d.as_nanos() as u64)
            .collect::<Vec<_>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Duration>, D::Error> {
        let nanos: Vec<u64> = Vec::deserialize(d)?;
        Ok(nanos.into_iter().map(Duration::from_nanos).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success(millis: &[u64]) -> TrialOutcome {
        TrialOutcome::Success {
            durations: millis.iter().map(|&m| Duration::from_millis(m)).collect(),
        }
    }

    fn table() -> ResultTable {
        ResultTable::new(vec!["cpu".into(), "gpu".into()], Vec::new(), 2)
    }

    #[test]
    fn should_compute_population_stddev() {
        let stats = success(&[10, 30]).summary().unwrap();
        assert!((stats.mean - 0.020).abs() < 1e-12);
        assert!((stats.stddev - 0.010).abs() < 1e-12);
        assert!((stats.min - 0.010).abs() < 1e-12);
        assert!((stats.max - 0.030).abs() < 1e-12);
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn should_have_no_statistic_for_failure() {
        assert!(TrialOutcome::failure("boom").summary().is_none());
    }

    #[test]
    fn should_commit_complete_row() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", success(&[10, 12]));
        row.record("gpu", TrialOutcome::failure("oom"));
        table.commit(row).unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.cell(WorkloadSize(2), "cpu").unwrap().is_success());
        assert_eq!(
            table.cell(WorkloadSize(2), "gpu").unwrap().failure_message(),
            Some("oom")
        );
    }

    #[test]
    fn should_reject_incomplete_row() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", success(&[10, 12]));

        assert!(matches!(
            table.commit(row),
            Err(TableError::IncompleteRow { expected: 2, found: 1, .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    fn should_reject_short_success() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", success(&[10]));
        row.record("gpu", success(&[10, 11]));

        assert!(matches!(
            table.commit(row),
            Err(TableError::SampleCount { .. })
        ));
    }

    #[test]
    fn should_reject_rows_out_of_size_order() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(4));
        row.record("cpu", success(&[1, 1]));
        row.record("gpu", success(&[1, 1]));
        table.commit(row).unwrap();

        let mut row = table.begin_row(WorkloadSize(4));
        row.record("cpu", success(&[1, 1]));
        row.record("gpu", success(&[1, 1]));
        assert!(matches!(
            table.commit(row),
            Err(TableError::SizeOutOfOrder { .. })
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn should_derive_speedup_against_reference() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", success(&[40, 40]));
        row.record("gpu", success(&[10, 10]));
        table.commit(row).unwrap();

        let speedup = table.speedup(WorkloadSize(2), "cpu", "gpu").unwrap();
        assert!((speedup - 4.0).abs() < 1e-9);
    }

    #[test]
    fn should_leave_speedup_undefined_when_either_side_failed() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", TrialOutcome::failure("crash"));
        row.record("gpu", success(&[10, 10]));
        table.commit(row).unwrap();

        let mut row = table.begin_row(WorkloadSize(4));
        row.record("cpu", success(&[10, 10]));
        row.record("gpu", TrialOutcome::failure("crash"));
        table.commit(row).unwrap();

        assert_eq!(table.speedup(WorkloadSize(2), "cpu", "gpu"), None);
        assert_eq!(table.speedup(WorkloadSize(4), "cpu", "gpu"), None);
        assert_eq!(table.speedup(WorkloadSize(6), "cpu", "gpu"), None);
        assert_eq!(table.speedup(WorkloadSize(4), "tpu", "cpu"), None);
    }

    #[test]
    fn should_leave_speedup_undefined_when_backend_took_no_time() {
        let mut table = table();
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", success(&[10, 10]));
        row.record("gpu", success(&[0, 0]));
        table.commit(row).unwrap();

        assert_eq!(table.speedup(WorkloadSize(2), "cpu", "gpu"), None);
    }

    #[test]
    fn should_round_trip_through_json() {
        let mut table = ResultTable::new(
            vec!["cpu".into()],
            vec![ExcludedBackend {
                name: "gpu".into(),
                reason: "no device".into(),
            }],
            1,
        );
        let mut row = table.begin_row(WorkloadSize(2));
        row.record("cpu", success(&[7]));
        table.commit(row).unwrap();

        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains("\"status\":\"success\""));
        let back: ResultTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
