//! Pluggable reporters for sweep progress.
//!
//! All reporters implement the `Reporter` trait and are designed to be:
//! - Non-panicking: errors are logged but never propagate
//! - Atomic: output is written in complete lines to avoid interleaving

use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::SweepConfig;
use crate::result::{ResultTable, TrialOutcome};
use crate::runner::SweepStatus;
use crate::workload::WorkloadSize;

/// File name the JSON reporter writes inside the output directory.
pub const JSON_RESULTS_FILE: &str = "benchmark_results.json";

/// Observer of sweep events.
pub trait Reporter: Send + Sync {
    /// Called once, after backend registration and before the first row.
    fn sweep_start(&self, _config: &SweepConfig, _table: &ResultTable) {}

    /// Called before the backends run at `size`.
    fn row_start(&self, _size: WorkloadSize) {}

    /// Called after one backend finishes its trial at `size`.
    fn cell_end(&self, _size: WorkloadSize, _backend: &str, _outcome: &TrialOutcome) {}

    /// Called once with every committed row.
    fn sweep_end(&self, _table: &ResultTable, _status: SweepStatus) {}
}

/// Fixed width for the backend name column in console output.
const NAME_WIDTH: usize = 20;
/// Fixed width for duration column in console output.
const DURATION_WIDTH: usize = 12;

const RULE: &str = "---------------------------------------------------------------";

/// Console reporter that prints progress to stdout.
pub struct ConsoleReporter {
    show_all_runs: bool,
    output_lock: Mutex<()>,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            show_all_runs: false,
            output_lock: Mutex::new(()),
        }
    }

    /// Show individual repeat times on a separate indented line.
    pub fn show_all_runs(mut self, show: bool) -> Self {
        self.show_all_runs = show;
        self
    }

    fn format_cell(&self, backend: &str, outcome: &TrialOutcome) -> String {
        let Some(stats) = outcome.summary() else {
            return format!(
                "  {:<width$} FAILED ({})",
                backend,
                outcome.failure_message().unwrap_or_default(),
                width = NAME_WIDTH
            );
        };

        let mean = format_duration(Duration::from_secs_f64(stats.mean));
        let mut line = if stats.count > 1 {
            format!(
                "  {:<width$} {:>dur_width$} ± {}",
                backend,
                mean,
                format_duration(Duration::from_secs_f64(stats.stddev)),
                width = NAME_WIDTH,
                dur_width = DURATION_WIDTH
            )
        } else {
            format!(
                "  {:<width$} {:>dur_width$}",
                backend,
                mean,
                width = NAME_WIDTH,
                dur_width = DURATION_WIDTH
            )
        };

        if self.show_all_runs && stats.count > 1 {
            let runs: Vec<_> = outcome
                .durations()
                .unwrap_or_default()
                .iter()
                .map(|d| format_duration(*d))
                .collect();
            line.push_str(&format!("\n      runs: [{}]", runs.join(", ")));
        }
        line
    }

    /// Atomically write a complete message to stdout.
    fn write_stdout(&self, message: &str) {
        let _guard = self.output_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut stdout = std::io::stdout().lock();
        if let Err(e) = writeln!(stdout, "{}", message) {
            warn!(error = %e, "failed to write to stdout");
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn sweep_start(&self, config: &SweepConfig, table: &ResultTable) {
        let mut header = format!(
            "{RULE}\n\
             Quantum Circuit Simulation Benchmark\n\
             Depth: {}, Precision: {}, Seed: {}\n\
             Repeats: {}, Warmup: {}\n\
             Backends: {}\n",
            config.depth,
            config.precision,
            config.seed,
            config.repeats,
            if config.warmup { "yes" } else { "no" },
            table.backends().join(", "),
        );
        for excluded in table.excluded() {
            header.push_str(&format!("Excluded: {} ({})\n", excluded.name, excluded.reason));
        }
        header.push_str(RULE);
        self.write_stdout(&header);
    }

    fn row_start(&self, size: WorkloadSize) {
        self.write_stdout(&format!("\nBenchmarking {size} qubits"));
    }

    fn cell_end(&self, _size: WorkloadSize, backend: &str, outcome: &TrialOutcome) {
        self.write_stdout(&self.format_cell(backend, outcome));
    }

    fn sweep_end(&self, table: &ResultTable, status: SweepStatus) {
        let verb = match status {
            SweepStatus::Completed => "Completed",
            SweepStatus::Cancelled => "Cancelled after",
        };
        let footer = format!("{RULE}\n{verb} {} sizes\n{RULE}", table.len());
        self.write_stdout(&footer);
    }
}

/// JSON reporter that writes the final table to `benchmark_results.json`.
pub struct JsonReporter {
    output_dir: PathBuf,
}

#[derive(Serialize)]
struct SweepDocument<'a> {
    status: SweepStatus,
    #[serde(flatten)]
    table: &'a ResultTable,
}

impl JsonReporter {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.output_dir.join(JSON_RESULTS_FILE)
    }

    /// Never panics; logs a warning on failure.
    fn write_results(&self, table: &ResultTable, status: SweepStatus) {
        if let Err(e) = self.write_results_inner(table, status) {
            warn!(error = %e, dir = %self.output_dir.display(), "failed to write results");
        }
    }

    fn write_results_inner(&self, table: &ResultTable, status: SweepStatus) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.output_dir)?;

        let document = SweepDocument { status, table };
        let json = serde_json::to_string_pretty(&document).map_err(std::io::Error::other)?;

        let path = self.path();
        std::fs::write(&path, json)?;
        info!(path = %path.display(), "results written");
        Ok(())
    }
}

impl Reporter for JsonReporter {
    fn sweep_end(&self, table: &ResultTable, status: SweepStatus) {
        self.write_results(table, status);
    }
}

/// Format a duration with consistent units: ns, us, ms, or s.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else if secs >= 0.001 {
        format!("{:.2}ms", secs * 1_000.0)
    } else if secs >= 0.000_001 {
        format!("{:.2}us", secs * 1_000_000.0)
    } else {
        format!("{:.2}ns", secs * 1_000_000_000.0)
    }
}

/// Combines multiple reporters. A panicking reporter does not stop the
/// others, nor the sweep.
#[derive(Default)]
pub struct MultiReporter {
    reporters: Vec<Box<dyn Reporter>>,
}

impl MultiReporter {
    pub fn new(reporters: Vec<Box<dyn Reporter>>) -> Self {
        Self { reporters }
    }

    pub fn push(&mut self, reporter: Box<dyn Reporter>) {
        self.reporters.push(reporter);
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn Reporter)) {
        for r in &self.reporters {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(r.as_ref())));
        }
    }
}

impl Reporter for MultiReporter {
    fn sweep_start(&self, config: &SweepConfig, table: &ResultTable) {
        self.each(|r| r.sweep_start(config, table));
    }

    fn row_start(&self, size: WorkloadSize) {
        self.each(|r| r.row_start(size));
    }

    fn cell_end(&self, size: WorkloadSize, backend: &str, outcome: &TrialOutcome) {
        self.each(|r| r.cell_end(size, backend, outcome));
    }

    fn sweep_end(&self, table: &ResultTable, status: SweepStatus) {
        self.each(|r| r.sweep_end(table, status));
    }
}
