//! Configuration for a benchmark sweep.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::error::ConfigError;
use crate::workload::WorkloadSize;

/// Names of the stock simulator backends, in canonical registration order.
pub const STANDARD_BACKENDS: [&str; 3] = ["cpu", "gpu_default", "gpu_custatevec"];

/// Floating point precision of the simulated amplitudes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Single,
    #[default]
    Double,
}

impl std::fmt::Display for Precision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Precision::Single => write!(f, "single"),
            Precision::Double => write!(f, "double"),
        }
    }
}

impl FromStr for Precision {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single" | "f32" => Ok(Precision::Single),
            "double" | "f64" => Ok(Precision::Double),
            _ => Err(ConfigError::InvalidValue {
                key: "precision",
                value: s.to_string(),
            }),
        }
    }
}

/// Which stock backends to register.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackendSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl BackendSelection {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            BackendSelection::All => true,
            BackendSelection::Only(names) => names.iter().any(|n| n == name),
        }
    }

    /// Names selected, in canonical order.
    pub fn resolve(&self) -> Result<Vec<&'static str>, ConfigError> {
        if let BackendSelection::Only(names) = self {
            if let Some(unknown) = names.iter().find(|n| !STANDARD_BACKENDS.contains(&n.as_str())) {
                return Err(ConfigError::UnknownBackend(unknown.clone()));
            }
        }
        Ok(STANDARD_BACKENDS
            .iter()
            .copied()
            .filter(|name| self.includes(name))
            .collect())
    }
}

impl FromStr for BackendSelection {
    type Err = ConfigError;

    /// Comma or whitespace separated names; `all` anywhere selects everything.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<String> = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .collect();

        if names.is_empty() || names.iter().any(|n| n == "all") {
            return Ok(BackendSelection::All);
        }
        if let Some(unknown) = names.iter().find(|n| !STANDARD_BACKENDS.contains(&n.as_str())) {
            return Err(ConfigError::UnknownBackend(unknown.clone()));
        }
        Ok(BackendSelection::Only(names))
    }
}

/// Whether one workload unit may be executed repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnitReuse {
    /// One unit per size, shared by warmup and every repeat.
    #[default]
    Reuse,
    /// Ask the provider for a fresh unit before every execution.
    FreshPerRepeat,
}

/// How the sweep sizes are given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SizeSpec {
    /// `min..=max` by `step`.
    Range { min: usize, max: usize, step: usize },
    Explicit(Vec<WorkloadSize>),
}

impl SizeSpec {
    /// Expand into the ordered sweep, rejecting empty or non-increasing input.
    pub fn expand(&self) -> Result<Vec<WorkloadSize>, ConfigError> {
        let sizes = match self {
            SizeSpec::Range { step: 0, .. } => return Err(ConfigError::ZeroStep),
            SizeSpec::Range { min, max, .. } if min > max => {
                return Err(ConfigError::InvalidRange {
                    min: *min,
                    max: *max,
                })
            }
            SizeSpec::Range { min, max, step } => (*min..=*max)
                .step_by(*step)
                .map(WorkloadSize)
                .collect::<Vec<_>>(),
            SizeSpec::Explicit(sizes) => sizes.clone(),
        };

        if sizes.is_empty() {
            return Err(ConfigError::EmptySweep);
        }
        for pair in sizes.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::NonIncreasingSizes {
                    previous: pair[0],
                    next: pair[1],
                });
            }
        }
        Ok(sizes)
    }
}

/// Everything a sweep needs to know, validated before any trial runs.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Sizes to benchmark, in sweep order.
    pub sizes: SizeSpec,
    /// Timed executions per (backend, size).
    pub repeats: usize,
    /// One untimed execution before the timed repeats.
    pub warmup: bool,
    /// Circuit depth handed to the workload provider.
    pub depth: usize,
    /// Workload seed.
    pub seed: u64,
    pub precision: Precision,
    /// Stock backends to register.
    pub backends: BackendSelection,
    /// Backend every speedup is measured against.
    pub reference_backend: String,
    pub unit_reuse: UnitReuse,
    /// Directory for exported files.
    pub output_dir: PathBuf,
    /// Write the CSV table.
    pub save_csv: bool,
    /// Write chart data.
    pub plots: bool,
    /// Print progress to stdout.
    pub verbose: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            sizes: SizeSpec::Range {
                min: 2,
                max: 24,
                step: 2,
            },
            repeats: 1,
            warmup: false,
            depth: 10,
            seed: 42,
            precision: Precision::Double,
            backends: BackendSelection::All,
            reference_backend: "cpu".to_string(),
            unit_reuse: UnitReuse::Reuse,
            output_dir: PathBuf::from("results"),
            save_csv: false,
            plots: true,
            verbose: true,
        }
    }
}

impl SweepConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse config from environment variables.
    ///
    /// Supported variables:
    /// - `QBENCH_MIN_QUBITS`, `QBENCH_MAX_QUBITS`, `QBENCH_STEP`: size range
    /// - `QBENCH_DEPTH`: circuit depth (default: 10)
    /// - `QBENCH_SEED`: workload seed (default: 42)
    /// - `QBENCH_REPEATS`: timed repeats (default: 1)
    /// - `QBENCH_WARMUP`: warmup execution (default: false)
    /// - `QBENCH_PRECISION`: `single` or `double`
    /// - `QBENCH_BACKENDS`: e.g. `cpu,gpu_custatevec` or `all`
    /// - `QBENCH_OUTPUT_DIR`: export directory
    /// - `QBENCH_SAVE_CSV`: write the CSV table
    /// - `QBENCH_NO_PLOTS`: skip chart data
    ///
    /// Unparsable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        let (mut min, mut max, mut step) = (2, 24, 2);
        if let Some(n) = env_parse("QBENCH_MIN_QUBITS") {
            min = n;
        }
        if let Some(n) = env_parse("QBENCH_MAX_QUBITS") {
            max = n;
        }
        if let Some(n) = env_parse("QBENCH_STEP") {
            step = n;
        }
        cfg.sizes = SizeSpec::Range { min, max, step };

        if let Some(n) = env_parse("QBENCH_DEPTH") {
            cfg.depth = n;
        }
        if let Some(n) = env_parse("QBENCH_SEED") {
            cfg.seed = n;
        }
        if let Some(n) = env_parse("QBENCH_REPEATS") {
            cfg.repeats = n;
        }
        if let Some(v) = env_flag("QBENCH_WARMUP") {
            cfg.warmup = v;
        }
        if let Some(p) = env_parse("QBENCH_PRECISION") {
            cfg.precision = p;
        }
        if let Some(b) = env_parse("QBENCH_BACKENDS") {
            cfg.backends = b;
        }
        if let Ok(v) = std::env::var("QBENCH_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env_flag("QBENCH_SAVE_CSV") {
            cfg.save_csv = v;
        }
        if let Some(v) = env_flag("QBENCH_NO_PLOTS") {
            cfg.plots = !v;
        }

        cfg
    }

    /// Check every option that could make the sweep meaningless.
    pub fn validate(&self) -> Result<Vec<WorkloadSize>, ConfigError> {
        if self.repeats == 0 {
            return Err(ConfigError::ZeroRepeats);
        }
        self.sizes.expand()
    }

    /// Sweep `min..=max` qubits by `step`.
    pub fn qubit_range(mut self, min: usize, max: usize, step: usize) -> Self {
        self.sizes = SizeSpec::Range { min, max, step };
        self
    }

    /// Sweep exactly these sizes, in this order.
    pub fn sizes(mut self, sizes: impl IntoIterator<Item = usize>) -> Self {
        self.sizes = SizeSpec::Explicit(sizes.into_iter().map(WorkloadSize).collect());
        self
    }

    /// Set the number of timed repeats per backend and size.
    pub fn repeats(mut self, n: usize) -> Self {
        self.repeats = n;
        self
    }

    /// Enable or disable the untimed warmup execution.
    pub fn warmup(mut self, enabled: bool) -> Self {
        self.warmup = enabled;
        self
    }

    /// Set the circuit depth handed to the workload provider.
    pub fn depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Set the workload seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the amplitude precision.
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Choose which stock backends to register.
    pub fn backends(mut self, selection: BackendSelection) -> Self {
        self.backends = selection;
        self
    }

    /// Set the backend speedups are measured against.
    pub fn reference_backend(mut self, name: impl Into<String>) -> Self {
        self.reference_backend = name.into();
        self
    }

    /// Set whether one unit per size is reused across executions.
    pub fn unit_reuse(mut self, reuse: UnitReuse) -> Self {
        self.unit_reuse = reuse;
        self
    }

    /// Set the directory exports are written to.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = path.into();
        self
    }

    /// Enable or disable the CSV export.
    pub fn save_csv(mut self, enabled: bool) -> Self {
        self.save_csv = enabled;
        self
    }

    /// Enable or disable the chart data export.
    pub fn plots(mut self, enabled: bool) -> Self {
        self.plots = enabled;
        self
    }

    /// Enable or disable console progress.
    pub fn verbose(mut self, v: bool) -> Self {
        self.verbose = v;
        self
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
}
