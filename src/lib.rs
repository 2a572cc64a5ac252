//! # qbench
//!
//! Benchmark orchestration for quantum circuit simulation backends.
//!
//! A sweep runs every available backend against a strictly increasing series
//! of workload sizes (qubit counts), times a fixed number of repeats per
//! backend and size, and collects the outcomes into a [`ResultTable`]. A
//! backend that fails to initialize is excluded up front; a backend that fails
//! at one size gets a failed cell there and keeps running at the others.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use qbench::{export_all, standard_registry, RandomCircuitProvider, SweepConfig, SweepRunner};
//!
//! let config = SweepConfig::from_env().qubit_range(2, 16, 2).repeats(3).save_csv(true);
//! let registry = standard_registry(&config)?;
//! let provider = RandomCircuitProvider::new(config.depth, config.seed);
//!
//! let outcome = SweepRunner::new(config.clone()).run(registry, &provider)?;
//!
//! for row in outcome.table.rows() {
//!     if let Some(speedup) = outcome.table.speedup(row.size(), "cpu", "gpu_default") {
//!         println!("{} qubits: {:.2}x", row.size(), speedup);
//!     }
//! }
//!
//! export_all(&outcome.table, &config)?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Custom backends
//!
//! Anything implementing [`Backend`] for the provider's unit type can be
//! registered, including a plain closure:
//!
//! ```rust
//! use qbench::{BackendRegistry, Completion, ExecutionError, InitError};
//!
//! let mut registry = BackendRegistry::<Vec<u8>>::new();
//! registry
//!     .register("checksum", || -> Result<_, InitError> {
//!         Ok(|unit: &Vec<u8>| -> Result<Completion, ExecutionError> {
//!             let _sum: u64 = unit.iter().map(|&b| u64::from(b)).sum();
//!             Ok(Completion::Succeeded)
//!         })
//!     })
//!     .unwrap();
//! assert_eq!(registry.active_names(), vec!["checksum"]);
//! ```

mod backend;
mod config;
mod error;
mod export;
mod registry;
mod report;
mod result;
mod runner;
mod simulator;
mod trial;
mod workload;

pub use backend::{Backend, BackendHandle, BackendState, Completion};
pub use config::{BackendSelection, Precision, SizeSpec, SweepConfig, UnitReuse, STANDARD_BACKENDS};
pub use error::{ConfigError, ExecutionError, InitError, RegistryError, TableError, WorkloadError};
pub use export::{
    export_all, tabular_records, write_chart_data, write_csv, ChartData, Point, Series,
    TabularRecord, CHART_FILE, CSV_FILE, FAILURE_SENTINEL,
};
pub use registry::BackendRegistry;
pub use report::{format_duration, ConsoleReporter, JsonReporter, MultiReporter, Reporter, JSON_RESULTS_FILE};
pub use result::{
    ExcludedBackend, ResultCell, ResultRow, ResultTable, RowBuilder, SummaryStatistic,
    TrialOutcome,
};
pub use runner::{CancelFlag, SweepOutcome, SweepRunner, SweepStatus};
pub use simulator::{standard_registry, Device, Real, Statevector, StatevectorBackend, DEFAULT_MAX_QUBITS};
pub use trial::{run_trial, UnitSource};
pub use workload::{Circuit, Gate, RandomCircuitProvider, WorkloadProvider, WorkloadSize};
