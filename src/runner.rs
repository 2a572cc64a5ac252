//! The sweep driver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::backend::panic_message;
use crate::config::{SweepConfig, UnitReuse};
use crate::error::{ConfigError, WorkloadError};
use crate::registry::BackendRegistry;
use crate::report::{ConsoleReporter, JsonReporter, MultiReporter, Reporter};
use crate::result::{ExcludedBackend, ResultTable, TrialOutcome};
use crate::trial::{run_trial, UnitSource};
use crate::workload::{WorkloadProvider, WorkloadSize};

/// Cooperative stop request, shared between the sweep and whoever may
/// interrupt it.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How a sweep ended. A cancelled sweep is a valid, shorter result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepStatus {
    Completed,
    Cancelled,
}

impl fmt::Display for SweepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepStatus::Completed => write!(f, "completed"),
            SweepStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// The finished table and how the sweep ended.
#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub table: ResultTable,
    pub status: SweepStatus,
}

/// Runs every active backend against every size, strictly sequentially.
///
/// # Example
///
/// ```rust,no_run
/// use qbench::{standard_registry, RandomCircuitProvider, SweepConfig, SweepRunner};
///
/// let config = SweepConfig::new().qubit_range(2, 12, 2).repeats(3).warmup(true);
/// let registry = standard_registry(&config)?;
/// let provider = RandomCircuitProvider::new(config.depth, config.seed);
///
/// let outcome = SweepRunner::new(config).run(registry, &provider)?;
/// println!("{} rows", outcome.table.len());
/// # Ok::<(), qbench::ConfigError>(())
/// ```
pub struct SweepRunner {
    config: SweepConfig,
    reporter: MultiReporter,
    cancel: CancelFlag,
}

impl SweepRunner {
    /// Create a runner with the default reporters: console (when verbose)
    /// and JSON.
    pub fn new(config: SweepConfig) -> Self {
        let mut reporters: Vec<Box<dyn Reporter>> = Vec::new();
        if config.verbose {
            reporters.push(Box::new(ConsoleReporter::new()));
        }
        reporters.push(Box::new(JsonReporter::new(config.output_dir.clone())));

        Self {
            config,
            reporter: MultiReporter::new(reporters),
            cancel: CancelFlag::new(),
        }
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Replace reporters with a custom set.
    pub fn reporters(mut self, reporters: Vec<Box<dyn Reporter>>) -> Self {
        self.reporter = MultiReporter::new(reporters);
        self
    }

    /// Add an additional reporter.
    pub fn add_reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter.push(reporter);
        self
    }

    /// Observe an externally owned cancel flag.
    pub fn cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    /// A handle that stops this runner between rows.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run the sweep.
    ///
    /// The registry is consumed: its backends are dropped, releasing their
    /// devices, when this returns, whatever the exit path. Only invalid
    /// configuration is an error; backend failures become failed cells and
    /// cancellation yields the rows completed so far.
    pub fn run<P>(
        &self,
        mut registry: BackendRegistry<P::Unit>,
        provider: &P,
    ) -> Result<SweepOutcome, ConfigError>
    where
        P: WorkloadProvider,
    {
        let sizes = self.config.validate()?;
        if !registry.has_active() {
            return Err(ConfigError::NoActiveBackends);
        }

        let columns: Vec<String> = registry.active_names().into_iter().map(String::from).collect();
        let excluded: Vec<ExcludedBackend> = registry
            .excluded()
            .map(|h| ExcludedBackend {
                name: h.name().to_string(),
                reason: h.unavailable_reason().unwrap_or_default().to_string(),
            })
            .collect();
        let mut table = ResultTable::new(columns, excluded, self.config.repeats);

        info!(
            sizes = sizes.len(),
            backends = table.backends().len(),
            repeats = self.config.repeats,
            warmup = self.config.warmup,
            "sweep started"
        );
        self.reporter.sweep_start(&self.config, &table);

        let mut status = SweepStatus::Completed;
        'sizes: for size in sizes {
            if self.cancel.is_cancelled() {
                status = SweepStatus::Cancelled;
                break;
            }

            self.reporter.row_start(size);
            let shared = match self.config.unit_reuse {
                UnitReuse::Reuse => Some(produce_guarded(provider, size)),
                UnitReuse::FreshPerRepeat => None,
            };
            let produce = || provider.produce(size);

            let mut row = table.begin_row(size);
            for (name, backend) in registry.active_mut() {
                if self.cancel.is_cancelled() {
                    warn!(size = %size, "sweep cancelled mid-row, discarding partial row");
                    status = SweepStatus::Cancelled;
                    break 'sizes;
                }

                let outcome = match &shared {
                    Some(Ok(unit)) => run_trial(
                        backend,
                        UnitSource::Shared(unit),
                        self.config.repeats,
                        self.config.warmup,
                    ),
                    Some(Err(err)) => TrialOutcome::failure(err.to_string()),
                    None => run_trial(
                        backend,
                        UnitSource::Fresh(&produce),
                        self.config.repeats,
                        self.config.warmup,
                    ),
                };

                if let Some(message) = outcome.failure_message() {
                    warn!(backend = name, size = %size, error = message, "trial failed");
                }
                self.reporter.cell_end(size, name, &outcome);
                row.record(name, outcome);
            }

            if let Err(err) = table.commit(row) {
                error!(error = %err, "dropping malformed row");
            }
        }

        match status {
            SweepStatus::Completed => info!(rows = table.len(), "sweep completed"),
            SweepStatus::Cancelled => info!(rows = table.len(), "sweep cancelled"),
        }
        self.reporter.sweep_end(&table, status);

        Ok(SweepOutcome { table, status })
    }
}

/// Ask the provider for a unit; a panicking provider fails the row like any
/// other workload error.
fn produce_guarded<P: WorkloadProvider>(
    provider: &P,
    size: WorkloadSize,
) -> Result<P::Unit, WorkloadError> {
    catch_unwind(AssertUnwindSafe(|| provider.produce(size))).unwrap_or_else(|payload| {
        Err(WorkloadError::new(
            size,
            format!("provider panicked: {}", panic_message(payload.as_ref())),
        ))
    })
}
