//! Error taxonomy.
//!
//! Only [`ConfigError`] ever aborts a sweep. [`InitError`] and
//! [`ExecutionError`] are caught where they happen and folded into the data
//! model (an unavailable backend, a failed cell).

use thiserror::Error;

use crate::workload::WorkloadSize;

/// Invalid sweep parameters. Fatal: no trial executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The sweep has no sizes.
    #[error("sweep contains no sizes")]
    EmptySweep,

    /// Sizes must be strictly increasing (which also rules out duplicates).
    #[error("sweep sizes must be strictly increasing, got {previous} followed by {next}")]
    NonIncreasingSizes {
        /// The earlier size.
        previous: WorkloadSize,
        /// The offending size.
        next: WorkloadSize,
    },

    /// At least one timed repeat is required.
    #[error("repeats must be at least 1")]
    ZeroRepeats,

    /// A range step of zero never advances.
    #[error("size step must be at least 1")]
    ZeroStep,

    /// `min > max` for a size range.
    #[error("invalid size range: min {min} is greater than max {max}")]
    InvalidRange {
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },

    /// A selected backend name is not known.
    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    /// Every registered backend failed to initialize.
    #[error("no backends available")]
    NoActiveBackends,

    /// A textual option could not be parsed.
    #[error("invalid value '{value}' for {key}")]
    InvalidValue {
        /// Option name.
        key: &'static str,
        /// Rejected input.
        value: String,
    },
}

/// A backend could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct InitError {
    /// Human readable cause.
    pub reason: String,
}

impl InitError {
    /// Create an init error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A single execution against a backend failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ExecutionError {
    /// Human readable cause.
    pub message: String,
}

impl ExecutionError {
    /// Create an execution error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The workload provider could not produce a unit for a size.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("workload for size {size} unavailable: {reason}")]
pub struct WorkloadError {
    pub size: WorkloadSize,
    pub reason: String,
}

impl WorkloadError {
    /// Create a workload error for `size`.
    pub fn new(size: WorkloadSize, reason: impl Into<String>) -> Self {
        Self {
            size,
            reason: reason.into(),
        }
    }
}

/// Registry misuse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A backend name was registered twice.
    #[error("backend '{0}' is already registered")]
    DuplicateName(String),
}

/// A row that would break the result table's invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TableError {
    #[error("row for size {next} does not follow size {last}")]
    SizeOutOfOrder {
        last: WorkloadSize,
        next: WorkloadSize,
    },

    #[error("row for size {size} has {found} cells, expected {expected}")]
    IncompleteRow {
        size: WorkloadSize,
        expected: usize,
        found: usize,
    },

    #[error("row for size {size} has backend '{found}' where '{expected}' belongs")]
    ColumnMismatch {
        size: WorkloadSize,
        expected: String,
        found: String,
    },

    #[error("cell ({backend}, {size}) does not hold exactly {expected} samples")]
    SampleCount {
        size: WorkloadSize,
        backend: String,
        expected: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_name_both_sizes_when_sweep_not_increasing() {
        let err = ConfigError::NonIncreasingSizes {
            previous: WorkloadSize(4),
            next: WorkloadSize(4),
        };
        assert_eq!(
            err.to_string(),
            "sweep sizes must be strictly increasing, got 4 followed by 4"
        );
    }

    #[test]
    fn should_display_reason_when_init_fails() {
        let err = InitError::new("no device");
        assert_eq!(err.to_string(), "no device");
    }
}
