//! The backend capability and its registry-side identity.

use serde::{Deserialize, Serialize};
use std::any::Any;

use crate::error::ExecutionError;

/// How a backend signalled the end of one execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The backend finished and reported success.
    Succeeded,
    /// The backend finished but flagged its own result as failed.
    Failed(String),
}

/// An interchangeable execution engine for units of type `U`.
///
/// `execute` is blocking. Any device or session state acquired at
/// construction belongs to the backend and is released in its `Drop`; the
/// registry owns every backend, so release happens when the registry goes
/// away on any exit path.
pub trait Backend<U> {
    fn execute(&mut self, unit: &U) -> Result<Completion, ExecutionError>;
}

impl<U, F> Backend<U> for F
where
    F: FnMut(&U) -> Result<Completion, ExecutionError>,
{
    fn execute(&mut self, unit: &U) -> Result<Completion, ExecutionError> {
        self(unit)
    }
}

/// Whether a backend survived construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum BackendState {
    Available,
    Unavailable(String),
}

/// Name and state of a registered backend. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHandle {
    name: String,
    state: BackendState,
}

impl BackendHandle {
    pub(crate) fn new(name: impl Into<String>, state: BackendState) -> Self {
        Self {
            name: name.into(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> &BackendState {
        &self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == BackendState::Available
    }

    /// Why construction failed, if it did.
    pub fn unavailable_reason(&self) -> Option<&str> {
        match &self.state {
            BackendState::Available => None,
            BackendState::Unavailable(reason) => Some(reason),
        }
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
