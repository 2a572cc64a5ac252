//! Trial runner: one backend, one size, `repeats` timed executions.
//!
//! Nothing a backend does escapes this boundary. Errors, self-reported
//! failures and panics all become [`TrialOutcome::Failure`], and a fault on
//! any timed repeat throws away the samples gathered before it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backend::{panic_message, Backend, Completion};
use crate::error::WorkloadError;
use crate::result::TrialOutcome;

/// Where each execution gets its unit from.
pub enum UnitSource<'a, U> {
    /// One unit, reused by the warmup and every repeat.
    Shared(&'a U),
    /// A fresh unit from the provider before every execution.
    Fresh(&'a dyn Fn() -> Result<U, WorkloadError>),
}

impl<U> UnitSource<'_, U> {
    /// Run `f` against a unit. Producing a fresh unit is outside `f`, so it is
    /// never inside a timed window. A provider error or panic is returned as
    /// its message.
    fn with_unit<R>(&self, f: impl FnOnce(&U) -> R) -> Result<R, String> {
        match self {
            UnitSource::Shared(unit) => Ok(f(unit)),
            UnitSource::Fresh(produce) => {
                let unit = catch_unwind(AssertUnwindSafe(|| produce()))
                    .map_err(|payload| {
                        format!("workload provider panicked: {}", panic_message(payload.as_ref()))
                    })?
                    .map_err(|err| err.to_string())?;
                Ok(f(&unit))
            }
        }
    }
}

/// Time a single call on a monotonic clock.
fn measure<F, R>(f: F) -> (R, Duration)
where
    F: FnOnce() -> R,
{
    let start = Instant::now();
    let result = f();
    (result, start.elapsed())
}

/// One guarded execution: `Ok(elapsed)` or a failure message.
fn execute_once<U>(backend: &mut dyn Backend<U>, unit: &U) -> Result<Duration, String> {
    let guarded = catch_unwind(AssertUnwindSafe(|| measure(|| backend.execute(unit))));
    match guarded {
        Ok((Ok(Completion::Succeeded), elapsed)) => Ok(elapsed),
        Ok((Ok(Completion::Failed(msg)), _)) => Err(format!("backend reported failure: {msg}")),
        Ok((Err(err), _)) => Err(err.to_string()),
        Err(payload) => Err(format!("backend panicked: {}", panic_message(payload.as_ref()))),
    }
}

/// Run one trial of `backend`.
///
/// With `warmup`, one untimed execution runs first; its failure is logged
/// and the timed repeats are attempted anyway. The timed repeats run
/// strictly one after another.
pub fn run_trial<U>(
    backend: &mut dyn Backend<U>,
    source: UnitSource<'_, U>,
    repeats: usize,
    warmup: bool,
) -> TrialOutcome {
    if repeats == 0 {
        return TrialOutcome::failure("no timed repeats requested");
    }

    if warmup {
        match source.with_unit(|unit| execute_once(backend, unit)) {
            Ok(Ok(_)) => debug!("warmup complete"),
            Ok(Err(msg)) => warn!(error = %msg, "warmup failed, continuing with timed repeats"),
            Err(err) => warn!(error = %err, "warmup skipped, workload unavailable"),
        }
    }

    let mut durations = Vec::with_capacity(repeats);
    for k in 1..=repeats {
        let run = match source.with_unit(|unit| execute_once(backend, unit)) {
            Ok(run) => run,
            Err(err) => return TrialOutcome::failure(format!("repeat {k}/{repeats}: {err}")),
        };
        match run {
            Ok(elapsed) => {
                debug!(repeat = k, elapsed_secs = elapsed.as_secs_f64(), "timed repeat");
                durations.push(elapsed);
            }
            Err(msg) => return TrialOutcome::failure(format!("repeat {k}/{repeats}: {msg}")),
        }
    }

    TrialOutcome::Success { durations }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionError;
    use crate::workload::WorkloadSize;
    use std::cell::Cell;

    /// Fails on the listed (1-based) calls, succeeds otherwise.
    struct Scripted {
        calls: usize,
        fail_on: Vec<usize>,
        panic_on: Vec<usize>,
        report_on: Vec<usize>,
    }

    impl Scripted {
        fn new() -> Self {
            Self {
                calls: 0,
                fail_on: Vec::new(),
                panic_on: Vec::new(),
                report_on: Vec::new(),
            }
        }
    }

    impl Backend<u32> for Scripted {
        fn execute(&mut self, _unit: &u32) -> Result<Completion, ExecutionError> {
            self.calls += 1;
            if self.panic_on.contains(&self.calls) {
                panic!("kernel fault");
            }
            if self.fail_on.contains(&self.calls) {
                return Err(ExecutionError::new("out of memory"));
            }
            if self.report_on.contains(&self.calls) {
                return Ok(Completion::Failed("invalid result".into()));
            }
            Ok(Completion::Succeeded)
        }
    }

    #[test]
    fn should_collect_exactly_repeats_samples() {
        let mut backend = Scripted::new();
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 5, false);
        assert_eq!(outcome.durations().unwrap().len(), 5);
        assert_eq!(backend.calls, 5);
    }

    #[test]
    fn should_run_one_extra_untimed_execution_when_warmup() {
        let mut backend = Scripted::new();
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 3, true);
        assert_eq!(outcome.durations().unwrap().len(), 3);
        assert_eq!(backend.calls, 4);
    }

    #[test]
    fn should_still_time_repeats_when_warmup_fails() {
        let mut backend = Scripted::new();
        backend.fail_on = vec![1];
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 2, true);
        assert_eq!(outcome.durations().unwrap().len(), 2);
    }

    #[test]
    fn should_discard_samples_when_repeat_fails() {
        let mut backend = Scripted::new();
        backend.fail_on = vec![2];
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 3, false);

        assert!(!outcome.is_success());
        assert!(outcome.failure_message().unwrap().contains("repeat 2/3"));
        assert_eq!(backend.calls, 2, "remaining repeats must be skipped");
    }

    #[test]
    fn should_convert_panic_into_failure() {
        let mut backend = Scripted::new();
        backend.panic_on = vec![3];
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 3, false);
        assert!(outcome.failure_message().unwrap().contains("kernel fault"));
    }

    #[test]
    fn should_treat_reported_failure_as_failure() {
        let mut backend = Scripted::new();
        backend.report_on = vec![1];
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 1, false);
        assert!(outcome.failure_message().unwrap().contains("invalid result"));
    }

    #[test]
    fn should_request_fresh_unit_per_execution() {
        let produced = Cell::new(0);
        let produce = || -> Result<u32, WorkloadError> {
            produced.set(produced.get() + 1);
            Ok(7)
        };
        let mut backend = Scripted::new();
        let outcome = run_trial(&mut backend, UnitSource::Fresh(&produce), 3, true);

        assert!(outcome.is_success());
        assert_eq!(produced.get(), 4);
    }

    #[test]
    fn should_fail_cell_when_fresh_unit_unavailable() {
        let produce = || -> Result<u32, WorkloadError> {
            Err(WorkloadError::new(WorkloadSize(3), "generator exhausted"))
        };
        let mut backend = Scripted::new();
        let outcome = run_trial(&mut backend, UnitSource::Fresh(&produce), 2, false);

        assert!(outcome.failure_message().unwrap().contains("generator exhausted"));
        assert_eq!(backend.calls, 0);
    }

    #[test]
    fn should_fail_cell_when_fresh_unit_producer_panics() {
        let produce = || -> Result<u32, WorkloadError> { panic!("seed table corrupt") };
        let mut backend = Scripted::new();
        let outcome = run_trial(&mut backend, UnitSource::Fresh(&produce), 2, true);

        assert!(outcome.failure_message().unwrap().contains("seed table corrupt"));
        assert_eq!(backend.calls, 0);
    }

    #[test]
    fn should_time_the_execution_window() {
        let mut backend = |_: &u32| -> Result<Completion, ExecutionError> {
            std::thread::sleep(Duration::from_millis(10));
            Ok(Completion::Succeeded)
        };
        let outcome = run_trial(&mut backend, UnitSource::Shared(&1u32), 1, false);
        let d = outcome.durations().unwrap()[0];
        assert!(d >= Duration::from_millis(10));
        assert!(d < Duration::from_millis(500));
    }
}
