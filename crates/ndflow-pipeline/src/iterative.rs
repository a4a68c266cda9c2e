//! The iterative stage extension: a convergence loop with cooperative
//! early termination.
//!
//! Deconvolution- and optimizer-style stages run many forward passes
//! inside one `execute`. [`IterationDriver`] owns that loop: it emits
//! one `Iteration` event per pass, checks the external [`StopFlag`]
//! only at the top of each iteration (cancellation is cooperative and
//! bounded by one in-flight iteration, never preemptive), and ends in
//! `Converged` or `StoppedEarly`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ndflow_core::error::StageError;
use ndflow_core::event::{EventHub, RunOutcome, StageEvent};

/// Cloneable cooperative-cancellation handle.
///
/// Any thread holding a clone may request a stop; the running loop
/// observes it at the top of its next iteration.
#[derive(Clone, Debug, Default)]
pub struct StopFlag {
    flag: Arc<AtomicBool>,
}

impl StopFlag {
    /// A fresh, unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request the loop stop after the in-flight iteration.
    pub fn request_stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Re-arm the flag for a new run.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Lifecycle of an iterative run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IterationState {
    /// Not yet started.
    Idle,
    /// Loop in progress.
    Running,
    /// Internal stop predicate satisfied (threshold met or iteration
    /// budget reached).
    Converged,
    /// External stop flag observed.
    StoppedEarly,
}

/// Result of a completed iterative run.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IterationOutcome {
    /// Terminal state: `Converged` or `StoppedEarly`.
    pub state: IterationState,
    /// Number of iterations that ran (and of `Iteration` events
    /// emitted).
    pub iterations: u64,
    /// Metric from the last completed iteration, if any ran.
    pub final_metric: Option<f64>,
}

/// Runs a convergence loop on behalf of an iterative stage.
///
/// One driver instance is scoped to one `execute` invocation.
#[derive(Clone, Debug)]
pub struct IterationDriver {
    max_iterations: u64,
    convergence_threshold: f64,
    stop: StopFlag,
    state: IterationState,
}

impl IterationDriver {
    /// Create a driver that stops after `max_iterations` passes or
    /// once the step metric drops to `convergence_threshold` or below.
    pub fn new(max_iterations: u64, convergence_threshold: f64, stop: StopFlag) -> Self {
        Self {
            max_iterations,
            convergence_threshold,
            stop,
            state: IterationState::Idle,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> IterationState {
        self.state
    }

    /// Run the loop. `step(i)` performs one forward pass and returns
    /// the convergence metric after that pass.
    ///
    /// Emits `Start`, one `Iteration` per completed pass, and `End`
    /// carrying `Converged` or `StoppedEarly`. A step error aborts the
    /// loop without an `End` event; the caller surfaces it as a
    /// computation failure.
    pub fn run(
        &mut self,
        hub: &EventHub,
        stage: &str,
        mut step: impl FnMut(u64) -> Result<f64, StageError>,
    ) -> Result<IterationOutcome, StageError> {
        self.state = IterationState::Running;
        let _ = hub.notify(&StageEvent::Start {
            stage: stage.to_string(),
        });

        let mut iterations = 0u64;
        let mut final_metric = None;

        loop {
            // Stop checked only at loop top: at most one in-flight
            // iteration after the flag is raised.
            if self.stop.is_set() {
                self.state = IterationState::StoppedEarly;
                break;
            }
            if iterations >= self.max_iterations {
                self.state = IterationState::Converged;
                break;
            }

            let metric = step(iterations)?;
            let _ = hub.notify(&StageEvent::Iteration {
                stage: stage.to_string(),
                index: iterations,
                metric,
            });
            iterations += 1;
            final_metric = Some(metric);

            if metric <= self.convergence_threshold {
                self.state = IterationState::Converged;
                break;
            }
        }

        let outcome = match self.state {
            IterationState::Converged => RunOutcome::Converged,
            IterationState::StoppedEarly => RunOutcome::StoppedEarly,
            // Loop only exits through the two states above.
            IterationState::Idle | IterationState::Running => RunOutcome::Completed,
        };
        let _ = hub.notify(&StageEvent::End {
            stage: stage.to_string(),
            outcome,
        });

        Ok(IterationOutcome {
            state: self.state,
            iterations,
            final_metric,
        })
    }
}
