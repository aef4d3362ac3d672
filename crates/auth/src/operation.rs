//! Single-flight tracker for long-running identity operations.
//!
//! Every entity that performs asynchronous provider calls (the session and
//! each user snapshot) owns exactly one [`Operation`]. Starting a second
//! action while one is running fails fast with
//! [`IdentityError::ConcurrentOperation`]; nothing is queued.
//!
//! All observable fields live in a single `watch` cell, so each transition
//! (start, progress, success, failure) is one atomic write: a subscriber never
//! sees `in_progress == true` next to the previous run's error.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::IdentityError;

/// Observable state of an [`Operation`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationState {
    /// Name of the current or last run; empty if the operation never ran.
    pub name: String,
    /// Whether a run is active.
    pub in_progress: bool,
    /// Progress of the current run in `[0, 1]`.
    pub progress: f64,
    /// Error of the last run, until cleared.
    pub error: Option<IdentityError>,
    /// When the current or last run started.
    pub start_time: Option<DateTime<Utc>>,
    /// When the last run finished.
    pub end_time: Option<DateTime<Utc>>,
    run: u64,
}

impl OperationState {
    /// Time elapsed since the later of `start_time` and `end_time`.
    #[must_use]
    pub fn expired_time(&self, now: DateTime<Utc>) -> Option<TimeDelta> {
        let last = match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some(start.max(end)),
            (start, end) => start.or(end),
        };
        last.map(|at| now - at)
    }
}

/// Runs one named asynchronous action at a time and records its telemetry.
#[derive(Debug)]
pub struct Operation {
    state: Arc<watch::Sender<OperationState>>,
}

impl Default for Operation {
    fn default() -> Self {
        Self::new()
    }
}

impl Operation {
    /// Create an idle operation.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(OperationState::default())),
        }
    }

    /// Run `action` under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] without touching any
    /// state if a run is already in progress; otherwise returns whatever
    /// `action` fails with.
    pub async fn start<R, F, Fut>(&self, name: &str, action: F) -> Result<R, IdentityError>
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = Result<R, IdentityError>>,
    {
        self.start_then(name, action, || {}).await
    }

    /// Run `action` under `name`, calling `on_success` once it succeeds.
    ///
    /// `on_success` runs before the operation is marked idle, so anything
    /// watching for the run to finish also sees the callback's effects.
    /// The run is still in progress while it executes: starting another run
    /// on this operation from inside the callback fails with
    /// [`IdentityError::ConcurrentOperation`].
    ///
    /// # Errors
    ///
    /// Same as [`Operation::start`]. `on_success` is not called on failure.
    pub async fn start_then<R, F, Fut, S>(
        &self,
        name: &str,
        action: F,
        on_success: S,
    ) -> Result<R, IdentityError>
    where
        F: FnOnce(ProgressReporter) -> Fut,
        Fut: Future<Output = Result<R, IdentityError>>,
        S: FnOnce(),
    {
        let run = self.begin(name)?;
        let settle = Settle {
            state: &self.state,
            run,
            name,
            settled: false,
        };
        let reporter = ProgressReporter {
            state: Arc::clone(&self.state),
            run,
            name: name.to_owned(),
        };

        match action(reporter).await {
            Ok(value) => {
                on_success();
                settle.succeed();
                debug!(operation = name, "operation completed");
                Ok(value)
            }
            Err(err) => {
                settle.fail(err.clone());
                warn!(operation = name, error = %err, "operation failed");
                Err(err)
            }
        }
    }

    /// Check the single-flight guard and open a new run in one write.
    fn begin(&self, name: &str) -> Result<u64, IdentityError> {
        let mut outcome = Err(String::new());
        self.state.send_if_modified(|state| {
            if state.in_progress {
                outcome = Err(state.name.clone());
                return false;
            }
            state.run = state.run.wrapping_add(1);
            state.name = name.to_owned();
            state.progress = 0.0;
            state.error = None;
            state.in_progress = true;
            state.start_time = Some(Utc::now());
            outcome = Ok(state.run);
            true
        });

        match outcome {
            Ok(run) => {
                debug!(operation = name, run, "operation started");
                Ok(run)
            }
            Err(running) => {
                debug!(operation = name, running = %running, "operation rejected");
                Err(IdentityError::ConcurrentOperation { running })
            }
        }
    }

    /// Clear the last error.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::ConcurrentOperation`] while a run is in progress.
    pub fn clear_error(&self) -> Result<(), IdentityError> {
        let mut running = None;
        self.state.send_if_modified(|state| {
            if state.in_progress {
                running = Some(state.name.clone());
                return false;
            }
            state.error.take().is_some()
        });
        match running {
            Some(running) => Err(IdentityError::ConcurrentOperation { running }),
            None => Ok(()),
        }
    }

    /// A consistent copy of every field.
    #[must_use]
    pub fn state(&self) -> OperationState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OperationState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.state.borrow().name.clone()
    }

    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.state.borrow().in_progress
    }

    #[must_use]
    pub fn progress(&self) -> f64 {
        self.state.borrow().progress
    }

    #[must_use]
    pub fn error(&self) -> Option<IdentityError> {
        self.state.borrow().error.clone()
    }

    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.state.borrow().end_time
    }

    /// Time since the operation last started or finished, whichever is later.
    ///
    /// `None` if the operation has never run.
    #[must_use]
    pub fn expired_time(&self) -> Option<TimeDelta> {
        self.state.borrow().expired_time(Utc::now())
    }
}

/// Progress callback handed to an action.
///
/// Only valid for the run it was created for; reporting after that run
/// settled fails with [`IdentityError::NoOperationInProgress`].
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    state: Arc<watch::Sender<OperationState>>,
    run: u64,
    name: String,
}

impl ProgressReporter {
    /// Record progress for the current run.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::NoOperationInProgress`] if this reporter's run
    /// is no longer active, or [`IdentityError::InvalidProgress`] if
    /// `progress` is NaN or outside `[0, 1]`. Progress is unchanged on error.
    pub fn report(&self, progress: f64) -> Result<(), IdentityError> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            if !state.in_progress || state.run != self.run {
                outcome = Err(IdentityError::NoOperationInProgress {
                    name: self.name.clone(),
                    progress,
                });
                return false;
            }
            // NaN fails the range check too.
            if !(0.0..=1.0).contains(&progress) {
                outcome = Err(IdentityError::InvalidProgress { progress });
                return false;
            }
            state.progress = progress;
            true
        });
        outcome
    }
}

/// Closes a run exactly once. Dropped without settling means interrupted.
struct Settle<'a> {
    state: &'a watch::Sender<OperationState>,
    run: u64,
    name: &'a str,
    settled: bool,
}

impl Settle<'_> {
    fn succeed(mut self) {
        self.settled = true;
        self.state.send_modify(|state| {
            state.progress = 1.0;
            state.in_progress = false;
            state.error = None;
            state.end_time = Some(Utc::now());
        });
    }

    fn fail(mut self, err: IdentityError) {
        self.settled = true;
        self.state.send_modify(|state| {
            state.in_progress = false;
            state.end_time = Some(Utc::now());
            state.error = Some(err);
        });
    }
}

impl Drop for Settle<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let interrupted = self.state.send_if_modified(|state| {
            if !state.in_progress || state.run != self.run {
                return false;
            }
            state.in_progress = false;
            state.end_time = Some(Utc::now());
            state.error = Some(IdentityError::Interrupted {
                name: self.name.to_owned(),
            });
            true
        });
        if interrupted {
            warn!(operation = self.name, "operation interrupted");
        }
    }
}
