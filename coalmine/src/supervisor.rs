//! Worker supervision shared by the batch and live orchestrators.
//!
//! Each generator group runs on its own tokio task. The supervisor collects
//! the tasks' outcomes, keeps the first failure as the run's terminal error
//! and cancels the remaining workers through a shared child token.

use std::collections::HashMap;
use std::future::Future;

use tokio::task::{Id, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{CoalMineError, Result, WriteError};

/// Summary of one generation run.
#[derive(Debug)]
pub struct RunReport {
    /// Bytes delivered by all workers, including partial writes.
    pub bytes_written: u64,
    /// Number of series that took part in the run.
    pub series: usize,
    /// The first fatal error, if any.
    pub error: Option<CoalMineError>,
}

impl RunReport {
    /// Returns `true` when the run ended without a terminal error.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Converts the report into the bytes written or the terminal error.
    ///
    /// # Errors
    ///
    /// Returns the run's terminal error, if there is one.
    pub fn into_result(self) -> Result<u64> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.bytes_written),
        }
    }
}

/// What a worker task hands back to the supervisor.
#[derive(Debug)]
pub(crate) struct WorkerOutcome {
    pub(crate) bytes: u64,
    pub(crate) result: Result<()>,
}

pub(crate) struct Supervisor {
    tasks: JoinSet<WorkerOutcome>,
    patterns: HashMap<Id, String>,
    run: CancellationToken,
    series: usize,
}

impl Supervisor {
    /// Creates a supervisor whose run token is a child of `parent`.
    pub(crate) fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            patterns: HashMap::new(),
            run: parent.child_token(),
            series: 0,
        }
    }

    /// Token observed by workers; cancelled on the first failure.
    pub(crate) fn token(&self) -> CancellationToken {
        self.run.clone()
    }

    pub(crate) fn spawn<F>(&mut self, pattern: String, series: usize, worker: F)
    where
        F: Future<Output = WorkerOutcome> + Send + 'static,
    {
        let handle = self.tasks.spawn(worker);
        self.patterns.insert(handle.id(), pattern);
        self.series += series;
    }

    pub(crate) fn workers(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn series(&self) -> usize {
        self.series
    }

    /// Waits for every worker, racing them against `external`.
    ///
    /// When `cancel_is_error` is set, an external cancellation becomes the
    /// run's terminal [`CoalMineError::Cancelled`].
    pub(crate) async fn wait(
        mut self,
        external: &CancellationToken,
        cancel_is_error: bool,
    ) -> RunReport {
        let mut report = RunReport {
            bytes_written: 0,
            series: self.series,
            error: None,
        };
        let mut cancel_seen = false;

        loop {
            let joined = tokio::select! {
                () = external.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    info!(workers = self.tasks.len(), "cancellation requested, stopping workers");
                    if cancel_is_error && report.error.is_none() {
                        report.error = Some(CoalMineError::Cancelled);
                    }
                    self.run.cancel();
                    continue;
                }
                joined = self.tasks.join_next_with_id() => joined,
            };
            let Some(joined) = joined else {
                break;
            };

            let (pattern, outcome) = match joined {
                Ok((id, outcome)) => (self.patterns.remove(&id).unwrap_or_default(), outcome),
                Err(e) => {
                    let pattern = self.patterns.remove(&e.id()).unwrap_or_default();
                    let reason = if e.is_panic() { "panicked" } else { "aborted" };
                    let result = Err(WriteError::WorkerPanicked {
                        pattern: pattern.clone(),
                        reason: reason.to_string(),
                    }
                    .into());
                    (pattern, WorkerOutcome { bytes: 0, result })
                }
            };

            report.bytes_written += outcome.bytes;
            match outcome.result {
                Ok(()) => {
                    debug!(pattern = pattern.as_str(), bytes = outcome.bytes, "worker finished");
                }
                Err(CoalMineError::Cancelled) => {
                    debug!(pattern = pattern.as_str(), bytes = outcome.bytes, "worker cancelled");
                    if report.error.is_none() {
                        report.error = Some(CoalMineError::Cancelled);
                    }
                }
                Err(e) => {
                    error!(
                        pattern = pattern.as_str(),
                        bytes = outcome.bytes,
                        error = %e,
                        "worker failed"
                    );
                    if report.error.is_none() {
                        report.error = Some(e);
                        self.run.cancel();
                    }
                }
            }
        }

        report
    }
}
