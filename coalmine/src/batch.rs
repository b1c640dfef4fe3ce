//! Batch orchestrator: writes every group's full historical window.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::group::GeneratorGroup;
use crate::sink::Destination;
use crate::supervisor::{RunReport, Supervisor, WorkerOutcome};
use crate::writer::write_all;

/// Writes all points of all `groups` to `dest`, one task per group.
///
/// Each worker advances its group and writes one tick at a time until the
/// window is over. The first worker failure, or cancellation of `cancel`,
/// stops the remaining workers before their next write and becomes the
/// report's terminal error ([`crate::CoalMineError::Cancelled`] for `cancel`).
/// Empty groups are skipped.
pub async fn run_batch<D: Destination>(
    groups: Vec<GeneratorGroup>,
    dest: Arc<D>,
    cancel: CancellationToken,
) -> RunReport {
    let mut supervisor = Supervisor::new(&cancel);
    for group in groups {
        if group.is_empty() {
            debug!(pattern = group.pattern(), "skipping group without series");
            continue;
        }
        let pattern = group.pattern().to_string();
        let series = group.len();
        let worker = batch_worker(group, Arc::clone(&dest), supervisor.token());
        supervisor.spawn(pattern, series, worker);
    }

    info!(
        groups = supervisor.workers(),
        series = supervisor.series(),
        "starting batch generation"
    );
    let report = supervisor.wait(&cancel, true).await;
    info!(
        bytes = report.bytes_written,
        series = report.series,
        ok = report.is_success(),
        "batch generation finished"
    );
    report
}

async fn batch_worker<D: Destination>(
    mut group: GeneratorGroup,
    dest: Arc<D>,
    token: CancellationToken,
) -> WorkerOutcome {
    let mut bytes = 0u64;
    let result = write_all(&mut group, dest.as_ref(), &token, &mut bytes).await;
    WorkerOutcome { bytes, result }
}
