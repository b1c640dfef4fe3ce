//! Live orchestrator: an unbounded real-time feed.
//!
//! Every group gets its own ticker. On each tick the group's horizon moves
//! to the current wall-clock second, the points that are due are written and
//! the members that were written advance by one step. Runs until cancelled
//! or until a write fails.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoalMineError;
use crate::group::GeneratorGroup;
use crate::sink::Destination;
use crate::supervisor::{RunReport, Supervisor, WorkerOutcome};
use crate::writer::write_group;

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Streams `groups` to `dest` in real time until `cancel` fires.
///
/// Groups are expected to start at the current time, see
/// [`Config::groups_live`](crate::config::Config::groups_live).
pub async fn run_live<D: Destination>(
    groups: Vec<GeneratorGroup>,
    dest: Arc<D>,
    cancel: CancellationToken,
) -> RunReport {
    run_live_from(groups, dest, unix_now(), cancel).await
}

/// Like [`run_live`], with the wall clock anchored at `now` unix seconds
/// when the run starts and advanced by the tokio clock afterwards.
///
/// External cancellation ends the run without an error. A failed write is
/// the terminal error and stops every other worker.
pub async fn run_live_from<D: Destination>(
    groups: Vec<GeneratorGroup>,
    dest: Arc<D>,
    now: u64,
    cancel: CancellationToken,
) -> RunReport {
    let clock = Clock {
        anchor: Instant::now(),
        unix: now,
    };

    let mut supervisor = Supervisor::new(&cancel);
    for group in groups {
        let pattern = group.pattern().to_string();
        let series = group.len();
        let worker = live_worker(group, Arc::clone(&dest), clock, supervisor.token());
        supervisor.spawn(pattern, series, worker);
    }

    info!(
        groups = supervisor.workers(),
        series = supervisor.series(),
        "starting live generation"
    );
    let report = supervisor.wait(&cancel, false).await;
    info!(
        bytes = report.bytes_written,
        series = report.series,
        ok = report.is_success(),
        "live generation finished"
    );
    report
}

/// Wall clock derived from the tokio clock, so paused-time tests advance it.
#[derive(Debug, Clone, Copy)]
struct Clock {
    anchor: Instant,
    unix: u64,
}

impl Clock {
    fn now(&self) -> u64 {
        self.unix + self.anchor.elapsed().as_secs()
    }
}

async fn live_worker<D: Destination>(
    mut group: GeneratorGroup,
    dest: Arc<D>,
    clock: Clock,
    token: CancellationToken,
) -> WorkerOutcome {
    let tick = group.tick_interval();
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut bytes = 0u64;

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => break,
            _ = interval.tick() => {}
        }
        if group.is_empty() {
            continue;
        }

        group.set_stop(clock.now());
        let started = Instant::now();
        match write_group(&mut group, dest.as_ref()).await {
            Ok(n) => bytes += n,
            Err(e) => {
                let e = CoalMineError::from(e);
                bytes += e.bytes_written();
                return WorkerOutcome { bytes, result: Err(e) };
            }
        }
        let elapsed = started.elapsed();
        if elapsed > tick {
            warn!(
                pattern = group.pattern(),
                ?elapsed,
                ?tick,
                "write took longer than the tick interval"
            );
        }

        let advanced = group.advance_each();
        if advanced < group.len() {
            debug!(
                pattern = group.pattern(),
                advanced,
                waiting = group.len() - advanced,
                "series waiting for the horizon"
            );
        }
    }

    WorkerOutcome {
        bytes,
        result: Ok(()),
    }
}
