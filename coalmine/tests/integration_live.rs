//! Integration tests for live generation.
//!
//! Time is paused so tick schedules are exact: the wall clock of a live run
//! is anchored at a fixed unix second and advanced by the tokio clock.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use coalmine::sink::Destination;
use coalmine::{CoalMineError, Config, GeneratorGroup, WriteError, run_live_from};
use tokio_util::sync::CancellationToken;

const START: u64 = 1_000;

#[derive(Default)]
struct MemorySink {
    capacity: Option<usize>,
    delay: Option<Duration>,
    writes: Mutex<Vec<Vec<u8>>>,
}

impl MemorySink {
    fn lines(&self) -> Vec<String> {
        let bytes = self.writes.lock().unwrap().concat();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Timestamps written for `name`, in order.
    fn timestamps(&self, name: &str) -> Vec<u64> {
        self.lines()
            .iter()
            .filter_map(|line| {
                let mut fields = line.split(' ');
                (fields.next() == Some(name))
                    .then(|| fields.nth(1))
                    .flatten()
                    .and_then(|ts| ts.parse().ok())
            })
            .collect()
    }
}

impl Destination for MemorySink {
    fn max_payload(&self) -> io::Result<Option<usize>> {
        Ok(None)
    }

    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut writes = self.writes.lock().unwrap();
        let used: usize = writes.iter().map(Vec::len).sum();
        let room = self.capacity.map_or(buf.len(), |cap| cap.saturating_sub(used));
        if room == 0 {
            return Err(io::ErrorKind::ConnectionReset.into());
        }
        let n = room.min(buf.len());
        writes.push(buf[..n].to_vec());
        Ok(n)
    }
}

fn live_groups(patterns: &[&str], step: u64, randomize: bool) -> Vec<GeneratorGroup> {
    let mut config = Config {
        constant: patterns.iter().map(|p| (*p).to_string()).collect(),
        ..Config::default()
    };
    config.general.step = step;
    config.general.randomize = randomize;
    config.general.value = 1.0;
    config.general.deviation = 0.0;
    config.groups_live(START).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_points_follow_the_clock() {
    let sink = Arc::new(MemorySink::default());
    let cancel = CancellationToken::new();

    let run = tokio::spawn(run_live_from(
        live_groups(&["{a,b}"], 10, false),
        Arc::clone(&sink),
        START,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_secs(25)).await;
    cancel.cancel();
    let report = run.await.unwrap();

    // External cancellation is a clean shutdown.
    assert!(report.is_success());
    assert_eq!(report.series, 2);
    assert_eq!(
        sink.lines(),
        ["a 1 1000", "b 1 1000", "a 1 1010", "b 1 1010", "a 1 1020", "b 1 1020"]
    );
    assert_eq!(report.bytes_written, 6 * 9);
}

#[tokio::test(start_paused = true)]
async fn test_randomized_series_keep_their_step() {
    let sink = Arc::new(MemorySink::default());
    let cancel = CancellationToken::new();

    let run = tokio::spawn(run_live_from(
        live_groups(&["r{1..5}"], 10, true),
        Arc::clone(&sink),
        START,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_millis(24_500)).await;
    cancel.cancel();
    assert!(run.await.unwrap().is_success());

    for i in 1..=5 {
        let timestamps = sink.timestamps(&format!("r{i}"));
        assert!(timestamps.len() >= 2, "r{i} wrote {timestamps:?}");
        let first = timestamps[0];
        assert!((START..START + 10).contains(&first));
        for (n, ts) in timestamps.iter().enumerate() {
            assert_eq!(*ts, first + 10 * n as u64);
            assert!(*ts <= START + 24);
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_stops_every_worker() {
    let sink = Arc::new(MemorySink {
        capacity: Some(4),
        ..MemorySink::default()
    });

    let report = run_live_from(
        live_groups(&["first", "second"], 1, false),
        Arc::clone(&sink),
        START,
        CancellationToken::new(),
    )
    .await;

    match report.error {
        Some(CoalMineError::Write(WriteError::Io { source, .. })) => {
            assert_eq!(source.kind(), io::ErrorKind::ConnectionReset);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(report.bytes_written, 4);
}

#[tokio::test(start_paused = true)]
async fn test_empty_group_idles_until_cancelled() {
    let sink = Arc::new(MemorySink::default());
    let cancel = CancellationToken::new();

    let run = tokio::spawn(run_live_from(
        live_groups(&[""], 1, false),
        Arc::clone(&sink),
        START,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(!run.is_finished());

    cancel.cancel();
    let report = run.await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.series, 0);
    assert!(sink.lines().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_slow_write_is_not_interrupted() {
    let sink = Arc::new(MemorySink {
        delay: Some(Duration::from_secs(15)),
        ..MemorySink::default()
    });
    let cancel = CancellationToken::new();

    let run = tokio::spawn(run_live_from(
        live_groups(&["s"], 10, false),
        Arc::clone(&sink),
        START,
        cancel.clone(),
    ));
    tokio::time::sleep(Duration::from_secs(20)).await;
    cancel.cancel();
    let report = run.await.unwrap();

    assert!(report.is_success());
    assert_eq!(sink.lines(), ["s 1 1000", "s 1 1010"]);
}
