//! Microbenchmarks for the per-tick hot path: advancing a group and
//! serializing its points, plus pattern expansion.
//!
//! Run with: `cargo bench -p coalmine -- serialize`

#![allow(missing_docs, clippy::cast_possible_truncation)]

use std::collections::HashMap;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use coalmine::expand::expand;
use coalmine::generator::{GeneratorKind, SeriesParams};
use coalmine::group::GeneratorGroup;

/// Builds a group whose window never ends during a benchmark run.
fn setup_group(kind: GeneratorKind, series: u32) -> GeneratorGroup {
    GeneratorGroup::expand(
        kind,
        &format!("bench.host{{1..{series}}}.metric"),
        &HashMap::new(),
        &SeriesParams {
            start: 1_700_000_000,
            stop: u64::MAX - 1,
            step: 10,
            value: 100.0,
            deviation: 5.0,
            ..SeriesParams::default()
        },
    )
    .unwrap()
}

fn bench_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialize/tick");

    for kind in GeneratorKind::ALL {
        for series in [1u32, 100, 1000] {
            let mut generators = setup_group(kind, series);
            let mut buf = Vec::with_capacity(series as usize * 48);

            group.bench_with_input(
                BenchmarkId::new(kind.as_str(), series),
                &series,
                |b, _| {
                    b.iter(|| {
                        buf.clear();
                        generators.next().unwrap();
                        black_box(generators.serialize_into(&mut buf));
                    });
                },
            );
        }
    }

    group.finish();
}

fn bench_expand(c: &mut Criterion) {
    let vars = HashMap::from([("dc".to_string(), "{eu,us,ap}".to_string())]);

    c.bench_function("serialize/expand_cartesian", |b| {
        b.iter(|| {
            black_box(expand(
                black_box("{{dc}}.server{001..100}.cpu{0..7}.{user,system}"),
                &vars,
            ))
        });
    });
}

criterion_group!(benches, bench_tick, bench_expand);
criterion_main!(benches);
