//! Criterion micro-benchmarks for path lookups over long blocked lines.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use timetree_core::{Path, Rounding};
use timetree_test_utils::{tally_line, Tally, TallyProfile};

/// Benchmark: indexed access into a 10K-node single-block line.
fn bench_at_single_block_10k(c: &mut Criterion) {
    let (tree, nodes) = tally_line(10_000, TallyProfile::Add(1));
    let mut path = Path::containing(&tree, nodes[0]).unwrap();

    c.bench_function("path_at_single_block_10k", |b| {
        b.iter(|| {
            for i in (0..10_000isize).step_by(97) {
                black_box(path.at(&tree, i).unwrap());
            }
        });
    });
}

/// Benchmark: clock lookups on a 10K-node line split by a fork every
/// 100 nodes.
fn bench_clock_lookup_forked_10k(c: &mut Criterion) {
    let (mut tree, nodes) = tally_line(10_000, TallyProfile::Add(1));
    for &fork in nodes.iter().step_by(100).skip(1) {
        tree.add_state(Tally::new(-1), Some(fork), Some(TallyProfile::Add(2)))
            .unwrap();
    }
    let mut path = Path::new(nodes[0]);
    path.modify_to_include(&tree, nodes[9_999]).unwrap();

    c.bench_function("path_node_by_clock_forked_10k", |b| {
        b.iter(|| {
            for clock in (0..10_000).step_by(89) {
                let found = path
                    .node_by_clock(&tree, clock as f64 + 0.5, Rounding::Low, None)
                    .unwrap();
                black_box(found);
            }
        });
    });
}

criterion_group!(benches, bench_at_single_block_10k, bench_clock_lookup_forked_10k);
criterion_main!(benches);
