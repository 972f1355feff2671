//! Criterion benchmarks for one sampling iteration
//!
//! Run with: cargo bench -p lcimc_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use lcimc_core::model::{Activity, ActivityKey, Dataset, Exchange, Flow, FlowKey, Uncertainty};
use lcimc_core::provider::MatrixProvider;
use lcimc_core::sampling::SampleEngine;
use lcimc_core::solver::{SolverStage, inventory};

/// A chain of `n` activities, each consuming its predecessor and emitting one flow
fn chain_dataset(n: usize) -> Dataset {
    let key = |i: usize| ActivityKey::new("bench", format!("a{i}"));
    let activities = (0..n)
        .map(|i| {
            let mut exchanges = vec![Exchange::Biosphere {
                input: FlowKey::new("bio", format!("f{}", i % 10)),
                amount: 1.0,
                uncertainty: Uncertainty::Normal {
                    loc: 1.0,
                    scale: 0.1,
                },
            }];
            if i > 0 {
                exchanges.push(Exchange::Technosphere {
                    input: key(i - 1),
                    amount: 0.5,
                    uncertainty: Uncertainty::Uniform {
                        minimum: 0.4,
                        maximum: 0.6,
                    },
                });
            }
            Activity {
                key: key(i),
                name: format!("activity {i}"),
                unit: "unit".into(),
                exchanges,
            }
        })
        .collect();
    let flows = (0..10)
        .map(|i| Flow {
            key: FlowKey::new("bio", format!("f{i}")),
            name: format!("flow {i}"),
            unit: "kilogram".into(),
            categories: vec!["air".into()],
        })
        .collect();
    Dataset {
        name: "bench".into(),
        activities,
        flows,
    }
}

fn bench_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("rebuild");
    for size in [100, 1_000] {
        let data = chain_dataset(size).load_matrices().unwrap();
        let mut engine = SampleEngine::new(&data, 1).unwrap();
        let mut matrices = data.matrices.clone();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| engine.rebuild(black_box(&mut matrices)))
        });
    }
    group.finish();
}

fn bench_iteration(c: &mut Criterion) {
    let mut group = c.benchmark_group("factorize_and_solve");
    for size in [100, 1_000] {
        let data = chain_dataset(size).load_matrices().unwrap();
        let last = ActivityKey::new("bench", format!("a{}", size - 1));
        let row = data.index.products.get(&last).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let solver = SolverStage::factorize(black_box(&data.matrices.technosphere)).unwrap();
                let supply = solver.supply(row, 1.0, &last).unwrap();
                inventory(&data.matrices.biosphere, &supply)
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_rebuild, bench_iteration);
criterion_main!(benches);
