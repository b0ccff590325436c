//! Criterion benchmarks for the lowering engine.
//!
//! Measures building and lowering only; no backend is invoked.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use u_mipmodel::lower::ModelBuilder;

// ===========================================================================
// AllDifferent over n variables with domain [0, n)
// ===========================================================================

fn lower_alldifferent(n: i64) -> ModelBuilder {
    let mut mb = ModelBuilder::new();
    let xs: Vec<_> = (0..n).map(|_| mb.int_var(0, n - 1).unwrap()).collect();
    let ad = mb.all_different(xs).unwrap();
    mb.add(ad).unwrap();
    mb
}

fn bench_alldifferent(c: &mut Criterion) {
    let mut group = c.benchmark_group("alldifferent");
    group.sample_size(10);

    for n in [10, 50, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(lower_alldifferent(n)).model().row_count())
        });
    }
    group.finish();
}

// ===========================================================================
// Chain of reified precedences: or(x_i + 3 <= x_{i+1}, x_{i+1} + 3 <= x_i)
// ===========================================================================

fn lower_disjunctions(n: usize) -> ModelBuilder {
    let mut mb = ModelBuilder::new();
    let xs: Vec<_> = (0..n).map(|_| mb.int_var(0, 1_000).unwrap()).collect();
    for w in xs.windows(2) {
        let before = mb.precedence(w[0], w[1], [3]).unwrap();
        let after = mb.precedence(w[1], w[0], [3]).unwrap();
        let either = mb.or(before, after).unwrap();
        mb.add(either).unwrap();
    }
    mb
}

fn bench_disjunctions(c: &mut Criterion) {
    let mut group = c.benchmark_group("disjunctions");
    group.sample_size(10);

    for n in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| black_box(lower_disjunctions(n)).model().row_count())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_alldifferent, bench_disjunctions);
criterion_main!(benches);
