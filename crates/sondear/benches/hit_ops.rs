//! Hit-Recording Benchmarks
//!
//! The statement hook is the hottest path in the system: it runs once per
//! executed statement of the host program.
//!
//! Run with: `cargo bench --bench hit_ops`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sondear::filter::{FilterMode, FilterSet, RuleSpec};
use sondear::registry::UnitRegistry;
use sondear::unit::{UnitDescriptor, UnitIdentity};

fn bench_record_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_line");

    let statement_counts = vec![1_000, 10_000, 100_000];

    for count in statement_counts {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_statements")),
            &count,
            |bench, &n| {
                bench.iter(|| {
                    let mut registry = UnitRegistry::new();
                    let id = registry.register(
                        UnitDescriptor::new(UnitIdentity::file("/app/index.php", 1, 500)),
                        &FilterSet::none(),
                    );
                    for i in 0..n {
                        let line = (i % 500) + 1;
                        let _ = registry.record_line(id, black_box(line));
                    }
                    black_box(registry);
                });
            },
        );
    }

    group.finish();
}

fn bench_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("registration");

    let unit_counts = vec![100, 1_000, 5_000];

    for count in unit_counts {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{count}_units")),
            &count,
            |bench, &n| {
                bench.iter(|| {
                    let mut registry = UnitRegistry::new();
                    let filter = FilterSet::none();
                    for i in 0..n {
                        let descriptor = UnitDescriptor::new(UnitIdentity::file(
                            format!("/app/module_{i}.php"),
                            1,
                            100,
                        ));
                        black_box(registry.register(descriptor, &filter));
                    }
                    black_box(registry);
                });
            },
        );
    }

    group.finish();
}

fn bench_filtered_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("filtered_registration");

    let (filter, _) = FilterSet::compile(
        FilterMode::DenyList,
        &[
            RuleSpec::exclude("/vendor/keep/.*"),
            RuleSpec::include("/vendor/.*"),
        ],
    );

    group.bench_function("deny_list_two_rules", |bench| {
        bench.iter(|| {
            let mut registry = UnitRegistry::new();
            for i in 0..1_000 {
                let path = if i % 3 == 0 {
                    format!("/vendor/lib_{i}.php")
                } else {
                    format!("/app/module_{i}.php")
                };
                let descriptor = UnitDescriptor::new(UnitIdentity::file(path, 1, 100));
                black_box(registry.register(descriptor, &filter));
            }
            black_box(registry);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_record_line,
    bench_registration,
    bench_filtered_registration
);
criterion_main!(benches);
