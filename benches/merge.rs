//! Benchmarks for CIDR merge performance.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use prefixcache::aggregator::{merge, split_families, V4, V6};
use std::hint::black_box;

/// Consecutive /24s, which fold all the way up
fn generate_siblings(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("10.{}.{}.0/24", (i / 256) % 256, i % 256))
        .collect()
}

/// CIDRs of varying sizes, scattered and partly nested
fn generate_cidrs(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let a = (i * 7 % 223) + 1;
            let b = (i / 223) % 256;
            let prefix = 16 + (i % 17); // Prefix lengths 16-32
            format!("{}.{}.0.0/{}", a, b, prefix)
        })
        .collect()
}

fn generate_v6(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("2001:db8:{:x}::/48", i % 65536))
        .collect()
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");

    for size in [100, 1000, 10000, 50000] {
        let siblings = generate_siblings(size);
        group.bench_with_input(BenchmarkId::new("v4_siblings", size), &siblings, |b, input| {
            b.iter(|| black_box(merge::<V4, _>(input)));
        });

        let cidrs = generate_cidrs(size);
        group.bench_with_input(BenchmarkId::new("v4_mixed", size), &cidrs, |b, input| {
            b.iter(|| black_box(merge::<V4, _>(input)));
        });

        let v6 = generate_v6(size);
        group.bench_with_input(BenchmarkId::new("v6_siblings", size), &v6, |b, input| {
            b.iter(|| black_box(merge::<V6, _>(input)));
        });
    }

    group.finish();
}

fn bench_split_families(c: &mut Criterion) {
    let mut group = c.benchmark_group("split_families");

    for size in [1000, 10000] {
        let mut raw = generate_cidrs(size);
        raw.extend(generate_v6(size));
        raw.push("not-a-prefix".to_string());

        group.bench_with_input(BenchmarkId::new("mixed", size * 2), &raw, |b, input| {
            b.iter(|| black_box(split_families(input)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge, bench_split_families);
criterion_main!(benches);
