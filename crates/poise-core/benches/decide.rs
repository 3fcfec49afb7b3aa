//! Decision hot-path benchmarks.
//!
//! Measures matcher construction and per-request decisions against policies of
//! growing size, plus the per-origin seeding that runs once per page.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use poise_core::policy::{Dimension, PolicyConfig};
use poise_core::{rng_for_origin, Persona};

const URLS: &[&str] = &[
    "https://www.example.com/index.html",
    "https://cdn.site42.test/api/v1/items?page=2",
    "https://www.google-analytics.com/g/collect?v=2&tid=G-1",
    "https://shop.site7.test/checkout?step=1",
    "https://static.unrelated.test/app.js",
    "https://site13.test/?utm_source=newsletter",
];

fn policy(entries: usize) -> PolicyConfig {
    let mut cfg = PolicyConfig::default();
    for i in 0..entries {
        let _ = cfg.add_entry(Dimension::WhitelistOrigin, &format!("allow{i}.test"));
        let _ = cfg.add_entry(Dimension::BlacklistOrigin, &format!("site{i}.test"));
        let _ = cfg.add_entry(Dimension::BlacklistPath, &format!("site{i}.test/api/v1"));
        let _ = cfg.add_entry(Dimension::WhitelistPattern, &format!("site{i}.test/checkout"));
    }
    cfg
}

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy/decide");

    for size in [0usize, 10, 100, 1000] {
        let matcher = policy(size).matcher();
        group.bench_with_input(BenchmarkId::from_parameter(size), &matcher, |b, m| {
            b.iter(|| {
                for url in URLS {
                    black_box(m.decide(black_box(url)));
                }
            });
        });
    }

    group.finish();
}

fn bench_matcher_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy/matcher_build");

    for size in [10usize, 100, 1000] {
        let cfg = policy(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &cfg, |b, cfg| {
            b.iter(|| black_box(cfg.matcher()));
        });
    }

    group.finish();
}

fn bench_seeding(c: &mut Criterion) {
    c.bench_function("persona/for_origin", |b| {
        b.iter(|| black_box(Persona::for_origin(black_box("https://www.example.com"))));
    });
    c.bench_function("prng/rng_for_origin", |b| {
        b.iter(|| black_box(rng_for_origin(black_box("https://www.example.com"))));
    });
}

criterion_group!(benches, bench_decide, bench_matcher_build, bench_seeding);
criterion_main!(benches);
