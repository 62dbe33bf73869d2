use criterion::{black_box, criterion_group, criterion_main, Criterion};
use somnium_core::prelude::*;

fn svf_sweep(c: &mut Criterion) {
    c.bench_function("svf lowpass, swept cutoff, 1 s @ 48k", |b| {
        b.iter(|| {
            let mut svf = SvfTpt::new(400.0, 0.707, 48_000.0);
            let mut acc = 0.0f32;
            for i in 0..48_000 {
                svf.set_cutoff_hz(400.0 + (i % 480) as f32);
                acc += svf.process_lp(black_box(0.5));
            }
            acc
        })
    });
}

fn param_lane(c: &mut Criterion) {
    c.bench_function("param exponential lane, 1 s @ 48k", |b| {
        b.iter(|| {
            let curve = Curve::new().set(0.0).linear_at(0.01, 0.1).exponential_at(1.0, 1.0);
            let mut p = Param::with_curve(0.0, 48_000.0, &curve);
            let mut acc = 0.0f32;
            for _ in 0..48_000 {
                acc += p.next();
            }
            acc
        })
    });
}

criterion_group!(benches, svf_sweep, param_lane);
criterion_main!(benches);
