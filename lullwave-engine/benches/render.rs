//! Render throughput of a running session.
//!
//! Run:
//! - cargo bench -p lullwave-engine
//! - cargo bench -p lullwave-engine --features fast-math

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lullwave_engine::{Composer, ComposerConfig, OfflineHost};

const FS: f32 = 48_000.0;
const BLOCK_LENS: [usize; 3] = [64, 256, 1024];
const POINTS: [(f32, f32); 4] = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];

/// A session that has been running long enough to have every pool busy.
fn warm_composer(x: f32, y: f32) -> Composer {
    let mut c = Composer::new(ComposerConfig { seed: Some(7), initial_point: [x, y], ..ComposerConfig::default() });
    c.init(&mut OfflineHost::new(FS)).expect("offline init");
    c.start();
    let mut warm = vec![0.0; 4096];
    for _ in 0..(20.0 * FS / 4096.0) as usize {
        c.render(&mut warm);
    }
    c
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("composer_render");
    group.sample_size(30);

    for &(x, y) in &POINTS {
        for &block_len in &BLOCK_LENS {
            let mut composer = warm_composer(x, y);
            let mut out = vec![0.0; block_len];
            let id = BenchmarkId::new("case", format!("x{x}_y{y}_b{block_len}"));
            group.bench_function(id, |b| {
                b.iter(|| {
                    composer.render(black_box(&mut out));
                    black_box(out[block_len - 1]);
                })
            });
        }
    }
    group.finish();
}

fn bench_control(c: &mut Criterion) {
    let mut composer = warm_composer(0.5, 0.5);
    let mut flip = false;
    c.bench_function("composer_control_second", |b| {
        b.iter(|| {
            flip = !flip;
            composer.set_xy(if flip { 0.9 } else { 0.1 }, 0.5);
            composer.advance(black_box(1.0));
        })
    });
}

criterion_group!(benches, bench_render, bench_control);
criterion_main!(benches);
