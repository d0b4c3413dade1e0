//! Circular buffer hot-path benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use skein_core::cbuf::CBuf;

fn bench_push_back(c: &mut Criterion) {
    c.bench_function("cbuf_push_back_small", |b| {
        let mut buf: CBuf<f32, 64> = CBuf::new();
        let mut x = 0.0f32;
        b.iter(|| {
            x += 1.0;
            buf.push_back(black_box(x));
        });
    });

    c.bench_function("cbuf_push_back_large", |b| {
        let mut buf: CBuf<f32, 4096> = CBuf::new();
        let mut x = 0.0f32;
        b.iter(|| {
            x += 1.0;
            buf.push_back(black_box(x));
        });
    });
}

fn bench_indexing(c: &mut Criterion) {
    let mut buf: CBuf<f32, 4096> = CBuf::new();
    for i in 0..6000 {
        buf.push_back(i as f32);
    }
    c.bench_function("cbuf_index_wrapped", |b| {
        let mut i = 0usize;
        b.iter(|| {
            i = (i + 1) % buf.len();
            black_box(buf[i])
        });
    });
}

fn bench_subspan(c: &mut Criterion) {
    let mut buf: CBuf<f32, 4096> = CBuf::new();
    for i in 0..6000 {
        buf.push_back(i as f32);
    }
    c.bench_function("cbuf_subspan_10", |b| {
        b.iter(|| {
            let span = buf.subspan(black_box(2000), 10);
            black_box(span.head.len() + span.tail.len())
        });
    });
    c.bench_function("cbuf_tail_full", |b| {
        b.iter(|| {
            let span = buf.tail_span(black_box(buf.len()));
            black_box(span.len())
        });
    });
}

criterion_group!(benches, bench_push_back, bench_indexing, bench_subspan);
criterion_main!(benches);
