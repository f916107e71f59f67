use criterion::{black_box, criterion_group, criterion_main, Criterion};

use trellis_core::reactive::Runtime;

fn signal_write_fan_out(c: &mut Criterion) {
    let rt = Runtime::new();
    let source = rt.signal(0i64);

    let mut effects = Vec::new();
    for _ in 0..32 {
        let s = source.clone();
        effects.push(rt.effect(move || {
            black_box(s.get());
        }));
    }

    let mut n = 0i64;
    c.bench_function("signal write, 32 effects", |b| {
        b.iter(|| {
            n += 1;
            source.set(n);
        })
    });
}

fn memo_chain_refresh(c: &mut Criterion) {
    let rt = Runtime::new();
    let source = rt.signal(0i64);

    let s = source.clone();
    let mut last = rt.memo(move || s.get() + 1);
    for _ in 0..16 {
        let prev = last.clone();
        last = rt.memo(move || prev.get() + 1);
    }
    let tail = last.clone();
    let _effect = rt.effect(move || {
        black_box(tail.get());
    });

    let mut n = 0i64;
    c.bench_function("write through 16 chained memos", |b| {
        b.iter(|| {
            n += 1;
            source.set(n);
        })
    });
}

fn clean_memo_read(c: &mut Criterion) {
    let rt = Runtime::new();
    let source = rt.signal(7i64);
    let s = source.clone();
    let memo = rt.memo(move || s.get() * 2);
    memo.get();

    c.bench_function("clean memo read", |b| {
        b.iter(|| {
            black_box(memo.get());
        })
    });
}

criterion_group!(
    benches,
    signal_write_fan_out,
    memo_chain_refresh,
    clean_memo_read
);
criterion_main!(benches);
