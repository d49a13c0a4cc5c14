use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use wbrcu::core::{ArcProtected, MutexProtected, RwLockProtected};
use wbrcu::{Protect, Rcu};

fn bench_read<P: Protect<Vec<u64>>>(c: &mut Criterion, cell: &P) {
    let mut group = c.benchmark_group("read");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::from_parameter(cell.name()), |b| {
        b.iter(|| {
            let guard = cell.read();
            black_box(guard[0]);
        });
    });

    group.finish();
}

fn bench_update<P: Protect<Vec<u64>>>(c: &mut Criterion, cell: &P, label: &str) {
    let mut group = c.benchmark_group("update");
    group.throughput(Throughput::Elements(1));

    group.bench_function(BenchmarkId::new(cell.name(), label), |b| {
        b.iter(|| cell.update(|v| v[0] = v[0].wrapping_add(1)));
    });

    group.finish();
}

fn bench_all(c: &mut Criterion) {
    for (label, size) in [("16B", 2usize), ("4KB", 512)] {
        let payload = vec![0u64; size];

        let rcu = Rcu::new(payload.clone());
        let arc = ArcProtected::new(payload.clone());
        let rwlock = RwLockProtected::new(payload.clone());
        let mutex = MutexProtected::new(payload);

        if size == 2 {
            bench_read(c, &rcu);
            bench_read(c, &arc);
            bench_read(c, &rwlock);
            bench_read(c, &mutex);
        }

        bench_update(c, &rcu, label);
        bench_update(c, &arc, label);
        bench_update(c, &rwlock, label);
        bench_update(c, &mutex, label);
    }
}

criterion_group!(benches, bench_all);
criterion_main!(benches);
