use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use tessera_types::Address;
use tessera_vm::{InMemoryStore, StateKey, StorageOverlay};

const CONTRACT: Address = Address::from_bytes([2; 32]);

fn keys(n: u32) -> Vec<Vec<u8>> {
    (0..n).map(|i| i.to_le_bytes().repeat(8)).collect()
}

fn bench_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("overlay");
    let keys = keys(1_000);

    group.bench_function("set_1k", |b| {
        b.iter_batched(
            || StorageOverlay::new(CONTRACT, Arc::new(InMemoryStore::new())),
            |mut overlay| {
                for key in &keys {
                    black_box(overlay.set_storage(key, Some(vec![1; 32]), false));
                }
                overlay
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("read_through_1k", |b| {
        let store = Arc::new(InMemoryStore::new());
        for key in &keys {
            store.insert(StateKey::new(&CONTRACT, key), vec![7; 32]);
        }
        b.iter_batched(
            || StorageOverlay::new(CONTRACT, store.clone()),
            |mut overlay| {
                for key in &keys {
                    black_box(overlay.get_storage(key).unwrap());
                }
                overlay
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("changes_1k", |b| {
        let mut overlay = StorageOverlay::new(CONTRACT, Arc::new(InMemoryStore::new()));
        for (i, key) in keys.iter().enumerate() {
            let value = (i % 3 != 0).then(|| vec![1; 32]);
            overlay.set_storage(key, value, false);
        }
        b.iter(|| black_box(overlay.changes()))
    });

    group.finish();
}

criterion_group!(benches, bench_writes);
criterion_main!(benches);
