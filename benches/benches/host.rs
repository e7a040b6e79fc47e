use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use tessera_types::{Address, Weight};
use tessera_vm::testing::MockChain;
use tessera_vm::{InMemoryStore, WasmRuntime, WasmRuntimeConfig};

const STORAGE_LOOP: &str = r#"
    (module
        (import "seal2" "set_storage" (func $set (param i32 i32 i32 i32) (result i32)))
        (import "seal1" "get_storage" (func $get (param i32 i32 i32 i32) (result i32)))
        (import "env" "memory" (memory 1 1))
        (func (export "deploy"))
        (func (export "call")
            (local $i i32)
            (loop $next
                (i32.store (i32.const 0) (local.get $i))
                (drop (call $set (i32.const 0) (i32.const 4) (i32.const 64) (i32.const 32)))
                (i32.store (i32.const 124) (i32.const 64))
                (drop (call $get (i32.const 0) (i32.const 4) (i32.const 128) (i32.const 124)))
                (local.set $i (i32.add (local.get $i) (i32.const 1)))
                (br_if $next (i32.lt_u (local.get $i) (i32.const 100)))))
    )
"#;

fn bench_host(c: &mut Criterion) {
    let mut group = c.benchmark_group("host");
    let runtime = WasmRuntime::new(WasmRuntimeConfig::default()).unwrap();
    let code = wat::parse_str(STORAGE_LOOP).unwrap();
    let chain = Arc::new(MockChain::new());

    group.bench_function("prepare", |b| b.iter(|| runtime.prepare(&code).unwrap()));

    let prepared = runtime.prepare(&code).unwrap();
    group.bench_function("storage_loop_100", |b| {
        b.iter_batched(
            || {
                runtime.context(
                    Address::from_bytes([1; 32]),
                    Address::from_bytes([2; 32]),
                    Weight::from_parts(u64::MAX / 2, u64::MAX / 2),
                    Arc::new(InMemoryStore::new()),
                    chain.clone(),
                )
            },
            |ctx| runtime.call(&prepared, ctx).unwrap(),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_host);
criterion_main!(benches);
