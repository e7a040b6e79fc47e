use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn bench_hashes(c: &mut Criterion) {
    let mut group = c.benchmark_group("crypto_hash");

    for size in [32usize, 1024, 16 * 1024] {
        let data = vec![0xabu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("sha2_256", size), &data, |b, data| {
            b.iter(|| tessera_crypto::sha2_256(black_box(data)))
        });
        group.bench_with_input(BenchmarkId::new("keccak_256", size), &data, |b, data| {
            b.iter(|| tessera_crypto::keccak_256(black_box(data)))
        });
        group.bench_with_input(BenchmarkId::new("blake2_256", size), &data, |b, data| {
            b.iter(|| tessera_crypto::blake2_256(black_box(data)))
        });
        group.bench_with_input(BenchmarkId::new("blake2_128", size), &data, |b, data| {
            b.iter(|| tessera_crypto::blake2_128(black_box(data)))
        });
    }

    group.finish();
}

fn bench_eth_address(c: &mut Criterion) {
    // Compressed public key of the secret scalar 1.
    let mut key = [0u8; 33];
    key[0] = 0x02;
    key[1..].copy_from_slice(&[
        0x79, 0xbe, 0x66, 0x7e, 0xf9, 0xdc, 0xbb, 0xac, 0x55, 0xa0, 0x62, 0x95, 0xce, 0x87, 0x0b, 0x07,
        0x02, 0x9b, 0xfc, 0xdb, 0x2d, 0xce, 0x28, 0xd9, 0x59, 0xf2, 0x81, 0x5b, 0x16, 0xf8, 0x17, 0x98,
    ]);

    c.bench_function("crypto_ecdsa_to_eth_address", |b| {
        b.iter(|| tessera_crypto::ecdsa_to_eth_address(black_box(&key)))
    });
}

criterion_group!(benches, bench_hashes, bench_eth_address);
criterion_main!(benches);
