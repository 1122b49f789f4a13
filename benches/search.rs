//! Benchmarks for the hash-search hot paths

use criterion::{criterion_group, criterion_main, Criterion};
use gridhash::block::MessageBlock;
use gridhash::crypto;
use gridhash::kernel::{cpu::compress_block, CpuKernel, HashKernel, KernelGrid};
use gridhash::types::{DifficultyTarget, DispatchBatch};
use std::hint::black_box;

fn bench_single_hash(c: &mut Criterion) {
    let prefix = [0xABu8; 32];
    let block = MessageBlock::with_nonce_slot(&prefix).unwrap();

    c.bench_function("compress_block_with_nonce", |b| {
        let mut nonce = 0u32;
        b.iter(|| {
            nonce = nonce.wrapping_add(1);
            black_box(compress_block(&block.words_with_nonce(nonce)))
        })
    });

    c.bench_function("reference_digest_with_nonce", |b| {
        let mut nonce = 0u32;
        b.iter(|| {
            nonce = nonce.wrapping_add(1);
            black_box(crypto::digest_with_nonce(&prefix, nonce))
        })
    });
}

fn bench_cpu_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let kernel = CpuKernel::new(KernelGrid::new(8, 8), 0);
    let block = MessageBlock::with_nonce_slot(&[0xABu8; 32]).unwrap();
    // 32 leading zero bits never hits, so the dispatch does full work
    let target = DifficultyTarget::LeadingZeroBits(32);

    c.bench_function("cpu_dispatch_64_lanes_x16", |b| {
        b.iter(|| {
            let batch = DispatchBatch::new(0, 64, 16).unwrap();
            let channel = runtime
                .block_on(kernel.dispatch(&block, &target, batch))
                .unwrap();
            black_box(channel.first_hit())
        })
    });
}

criterion_group!(benches, bench_single_hash, bench_cpu_dispatch);
criterion_main!(benches);
