//! Lane-faithful CPU kernel
//!
//! Executes the exact per-lane semantics of the parallel program on the
//! host: every lane walks its own nonce window, splices candidates into the
//! block, runs the single-block compression, and writes one interleaved
//! record. Lanes are spread across threads and never share mutable state;
//! each thread owns a disjoint slice of the output records.
//!
//! Besides serving as a fallback backend, this kernel is the testable twin
//! of the shader: both must reproduce the reference digest bit-for-bit.

use super::{check_capacity, HashKernel, KernelGrid};
use crate::block::MessageBlock;
use crate::channel::{self, ResultChannel, LANE_STRIDE, NONCE_SENTINEL};
use crate::types::{Digest, DifficultyTarget, DispatchBatch};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::debug;

const H0: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

const K: [u32; 64] = [
    0x428a2f98, 0x71374491, 0xb5c0fbcf, 0xe9b5dba5, 0x3956c25b, 0x59f111f1, 0x923f82a4, 0xab1c5ed5,
    0xd807aa98, 0x12835b01, 0x243185be, 0x550c7dc3, 0x72be5d74, 0x80deb1fe, 0x9bdc06a7, 0xc19bf174,
    0xe49b69c1, 0xefbe4786, 0x0fc19dc6, 0x240ca1cc, 0x2de92c6f, 0x4a7484aa, 0x5cb0a9dc, 0x76f988da,
    0x983e5152, 0xa831c66d, 0xb00327c8, 0xbf597fc7, 0xc6e00bf3, 0xd5a79147, 0x06ca6351, 0x14292967,
    0x27b70a85, 0x2e1b2138, 0x4d2c6dfc, 0x53380d13, 0x650a7354, 0x766a0abb, 0x81c2c92e, 0x92722c85,
    0xa2bfe8a1, 0xa81a664b, 0xc24b8b70, 0xc76c51a3, 0xd192e819, 0xd6990624, 0xf40e3585, 0x106aa070,
    0x19a4c116, 0x1e376c08, 0x2748774c, 0x34b0bcb5, 0x391c0cb3, 0x4ed8aa4a, 0x5b9cca4f, 0x682e6ff3,
    0x748f82ee, 0x78a5636f, 0x84c87814, 0x8cc70208, 0x90befffa, 0xa4506ceb, 0xbef9a3f7, 0xc67178f2,
];

#[inline]
fn rotr(x: u32, n: u32) -> u32 {
    (x >> n) | (x << (32 - n))
}

#[inline]
fn ch(x: u32, y: u32, z: u32) -> u32 {
    (x & y) ^ (!x & z)
}

#[inline]
fn maj(x: u32, y: u32, z: u32) -> u32 {
    (x & y) ^ (x & z) ^ (y & z)
}

#[inline]
fn bsig0(x: u32) -> u32 {
    rotr(x, 2) ^ rotr(x, 13) ^ rotr(x, 22)
}

#[inline]
fn bsig1(x: u32) -> u32 {
    rotr(x, 6) ^ rotr(x, 11) ^ rotr(x, 25)
}

#[inline]
fn ssig0(x: u32) -> u32 {
    rotr(x, 7) ^ rotr(x, 18) ^ (x >> 3)
}

#[inline]
fn ssig1(x: u32) -> u32 {
    rotr(x, 17) ^ rotr(x, 19) ^ (x >> 10)
}

/// Single-block SHA-256 compression over 16 big-endian words.
///
/// All arithmetic is 32-bit wraparound; this must match the reference
/// primitive bit-for-bit for every input the block builder can produce.
pub fn compress_block(block: &[u32; 16]) -> [u32; 8] {
    let mut w = [0u32; 64];
    w[..16].copy_from_slice(block);
    for i in 16..64 {
        w[i] = ssig1(w[i - 2])
            .wrapping_add(w[i - 7])
            .wrapping_add(ssig0(w[i - 15]))
            .wrapping_add(w[i - 16]);
    }

    let [mut a, mut b, mut c, mut d, mut e, mut f, mut g, mut h] = H0;
    for i in 0..64 {
        let t1 = h
            .wrapping_add(bsig1(e))
            .wrapping_add(ch(e, f, g))
            .wrapping_add(K[i])
            .wrapping_add(w[i]);
        let t2 = bsig0(a).wrapping_add(maj(a, b, c));
        h = g;
        g = f;
        f = e;
        e = d.wrapping_add(t1);
        d = c;
        c = b;
        b = a;
        a = t1.wrapping_add(t2);
    }

    [
        H0[0].wrapping_add(a),
        H0[1].wrapping_add(b),
        H0[2].wrapping_add(c),
        H0[3].wrapping_add(d),
        H0[4].wrapping_add(e),
        H0[5].wrapping_add(f),
        H0[6].wrapping_add(g),
        H0[7].wrapping_add(h),
    ]
}

fn run_lane(
    block: &MessageBlock,
    target: &DifficultyTarget,
    batch: &DispatchBatch,
    lane: u32,
    record: &mut [u32],
) {
    record[channel::NONCE] = NONCE_SENTINEL;
    let mut word0 = 0u32;
    for k in 0..batch.nonces_per_lane() {
        let candidate = batch.base_nonce() + lane * batch.nonces_per_lane() + k;
        let words = block.words_with_nonce(candidate);
        let digest = compress_block(&words);
        word0 = digest[0];
        if target.matches(&Digest::new(digest)) {
            record[channel::NONCE] = candidate;
            if target.wants_full_digest() {
                record[channel::DIGEST..channel::DIGEST + 8].copy_from_slice(&digest);
            } else {
                record[channel::DIGEST] = digest[0];
            }
            break;
        }
    }
    // inert visualization channel, one byte of the last digest word per component
    record[channel::VISUAL] = word0 >> 24;
    record[channel::VISUAL + 1] = (word0 >> 16) & 0xff;
    record[channel::VISUAL + 2] = (word0 >> 8) & 0xff;
    record[channel::VISUAL + 3] = word0 & 0xff;
}

fn compute_records(
    block: &MessageBlock,
    target: &DifficultyTarget,
    batch: DispatchBatch,
    threads: usize,
) -> Vec<u32> {
    let lane_count = batch.lane_count() as usize;
    let mut raw = vec![0u32; lane_count * LANE_STRIDE];

    let threads = threads.clamp(1, lane_count);
    let lanes_per_thread = lane_count.div_ceil(threads);

    std::thread::scope(|scope| {
        for (chunk_index, chunk) in raw.chunks_mut(lanes_per_thread * LANE_STRIDE).enumerate() {
            let first_lane = (chunk_index * lanes_per_thread) as u32;
            scope.spawn(move || {
                for (i, record) in chunk.chunks_mut(LANE_STRIDE).enumerate() {
                    run_lane(block, target, &batch, first_lane + i as u32, record);
                }
            });
        }
    });

    raw
}

/// CPU backend simulating the compute grid with a thread pool
pub struct CpuKernel {
    grid: KernelGrid,
    threads: usize,
}

impl CpuKernel {
    /// Create a CPU kernel; `threads == 0` selects one thread per core
    pub fn new(grid: KernelGrid, threads: usize) -> Self {
        let threads = if threads == 0 {
            num_cpus::get()
        } else {
            threads
        };
        debug!("creating cpu kernel: {} threads", threads);
        Self { grid, threads }
    }
}

#[async_trait]
impl HashKernel for CpuKernel {
    fn backend(&self) -> &'static str {
        "cpu"
    }

    fn grid(&self) -> KernelGrid {
        self.grid
    }

    async fn dispatch(
        &self,
        block: &MessageBlock,
        target: &DifficultyTarget,
        batch: DispatchBatch,
    ) -> Result<ResultChannel> {
        check_capacity(self.grid, &batch)?;

        let block = *block;
        let target = *target;
        let threads = self.threads;
        let raw =
            tokio::task::spawn_blocking(move || compute_records(&block, &target, batch, threads))
                .await
                .map_err(|_| Error::cancelled("cpu lane pool"))?;

        ResultChannel::from_raw(raw, batch.lane_count(), target.wants_full_digest())
    }
}
