//! Hash kernel backends
//!
//! A kernel evaluates SHA-256 over many independent lanes and reports
//! match/no-match against a difficulty target, one interleaved record per
//! lane. Backends share one contract so the engine can drive either the
//! wgpu compute grid or the lane-faithful CPU fallback.

use crate::block::MessageBlock;
use crate::channel::ResultChannel;
use crate::config::{Config, KernelBackend};
use crate::types::{DifficultyTarget, DispatchBatch};
use crate::{Error, Result};
use async_trait::async_trait;

pub mod cpu;
pub mod gpu;

pub use cpu::CpuKernel;
pub use gpu::GpuKernel;

/// Compute-grid dimensions; lanes are addressed in row-major order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelGrid {
    pub width: u32,
    pub height: u32,
}

impl KernelGrid {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Lanes available per dispatch
    pub fn lane_count(&self) -> u32 {
        self.width * self.height
    }
}

/// Parallel hash-search kernel.
///
/// One dispatch covers `batch.lane_count() * batch.nonces_per_lane()`
/// candidate nonces. Lanes execute independently with no ordering guarantee;
/// the only ordering in the system is the host-side scan of the readback.
#[async_trait]
pub trait HashKernel: Send + Sync {
    /// Backend name for logs
    fn backend(&self) -> &'static str;

    /// Grid this kernel was built for
    fn grid(&self) -> KernelGrid;

    /// Run one dispatch and return the host-owned readback.
    ///
    /// Device resources for the dispatch are acquired and released inside
    /// this call, success or failure.
    async fn dispatch(
        &self,
        block: &MessageBlock,
        target: &DifficultyTarget,
        batch: DispatchBatch,
    ) -> Result<ResultChannel>;
}

/// Reject a batch the kernel's grid cannot cover
pub(crate) fn check_capacity(grid: KernelGrid, batch: &DispatchBatch) -> Result<()> {
    if batch.lane_count() > grid.lane_count() {
        return Err(Error::batch(format!(
            "batch wants {} lanes but the grid provides {}",
            batch.lane_count(),
            grid.lane_count()
        )));
    }
    Ok(())
}

/// Create the configured kernel backend
pub async fn create_kernel(config: &Config) -> Result<Box<dyn HashKernel>> {
    let grid = config.grid();
    match config.backend {
        KernelBackend::Cpu => Ok(Box::new(CpuKernel::new(grid, config.threads))),
        KernelBackend::Gpu => Ok(Box::new(
            GpuKernel::new(grid, config.kernel_source.as_deref()).await?,
        )),
    }
}
