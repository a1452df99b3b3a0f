//! Device kernels: the implementor-facing trait plus the Clone -> Init -> Run machinery.

mod args;
mod bound;
mod info;
mod instance;

use crate::error::DispatchResult;
use crate::launch::LaunchParam;

pub use args::{binary_layout, default_args_index, indexed_layout, symbol_layout, ArgsLayout};
pub use bound::BoundKernel;
pub use info::{
    align64, ConstTensorInfo, KernelInfo, KernelInfoSummary, MemsetInfo, MAX_ARGS_SIZE,
    MAX_TILING_SIZE,
};
pub use instance::{KernelInstance, KernelState};

/// Library that hosts CPU-side kernels resolved by symbol on the device.
pub const DEFAULT_AICPU_SO: &str = "libasdops_aicpu_kernels.so";

/// How a kernel reaches the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchMode {
    /// Through the bound binary handle, with inline tiling bytes in the argument block.
    Binary,
    /// Resolved on the device by library and symbol name.
    Symbol {
        so_name: &'static str,
        kernel_name: &'static str,
    },
    /// Through the bound binary handle, with one descriptor per tensor, scratch buffer
    /// and tiling buffer placed at the word offsets of [`KernelInfo::args_index`].
    /// Tiling stays on the device; supply it with [`KernelInfo::set_external_tiling`].
    Indexed,
}

/// One device kernel implementation.
///
/// A registered kernel keeps no per-invocation state: everything an invocation
/// computes lands in the [`KernelInfo`] owned by its [`KernelInstance`]. The same
/// object may be queried from many threads at once.
pub trait Kernel: Send + Sync {
    /// Pure predicate over dtypes, formats and dims of the launch tensors.
    fn can_support(&self, param: &LaunchParam) -> bool;

    /// Bytes of host tiling needed for `param`. `packaged` is the size declared by
    /// the binary container, already rounded up to 8.
    fn tiling_size(&self, param: &LaunchParam, packaged: u64) -> u64 {
        let _ = param;
        packaged
    }

    fn launch_with_tiling(&self) -> bool {
        true
    }

    fn launch_mode(&self) -> LaunchMode {
        LaunchMode::Binary
    }

    /// Fills tiling bytes, block dim, scratch sizes and the rest of `info`.
    fn init(&self, param: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()>;
}

/// Produces a fresh kernel object. Registered statically, called once per clone.
pub type KernelFactory = fn() -> Box<dyn Kernel>;
