use std::fmt;

use crate::error::{DispatchError, DispatchResult, RuntimeStatus};
use crate::launch::StreamHandle;

/// Device code handed to the runtime for binding.
#[derive(Debug, Clone, Copy)]
pub struct DeviceImage<'a> {
    pub kernel: &'a str,
    pub magic: u32,
    pub version: u32,
    pub code: &'a [u8],
}

/// Which functions of an image to bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolBinding<'a> {
    /// Bind one function by name; launches go through the function stub.
    Single(&'a str),
    /// Register every function in a multi-kernel image; launches select one by tiling key.
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    Function,
    Image,
}

/// Opaque runtime handle; stored as an integer so bound kernels stay `Send + Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionHandle {
    pub raw: u64,
    pub kind: HandleKind,
}

/// Describes a constant tensor living inside the argument block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostInputInfo {
    pub addr_offset: u32,
    pub data_offset: u32,
}

/// Where the inline tiling pointer slot and tiling payload sit in the argument block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilingOffsets {
    pub addr_offset: u32,
    pub data_offset: u32,
}

/// One enqueue call.
#[derive(Debug, Clone, Copy)]
pub enum LaunchRequest<'a> {
    Function {
        handle: FunctionHandle,
        tiling_key: u64,
        block_dim: u32,
        args: &'a [u8],
        tiling: Option<TilingOffsets>,
        host_inputs: &'a [HostInputInfo],
    },
    /// Kernels resolved on the device by library and symbol name.
    Symbol {
        block_dim: u32,
        args: &'a [u8],
        so_name_offset: u32,
        kernel_name_offset: u32,
    },
}

impl LaunchRequest<'_> {
    pub fn args(&self) -> &[u8] {
        match self {
            LaunchRequest::Function { args, .. } | LaunchRequest::Symbol { args, .. } => args,
        }
    }

    pub fn block_dim(&self) -> u32 {
        match self {
            LaunchRequest::Function { block_dim, .. } | LaunchRequest::Symbol { block_dim, .. } => {
                *block_dim
            }
        }
    }
}

/// The narrow contract between the dispatch engine and a physical device runtime.
///
/// Implementations must be shareable across threads: bound kernels keep handles
/// produced here and launch from whichever thread runs a clone.
pub trait DeviceRuntime: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Identity string of the current device, e.g. `Ascend910B2`.
    fn soc_version(&self) -> DispatchResult<String>;

    fn bind(&self, image: &DeviceImage<'static>, binding: SymbolBinding<'_>)
        -> DispatchResult<FunctionHandle>;

    /// Enqueues one kernel on `stream`. Success means enqueued, not completed.
    fn launch(&self, request: &LaunchRequest<'_>, stream: StreamHandle) -> Result<(), RuntimeStatus>;

    /// Device address patched into a kernel's hardware-sync argument slot.
    fn c2c_ctrl_addr(&self) -> DispatchResult<u64> {
        Err(DispatchError::runtime(
            "c2c_ctrl_addr",
            format!("{} has no hardware sync support", self.name()),
        ))
    }

    /// Zeroes `bytes` at `addr` before the kernel consuming it runs on `stream`.
    fn memset_async(&self, addr: u64, bytes: u64, stream: StreamHandle) -> Result<(), RuntimeStatus> {
        let _ = (addr, bytes, stream);
        Err(RuntimeStatus(-1))
    }
}

impl fmt::Debug for dyn DeviceRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRuntime")
            .field("name", &self.name())
            .finish()
    }
}
