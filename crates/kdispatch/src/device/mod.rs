//! Everything the engine knows about the device it runs on.

mod family;
mod handle;
mod runtime;

pub use family::{family_of, families};
pub use handle::BinHandle;
pub use runtime::{
    DeviceImage, DeviceRuntime, FunctionHandle, HandleKind, HostInputInfo, LaunchRequest,
    SymbolBinding, TilingOffsets,
};
