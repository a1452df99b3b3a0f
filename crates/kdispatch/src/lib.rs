//! Kernel dispatch engine for accelerator devices.
//!
//! Operations, kernels and packaged kernel binaries register themselves statically.
//! A [`Loader`] keeps the binaries that match the current device family, binds them
//! through a [`DeviceRuntime`] and wires each kernel to its operation. Callers then
//! infer shapes, pick a kernel and drive it through `clone -> init -> run`.

pub mod container;
pub mod device;
mod env;
pub mod error;
pub mod kernel;
pub mod launch;
pub mod loader;
pub mod operation;
pub mod registry;
pub mod schedule;
pub mod tensor;

pub use linkme;

pub use device::{DeviceRuntime, FunctionHandle, LaunchRequest, SymbolBinding};
pub use error::{DispatchError, DispatchResult, ErrorCode, RuntimeStatus};
pub use kernel::{Kernel, KernelInfo, KernelInstance, KernelState, LaunchMode};
pub use launch::{LaunchParam, RunInfo, StreamHandle};
pub use loader::{Loader, LoaderOptions};
pub use operation::{BoundOperation, KernelTable, Operation};
pub use registry::{Registry, RegistryBuilder};
pub use schedule::{install_runtime, ops, OpSchedule};
pub use tensor::{DType, Format, Tensor, TensorDesc};
