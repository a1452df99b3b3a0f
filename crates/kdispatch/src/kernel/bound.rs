use std::fmt;
use std::sync::Arc;

use super::instance::KernelInstance;
use super::{Kernel, KernelFactory};
use crate::container::KernelType;
use crate::device::{BinHandle, DeviceRuntime};
use crate::launch::LaunchParam;

/// A registered kernel whose device code is bound on the current device.
///
/// Cheap to clone and shared by every thread that asks its operation for kernels.
/// Nothing in here changes after loading.
#[derive(Clone)]
pub struct BoundKernel {
    inner: Arc<BoundKernelInner>,
}

struct BoundKernelInner {
    name: &'static str,
    op_name: &'static str,
    handle: BinHandle,
    factory: KernelFactory,
    prototype: Box<dyn Kernel>,
    runtime: Arc<dyn DeviceRuntime>,
}

impl BoundKernel {
    pub(crate) fn new(
        name: &'static str,
        op_name: &'static str,
        handle: BinHandle,
        factory: KernelFactory,
        runtime: Arc<dyn DeviceRuntime>,
    ) -> Self {
        BoundKernel {
            inner: Arc::new(BoundKernelInner {
                name,
                op_name,
                handle,
                factory,
                prototype: factory(),
                runtime,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn op_name(&self) -> &'static str {
        self.inner.op_name
    }

    pub fn handle(&self) -> &BinHandle {
        &self.inner.handle
    }

    pub fn kernel_type(&self) -> KernelType {
        self.inner.handle.kernel_type()
    }

    pub(crate) fn runtime(&self) -> &dyn DeviceRuntime {
        self.inner.runtime.as_ref()
    }

    /// Asks the shared kernel object; no per-invocation state is touched.
    pub fn can_support(&self, param: &LaunchParam) -> bool {
        self.inner.prototype.can_support(param)
    }

    /// A fresh instance with its own kernel object and empty kernel info.
    pub fn clone_instance(&self) -> KernelInstance {
        KernelInstance::new(self.clone(), (self.inner.factory)())
    }
}

impl fmt::Debug for BoundKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundKernel")
            .field("name", &self.inner.name)
            .field("op_name", &self.inner.op_name)
            .field("family", &self.inner.handle.family())
            .field("kernel_type", &self.kernel_type())
            .finish()
    }
}
