use crate::container::{KernelMetaInfo, KernelType};
use crate::error::DispatchResult;

use super::runtime::{DeviceImage, DeviceRuntime, FunctionHandle, SymbolBinding};

/// Parsed and bound device code for one kernel on the current device.
#[derive(Debug)]
pub struct BinHandle {
    meta: KernelMetaInfo<'static>,
    family: &'static str,
    function: FunctionHandle,
}

impl BinHandle {
    /// Binds `meta` through `runtime`. Single-kernel images bind their one function,
    /// multi-kernel images register every function.
    pub fn bind(
        kernel: &'static str,
        family: &'static str,
        meta: KernelMetaInfo<'static>,
        runtime: &dyn DeviceRuntime,
    ) -> DispatchResult<Self> {
        let binding = match meta.kernel_names.as_slice() {
            [only] => SymbolBinding::Single(only),
            _ => SymbolBinding::All,
        };
        let image = DeviceImage {
            kernel,
            magic: meta.header.magic,
            version: meta.header.version,
            code: meta.code,
        };
        let function = runtime.bind(&image, binding)?;
        tracing::debug!(
            kernel,
            family,
            functions = meta.kernel_names.len(),
            code_bytes = meta.code.len(),
            "bound device code"
        );
        Ok(BinHandle {
            meta,
            family,
            function,
        })
    }

    pub fn meta(&self) -> &KernelMetaInfo<'static> {
        &self.meta
    }

    pub fn family(&self) -> &'static str {
        self.family
    }

    pub fn function(&self) -> FunctionHandle {
        self.function
    }

    pub fn tiling_size(&self) -> u64 {
        self.meta.tiling_size()
    }

    pub fn kernel_type(&self) -> KernelType {
        self.meta.kernel_type()
    }
}
