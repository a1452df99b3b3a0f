#![allow(dead_code)]

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use kdispatch::device::families;
use kdispatch::kernel::{LaunchMode, DEFAULT_AICPU_SO};
use kdispatch::operation::KernelTable;
use kdispatch::registry::{create_kernel, create_operation, RegistryBuilder};
use kdispatch::tensor::{DType, Tensor};
use kdispatch::{
    DispatchError, DispatchResult, Kernel, KernelInfo, KernelInstance, LaunchParam, Loader,
    LoaderOptions, Operation, Registry,
};
use kdispatch_backend_tests::fixtures::{self, SOC_910B};
use kdispatch_backend_tests::RecordingRuntime;

pub const ECHO_TILING_KEY: u64 = 7;

/// Elementwise two-input operation whose output mirrors input 0.
#[derive(Default)]
pub struct EchoOperation;

impl Operation for EchoOperation {
    fn name(&self) -> &str {
        "EchoOperation"
    }

    fn input_num(&self, _: &LaunchParam) -> usize {
        2
    }

    fn infer_shape_impl(&self, param: &LaunchParam, outputs: &mut [Tensor]) -> DispatchResult<()> {
        let input = param.in_tensor(0)?;
        if input.dims().is_empty() {
            return Err(DispatchError::infer_shape("EchoOperation", "input 0 has no dims"));
        }
        outputs[0].desc = input.desc.clone();
        Ok(())
    }

    fn best_kernel(
        &self,
        param: &LaunchParam,
        kernels: &KernelTable<'_>,
    ) -> DispatchResult<KernelInstance> {
        match param.in_tensor(0)?.desc.dtype {
            DType::Float16 => kernels.by_name("EchoKernel"),
            _ => kernels.by_name("EchoWideKernel"),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct EchoTiling {
    pub total: u32,
    pub tiles: u32,
}

#[derive(Default)]
pub struct EchoKernel;

impl Kernel for EchoKernel {
    fn can_support(&self, param: &LaunchParam) -> bool {
        param.in_count() == 2
            && param.out_count() == 1
            && param
                .in_tensors()
                .iter()
                .all(|tensor| tensor.desc.dtype == DType::Float16)
    }

    fn init(&self, param: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()> {
        let total = param.in_tensor(0)?.numel() as u32;
        info.write_tiling(&EchoTiling { total, tiles: 2 })?;
        info.set_block_dim(2)?;
        info.set_tiling_key(ECHO_TILING_KEY);
        info.add_scratch(32);
        Ok(())
    }
}

/// Registered but never packaged, so it is never bound.
#[derive(Default)]
pub struct EchoWideKernel;

impl Kernel for EchoWideKernel {
    fn can_support(&self, _: &LaunchParam) -> bool {
        true
    }

    fn init(&self, _: &LaunchParam, _: &mut KernelInfo) -> DispatchResult<()> {
        Ok(())
    }
}

/// Uses every fixed slot kind: hardware sync, a const tensor and a memset output.
#[derive(Default)]
pub struct SyncKernel;

impl Kernel for SyncKernel {
    fn can_support(&self, param: &LaunchParam) -> bool {
        param.in_count() == 2 && param.out_count() == 1
    }

    fn tiling_size(&self, _: &LaunchParam, packaged: u64) -> u64 {
        packaged + 256
    }

    fn init(&self, _: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()> {
        info.set_hwsync_index(0);
        info.set_const_tensor_offset(64)?;
        info.add_const_tensor(2, &[1.0f32, 2.0, 3.0, 4.0])?;
        info.set_block_dim(1)?;
        // output 0 lands in slot 4: [hwsync, in0, const, in1, out0, tiling]
        info.add_memset(4, 128);
        Ok(())
    }
}

#[derive(Default)]
pub struct SymbolKernel;

impl Kernel for SymbolKernel {
    fn can_support(&self, _: &LaunchParam) -> bool {
        true
    }

    fn launch_mode(&self) -> LaunchMode {
        LaunchMode::Symbol {
            so_name: DEFAULT_AICPU_SO,
            kernel_name: "echo_cpu",
        }
    }

    fn init(&self, _: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()> {
        info.set_block_dim(1)
    }
}

/// Descriptor-table kernel with hardware sync and device-resident tiling.
#[derive(Default)]
pub struct IndexedKernel;

impl Kernel for IndexedKernel {
    fn can_support(&self, _: &LaunchParam) -> bool {
        true
    }

    fn launch_mode(&self) -> LaunchMode {
        LaunchMode::Indexed
    }

    fn init(&self, param: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()> {
        let total = param.in_tensor(0)?.numel() as u32;
        info.set_external_tiling(bytemuck::bytes_of(&EchoTiling { total, tiles: 1 }).to_vec())?;
        info.set_hwsync_index(0);
        info.set_block_dim(1)?;
        // output 0 descriptor: [hwsync, in0 x5, in1 x5, out0 x5, tiling x5]
        info.add_memset(11, 32);
        Ok(())
    }
}

/// Operation registered without any kernel.
#[derive(Default)]
pub struct IdleOperation;

impl Operation for IdleOperation {
    fn name(&self) -> &str {
        "IdleOperation"
    }

    fn infer_shape_impl(&self, _: &LaunchParam, _: &mut [Tensor]) -> DispatchResult<()> {
        Ok(())
    }

    fn best_kernel(
        &self,
        _: &LaunchParam,
        kernels: &KernelTable<'_>,
    ) -> DispatchResult<KernelInstance> {
        kernels.by_name("IdleKernel")
    }
}

/// Reports a different name than the one it is registered under.
#[derive(Default)]
pub struct MisnamedOperation;

impl Operation for MisnamedOperation {
    fn name(&self) -> &str {
        "SomethingElse"
    }

    fn infer_shape_impl(&self, _: &LaunchParam, _: &mut [Tensor]) -> DispatchResult<()> {
        Ok(())
    }

    fn best_kernel(
        &self,
        _: &LaunchParam,
        kernels: &KernelTable<'_>,
    ) -> DispatchResult<KernelInstance> {
        kernels.by_name("none")
    }
}

/// Echo and Idle operations with four kernels, all packaged for `ascend910b`
/// except `EchoWideKernel`.
pub fn echo_registry() -> RegistryBuilder {
    Registry::builder()
        .operation("EchoOperation", create_operation::<EchoOperation>)
        .operation("IdleOperation", create_operation::<IdleOperation>)
        .kernel("EchoOperation", "EchoKernel", create_kernel::<EchoKernel>)
        .kernel("EchoOperation", "EchoWideKernel", create_kernel::<EchoWideKernel>)
        .kernel("EchoOperation", "SyncKernel", create_kernel::<SyncKernel>)
        .kernel("EchoOperation", "SymbolKernel", create_kernel::<SymbolKernel>)
        .binary(
            "EchoKernel",
            families::ASCEND910B,
            fixtures::leaked_container(&["echo_kernel"], 8, &[0xEC; 16]),
        )
        .binary(
            "SyncKernel",
            families::ASCEND910B,
            fixtures::leaked_container(&["sync_0", "sync_1"], 16, &[0x5C; 8]),
        )
        .binary(
            "SymbolKernel",
            families::ASCEND910B,
            fixtures::leaked_container(&["echo_cpu"], 0, &[0xC0; 4]),
        )
}

pub fn load(registry: &Registry, runtime: &Arc<RecordingRuntime>) -> Loader {
    Loader::load_with(registry, runtime.clone(), &LoaderOptions::default())
}

pub fn runtime_910b() -> Arc<RecordingRuntime> {
    Arc::new(RecordingRuntime::new(SOC_910B).with_c2c_ctrl_addr(0xC2C0))
}

/// Two float16 `[16]` inputs with device storage and one output whose desc is unset.
pub fn echo_param() -> LaunchParam {
    let mut param = LaunchParam::new();
    param.add_in_tensor(fixtures::device_tensor(DType::Float16, &[16], 0x1000));
    param.add_in_tensor(fixtures::device_tensor(DType::Float16, &[16], 0x2000));
    param.add_out_tensor(Tensor::default().with_device_data(0x3000, 32));
    param
}
