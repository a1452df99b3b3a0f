//! Elementwise float16 `z = x + y`, split evenly over two vector cores.

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use kdispatch::operation::KernelTable;
use kdispatch::tensor::{DType, Tensor};
use kdispatch::{
    DispatchError, DispatchResult, Kernel, KernelInfo, KernelInstance, LaunchParam, Operation,
};

use crate::params::AddCustom;

const INPUTS: usize = 2;
const OUTPUTS: usize = 1;
const BLOCK_DIM: u32 = 2;

#[derive(Debug, Default)]
pub struct AddCustomOperation;

impl Operation for AddCustomOperation {
    fn name(&self) -> &str {
        "AddCustomOperation"
    }

    fn input_num(&self, _: &LaunchParam) -> usize {
        INPUTS
    }

    fn output_num(&self, _: &LaunchParam) -> usize {
        OUTPUTS
    }

    fn infer_shape_impl(&self, param: &LaunchParam, outputs: &mut [Tensor]) -> DispatchResult<()> {
        param.expect_param::<AddCustom>("AddCustomOperation")?;
        outputs[0].desc = param.in_tensor(0)?.desc.clone();
        Ok(())
    }

    fn best_kernel(
        &self,
        param: &LaunchParam,
        kernels: &KernelTable<'_>,
    ) -> DispatchResult<KernelInstance> {
        param.expect_param::<AddCustom>("AddCustomOperation")?;
        let input = &param.in_tensor(0)?.desc;
        if !param.out_tensor(0)?.desc.same_shape(input) {
            return Err(DispatchError::NotConsistent {
                op: self.name().to_string(),
            });
        }
        if input.dtype != DType::Float16 {
            return Err(DispatchError::validation(format!(
                "AddCustomOperation supports float16 only, got {}",
                input.dtype
            )));
        }
        kernels.by_name("AddCustomKernel")
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct AddCustomTiling {
    pub total_length: u32,
    pub tile_num: u32,
}

#[derive(Debug, Default)]
pub struct AddCustomKernel;

impl Kernel for AddCustomKernel {
    fn can_support(&self, param: &LaunchParam) -> bool {
        param.param::<AddCustom>().is_some()
    }

    fn tiling_size(&self, _: &LaunchParam, _packaged: u64) -> u64 {
        size_of::<AddCustomTiling>() as u64
    }

    fn init(&self, param: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()> {
        param.expect_param::<AddCustom>("AddCustomKernel")?;
        let total_length = param
            .in_tensor(0)?
            .dims()
            .first()
            .copied()
            .ok_or_else(|| DispatchError::validation("AddCustomKernel: input 0 has no dims"))?;
        let tiling = AddCustomTiling {
            total_length: total_length as u32,
            tile_num: BLOCK_DIM,
        };
        tracing::info!(
            total_length = tiling.total_length,
            tile_num = tiling.tile_num,
            block_dim = BLOCK_DIM,
            "AddCustomKernel tiling"
        );
        info.write_tiling(&tiling)?;
        info.set_block_dim(BLOCK_DIM)
    }
}

kdispatch::register_operation!(ADD_CUSTOM_OPERATION, AddCustomOperation);
kdispatch::register_kernel!(ADD_CUSTOM_KERNEL, AddCustomOperation, AddCustomKernel);
