//! Strips padding from a `[batch, max_seq_len]` token matrix.
//!
//! Inputs: `input_ids` (int64 `[batch, max_seq_len]`), `cum_offsets_now` (int32
//! `[batch, 1]`), `token_num` (int64 `[1, 1]`), `seq_len` (int32 `[batch, 1]`).
//! Outputs: `x_remove_padding` (int64 `[1, batch * max_seq_len]`), `cum_offsets_out`
//! (`[batch, 1]`) and `padding_offset` (`[1, batch * max_seq_len]`).

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use kdispatch::operation::KernelTable;
use kdispatch::tensor::{DType, Format, Tensor};
use kdispatch::{DispatchError, DispatchResult, Kernel, KernelInfo, KernelInstance, LaunchParam};
use kdispatch::Operation;

const INPUTS: usize = 4;
const OUTPUTS: usize = 3;
const SCRATCH_BYTES: u64 = 16;

#[derive(Debug, Default)]
pub struct UnpadOperation;

impl UnpadOperation {
    fn check(param: &LaunchParam) -> DispatchResult<()> {
        let ids = param.in_tensor(0)?.dims();
        if ids.len() != 2 {
            return Err(DispatchError::infer_shape(
                "UnpadOperation",
                format!("input_ids must be 2-D, got {ids:?}"),
            ));
        }
        let batch = param.in_tensor(3)?.dims().first().copied();
        let cum = param.in_tensor(1)?.dims().first().copied();
        if batch.is_none() || ids.first().copied() != batch || cum != batch {
            return Err(DispatchError::infer_shape(
                "UnpadOperation",
                "seq_len and cum_offsets_now must share the batch of input_ids",
            ));
        }
        if param.in_tensor(1)?.dims().len() != 2 {
            return Err(DispatchError::infer_shape(
                "UnpadOperation",
                "cum_offsets_now must be 2-D",
            ));
        }
        Ok(())
    }
}

impl Operation for UnpadOperation {
    fn name(&self) -> &str {
        "UnpadOperation"
    }

    fn input_num(&self, _: &LaunchParam) -> usize {
        INPUTS
    }

    fn output_num(&self, _: &LaunchParam) -> usize {
        OUTPUTS
    }

    fn infer_shape_impl(&self, param: &LaunchParam, outputs: &mut [Tensor]) -> DispatchResult<()> {
        Self::check(param)?;
        let unpadded = param.in_tensor(0)?.numel();
        let cum_offsets = &param.in_tensor(1)?.desc;
        for output in outputs.iter_mut() {
            output.desc = cum_offsets.clone();
        }
        outputs[0].desc.dtype = DType::Int64;
        for idx in [0, 2] {
            outputs[idx].desc.dims[0] = 1;
            outputs[idx].desc.dims[1] = unpadded;
        }
        Ok(())
    }

    fn best_kernel(
        &self,
        _: &LaunchParam,
        kernels: &KernelTable<'_>,
    ) -> DispatchResult<KernelInstance> {
        kernels.by_name("UnpadKernel")
    }
}

/// Tiling block read by the device kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct UnpadTiling {
    pub pad_length: u32,
    pub batch: u32,
}

#[derive(Debug, Default)]
pub struct UnpadKernel;

impl UnpadKernel {
    fn dims_match(param: &LaunchParam) -> bool {
        let dims = |tensor: &Tensor| (tensor.dims()[0], tensor.dims()[1]);
        let ins = param.in_tensors();
        let outs = param.out_tensors();
        let (batch, max_seq_len) = dims(&ins[0]);
        if batch <= 0 || max_seq_len <= 0 {
            tracing::debug!("UnpadKernel: input_ids has an empty dim");
            return false;
        }
        let Some(total) = batch.checked_mul(max_seq_len) else {
            tracing::debug!(batch, max_seq_len, "UnpadKernel: element count overflows i64");
            return false;
        };
        let expected = [
            (dims(&ins[1]), (batch, 1), "cum_offsets_now"),
            (dims(&ins[2]), (1, 1), "token_num"),
            (dims(&ins[3]), (batch, 1), "seq_len"),
            (dims(&outs[0]), (1, total), "x_remove_padding"),
            (dims(&outs[1]), (batch, 1), "cum_offsets_out"),
            (dims(&outs[2]), (1, total), "padding_offset"),
        ];
        expected.iter().all(|(actual, wanted, name)| {
            let ok = actual == wanted;
            if !ok {
                tracing::debug!(tensor = *name, ?actual, ?wanted, "UnpadKernel: dims mismatch");
            }
            ok
        })
    }
}

impl Kernel for UnpadKernel {
    fn can_support(&self, param: &LaunchParam) -> bool {
        if param.in_count() != INPUTS || param.out_count() != OUTPUTS {
            tracing::debug!(
                inputs = param.in_count(),
                outputs = param.out_count(),
                "UnpadKernel: tensor count invalid"
            );
            return false;
        }
        let in_dtypes = [DType::Int64, DType::Int32, DType::Int64, DType::Int32];
        let dtypes_ok = param
            .in_tensors()
            .iter()
            .zip(in_dtypes)
            .all(|(tensor, dtype)| tensor.desc.dtype == dtype)
            && param.out_tensors()[0].desc.dtype == DType::Int64;
        if !dtypes_ok {
            tracing::debug!("UnpadKernel: dtype invalid");
            return false;
        }
        let layout_ok = param
            .in_tensors()
            .iter()
            .chain(param.out_tensors())
            .all(|tensor| tensor.desc.format == Format::Nd && tensor.dims().len() == 2);
        if !layout_ok {
            tracing::debug!("UnpadKernel: every tensor must be 2-D ND");
            return false;
        }
        Self::dims_match(param)
    }

    fn tiling_size(&self, _: &LaunchParam, _packaged: u64) -> u64 {
        size_of::<UnpadTiling>() as u64
    }

    fn init(&self, param: &LaunchParam, info: &mut KernelInfo) -> DispatchResult<()> {
        let ids = param.in_tensor(0)?.dims();
        let tiling = UnpadTiling {
            pad_length: ids[1] as u32,
            batch: ids[0] as u32,
        };
        info.write_tiling(&tiling)?;
        info.set_block_dim(1)?;
        info.set_scratch_sizes(&[SCRATCH_BYTES]);
        Ok(())
    }
}

kdispatch::register_operation!(UNPAD_OPERATION, UnpadOperation);
kdispatch::register_kernel!(UNPAD_KERNEL, UnpadOperation, UnpadKernel);
