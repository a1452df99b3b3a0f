use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Dims, TensorDesc};
use crate::error::{DispatchError, DispatchResult};

const MIN_RANK: usize = 1;
const MAX_RANK: usize = 8;
/// Largest byte size a single input tensor may describe (256 GiB).
pub const MAX_TENSOR_BYTES: u64 = 256 * 1024 * 1024 * 1024;

/// A tensor as seen by a kernel launch: metadata plus raw device/host addresses.
///
/// Addresses are plain integers; the engine never dereferences them, it only
/// copies them into argument slots.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tensor {
    pub desc: TensorDesc,
    pub data: Option<u64>,
    pub data_size: u64,
    pub host_data: Option<u64>,
}

impl Tensor {
    pub fn new(desc: TensorDesc) -> Self {
        Tensor {
            desc,
            ..Tensor::default()
        }
    }

    pub fn with_device_data(mut self, addr: u64, size: u64) -> Self {
        self.data = Some(addr);
        self.data_size = size;
        self
    }

    pub fn numel(&self) -> i64 {
        self.desc.numel()
    }

    pub fn dims(&self) -> &Dims {
        &self.desc.dims
    }

    pub fn view(&mut self, new_dims: &[i64]) -> DispatchResult<()> {
        self.desc.view(new_dims)
    }

    /// An intentionally empty placeholder: no elements, no storage anywhere.
    pub fn is_empty(&self) -> bool {
        self.numel() == 0 && self.data.is_none() && self.host_data.is_none() && self.data_size == 0
    }

    /// Byte size implied by the desc, checked against the rank and size limits.
    pub fn validate(&self) -> DispatchResult<u64> {
        let rank = self.desc.dims.len();
        if !(MIN_RANK..=MAX_RANK).contains(&rank) {
            return Err(DispatchError::validation(format!(
                "rank {rank} outside {MIN_RANK}..={MAX_RANK}"
            )));
        }
        let numel = self.numel();
        if numel == 0 {
            return Err(DispatchError::validation(format!(
                "tensor {} has no elements",
                self.desc
            )));
        }
        let elem = self.desc.dtype.element_size().ok_or_else(|| {
            DispatchError::validation(format!("dtype {} has no element size", self.desc.dtype))
        })?;
        let bytes = (numel as u64)
            .checked_mul(elem as u64)
            .filter(|bytes| *bytes <= MAX_TENSOR_BYTES)
            .ok_or_else(|| {
                DispatchError::validation(format!("tensor {} exceeds the size limit", self.desc))
            })?;
        Ok(bytes)
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, dataSize:{}, data:{}",
            self.desc,
            self.data_size,
            self.data.is_some()
        )
    }
}

/// Validates every input, skipping deliberately empty placeholders.
pub fn check_in_tensors(tensors: &[Tensor]) -> DispatchResult<()> {
    for (idx, tensor) in tensors.iter().enumerate() {
        if tensor.is_empty() {
            continue;
        }
        tensor.validate().map_err(|err| match err {
            DispatchError::Validation(msg) => {
                DispatchError::Validation(format!("input {idx}: {msg}"))
            }
            other => other,
        })?;
    }
    Ok(())
}

/// Structural equality over dtype, format and dims, index by index.
pub fn tensors_equal(lhs: &[Tensor], rhs: &[Tensor]) -> bool {
    if lhs.len() != rhs.len() {
        tracing::debug!(lhs = lhs.len(), rhs = rhs.len(), "tensor counts differ");
        return false;
    }
    for (idx, (a, b)) in lhs.iter().zip(rhs).enumerate() {
        if !a.desc.same_shape(&b.desc) {
            tracing::debug!(idx, lhs = %a.desc, rhs = %b.desc, "tensor descs differ");
            return false;
        }
    }
    true
}
