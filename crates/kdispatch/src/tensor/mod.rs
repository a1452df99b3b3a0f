//! Value types describing tensors handed to operations and kernels.

mod desc;
mod dtype;
mod format;
#[allow(clippy::module_inception)]
mod tensor;

pub use desc::{Dims, TensorDesc};
pub use dtype::DType;
pub use format::Format;
pub use tensor::{check_in_tensors, tensors_equal, Tensor, MAX_TENSOR_BYTES};
