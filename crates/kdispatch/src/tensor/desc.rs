//! Shape and layout metadata attached to every tensor crossing the dispatch engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{DType, Format};
use crate::error::{DispatchError, DispatchResult};

/// Inline storage for the dims of a device tensor; rank beyond 8 spills to the heap.
pub type Dims = SmallVec<[i64; 8]>;

/// Describes what a tensor looks like without saying where it lives.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TensorDesc {
    pub dtype: DType,
    pub format: Format,
    pub dims: Dims,
    pub strides: Option<Dims>,
    pub offset: i64,
}

impl TensorDesc {
    pub fn new(dtype: DType, format: Format, dims: &[i64]) -> Self {
        TensorDesc {
            dtype,
            format,
            dims: Dims::from_slice(dims),
            strides: None,
            offset: 0,
        }
    }

    /// Element count. Returns 0 for an empty desc, a `[0]` desc, any non-positive or
    /// oversized dim, and on `i64` overflow.
    pub fn numel(&self) -> i64 {
        if self.dims.is_empty() || (self.dims.len() == 1 && self.dims[0] == 0) {
            return 0;
        }
        checked_numel(&self.dims).unwrap_or(0)
    }

    /// Reinterprets the dims, keeping the element count unchanged.
    pub fn view(&mut self, new_dims: &[i64]) -> DispatchResult<()> {
        let count = checked_numel(new_dims).unwrap_or(0);
        if count == 0 {
            return Err(DispatchError::validation(format!(
                "cannot view as {new_dims:?}: invalid dims"
            )));
        }
        let current = self.numel();
        if count != current {
            return Err(DispatchError::validation(format!(
                "cannot view {} elements as {new_dims:?} ({count} elements)",
                current
            )));
        }
        self.dims = Dims::from_slice(new_dims);
        Ok(())
    }

    /// Compares the fields that shape inference is responsible for.
    pub fn same_shape(&self, other: &TensorDesc) -> bool {
        self.dtype == other.dtype && self.format == other.format && self.dims == other.dims
    }
}

fn checked_numel(dims: &[i64]) -> Option<i64> {
    let max_dim = i64::from(i32::MAX);
    dims.iter().try_fold(1i64, |acc, &dim| {
        if dim <= 0 || dim > max_dim {
            tracing::debug!(dim, "dim out of range");
            return None;
        }
        let next = acc.checked_mul(dim);
        if next.is_none() {
            tracing::debug!(?dims, "element count overflows i64");
        }
        next
    })
}

impl fmt::Display for TensorDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dtype:{}, format:{}, dims:[", self.dtype, self.format)?;
        for (idx, dim) in self.dims.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}
