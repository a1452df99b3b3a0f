//! Per-invocation payloads passed from the caller into operations and kernels.

use std::any::Any;
use std::fmt;

use smallvec::SmallVec;

use crate::error::{DispatchError, DispatchResult};
use crate::tensor::Tensor;

/// Inline storage for launch tensors; most operations take a handful.
pub type Tensors = SmallVec<[Tensor; 8]>;

/// Operation-specific parameter carried through a [`LaunchParam`] without the
/// engine knowing its concrete type.
pub trait OpParam: Any + fmt::Debug + Send + Sync {
    fn clone_box(&self) -> Box<dyn OpParam>;
    fn as_any(&self) -> &dyn Any;
    fn eq_dyn(&self, other: &dyn OpParam) -> bool;
}

impl<T> OpParam for T
where
    T: Any + Clone + fmt::Debug + PartialEq + Send + Sync,
{
    fn clone_box(&self) -> Box<dyn OpParam> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq_dyn(&self, other: &dyn OpParam) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }
}

impl Clone for Box<dyn OpParam> {
    fn clone(&self) -> Self {
        (**self).clone_box()
    }
}

/// Everything one invocation needs: the op parameter plus input and output tensors.
///
/// Cloning deep-copies the parameter and both tensor sequences.
#[derive(Debug, Clone, Default)]
pub struct LaunchParam {
    param: Option<Box<dyn OpParam>>,
    in_tensors: Tensors,
    out_tensors: Tensors,
}

impl LaunchParam {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_param<P: OpParam>(param: P) -> Self {
        LaunchParam {
            param: Some(Box::new(param)),
            ..Self::default()
        }
    }

    pub fn set_param<P: OpParam>(&mut self, param: P) {
        self.param = Some(Box::new(param));
    }

    /// Downcasts the op parameter; `None` if absent or of another type.
    pub fn param<P: OpParam>(&self) -> Option<&P> {
        self.param.as_deref()?.as_any().downcast_ref::<P>()
    }

    /// Like [`LaunchParam::param`] but reports a typed failure naming `context`.
    pub fn expect_param<P: OpParam>(&self, context: &str) -> DispatchResult<&P> {
        self.param::<P>()
            .ok_or_else(|| DispatchError::param_type::<P>(context))
    }

    pub fn raw_param(&self) -> Option<&dyn OpParam> {
        self.param.as_deref()
    }

    pub fn add_in_tensor(&mut self, tensor: Tensor) {
        self.in_tensors.push(tensor);
    }

    pub fn add_out_tensor(&mut self, tensor: Tensor) {
        self.out_tensors.push(tensor);
    }

    pub fn in_tensors(&self) -> &[Tensor] {
        &self.in_tensors
    }

    pub fn out_tensors(&self) -> &[Tensor] {
        &self.out_tensors
    }

    pub fn in_tensors_mut(&mut self) -> &mut Tensors {
        &mut self.in_tensors
    }

    pub fn out_tensors_mut(&mut self) -> &mut Tensors {
        &mut self.out_tensors
    }

    pub fn in_tensor(&self, idx: usize) -> DispatchResult<&Tensor> {
        self.in_tensors.get(idx).ok_or_else(|| {
            DispatchError::validation(format!(
                "input {idx} requested but only {} present",
                self.in_tensors.len()
            ))
        })
    }

    pub fn out_tensor(&self, idx: usize) -> DispatchResult<&Tensor> {
        self.out_tensors.get(idx).ok_or_else(|| {
            DispatchError::validation(format!(
                "output {idx} requested but only {} present",
                self.out_tensors.len()
            ))
        })
    }

    pub fn in_count(&self) -> usize {
        self.in_tensors.len()
    }

    pub fn out_count(&self) -> usize {
        self.out_tensors.len()
    }
}

impl PartialEq for LaunchParam {
    fn eq(&self, other: &Self) -> bool {
        let params_equal = match (&self.param, &other.param) {
            (None, None) => true,
            (Some(a), Some(b)) => a.eq_dyn(b.as_ref()),
            _ => false,
        };
        params_equal && self.in_tensors == other.in_tensors && self.out_tensors == other.out_tensors
    }
}

impl fmt::Display for LaunchParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.param {
            Some(param) => writeln!(f, "specificParam: {param:?}")?,
            None => writeln!(f, "specificParam: none")?,
        }
        for (idx, tensor) in self.in_tensors.iter().enumerate() {
            writeln!(f, "intensors[{idx}]: {tensor}")?;
        }
        for (idx, tensor) in self.out_tensors.iter().enumerate() {
            writeln!(f, "outtensors[{idx}]: {tensor}")?;
        }
        Ok(())
    }
}

/// Opaque execution queue owned by the caller; the engine only forwards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamHandle(pub u64);

/// Device-side resources the caller prepared for a single `run`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInfo {
    pub stream: StreamHandle,
    pub scratch_addr: Option<u64>,
    pub tiling_device_addr: Option<u64>,
}

impl RunInfo {
    pub fn new(stream: StreamHandle) -> Self {
        RunInfo {
            stream,
            ..Self::default()
        }
    }

    pub fn with_scratch(mut self, addr: u64) -> Self {
        self.scratch_addr = Some(addr);
        self
    }

    pub fn with_tiling_device_addr(mut self, addr: u64) -> Self {
        self.tiling_device_addr = Some(addr);
        self
    }
}

impl fmt::Display for RunInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "stream:{:#x}, scratch:{}, tiling:{}",
            self.stream.0,
            self.scratch_addr.is_some(),
            self.tiling_device_addr.is_some()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tensor::{DType, Format, TensorDesc};

    #[derive(Debug, Clone, PartialEq)]
    struct Scale {
        factor: f32,
    }

    #[test]
    fn clone_is_deep() {
        let mut param = LaunchParam::with_param(Scale { factor: 2.0 });
        param.add_in_tensor(Tensor::new(TensorDesc::new(DType::Float, Format::Nd, &[4])));
        let mut copy = param.clone();
        copy.in_tensors_mut()[0].desc.dims[0] = 8;
        assert_eq!(param.in_tensors()[0].desc.dims[0], 4);
        assert_eq!(copy.param::<Scale>(), Some(&Scale { factor: 2.0 }));
        assert_ne!(param, copy);
    }

    #[test]
    fn params_compare_by_type_and_value() {
        let a = LaunchParam::with_param(Scale { factor: 1.0 });
        assert_eq!(a, a.clone());
        assert_ne!(a, LaunchParam::with_param(Scale { factor: 3.0 }));
        assert_ne!(a, LaunchParam::with_param(7u32));
        assert_ne!(a, LaunchParam::new());
    }

    #[test]
    fn wrong_param_type_is_reported() {
        let param = LaunchParam::with_param(1u8);
        assert!(param.param::<Scale>().is_none());
        let err = param.expect_param::<Scale>("ScaleOperation").unwrap_err();
        assert!(matches!(err, DispatchError::ParamType { .. }));
    }
}
