//! Logical operations: shape inference, consistency checks and kernel selection.

use std::collections::HashMap;
use std::fmt;

use crate::error::{DispatchError, DispatchResult};
use crate::kernel::{BoundKernel, KernelInstance};
use crate::launch::LaunchParam;
use crate::tensor::{tensors_equal, Tensor};

/// An operation implementation.
///
/// Implementations are shared read-only between threads and must not keep
/// per-call state.
pub trait Operation: Send + Sync {
    /// Must equal the name the operation was registered under.
    fn name(&self) -> &str;

    fn input_num(&self, param: &LaunchParam) -> usize {
        let _ = param;
        tracing::debug!(operation = self.name(), "input_num not overridden, using 1");
        1
    }

    fn output_num(&self, param: &LaunchParam) -> usize {
        let _ = param;
        tracing::debug!(operation = self.name(), "output_num not overridden, using 1");
        1
    }

    /// Writes the output descriptors implied by `param` into `outputs`.
    ///
    /// `outputs` already holds `output_num` tensors. Only their descs are expected to
    /// change.
    fn infer_shape_impl(&self, param: &LaunchParam, outputs: &mut [Tensor]) -> DispatchResult<()>;

    /// Picks the kernel for `param`, usually by name from `kernels`.
    fn best_kernel(
        &self,
        param: &LaunchParam,
        kernels: &KernelTable<'_>,
    ) -> DispatchResult<KernelInstance>;
}

/// Read-only view of the kernels bound to one operation.
#[derive(Debug, Clone, Copy)]
pub struct KernelTable<'a> {
    op_name: &'a str,
    kernels: &'a [BoundKernel],
    index: &'a HashMap<&'static str, usize>,
}

impl<'a> KernelTable<'a> {
    pub fn get(&self, name: &str) -> Option<&'a BoundKernel> {
        self.index.get(name).map(|idx| &self.kernels[*idx])
    }

    /// A fresh instance of the kernel called `name`.
    pub fn by_name(&self, name: &str) -> DispatchResult<KernelInstance> {
        match self.get(name) {
            Some(kernel) => Ok(kernel.clone_instance()),
            None => {
                tracing::warn!(
                    operation = self.op_name,
                    kernel = name,
                    "kernel not bound, maybe not supported on this device"
                );
                Err(DispatchError::KernelNotFound {
                    op: self.op_name.to_string(),
                    kernel: name.to_string(),
                })
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a BoundKernel> {
        self.kernels.iter()
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }
}

/// An operation plus the kernels the loader bound for it on this device.
pub struct BoundOperation {
    op: Box<dyn Operation>,
    name: &'static str,
    kernels: Vec<BoundKernel>,
    index: HashMap<&'static str, usize>,
}

impl BoundOperation {
    pub(crate) fn new(name: &'static str, op: Box<dyn Operation>) -> Self {
        BoundOperation {
            op,
            name,
            kernels: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Adds `kernel` unless one with the same name is already bound.
    pub(crate) fn add_kernel(&mut self, kernel: BoundKernel) -> bool {
        if self.index.contains_key(kernel.name()) {
            return false;
        }
        self.index.insert(kernel.name(), self.kernels.len());
        self.kernels.push(kernel);
        true
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn input_num(&self, param: &LaunchParam) -> usize {
        self.op.input_num(param)
    }

    pub fn output_num(&self, param: &LaunchParam) -> usize {
        self.op.output_num(param)
    }

    fn check_arity(&self, param: &LaunchParam) -> DispatchResult<()> {
        let expected_inputs = self.op.input_num(param);
        let expected_outputs = self.op.output_num(param);
        if param.in_count() != expected_inputs || param.out_count() != expected_outputs {
            return Err(DispatchError::Arity {
                op: self.name.to_string(),
                expected_inputs,
                expected_outputs,
                inputs: param.in_count(),
                outputs: param.out_count(),
            });
        }
        Ok(())
    }

    /// Fills the output descriptors of `param` in place.
    pub fn infer_shape(&self, param: &mut LaunchParam) -> DispatchResult<()> {
        self.check_arity(param)?;
        let mut outputs = param.out_tensors().to_vec();
        self.op.infer_shape_impl(param, &mut outputs)?;
        for (slot, inferred) in param.out_tensors_mut().iter_mut().zip(outputs) {
            *slot = inferred;
        }
        Ok(())
    }

    /// Whether re-inferring outputs from the inputs reproduces the outputs in `param`.
    /// Never modifies `param`.
    pub fn is_consistent(&self, param: &LaunchParam) -> bool {
        if let Err(err) = self.check_arity(param) {
            tracing::debug!(operation = self.name, error = %err, "inconsistent arity");
            return false;
        }
        let mut inferred = vec![Tensor::default(); param.out_count()];
        if let Err(err) = self.op.infer_shape_impl(param, &mut inferred) {
            tracing::debug!(operation = self.name, error = %err, "inference failed");
            return false;
        }
        tensors_equal(&inferred, param.out_tensors())
    }

    /// Like [`BoundOperation::is_consistent`] but reports the mismatch as an error.
    pub fn check_consistent(&self, param: &LaunchParam) -> DispatchResult<()> {
        if self.is_consistent(param) {
            Ok(())
        } else {
            Err(DispatchError::NotConsistent {
                op: self.name.to_string(),
            })
        }
    }

    pub fn kernel_table(&self) -> KernelTable<'_> {
        KernelTable {
            op_name: self.name,
            kernels: &self.kernels,
            index: &self.index,
        }
    }

    pub fn kernel_list(&self) -> &[BoundKernel] {
        &self.kernels
    }

    pub fn kernel_names(&self) -> Vec<&'static str> {
        self.kernels.iter().map(BoundKernel::name).collect()
    }

    pub fn kernel_by_name(&self, name: &str) -> DispatchResult<KernelInstance> {
        self.kernel_table().by_name(name)
    }

    /// The kernel the operation picks for `param`. The pick is checked against the
    /// kernel's support predicate before it is returned.
    pub fn best_kernel(&self, param: &LaunchParam) -> DispatchResult<KernelInstance> {
        let kernel = self.op.best_kernel(param, &self.kernel_table())?;
        if !kernel.can_support(param) {
            return Err(DispatchError::validation(format!(
                "{} selected {} which does not support the launch param",
                self.name,
                kernel.name()
            )));
        }
        Ok(kernel)
    }
}

impl fmt::Debug for BoundOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundOperation")
            .field("name", &self.name)
            .field("kernels", &self.kernel_names())
            .finish()
    }
}
