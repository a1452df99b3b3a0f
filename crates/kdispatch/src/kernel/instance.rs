use std::fmt;

use super::args::{self, ArgsLayout};
use super::bound::BoundKernel;
use super::info::KernelInfo;
use super::{Kernel, LaunchMode};
use crate::container::KernelType;
use crate::device::LaunchRequest;
use crate::error::{DispatchError, DispatchResult};
use crate::launch::{LaunchParam, RunInfo};
use crate::tensor::check_in_tensors;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelState {
    Created,
    Initialized,
    Executed,
    Failed,
}

impl KernelState {
    pub fn as_str(self) -> &'static str {
        match self {
            KernelState::Created => "created",
            KernelState::Initialized => "initialized",
            KernelState::Executed => "executed",
            KernelState::Failed => "failed",
        }
    }
}

impl fmt::Display for KernelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One caller's private copy of a bound kernel.
///
/// Moves through `Created -> Initialized -> Executed`. Any failure parks it in
/// `Failed` until [`KernelInstance::reset`]. Instances are `Send` but are meant to
/// be driven by a single thread at a time.
pub struct KernelInstance {
    bound: BoundKernel,
    kernel: Box<dyn Kernel>,
    info: KernelInfo,
    state: KernelState,
    layout: Option<ArgsLayout>,
}

impl KernelInstance {
    pub(crate) fn new(bound: BoundKernel, kernel: Box<dyn Kernel>) -> Self {
        KernelInstance {
            bound,
            kernel,
            info: KernelInfo::new(),
            state: KernelState::Created,
            layout: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.bound.name()
    }

    pub fn op_name(&self) -> &'static str {
        self.bound.op_name()
    }

    pub fn kernel_type(&self) -> KernelType {
        self.bound.kernel_type()
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    pub fn kernel_info(&self) -> &KernelInfo {
        &self.info
    }

    pub fn args_layout(&self) -> Option<ArgsLayout> {
        self.layout
    }

    pub fn can_support(&self, param: &LaunchParam) -> bool {
        self.kernel.can_support(param)
    }

    pub fn reset(&mut self) {
        self.info.reset();
        self.layout = None;
        self.state = KernelState::Created;
    }

    fn expect_state(&self, expected: KernelState, action: &'static str) -> DispatchResult<()> {
        if self.state != expected {
            return Err(DispatchError::InvalidState {
                kernel: self.name().to_string(),
                action,
                state: self.state.as_str(),
            });
        }
        Ok(())
    }

    /// Validates `param`, lets the kernel compute its tiling and sizes the argument block.
    pub fn init(&mut self, param: &LaunchParam) -> DispatchResult<()> {
        self.expect_state(KernelState::Created, "init")?;
        match self.init_inner(param) {
            Ok(layout) => {
                tracing::debug!(
                    kernel = self.name(),
                    arg_count = layout.arg_count,
                    args_size = layout.size,
                    block_dim = self.info.block_dim(),
                    tiling_key = self.info.tiling_key(),
                    "kernel initialized"
                );
                self.layout = Some(layout);
                self.state = KernelState::Initialized;
                Ok(())
            }
            Err(err) => {
                tracing::debug!(kernel = self.name(), error = %err, "kernel init failed");
                self.state = KernelState::Failed;
                Err(err)
            }
        }
    }

    fn init_inner(&mut self, param: &LaunchParam) -> DispatchResult<ArgsLayout> {
        check_in_tensors(param.in_tensors())?;
        if !self.kernel.can_support(param) {
            return Err(DispatchError::validation(format!(
                "kernel {} does not support {}",
                self.name(),
                param.to_string().trim_end()
            )));
        }

        self.info.reset();
        let mode = self.kernel.launch_mode();
        self.info
            .set_launch_with_tiling(mode != LaunchMode::Indexed && self.kernel.launch_with_tiling());
        if mode == LaunchMode::Binary && self.info.launch_with_tiling() {
            let size = self
                .kernel
                .tiling_size(param, self.bound.handle().tiling_size());
            if size > 0 {
                self.info.alloc_tiling(size)?;
            }
        }
        self.kernel.init(param, &mut self.info)?;

        let layout = match mode {
            LaunchMode::Binary => {
                args::binary_layout(&self.info, param.in_count(), param.out_count())
            }
            LaunchMode::Symbol {
                so_name,
                kernel_name,
            } => args::symbol_layout(param.in_count(), param.out_count(), so_name, kernel_name),
            LaunchMode::Indexed => {
                if self.info.args_index().is_empty() {
                    let index = args::default_args_index(&self.info, param);
                    self.info.set_args_index(&index);
                }
                args::indexed_layout(&self.info, param)?
            }
        };
        self.info.init_args(layout.size)?;
        Ok(layout)
    }

    /// Fills the argument block from `param` and enqueues the kernel once.
    pub fn run(&mut self, param: &LaunchParam, run_info: &RunInfo) -> DispatchResult<()> {
        self.expect_state(KernelState::Initialized, "run")?;
        let result = self.run_inner(param, run_info);
        self.state = match result {
            Ok(()) => KernelState::Executed,
            Err(_) => KernelState::Failed,
        };
        result
    }

    fn run_inner(&mut self, param: &LaunchParam, run_info: &RunInfo) -> DispatchResult<()> {
        let layout = self
            .layout
            .ok_or_else(|| DispatchError::programming("initialized kernel without layout"))?;
        if param.in_count() != layout.inputs || param.out_count() != layout.outputs {
            return Err(DispatchError::validation(format!(
                "kernel {} was initialized for {} inputs and {} outputs, run got {} and {}",
                self.name(),
                layout.inputs,
                layout.outputs,
                param.in_count(),
                param.out_count()
            )));
        }

        let runtime = self.bound.runtime();
        let hwsync_addr = match self.info.hwsync_index() {
            Some(_) => Some(runtime.c2c_ctrl_addr()?),
            None => None,
        };
        let mut block = self.info.take_args();
        let filled = match self.kernel.launch_mode() {
            LaunchMode::Binary => {
                args::fill_binary(&mut block, &self.info, &layout, param, run_info, hwsync_addr)
                    .map(Filled::Binary)
            }
            LaunchMode::Symbol {
                so_name,
                kernel_name,
            } => args::fill_symbol(&mut block, &layout, param, so_name, kernel_name)
                .map(Filled::Symbol),
            LaunchMode::Indexed => {
                args::fill_indexed(&mut block, &self.info, &layout, param, run_info, hwsync_addr)
                    .map(|()| Filled::Indexed)
            }
        };
        self.info.restore_args(block);
        let filled = filled?;

        for memset in self.info.memset_info() {
            let slot = usize::try_from(memset.arg_index).unwrap_or(usize::MAX);
            let addr = args::slot_value(self.info.args(), slot)
                .filter(|_| slot < layout.arg_count)
                .ok_or_else(|| {
                    DispatchError::validation(format!(
                        "memset slot {} is outside the argument table",
                        memset.arg_index
                    ))
                })?;
            runtime
                .memset_async(addr, memset.size, run_info.stream)
                .map_err(|status| {
                    DispatchError::runtime("memset_async", format!("status {status}"))
                })?;
        }

        let function = self.bound.handle().function();
        let request = match &filled {
            Filled::Binary(binary) => LaunchRequest::Function {
                handle: function,
                tiling_key: self.info.tiling_key(),
                block_dim: self.info.block_dim(),
                args: self.info.args(),
                tiling: binary.tiling,
                host_inputs: &binary.host_inputs,
            },
            Filled::Indexed => LaunchRequest::Function {
                handle: function,
                tiling_key: self.info.tiling_key(),
                block_dim: self.info.block_dim(),
                args: self.info.args(),
                tiling: None,
                host_inputs: &[],
            },
            Filled::Symbol(symbol) => LaunchRequest::Symbol {
                block_dim: self.info.block_dim(),
                args: self.info.args(),
                so_name_offset: symbol.so_name_offset,
                kernel_name_offset: symbol.kernel_name_offset,
            },
        };
        runtime.launch(&request, run_info.stream).map_err(|status| {
            tracing::error!(
                kernel = self.name(),
                status = status.0,
                block_dim = self.info.block_dim(),
                "kernel launch failed"
            );
            DispatchError::Launch {
                kernel: self.name().to_string(),
                status,
            }
        })
    }
}

enum Filled {
    Binary(args::BinaryArgs),
    Symbol(args::SymbolArgs),
    Indexed,
}

impl fmt::Debug for KernelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelInstance")
            .field("name", &self.name())
            .field("state", &self.state)
            .field("layout", &self.layout)
            .finish()
    }
}
