//! Per-invocation mutable state owned by exactly one kernel clone.

use std::fmt;

use bytemuck::Pod;
use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{DispatchError, DispatchResult};

/// Upper bound for both the argument block and the host tiling buffer.
pub const MAX_ARGS_SIZE: u64 = 1024 * 1024;
pub const MAX_TILING_SIZE: u64 = 1024 * 1024;
const MAX_BLOCK_DIM: u32 = 65536;
const CONST_TENSOR_ALIGN: u64 = 64;

/// Rounds `len` up to the 64-byte granule used for tiling and const tensor payloads.
pub fn align64(len: u64) -> u64 {
    len.div_ceil(CONST_TENSOR_ALIGN) * CONST_TENSOR_ALIGN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConstTensorInfo {
    pub arg_index: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemsetInfo {
    pub arg_index: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Default)]
struct TilingExtInfo {
    block_dim: u32,
    tiling_key: u64,
    const_tensor_offset: u64,
    used_size: u64,
    host: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct KernelInfo {
    args: Vec<u8>,
    launch_with_tiling: bool,
    hwsync_index: Option<u64>,
    tiling: TilingExtInfo,
    const_tensors: Vec<ConstTensorInfo>,
    scratch_sizes: SmallVec<[u64; 4]>,
    memset: Vec<MemsetInfo>,
    args_index: SmallVec<[u64; 16]>,
}

impl Default for KernelInfo {
    fn default() -> Self {
        KernelInfo {
            args: Vec::new(),
            launch_with_tiling: true,
            hwsync_index: None,
            tiling: TilingExtInfo::default(),
            const_tensors: Vec::new(),
            scratch_sizes: SmallVec::new(),
            memset: Vec::new(),
            args_index: SmallVec::new(),
        }
    }
}

impl KernelInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all per-invocation state. The launch-with-tiling mode is kept.
    pub fn reset(&mut self) {
        self.args.clear();
        self.hwsync_index = None;
        self.tiling = TilingExtInfo::default();
        self.const_tensors.clear();
        self.scratch_sizes.clear();
        self.memset.clear();
        self.args_index.clear();
    }

    pub fn init_args(&mut self, len: u64) -> DispatchResult<()> {
        if len > MAX_ARGS_SIZE {
            return Err(DispatchError::ArgsOverflow {
                requested: len,
                limit: MAX_ARGS_SIZE,
            });
        }
        self.args = vec![0; len as usize];
        tracing::debug!(len, "argument block allocated");
        Ok(())
    }

    pub fn args(&self) -> &[u8] {
        &self.args
    }

    pub(crate) fn take_args(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.args)
    }

    pub(crate) fn restore_args(&mut self, args: Vec<u8>) {
        self.args = args;
    }

    pub fn args_size(&self) -> u64 {
        self.args.len() as u64
    }

    pub fn launch_with_tiling(&self) -> bool {
        self.launch_with_tiling
    }

    pub fn set_launch_with_tiling(&mut self, enabled: bool) {
        self.launch_with_tiling = enabled;
    }

    /// Allocates the zeroed host tiling buffer for inline-tiling launches.
    pub fn alloc_tiling(&mut self, len: u64) -> DispatchResult<()> {
        if !self.launch_with_tiling {
            return Err(DispatchError::tiling("launch-with-tiling mode is off"));
        }
        if len == 0 || len > MAX_TILING_SIZE {
            return Err(DispatchError::tiling(format!(
                "tiling length {len} outside 1..={MAX_TILING_SIZE}"
            )));
        }
        if !self.tiling.host.is_empty() {
            return Err(DispatchError::tiling("tiling buffer already allocated"));
        }
        self.tiling.host = vec![0; len as usize];
        self.tiling.used_size = len;
        self.tiling.const_tensor_offset = len;
        Ok(())
    }

    /// Supplies caller-owned tiling bytes when the kernel does not launch with inline tiling.
    pub fn set_external_tiling(&mut self, bytes: Vec<u8>) -> DispatchResult<()> {
        if self.launch_with_tiling {
            return Err(DispatchError::tiling("launch-with-tiling mode is on"));
        }
        if bytes.is_empty() {
            return Err(DispatchError::tiling("external tiling is empty"));
        }
        let len = bytes.len() as u64;
        self.tiling.host = bytes;
        self.tiling.used_size = len;
        self.tiling.const_tensor_offset = len;
        Ok(())
    }

    pub fn tiling_host(&self) -> &[u8] {
        &self.tiling.host
    }

    pub fn tiling_host_mut(&mut self) -> &mut [u8] {
        &mut self.tiling.host
    }

    /// Copies a plain-old-data tiling struct to the start of the tiling buffer.
    pub fn write_tiling<T: Pod>(&mut self, value: &T) -> DispatchResult<()> {
        let bytes = bytemuck::bytes_of(value);
        let capacity = self.tiling.host.len();
        let dst = self.tiling.host.get_mut(..bytes.len()).ok_or_else(|| {
            DispatchError::tiling(format!(
                "tiling struct of {} bytes does not fit {capacity} byte buffer",
                bytes.len()
            ))
        })?;
        dst.copy_from_slice(bytes);
        Ok(())
    }

    pub fn tiling_size(&self) -> u64 {
        self.tiling.host.len() as u64
    }

    pub fn set_tiling_used_size(&mut self, used: u64) -> DispatchResult<()> {
        if used > self.tiling_size() {
            return Err(DispatchError::tiling(format!(
                "used size {used} exceeds tiling size {}",
                self.tiling_size()
            )));
        }
        self.tiling.used_size = used;
        Ok(())
    }

    pub fn tiling_used_size(&self) -> u64 {
        self.tiling.used_size
    }

    pub fn set_block_dim(&mut self, block_dim: u32) -> DispatchResult<()> {
        if block_dim >= MAX_BLOCK_DIM {
            return Err(DispatchError::validation(format!(
                "block dim {block_dim} must be below {MAX_BLOCK_DIM}"
            )));
        }
        self.tiling.block_dim = block_dim;
        Ok(())
    }

    pub fn block_dim(&self) -> u32 {
        self.tiling.block_dim
    }

    pub fn set_tiling_key(&mut self, key: u64) {
        self.tiling.tiling_key = key;
    }

    pub fn tiling_key(&self) -> u64 {
        self.tiling.tiling_key
    }

    /// Marks where const tensor payloads start inside the tiling buffer.
    /// Shrinks the used size when it would overlap them.
    pub fn set_const_tensor_offset(&mut self, offset: u64) -> DispatchResult<()> {
        if offset == 0 || offset >= self.tiling_size() {
            return Err(DispatchError::tiling(format!(
                "const tensor offset {offset} outside 1..{}",
                self.tiling_size()
            )));
        }
        self.tiling.const_tensor_offset = offset;
        if self.tiling.used_size > offset {
            tracing::debug!(
                from = self.tiling.used_size,
                to = offset,
                "tiling used size clipped to const tensor offset"
            );
            self.tiling.used_size = offset;
        }
        Ok(())
    }

    pub fn const_tensor_offset(&self) -> u64 {
        self.tiling.const_tensor_offset
    }

    /// Appends a constant tensor payload behind previously added ones and binds it to
    /// argument slot `arg_index`. Each payload occupies its 64-byte aligned size plus
    /// one extra 64-byte granule.
    pub fn add_const_tensor<T: Pod>(&mut self, arg_index: u64, data: &[T]) -> DispatchResult<()> {
        let offset = self.tiling.const_tensor_offset
            + self.const_tensors.iter().map(|info| info.size).sum::<u64>();
        if offset >= self.tiling_size() {
            return Err(DispatchError::tiling(format!(
                "const tensor offset {offset} is outside the tiling buffer"
            )));
        }
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let size = align64(bytes.len() as u64) + CONST_TENSOR_ALIGN;
        let start = offset as usize;
        let dst = self
            .tiling
            .host
            .get_mut(start..start + bytes.len())
            .ok_or_else(|| {
                DispatchError::tiling(format!(
                    "const tensor of {} bytes does not fit at offset {offset}",
                    bytes.len()
                ))
            })?;
        dst.copy_from_slice(bytes);
        tracing::debug!(arg_index, offset, size, "const tensor added");
        self.const_tensors.push(ConstTensorInfo { arg_index, size });
        Ok(())
    }

    pub fn const_tensors(&self) -> &[ConstTensorInfo] {
        &self.const_tensors
    }

    pub fn add_scratch(&mut self, size: u64) {
        self.scratch_sizes.push(size);
    }

    pub fn set_scratch_sizes(&mut self, sizes: &[u64]) {
        self.scratch_sizes = SmallVec::from_slice(sizes);
    }

    pub fn scratch_sizes(&self) -> &[u64] {
        &self.scratch_sizes
    }

    pub fn total_scratch_size(&self) -> u64 {
        self.scratch_sizes.iter().sum()
    }

    pub fn add_memset(&mut self, arg_index: u64, size: u64) {
        self.memset.push(MemsetInfo { arg_index, size });
    }

    pub fn memset_info(&self) -> &[MemsetInfo] {
        &self.memset
    }

    pub fn set_hwsync_index(&mut self, idx: u64) {
        self.hwsync_index = Some(idx);
    }

    pub fn hwsync_index(&self) -> Option<u64> {
        self.hwsync_index
    }

    /// Word offsets of each descriptor in an indexed argument block, in the order
    /// hwsync, inputs, outputs, scratch, tiling. Left empty, Init packs them densely.
    pub fn set_args_index(&mut self, index: &[u64]) {
        self.args_index = SmallVec::from_slice(index);
    }

    pub fn args_index(&self) -> &[u64] {
        &self.args_index
    }

    pub fn summary(&self) -> KernelInfoSummary {
        KernelInfoSummary {
            args_size: self.args_size(),
            launch_with_tiling: self.launch_with_tiling,
            block_dim: self.tiling.block_dim,
            tiling_key: self.tiling.tiling_key,
            tiling_size: self.tiling_size(),
            tiling_used_size: self.tiling.used_size,
            const_tensor_offset: self.tiling.const_tensor_offset,
            hwsync_index: self.hwsync_index,
            const_tensors: self.const_tensors.clone(),
            scratch_sizes: self.scratch_sizes.to_vec(),
            memset: self.memset.clone(),
            args_index: self.args_index.to_vec(),
        }
    }
}

/// Serializable snapshot of a [`KernelInfo`] for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KernelInfoSummary {
    pub args_size: u64,
    pub launch_with_tiling: bool,
    pub block_dim: u32,
    pub tiling_key: u64,
    pub tiling_size: u64,
    pub tiling_used_size: u64,
    pub const_tensor_offset: u64,
    pub hwsync_index: Option<u64>,
    pub const_tensors: Vec<ConstTensorInfo>,
    pub scratch_sizes: Vec<u64>,
    pub memset: Vec<MemsetInfo>,
    pub args_index: Vec<u64>,
}

impl fmt::Display for KernelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.summary()) {
            Ok(json) => f.write_str(&json),
            Err(_) => f.write_str("<kernel info>"),
        }
    }
}
