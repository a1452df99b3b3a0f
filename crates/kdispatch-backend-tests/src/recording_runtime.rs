use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use kdispatch::device::{
    DeviceImage, DeviceRuntime, FunctionHandle, HandleKind, HostInputInfo, LaunchRequest,
    SymbolBinding, TilingOffsets,
};
use kdispatch::{DispatchError, DispatchResult, RuntimeStatus, StreamHandle};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRecord {
    pub kernel: String,
    pub magic: u32,
    pub version: u32,
    /// The single bound function, or `None` when every function was registered.
    pub function: Option<String>,
    pub code: Vec<u8>,
    pub handle: FunctionHandle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchKind {
    Function {
        handle: FunctionHandle,
        tiling_key: u64,
        tiling: Option<TilingOffsets>,
        host_inputs: Vec<HostInputInfo>,
    },
    Symbol {
        so_name_offset: u32,
        kernel_name_offset: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub kind: LaunchKind,
    pub block_dim: u32,
    pub args: Vec<u8>,
    pub stream: StreamHandle,
}

impl LaunchRecord {
    /// The pointer stored in argument slot `slot`.
    pub fn slot(&self, slot: usize) -> u64 {
        let start = slot * 8;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.args[start..start + 8]);
        u64::from_ne_bytes(raw)
    }

    /// NUL-terminated string starting at `offset` in the argument block.
    pub fn c_str_at(&self, offset: u32) -> &str {
        let tail = &self.args[offset as usize..];
        let end = tail.iter().position(|b| *b == 0).unwrap_or(tail.len());
        std::str::from_utf8(&tail[..end]).expect("argument string is utf-8")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemsetRecord {
    pub addr: u64,
    pub bytes: u64,
    pub stream: StreamHandle,
}

/// Fake device runtime that records every call and launches nothing.
#[derive(Debug)]
pub struct RecordingRuntime {
    soc: Option<String>,
    c2c_ctrl_addr: Option<u64>,
    launch_status: Mutex<Option<i32>>,
    failing_binds: Vec<String>,
    next_handle: AtomicU64,
    binds: Mutex<Vec<BindRecord>>,
    launches: Mutex<Vec<LaunchRecord>>,
    memsets: Mutex<Vec<MemsetRecord>>,
}

impl RecordingRuntime {
    pub fn new(soc: impl Into<String>) -> Self {
        RecordingRuntime {
            soc: Some(soc.into()),
            c2c_ctrl_addr: None,
            launch_status: Mutex::new(None),
            failing_binds: Vec::new(),
            next_handle: AtomicU64::new(0x1000),
            binds: Mutex::new(Vec::new()),
            launches: Mutex::new(Vec::new()),
            memsets: Mutex::new(Vec::new()),
        }
    }

    /// A runtime whose device identity query fails.
    pub fn without_soc() -> Self {
        RecordingRuntime {
            soc: None,
            ..Self::new("")
        }
    }

    pub fn with_c2c_ctrl_addr(mut self, addr: u64) -> Self {
        self.c2c_ctrl_addr = Some(addr);
        self
    }

    pub fn with_failing_bind(mut self, kernel: impl Into<String>) -> Self {
        self.failing_binds.push(kernel.into());
        self
    }

    /// Every following launch fails with `status`; `None` makes launches succeed again.
    pub fn set_launch_status(&self, status: Option<i32>) {
        *self.launch_status.lock().expect("launch status mutex poisoned") = status;
    }

    pub fn binds(&self) -> Vec<BindRecord> {
        self.binds.lock().expect("binds mutex poisoned").clone()
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().expect("launches mutex poisoned").clone()
    }

    pub fn last_launch(&self) -> LaunchRecord {
        self.launches()
            .pop()
            .expect("runtime should have recorded a launch")
    }

    pub fn memsets(&self) -> Vec<MemsetRecord> {
        self.memsets.lock().expect("memsets mutex poisoned").clone()
    }
}

impl DeviceRuntime for RecordingRuntime {
    fn name(&self) -> &str {
        "recording"
    }

    fn soc_version(&self) -> DispatchResult<String> {
        self.soc
            .clone()
            .ok_or_else(|| DispatchError::runtime("soc_version", "no device"))
    }

    fn bind(
        &self,
        image: &DeviceImage<'static>,
        binding: SymbolBinding<'_>,
    ) -> DispatchResult<FunctionHandle> {
        if self.failing_binds.iter().any(|kernel| kernel == image.kernel) {
            return Err(DispatchError::Bind {
                kernel: image.kernel.to_string(),
                reason: "rejected by recording runtime".to_string(),
            });
        }
        let (kind, function) = match binding {
            SymbolBinding::Single(name) => (HandleKind::Function, Some(name.to_string())),
            SymbolBinding::All => (HandleKind::Image, None),
        };
        let handle = FunctionHandle {
            raw: self.next_handle.fetch_add(1, Ordering::Relaxed),
            kind,
        };
        self.binds
            .lock()
            .expect("binds mutex poisoned")
            .push(BindRecord {
                kernel: image.kernel.to_string(),
                magic: image.magic,
                version: image.version,
                function,
                code: image.code.to_vec(),
                handle,
            });
        Ok(handle)
    }

    fn launch(&self, request: &LaunchRequest<'_>, stream: StreamHandle) -> Result<(), RuntimeStatus> {
        if let Some(status) = *self.launch_status.lock().expect("launch status mutex poisoned") {
            return Err(RuntimeStatus(status));
        }
        let kind = match request {
            LaunchRequest::Function {
                handle,
                tiling_key,
                tiling,
                host_inputs,
                ..
            } => LaunchKind::Function {
                handle: *handle,
                tiling_key: *tiling_key,
                tiling: *tiling,
                host_inputs: host_inputs.to_vec(),
            },
            LaunchRequest::Symbol {
                so_name_offset,
                kernel_name_offset,
                ..
            } => LaunchKind::Symbol {
                so_name_offset: *so_name_offset,
                kernel_name_offset: *kernel_name_offset,
            },
        };
        self.launches
            .lock()
            .expect("launches mutex poisoned")
            .push(LaunchRecord {
                kind,
                block_dim: request.block_dim(),
                args: request.args().to_vec(),
                stream,
            });
        Ok(())
    }

    fn c2c_ctrl_addr(&self) -> DispatchResult<u64> {
        self.c2c_ctrl_addr
            .ok_or_else(|| DispatchError::runtime("c2c_ctrl_addr", "not configured"))
    }

    fn memset_async(&self, addr: u64, bytes: u64, stream: StreamHandle) -> Result<(), RuntimeStatus> {
        self.memsets
            .lock()
            .expect("memsets mutex poisoned")
            .push(MemsetRecord {
                addr,
                bytes,
                stream,
            });
        Ok(())
    }
}
