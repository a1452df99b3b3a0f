use std::ffi::CString;
use std::sync::Arc;

use kdispatch::device::{DeviceImage, HandleKind, HostInputInfo, TilingOffsets};
use kdispatch::{
    DeviceRuntime, DispatchError, DispatchResult, FunctionHandle, LaunchRequest, RuntimeStatus,
    StreamHandle, SymbolBinding,
};

use crate::driver::{self, AscendDriver, RtAicpuArgsEx, RtArgsEx, RtHostInputInfo};

/// [`DeviceRuntime`] backed by the CANN runtime of the current process.
#[derive(Clone)]
pub struct AscendRuntime {
    driver: Arc<AscendDriver>,
}

impl AscendRuntime {
    /// Loads the runtime library on first use. Fails when no Ascend runtime is installed.
    pub fn new() -> DispatchResult<Self> {
        Ok(AscendRuntime {
            driver: driver::driver()?,
        })
    }

    pub fn shared() -> DispatchResult<Arc<dyn DeviceRuntime>> {
        Ok(Arc::new(Self::new()?))
    }
}

impl std::fmt::Debug for AscendRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AscendRuntime").finish_non_exhaustive()
    }
}

impl DeviceRuntime for AscendRuntime {
    fn name(&self) -> &str {
        "ascend"
    }

    fn soc_version(&self) -> DispatchResult<String> {
        self.driver.soc_version()
    }

    fn bind(
        &self,
        image: &DeviceImage<'static>,
        binding: SymbolBinding<'_>,
    ) -> DispatchResult<FunctionHandle> {
        match binding {
            SymbolBinding::Single(function) => {
                let name = CString::new(function).map_err(|_| {
                    DispatchError::validation(format!(
                        "kernel {} function name contains a NUL byte",
                        image.kernel
                    ))
                })?;
                let raw = self
                    .driver
                    .register_function(image.magic, image.version, image.code, &name)?;
                Ok(FunctionHandle {
                    raw,
                    kind: HandleKind::Function,
                })
            }
            SymbolBinding::All => {
                let raw = self
                    .driver
                    .register_all(image.magic, image.version, image.code)?;
                Ok(FunctionHandle {
                    raw,
                    kind: HandleKind::Image,
                })
            }
        }
    }

    fn launch(&self, request: &LaunchRequest<'_>, stream: StreamHandle) -> Result<(), RuntimeStatus> {
        // The runtime may patch the argument block, so it gets its own copy.
        let mut args = request.args().to_vec();
        let args_size = u32::try_from(args.len()).map_err(|_| RuntimeStatus(-1))?;
        match *request {
            LaunchRequest::Function {
                handle,
                tiling_key,
                block_dim,
                tiling,
                host_inputs,
                ..
            } => {
                let mut host_inputs = host_input_table(host_inputs);
                let mut ex = args_ex(&mut args, args_size, tiling, &mut host_inputs)?;
                match handle.kind {
                    HandleKind::Image => self.driver.launch_with_handle(
                        handle.raw,
                        tiling_key,
                        block_dim,
                        &mut ex,
                        stream.0,
                    ),
                    HandleKind::Function => {
                        self.driver
                            .launch_with_flag(handle.raw, block_dim, &mut ex, stream.0)
                    }
                }
            }
            LaunchRequest::Symbol {
                block_dim,
                so_name_offset,
                kernel_name_offset,
                ..
            } => {
                let ex = RtAicpuArgsEx {
                    args: args.as_mut_ptr().cast(),
                    host_input_info_ptr: std::ptr::null_mut(),
                    kernel_offset_info_ptr: std::ptr::null_mut(),
                    args_size,
                    host_input_info_num: 0,
                    kernel_offset_info_num: 0,
                    so_name_addr_offset: so_name_offset,
                    kernel_name_addr_offset: kernel_name_offset,
                    is_no_need_h2d_copy: false,
                    reserved: [0; 3],
                };
                self.driver.launch_aicpu(block_dim, &ex, stream.0)
            }
        }
    }

    fn c2c_ctrl_addr(&self) -> DispatchResult<u64> {
        self.driver.c2c_ctrl_addr()
    }

    fn memset_async(&self, addr: u64, bytes: u64, stream: StreamHandle) -> Result<(), RuntimeStatus> {
        self.driver.memset_async(addr, bytes, stream.0)
    }
}

fn host_input_table(host_inputs: &[HostInputInfo]) -> Vec<RtHostInputInfo> {
    host_inputs
        .iter()
        .map(|info| RtHostInputInfo {
            addr_offset: info.addr_offset,
            data_offset: info.data_offset,
        })
        .collect()
}

fn args_ex(
    args: &mut [u8],
    args_size: u32,
    tiling: Option<TilingOffsets>,
    host_inputs: &mut [RtHostInputInfo],
) -> Result<RtArgsEx, RuntimeStatus> {
    let host_input_info_num = u16::try_from(host_inputs.len()).map_err(|_| RuntimeStatus(-1))?;
    let (has_tiling, tiling_addr_offset, tiling_data_offset) = match tiling {
        Some(offsets) => (1, offsets.addr_offset, offsets.data_offset),
        None => (0, 0, 0),
    };
    Ok(RtArgsEx {
        args: args.as_mut_ptr().cast(),
        host_input_info_ptr: if host_inputs.is_empty() {
            std::ptr::null_mut()
        } else {
            host_inputs.as_mut_ptr()
        },
        args_size,
        tiling_addr_offset,
        tiling_data_offset,
        host_input_info_num,
        has_tiling,
        is_no_need_h2d_copy: 0,
        reserved: [0; 4],
    })
}
