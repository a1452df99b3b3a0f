use std::env;
use std::ffi::{c_char, c_void, CStr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Context};
use kdispatch::{DispatchError, DispatchResult, RuntimeStatus};
use libloading::Library;

type RtError = i32;
type RtStream = *mut c_void;

const RT_SUCCESS: RtError = 0;
const SOC_VERSION_LEN: usize = 50;
/// Kernel type tag for CPU-side kernels resolved by library and symbol name.
const KERNEL_TYPE_AICPU: u32 = 2;
const EMPTY_OP_NAME: &[u8] = b"\0";

#[repr(C)]
pub(crate) struct RtDevBinary {
    pub magic: u32,
    pub version: u32,
    pub data: *const c_void,
    pub length: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RtHostInputInfo {
    pub addr_offset: u32,
    pub data_offset: u32,
}

#[repr(C)]
pub(crate) struct RtArgsEx {
    pub args: *mut c_void,
    pub host_input_info_ptr: *mut RtHostInputInfo,
    pub args_size: u32,
    pub tiling_addr_offset: u32,
    pub tiling_data_offset: u32,
    pub host_input_info_num: u16,
    pub has_tiling: u8,
    pub is_no_need_h2d_copy: u8,
    pub reserved: [u8; 4],
}

#[repr(C)]
pub(crate) struct RtAicpuArgsEx {
    pub args: *mut c_void,
    pub host_input_info_ptr: *mut RtHostInputInfo,
    pub kernel_offset_info_ptr: *mut RtHostInputInfo,
    pub args_size: u32,
    pub host_input_info_num: u16,
    pub kernel_offset_info_num: u16,
    pub so_name_addr_offset: u32,
    pub kernel_name_addr_offset: u32,
    pub is_no_need_h2d_copy: bool,
    pub reserved: [u8; 3],
}

type RtGetSocVersionFn = unsafe extern "C" fn(version: *mut c_char, max_len: u32) -> RtError;
type RtDevBinaryRegisterFn =
    unsafe extern "C" fn(bin: *const RtDevBinary, handle: *mut *mut c_void) -> RtError;
type RtFunctionRegisterFn = unsafe extern "C" fn(
    bin_handle: *mut c_void,
    stub_func: *const c_void,
    stub_name: *const c_char,
    kernel_info_ext: *const c_void,
    func_mode: u32,
) -> RtError;
type RtRegisterAllKernelFn =
    unsafe extern "C" fn(bin: *const RtDevBinary, handle: *mut *mut c_void) -> RtError;
type RtKernelLaunchWithHandleFn = unsafe extern "C" fn(
    handle: *mut c_void,
    tiling_key: u64,
    block_dim: u32,
    args: *mut RtArgsEx,
    sm_desc: *mut c_void,
    stream: RtStream,
    cfg_info: *const c_void,
) -> RtError;
type RtKernelLaunchWithFlagFn = unsafe extern "C" fn(
    stub_func: *const c_void,
    block_dim: u32,
    args: *mut RtArgsEx,
    sm_desc: *mut c_void,
    stream: RtStream,
    flags: u32,
    cfg_info: *const c_void,
) -> RtError;
type RtAicpuKernelLaunchExWithArgsFn = unsafe extern "C" fn(
    kernel_type: u32,
    op_name: *const c_char,
    block_dim: u32,
    args: *const RtAicpuArgsEx,
    sm_desc: *mut c_void,
    stream: RtStream,
    flags: u32,
) -> RtError;
type RtGetC2cCtrlAddrFn = unsafe extern "C" fn(addr: *mut u64, len: *mut u32) -> RtError;
type RtMemsetAsyncFn = unsafe extern "C" fn(
    dst: *mut c_void,
    dest_max: u64,
    value: u32,
    count: u64,
    stream: RtStream,
) -> RtError;

struct RuntimeFns {
    get_soc_version: RtGetSocVersionFn,
    dev_binary_register: RtDevBinaryRegisterFn,
    function_register: RtFunctionRegisterFn,
    register_all_kernel: RtRegisterAllKernelFn,
    launch_with_handle: RtKernelLaunchWithHandleFn,
    launch_with_flag: RtKernelLaunchWithFlagFn,
    memset_async: RtMemsetAsyncFn,
    // Absent on older runtimes.
    aicpu_launch: Option<RtAicpuKernelLaunchExWithArgsFn>,
    get_c2c_ctrl_addr: Option<RtGetC2cCtrlAddrFn>,
}

/// The CANN runtime library plus the entry points the dispatcher uses.
pub struct AscendDriver {
    _lib: Library,
    fns: RuntimeFns,
    // Stub keys handed to rtFunctionRegister; their addresses must stay stable.
    stubs: Mutex<Vec<Box<u64>>>,
}

static ASCEND_DRIVER: OnceLock<Result<Arc<AscendDriver>, String>> = OnceLock::new();

pub fn is_available() -> bool {
    driver().is_ok()
}

pub fn driver() -> DispatchResult<Arc<AscendDriver>> {
    let init = ASCEND_DRIVER.get_or_init(|| match AscendDriver::new() {
        Ok(driver) => Ok(Arc::new(driver)),
        Err(err) => Err(format!("{err:#}")),
    });
    match init {
        Ok(driver) => Ok(Arc::clone(driver)),
        Err(msg) => Err(DispatchError::runtime(
            "load_runtime",
            format!("Ascend runtime unavailable: {msg}"),
        )),
    }
}

impl AscendDriver {
    fn new() -> anyhow::Result<Self> {
        let lib = load_runtime_library()?;
        let fns = RuntimeFns {
            get_soc_version: load_symbol(&lib, b"rtGetSocVersion\0")?,
            dev_binary_register: load_symbol(&lib, b"rtDevBinaryRegister\0")?,
            function_register: load_symbol(&lib, b"rtFunctionRegister\0")?,
            register_all_kernel: load_symbol(&lib, b"rtRegisterAllKernel\0")?,
            launch_with_handle: load_symbol(&lib, b"rtKernelLaunchWithHandleV2\0")?,
            launch_with_flag: load_symbol(&lib, b"rtKernelLaunchWithFlagV2\0")?,
            memset_async: load_symbol(&lib, b"rtMemsetAsync\0")?,
            aicpu_launch: load_symbol(&lib, b"rtAicpuKernelLaunchExWithArgs\0").ok(),
            get_c2c_ctrl_addr: load_symbol(&lib, b"rtGetC2cCtrlAddr\0").ok(),
        };
        tracing::debug!(
            aicpu = fns.aicpu_launch.is_some(),
            c2c = fns.get_c2c_ctrl_addr.is_some(),
            "Ascend runtime symbols resolved"
        );
        Ok(AscendDriver {
            _lib: lib,
            fns,
            stubs: Mutex::new(Vec::new()),
        })
    }

    pub fn soc_version(&self) -> DispatchResult<String> {
        let mut buf = [0 as c_char; SOC_VERSION_LEN];
        // SAFETY: buffer is writable for SOC_VERSION_LEN bytes and the runtime NUL-terminates it.
        let code = unsafe { (self.fns.get_soc_version)(buf.as_mut_ptr(), SOC_VERSION_LEN as u32) };
        check_rt(code, "rtGetSocVersion")?;
        // SAFETY: the runtime wrote a NUL-terminated string into `buf`.
        let version = unsafe { CStr::from_ptr(buf.as_ptr()) };
        Ok(version.to_string_lossy().into_owned())
    }

    /// Registers a device image and binds the one function named `stub_name`.
    /// Returns the stub key used for launches.
    pub fn register_function(
        &self,
        magic: u32,
        version: u32,
        code: &'static [u8],
        stub_name: &CStr,
    ) -> DispatchResult<u64> {
        let bin = dev_binary(magic, version, code);
        let mut module: *mut c_void = std::ptr::null_mut();
        // SAFETY: `bin` points at static code and `module` is a valid out pointer.
        let code = unsafe { (self.fns.dev_binary_register)(&bin, &mut module) };
        check_rt(code, "rtDevBinaryRegister")?;

        let stub = Box::new(0u64);
        let stub_ptr = &*stub as *const u64 as *const c_void;
        // SAFETY: module was produced above, the stub address lives as long as this driver
        // and the name is NUL-terminated.
        let code = unsafe {
            (self.fns.function_register)(
                module,
                stub_ptr,
                stub_name.as_ptr(),
                stub_name.as_ptr() as *const c_void,
                0,
            )
        };
        check_rt(code, "rtFunctionRegister")?;
        self.stubs
            .lock()
            .map_err(|_| DispatchError::runtime("rtFunctionRegister", "stub table poisoned"))?
            .push(stub);
        Ok(stub_ptr as u64)
    }

    /// Registers every function of a multi-kernel image and returns the image handle.
    pub fn register_all(&self, magic: u32, version: u32, code: &'static [u8]) -> DispatchResult<u64> {
        let bin = dev_binary(magic, version, code);
        let mut handle: *mut c_void = std::ptr::null_mut();
        // SAFETY: `bin` points at static code and `handle` is a valid out pointer.
        let code = unsafe { (self.fns.register_all_kernel)(&bin, &mut handle) };
        check_rt(code, "rtRegisterAllKernel")?;
        Ok(handle as u64)
    }

    pub(crate) fn launch_with_handle(
        &self,
        handle: u64,
        tiling_key: u64,
        block_dim: u32,
        args: &mut RtArgsEx,
        stream: u64,
    ) -> Result<(), RuntimeStatus> {
        // SAFETY: handle came from rtRegisterAllKernel and `args` points at live host buffers.
        let code = unsafe {
            (self.fns.launch_with_handle)(
                handle as *mut c_void,
                tiling_key,
                block_dim,
                args,
                std::ptr::null_mut(),
                stream as RtStream,
                std::ptr::null(),
            )
        };
        status(code)
    }

    pub(crate) fn launch_with_flag(
        &self,
        stub: u64,
        block_dim: u32,
        args: &mut RtArgsEx,
        stream: u64,
    ) -> Result<(), RuntimeStatus> {
        // SAFETY: stub was registered through rtFunctionRegister and `args` is live.
        let code = unsafe {
            (self.fns.launch_with_flag)(
                stub as *const c_void,
                block_dim,
                args,
                std::ptr::null_mut(),
                stream as RtStream,
                0,
                std::ptr::null(),
            )
        };
        status(code)
    }

    pub(crate) fn launch_aicpu(
        &self,
        block_dim: u32,
        args: &RtAicpuArgsEx,
        stream: u64,
    ) -> Result<(), RuntimeStatus> {
        let Some(launch) = self.fns.aicpu_launch else {
            tracing::error!("rtAicpuKernelLaunchExWithArgs is not exported by this runtime");
            return Err(RuntimeStatus(-1));
        };
        // SAFETY: `args` and the names it references live in the caller's argument block.
        let code = unsafe {
            launch(
                KERNEL_TYPE_AICPU,
                EMPTY_OP_NAME.as_ptr() as *const c_char,
                block_dim,
                args,
                std::ptr::null_mut(),
                stream as RtStream,
                0,
            )
        };
        status(code)
    }

    pub fn c2c_ctrl_addr(&self) -> DispatchResult<u64> {
        let get = self.fns.get_c2c_ctrl_addr.ok_or_else(|| {
            DispatchError::runtime("rtGetC2cCtrlAddr", "not exported by this runtime")
        })?;
        let mut addr = 0u64;
        let mut len = 0u32;
        // SAFETY: both out pointers are valid for writes.
        let code = unsafe { get(&mut addr, &mut len) };
        check_rt(code, "rtGetC2cCtrlAddr")?;
        Ok(addr)
    }

    pub fn memset_async(&self, addr: u64, bytes: u64, stream: u64) -> Result<(), RuntimeStatus> {
        // SAFETY: the caller guarantees `addr` is a device allocation of at least `bytes`.
        let code = unsafe {
            (self.fns.memset_async)(addr as *mut c_void, bytes, 0, bytes, stream as RtStream)
        };
        status(code)
    }
}

fn dev_binary(magic: u32, version: u32, code: &'static [u8]) -> RtDevBinary {
    RtDevBinary {
        magic,
        version,
        data: code.as_ptr() as *const c_void,
        length: code.len() as u64,
    }
}

/// Library paths tried in order: under `ASCEND_HOME_PATH` first, then the loader path.
pub(crate) fn library_candidates(home: Option<&str>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = home.map(str::trim).filter(|home| !home.is_empty()) {
        let home = PathBuf::from(home);
        candidates.push(home.join("lib64").join("libruntime.so"));
        candidates.push(home.join("runtime").join("lib64").join("libruntime.so"));
    }
    candidates.push(PathBuf::from("libruntime.so"));
    candidates
}

fn load_runtime_library() -> anyhow::Result<Library> {
    let home = env::var("ASCEND_HOME_PATH").ok();
    if home.is_none() {
        tracing::warn!("ASCEND_HOME_PATH is not set, relying on the library search path");
    }
    let candidates = library_candidates(home.as_deref());
    for candidate in &candidates {
        // SAFETY: Opening the library only; no symbols are invoked at this stage.
        match unsafe { Library::new(candidate) } {
            Ok(lib) => {
                tracing::debug!(path = %candidate.display(), "loaded Ascend runtime");
                return Ok(lib);
            }
            Err(err) => tracing::debug!(path = %candidate.display(), error = %err, "candidate library failed to open"),
        }
    }
    Err(anyhow!(
        "failed to load the Ascend runtime library (tried {})",
        candidates
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    ))
}

fn load_symbol<T: Copy>(lib: &Library, name: &'static [u8]) -> anyhow::Result<T> {
    // SAFETY: Caller provides the symbol type declared by the runtime headers.
    let sym = unsafe { lib.get::<T>(name) }
        .with_context(|| format!("failed to resolve {}", String::from_utf8_lossy(name)))?;
    Ok(*sym)
}

fn status(code: RtError) -> Result<(), RuntimeStatus> {
    if code == RT_SUCCESS {
        Ok(())
    } else {
        Err(RuntimeStatus(code))
    }
}

pub(crate) fn check_rt(code: RtError, call: &'static str) -> DispatchResult<()> {
    status(code).map_err(|status| {
        DispatchError::runtime(call, format!("runtime returned {status}"))
    })
}
