//! Ascend NPU backend for `kdispatch`.
//!
//! The CANN runtime is opened with `libloading` on first use, so this crate builds and
//! links on machines without the toolkit. Probing order is `$ASCEND_HOME_PATH/lib64`,
//! `$ASCEND_HOME_PATH/runtime/lib64`, then the dynamic loader's search path.
//!
//! ```no_run
//! let runtime = kdispatch_backend_ascend::AscendRuntime::shared()?;
//! kdispatch::install_runtime(runtime)?;
//! let schedule = kdispatch::ops()?;
//! # Ok::<(), kdispatch::DispatchError>(())
//! ```

mod driver;
mod runtime;

pub use driver::{driver, is_available, AscendDriver};
pub use runtime::AscendRuntime;
