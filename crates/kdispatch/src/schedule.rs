//! Lookup front-end over a finished load, plus the process-wide instance.

use std::sync::{Arc, OnceLock};

use crate::device::DeviceRuntime;
use crate::error::{DispatchError, DispatchResult};
use crate::kernel::KernelInstance;
use crate::loader::Loader;
use crate::operation::BoundOperation;
use crate::registry::Registry;

#[derive(Debug)]
pub struct OpSchedule {
    loader: Loader,
}

impl OpSchedule {
    pub fn new(loader: Loader) -> Self {
        OpSchedule { loader }
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    fn check_valid(&self) -> DispatchResult<()> {
        match self.loader.error() {
            None => Ok(()),
            Some(err) => Err(DispatchError::programming(format!(
                "operations unavailable, load failed: {err}"
            ))),
        }
    }

    pub fn all_operations(&self) -> DispatchResult<&[BoundOperation]> {
        self.check_valid()?;
        Ok(self.loader.operations())
    }

    pub fn operation(&self, name: &str) -> DispatchResult<&BoundOperation> {
        self.check_valid()?;
        self.loader.operation(name).ok_or_else(|| {
            tracing::warn!(operation = name, "operation not found");
            DispatchError::OperationNotFound(name.to_string())
        })
    }

    /// A fresh instance of the first kernel called `kernel_name`, in any operation.
    pub fn kernel_instance(&self, kernel_name: &str) -> DispatchResult<KernelInstance> {
        self.check_valid()?;
        self.loader
            .operations()
            .iter()
            .find_map(|op| op.kernel_table().get(kernel_name))
            .map(|kernel| kernel.clone_instance())
            .ok_or_else(|| DispatchError::KernelNotFound {
                op: "*".to_string(),
                kernel: kernel_name.to_string(),
            })
    }
}

static RUNTIME: OnceLock<Arc<dyn DeviceRuntime>> = OnceLock::new();
static SCHEDULE: OnceLock<OpSchedule> = OnceLock::new();

/// Sets the device runtime used by [`ops`]. Only the first call succeeds.
pub fn install_runtime(runtime: Arc<dyn DeviceRuntime>) -> DispatchResult<()> {
    let name = runtime.name().to_string();
    RUNTIME.set(runtime).map_err(|_| {
        DispatchError::programming(format!("device runtime already installed, refusing {name}"))
    })?;
    tracing::debug!(runtime = %name, "device runtime installed");
    Ok(())
}

/// The process-wide schedule, loaded from the static registry on first use.
pub fn ops() -> DispatchResult<&'static OpSchedule> {
    if let Some(schedule) = SCHEDULE.get() {
        return Ok(schedule);
    }
    let runtime = RUNTIME
        .get()
        .ok_or_else(|| DispatchError::programming("no device runtime installed"))?;
    Ok(SCHEDULE.get_or_init(|| {
        OpSchedule::new(Loader::load(Registry::global(), Arc::clone(runtime)))
    }))
}
