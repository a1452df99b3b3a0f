//! Turns the registries into operations with kernels bound on the current device.

use std::collections::HashMap;
use std::sync::Arc;

use crate::container;
use crate::device::{family_of, BinHandle, DeviceRuntime};
use crate::env;
use crate::error::DispatchError;
use crate::kernel::BoundKernel;
use crate::operation::BoundOperation;
use crate::registry::Registry;

/// Knobs that normally come from the environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderOptions {
    /// Replaces the device identity reported by the runtime.
    pub device_override: Option<String>,
    /// Fail the load when the device family is unknown.
    pub strict: bool,
}

impl LoaderOptions {
    pub fn from_env() -> Self {
        LoaderOptions {
            device_override: env::device_override().map(str::to_string),
            strict: env::strict_load(),
        }
    }
}

/// Result of one load pass. Immutable afterwards and safe to share between threads.
#[derive(Debug)]
pub struct Loader {
    device: Option<String>,
    family: Option<&'static str>,
    operations: Vec<BoundOperation>,
    index: HashMap<&'static str, usize>,
    error: Option<DispatchError>,
    rejected: Vec<DispatchError>,
}

impl Loader {
    pub fn load(registry: &Registry, runtime: Arc<dyn DeviceRuntime>) -> Loader {
        Self::load_with(registry, runtime, &LoaderOptions::from_env())
    }

    pub fn load_with(
        registry: &Registry,
        runtime: Arc<dyn DeviceRuntime>,
        options: &LoaderOptions,
    ) -> Loader {
        let mut loader = Loader {
            device: None,
            family: None,
            operations: Vec::new(),
            index: HashMap::new(),
            error: None,
            rejected: Vec::new(),
        };

        loader.device = match &options.device_override {
            Some(device) => Some(device.clone()),
            None => match runtime.soc_version() {
                Ok(device) => Some(device),
                Err(err) => {
                    tracing::error!(runtime = runtime.name(), error = %err, "cannot query device identity");
                    None
                }
            },
        };
        loader.family = loader.device.as_deref().and_then(family_of);
        if loader.family.is_none() {
            let device = loader.device.clone().unwrap_or_default();
            tracing::error!(device = %device, "device does not belong to any known kernel family");
            if options.strict {
                loader.error = Some(DispatchError::DeviceResolution { device });
                return loader;
            }
        }

        if let Err(err) = loader.create_operations(registry) {
            tracing::error!(error = %err, "operation registration is broken");
            loader.operations.clear();
            loader.index.clear();
            loader.error = Some(err);
            return loader;
        }
        loader.bind_kernels(registry, &runtime);

        for op in &loader.operations {
            if op.kernel_list().is_empty() {
                tracing::warn!(operation = op.name(), "operation has no kernel on this device");
            }
        }
        tracing::debug!(
            device = loader.device.as_deref().unwrap_or(""),
            family = loader.family.unwrap_or(""),
            operations = loader.operations.len(),
            kernels = loader.operations.iter().map(|op| op.kernel_list().len()).sum::<usize>(),
            "loader finished"
        );
        loader
    }

    fn create_operations(&mut self, registry: &Registry) -> Result<(), DispatchError> {
        for entry in registry.operations() {
            if self.index.contains_key(entry.name) {
                tracing::warn!(operation = entry.name, "duplicate operation registration ignored");
                continue;
            }
            let op = (entry.factory)();
            if op.name() != entry.name {
                return Err(DispatchError::programming(format!(
                    "operation registered as {} reports name {}",
                    entry.name,
                    op.name()
                )));
            }
            self.index.insert(entry.name, self.operations.len());
            self.operations.push(BoundOperation::new(entry.name, op));
        }
        Ok(())
    }

    fn bind_kernels(&mut self, registry: &Registry, runtime: &Arc<dyn DeviceRuntime>) {
        let Some(family) = self.family else {
            return;
        };
        for entry in registry.kernels() {
            let Some(&op_idx) = self.index.get(entry.op_name) else {
                tracing::warn!(
                    operation = entry.op_name,
                    kernel = entry.kernel_name,
                    "kernel registered for an unknown operation"
                );
                continue;
            };
            let Some(variant) = registry.binary_for(entry.kernel_name, family) else {
                tracing::debug!(kernel = entry.kernel_name, family, "no binary for this family");
                continue;
            };
            let meta = match container::parse(variant.bytes) {
                Ok(meta) => meta,
                Err(source) => {
                    tracing::warn!(kernel = entry.kernel_name, family, error = %source, "rejected kernel binary");
                    self.rejected.push(DispatchError::ContainerFormat {
                        kernel: entry.kernel_name.to_string(),
                        source,
                    });
                    continue;
                }
            };
            let handle = match BinHandle::bind(entry.kernel_name, family, meta, runtime.as_ref()) {
                Ok(handle) => handle,
                Err(err) => {
                    tracing::warn!(kernel = entry.kernel_name, error = %err, "failed to bind kernel");
                    self.rejected.push(err);
                    continue;
                }
            };
            let kernel = BoundKernel::new(
                entry.kernel_name,
                entry.op_name,
                handle,
                entry.factory,
                Arc::clone(runtime),
            );
            if !self.operations[op_idx].add_kernel(kernel) {
                tracing::warn!(
                    operation = entry.op_name,
                    kernel = entry.kernel_name,
                    "duplicate kernel registration ignored"
                );
            }
        }
    }

    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// Why the load failed, when it did.
    pub fn error(&self) -> Option<&DispatchError> {
        self.error.as_ref()
    }

    /// Kernels left out of an otherwise valid load: unparseable binaries and failed binds.
    pub fn rejected(&self) -> &[DispatchError] {
        &self.rejected
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    pub fn family(&self) -> Option<&'static str> {
        self.family
    }

    pub fn operations(&self) -> &[BoundOperation] {
        &self.operations
    }

    pub fn operation(&self, name: &str) -> Option<&BoundOperation> {
        self.index.get(name).map(|idx| &self.operations[*idx])
    }
}
