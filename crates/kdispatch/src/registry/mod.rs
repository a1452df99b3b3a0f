//! Process-wide catalogues of operations, kernels and packaged kernel binaries.
//!
//! Entries are collected at link time through [`linkme`] slices, so every
//! registration is complete before `main` runs and before any loader reads them.
//! Registration order carries no meaning.

use std::sync::OnceLock;

use crate::kernel::{Kernel, KernelFactory};
use crate::operation::Operation;

/// Produces a fresh operation object.
pub type OperationFactory = fn() -> Box<dyn Operation>;

#[derive(Debug, Clone, Copy)]
pub struct OperationRegistration {
    pub name: &'static str,
    pub factory: OperationFactory,
}

#[derive(Debug, Clone, Copy)]
pub struct KernelRegistration {
    pub op_name: &'static str,
    pub kernel_name: &'static str,
    pub factory: KernelFactory,
}

/// Packaged device code of one kernel for one device family.
#[derive(Debug, Clone, Copy)]
pub struct BinaryVariant {
    pub kernel_name: &'static str,
    pub family: &'static str,
    pub bytes: &'static [u8],
}

#[linkme::distributed_slice]
pub static OPERATIONS: [OperationRegistration] = [..];

#[linkme::distributed_slice]
pub static KERNELS: [KernelRegistration] = [..];

#[linkme::distributed_slice]
pub static KERNEL_BINARIES: [BinaryVariant] = [..];

pub fn create_operation<T: Operation + Default + 'static>() -> Box<dyn Operation> {
    Box::new(T::default())
}

pub fn create_kernel<T: Kernel + Default + 'static>() -> Box<dyn Kernel> {
    Box::new(T::default())
}

/// Validated snapshot of registrations. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    operations: Vec<OperationRegistration>,
    kernels: Vec<KernelRegistration>,
    binaries: Vec<BinaryVariant>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Everything registered through the static slices.
    pub fn from_static() -> Registry {
        RegistryBuilder::default().with_static().build()
    }

    /// The static registry, collected once per process.
    pub fn global() -> &'static Registry {
        GLOBAL.get_or_init(Registry::from_static)
    }

    pub fn operations(&self) -> &[OperationRegistration] {
        &self.operations
    }

    pub fn kernels(&self) -> &[KernelRegistration] {
        &self.kernels
    }

    pub fn binaries(&self) -> &[BinaryVariant] {
        &self.binaries
    }

    /// First binary registered for `kernel_name` under `family`.
    pub fn binary_for(&self, kernel_name: &str, family: &str) -> Option<&BinaryVariant> {
        self.binaries
            .iter()
            .find(|variant| variant.kernel_name == kernel_name && variant.family == family)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.kernels.is_empty() && self.binaries.is_empty()
    }
}

/// Collects registrations, dropping malformed ones with a warning.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    registry: Registry,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_static(mut self) -> Self {
        for entry in OPERATIONS.iter() {
            self = self.operation(entry.name, entry.factory);
        }
        for entry in KERNELS.iter() {
            self = self.kernel(entry.op_name, entry.kernel_name, entry.factory);
        }
        for entry in KERNEL_BINARIES.iter() {
            self = self.binary(entry.kernel_name, entry.family, entry.bytes);
        }
        self
    }

    pub fn operation(mut self, name: &'static str, factory: OperationFactory) -> Self {
        if name.is_empty() {
            tracing::warn!("operation registration without a name ignored");
            return self;
        }
        tracing::debug!(operation = name, "operation registered");
        self.registry
            .operations
            .push(OperationRegistration { name, factory });
        self
    }

    pub fn kernel(
        mut self,
        op_name: &'static str,
        kernel_name: &'static str,
        factory: KernelFactory,
    ) -> Self {
        if op_name.is_empty() || kernel_name.is_empty() {
            tracing::warn!(
                operation = op_name,
                kernel = kernel_name,
                "kernel registration with an empty name ignored"
            );
            return self;
        }
        tracing::debug!(operation = op_name, kernel = kernel_name, "kernel registered");
        self.registry.kernels.push(KernelRegistration {
            op_name,
            kernel_name,
            factory,
        });
        self
    }

    pub fn binary(
        mut self,
        kernel_name: &'static str,
        family: &'static str,
        bytes: &'static [u8],
    ) -> Self {
        if kernel_name.is_empty() || family.is_empty() || bytes.is_empty() {
            tracing::warn!(
                kernel = kernel_name,
                family,
                len = bytes.len(),
                "kernel binary registration ignored"
            );
            return self;
        }
        tracing::debug!(kernel = kernel_name, family, len = bytes.len(), "kernel binary registered");
        self.registry.binaries.push(BinaryVariant {
            kernel_name,
            family,
            bytes,
        });
        self
    }

    pub fn build(self) -> Registry {
        self.registry
    }
}

/// Registers an operation type (`Default + Operation`) in the static catalogue.
///
/// ```ignore
/// kdispatch::register_operation!(UNPAD_OPERATION, UnpadOperation);
/// kdispatch::register_operation!(ADD_OPERATION, AddOperation, "Add");
/// ```
#[macro_export]
macro_rules! register_operation {
    ($slot:ident, $ty:ident) => {
        $crate::register_operation!($slot, $ty, stringify!($ty));
    };
    ($slot:ident, $ty:ty, $name:expr) => {
        #[$crate::linkme::distributed_slice($crate::registry::OPERATIONS)]
        #[linkme(crate = $crate::linkme)]
        static $slot: $crate::registry::OperationRegistration =
            $crate::registry::OperationRegistration {
                name: $name,
                factory: $crate::registry::create_operation::<$ty>,
            };
    };
}

/// Registers a kernel type (`Default + Kernel`) under an operation name.
///
/// ```ignore
/// kdispatch::register_kernel!(UNPAD_KERNEL, UnpadOperation, UnpadKernel);
/// kdispatch::register_kernel!(ADD_KERNEL, "AddCustomOperation", AddCustomKernel, "AddCustomKernel");
/// ```
#[macro_export]
macro_rules! register_kernel {
    ($slot:ident, $op:ident, $ty:ident) => {
        $crate::register_kernel!($slot, stringify!($op), $ty, stringify!($ty));
    };
    ($slot:ident, $op:expr, $ty:ty, $name:expr) => {
        #[$crate::linkme::distributed_slice($crate::registry::KERNELS)]
        #[linkme(crate = $crate::linkme)]
        static $slot: $crate::registry::KernelRegistration = $crate::registry::KernelRegistration {
            op_name: $op,
            kernel_name: $name,
            factory: $crate::registry::create_kernel::<$ty>,
        };
    };
}

/// Registers packaged device code of a kernel for one device family.
///
/// ```ignore
/// kdispatch::register_kernel_binary!(
///     UNPAD_910B,
///     "UnpadKernel",
///     kdispatch::device::families::ASCEND910B,
///     include_bytes!("unpad_910b.bin")
/// );
/// ```
#[macro_export]
macro_rules! register_kernel_binary {
    ($slot:ident, $kernel:expr, $family:expr, $bytes:expr) => {
        #[$crate::linkme::distributed_slice($crate::registry::KERNEL_BINARIES)]
        #[linkme(crate = $crate::linkme)]
        static $slot: $crate::registry::BinaryVariant = $crate::registry::BinaryVariant {
            kernel_name: $kernel,
            family: $family,
            bytes: $bytes,
        };
    };
}
