//! Operations shipped with `kdispatch`.
//!
//! Each operation and kernel registers itself at link time, so depending on this crate
//! is enough for [`kdispatch::Registry::global`] to see them. Device code is packaged
//! per family by the build that produces the kernel binaries and registered with
//! [`kdispatch::register_kernel_binary!`].

pub mod add_custom;
pub mod params;
pub mod unpad;

pub use add_custom::{AddCustomKernel, AddCustomOperation, AddCustomTiling};
pub use unpad::{UnpadKernel, UnpadOperation, UnpadTiling};
