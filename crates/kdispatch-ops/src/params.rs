//! Operation parameters carried in [`kdispatch::LaunchParam`].

/// Removes padding from a batch of token sequences. Carries no attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unpad;

/// Elementwise float16 addition. Carries no attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddCustom;
