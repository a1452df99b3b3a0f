//! Scalar element types understood by device kernels.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Element type tag. Discriminants are the stable values shared with kernel packages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum DType {
    #[default]
    Undefined = -1,
    Float = 0,
    Float16 = 1,
    Int8 = 2,
    Int32 = 3,
    Uint8 = 4,
    Int16 = 6,
    Uint16 = 7,
    Uint32 = 8,
    Int64 = 9,
    Uint64 = 10,
    Double = 11,
    Bool = 12,
    String = 13,
    Complex64 = 16,
    Complex128 = 17,
    Bf16 = 27,
}

const ALL: [DType; 17] = [
    DType::Undefined,
    DType::Float,
    DType::Float16,
    DType::Int8,
    DType::Int32,
    DType::Uint8,
    DType::Int16,
    DType::Uint16,
    DType::Uint32,
    DType::Int64,
    DType::Uint64,
    DType::Double,
    DType::Bool,
    DType::String,
    DType::Complex64,
    DType::Complex128,
    DType::Bf16,
];

impl DType {
    /// Bytes per element, or `None` for types that cannot back a device tensor.
    pub fn element_size(self) -> Option<usize> {
        match self {
            DType::Float | DType::Int32 | DType::Uint32 => Some(4),
            DType::Float16 | DType::Bf16 | DType::Int16 | DType::Uint16 => Some(2),
            DType::Int8 | DType::Uint8 | DType::Bool => Some(1),
            DType::Int64 | DType::Uint64 | DType::Double => Some(8),
            DType::Undefined | DType::String | DType::Complex64 | DType::Complex128 => None,
        }
    }

    pub fn tag(self) -> i32 {
        self as i32
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        ALL.into_iter().find(|dtype| dtype.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Undefined => "undefined",
            DType::Float => "float",
            DType::Float16 => "float16",
            DType::Int8 => "int8",
            DType::Int32 => "int32",
            DType::Uint8 => "uint8",
            DType::Int16 => "int16",
            DType::Uint16 => "uint16",
            DType::Uint32 => "uint32",
            DType::Int64 => "int64",
            DType::Uint64 => "uint64",
            DType::Double => "double",
            DType::Bool => "bool",
            DType::String => "string",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::Bf16 => "bf16",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL.into_iter()
            .find(|dtype| *dtype != DType::Undefined && dtype.name() == s)
            .ok_or_else(|| format!("unknown dtype `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for dtype in ALL.into_iter().filter(|d| *d != DType::Undefined) {
            assert_eq!(dtype.name().parse::<DType>(), Ok(dtype));
        }
        assert!("undefined".parse::<DType>().is_err());
        assert!("fp8".parse::<DType>().is_err());
    }

    #[test]
    fn tags_are_stable() {
        assert_eq!(DType::Bf16.tag(), 27);
        assert_eq!(DType::from_tag(9), Some(DType::Int64));
        assert_eq!(DType::from_tag(5), None);
    }

    #[test]
    fn unsized_types_have_no_element_size() {
        assert_eq!(DType::Float16.element_size(), Some(2));
        assert_eq!(DType::String.element_size(), None);
        assert_eq!(DType::Complex64.element_size(), None);
    }
}
