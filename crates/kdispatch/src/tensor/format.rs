use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Memory layout tag of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(i32)]
pub enum Format {
    #[default]
    Undefined = -1,
    Nchw = 0,
    Nhwc = 1,
    Nd = 2,
    Nc1hwc0 = 3,
    FractalZ = 4,
    Nc1hwc0C04 = 12,
    Hwcn = 16,
    Ndhwc = 27,
    FractalNz = 29,
    Ncdhw = 30,
    Ndc1hwc0 = 32,
    FractalZ3d = 33,
}

const ALL: [Format; 13] = [
    Format::Undefined,
    Format::Nchw,
    Format::Nhwc,
    Format::Nd,
    Format::Nc1hwc0,
    Format::FractalZ,
    Format::Nc1hwc0C04,
    Format::Hwcn,
    Format::Ndhwc,
    Format::FractalNz,
    Format::Ncdhw,
    Format::Ndc1hwc0,
    Format::FractalZ3d,
];

impl Format {
    pub fn tag(self) -> i32 {
        self as i32
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        ALL.into_iter().find(|format| format.tag() == tag)
    }

    pub fn name(self) -> &'static str {
        match self {
            Format::Undefined => "undefined",
            Format::Nchw => "nchw",
            Format::Nhwc => "nhwc",
            Format::Nd => "nd",
            Format::Nc1hwc0 => "nc1hwc0",
            Format::FractalZ => "fractal_z",
            Format::Nc1hwc0C04 => "nc1hwc0_c04",
            Format::Hwcn => "hwcn",
            Format::Ndhwc => "ndhwc",
            Format::FractalNz => "fractal_nz",
            Format::Ncdhw => "ncdhw",
            Format::Ndc1hwc0 => "ndc1hwc0",
            Format::FractalZ3d => "fractal_z_3d",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL.into_iter()
            .find(|format| *format != Format::Undefined && format.name() == s)
            .ok_or_else(|| format!("unknown format `{s}`"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_back() {
        for format in ALL.into_iter().filter(|f| *f != Format::Undefined) {
            assert_eq!(format.name().parse::<Format>(), Ok(format));
        }
        assert_eq!(Format::from_tag(29), Some(Format::FractalNz));
        assert_eq!(Format::from_tag(5), None);
    }
}
