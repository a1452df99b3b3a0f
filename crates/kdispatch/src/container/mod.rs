//! Decoder for the packaged kernel container.
//!
//! A container is a fixed 128-byte header of eight native-endian `u32` fields followed
//! by three length-prefixed sections:
//!
//! ```text
//! [ header: version magic tiling_size core_type kernel_num
//!           name_offset compile_info_offset code_offset  (padding, crc) ]
//! [ name table: kernel_num x (u32 len, len bytes, NUL padded) ]
//! [ compile info: u32 len, len bytes, NUL padded ]
//! [ code: u32 len, len bytes ]  <- must end exactly at the end of the buffer
//! ```
//!
//! Section offsets are relative to the first byte after the header. Every name, the
//! compile info and the code are returned as views into the original bytes.

mod writer;

use std::ffi::CStr;

use serde::Serialize;
use thiserror::Error;

pub use writer::ContainerWriter;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 128;
const FIELD_LEN: usize = 4;
const TILING_ALIGN: u64 = 8;

/// Well-known magic tags of device images.
pub mod magic {
    pub const ELF: u32 = 0x4355_4245;
    pub const ELF_AIVEC: u32 = 0x4141_5246;
    pub const ELF_AICUBE: u32 = 0x4149_4343;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("container of {len} bytes is not longer than the {HEADER_LEN} byte header")]
    TooShort { len: usize },
    #[error("header declares zero kernels")]
    ZeroKernelCount,
    #[error("header magic is zero")]
    ZeroMagic,
    #[error("name table entry {index} runs past the end of the container")]
    NameTableTruncated { index: usize },
    #[error("name table entry {index} is not NUL terminated within its declared length")]
    NameUnterminated { index: usize },
    #[error("name table entry {index} is not valid UTF-8")]
    NameNotUtf8 { index: usize },
    #[error("compile info runs past the end of the container")]
    CompileInfoTruncated,
    #[error("compile info is not NUL terminated within its declared length")]
    CompileInfoUnterminated,
    #[error("compile info is not valid UTF-8")]
    CompileInfoNotUtf8,
    #[error("code section runs past the end of the container")]
    CodeTruncated,
    #[error("code section ends at {declared_end} but the container ends at {actual_end}")]
    CodeLengthMismatch {
        declared_end: usize,
        actual_end: usize,
    },
}

/// The eight header fields, in wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ContainerHeader {
    pub version: u32,
    pub magic: u32,
    pub tiling_size: u32,
    pub core_type: u32,
    pub kernel_num: u32,
    pub kernel_name_offset: u32,
    pub compile_info_offset: u32,
    pub kernel_code_offset: u32,
}

impl ContainerHeader {
    fn read(bytes: &[u8]) -> Self {
        let field = |idx: usize| read_u32(bytes, idx * FIELD_LEN);
        ContainerHeader {
            version: field(0),
            magic: field(1),
            tiling_size: field(2),
            core_type: field(3),
            kernel_num: field(4),
            kernel_name_offset: field(5),
            compile_info_offset: field(6),
            kernel_code_offset: field(7),
        }
    }
}

/// Execution unit a device image was compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum KernelType {
    AiCore,
    Aiv,
    MixAic,
    AiCpu,
}

impl KernelType {
    /// Maps a header core-type tag; unknown tags fall back to `MixAic`.
    pub fn from_core_type(tag: u32) -> Self {
        match tag {
            0 => KernelType::AiCore,
            2 => KernelType::Aiv,
            4 => KernelType::MixAic,
            other => {
                tracing::warn!(core_type = other, "unexpected core type, using MixAic");
                KernelType::MixAic
            }
        }
    }
}

/// Parsed view of one container. Borrows everything from the source bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelMetaInfo<'a> {
    pub header: ContainerHeader,
    pub kernel_names: Vec<&'a str>,
    pub compile_info: &'a str,
    pub code: &'a [u8],
}

impl<'a> KernelMetaInfo<'a> {
    /// Tiling payload size rounded up to a multiple of 8 bytes.
    pub fn tiling_size(&self) -> u64 {
        u64::from(self.header.tiling_size).div_ceil(TILING_ALIGN) * TILING_ALIGN
    }

    pub fn kernel_type(&self) -> KernelType {
        KernelType::from_core_type(self.header.core_type)
    }

    pub fn magic(&self) -> u32 {
        self.header.magic
    }
}

/// Parses `bytes` into borrowed metadata, bounds-checking every read.
pub fn parse(bytes: &[u8]) -> Result<KernelMetaInfo<'_>, ContainerError> {
    if bytes.len() <= HEADER_LEN {
        return Err(ContainerError::TooShort { len: bytes.len() });
    }
    let header = ContainerHeader::read(bytes);
    if header.kernel_num == 0 {
        return Err(ContainerError::ZeroKernelCount);
    }
    if header.magic == 0 {
        return Err(ContainerError::ZeroMagic);
    }

    let body = &bytes[HEADER_LEN..];
    let end = body.len();

    let mut cursor = header.kernel_name_offset as usize;
    let mut kernel_names = Vec::with_capacity(header.kernel_num.min(64) as usize);
    for index in 0..header.kernel_num as usize {
        let (field, next) = length_prefixed(body, cursor)
            .ok_or(ContainerError::NameTableTruncated { index })?;
        let name = terminated_str(field).map_err(|err| err.into_name_error(index))?;
        kernel_names.push(name);
        cursor = next;
    }

    let (field, _) = length_prefixed(body, header.compile_info_offset as usize)
        .ok_or(ContainerError::CompileInfoTruncated)?;
    let compile_info = terminated_str(field).map_err(|err| match err {
        StrError::Unterminated => ContainerError::CompileInfoUnterminated,
        StrError::NotUtf8 => ContainerError::CompileInfoNotUtf8,
    })?;

    let code_start = header.kernel_code_offset as usize;
    let len_end = code_start
        .checked_add(FIELD_LEN)
        .filter(|len_end| *len_end <= end)
        .ok_or(ContainerError::CodeTruncated)?;
    let code_len = read_u32(body, code_start) as usize;
    let declared_end = len_end
        .checked_add(code_len)
        .ok_or(ContainerError::CodeTruncated)?;
    if declared_end != end {
        return Err(ContainerError::CodeLengthMismatch {
            declared_end: declared_end.saturating_add(HEADER_LEN),
            actual_end: end + HEADER_LEN,
        });
    }
    let code = &body[len_end..declared_end];

    Ok(KernelMetaInfo {
        header,
        kernel_names,
        compile_info,
        code,
    })
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; FIELD_LEN];
    raw.copy_from_slice(&bytes[at..at + FIELD_LEN]);
    u32::from_ne_bytes(raw)
}

/// Reads a `u32` length and the bytes it covers, returning them and the next cursor.
fn length_prefixed(body: &[u8], cursor: usize) -> Option<(&[u8], usize)> {
    let data_start = cursor.checked_add(FIELD_LEN)?;
    if data_start > body.len() {
        return None;
    }
    let len = read_u32(body, cursor) as usize;
    let data_end = data_start.checked_add(len)?;
    if data_end > body.len() {
        return None;
    }
    Some((&body[data_start..data_end], data_end))
}

enum StrError {
    Unterminated,
    NotUtf8,
}

impl StrError {
    fn into_name_error(self, index: usize) -> ContainerError {
        match self {
            StrError::Unterminated => ContainerError::NameUnterminated { index },
            StrError::NotUtf8 => ContainerError::NameNotUtf8 { index },
        }
    }
}

/// The declared length must strictly exceed the string length, so a NUL has to
/// appear inside the field.
fn terminated_str(field: &[u8]) -> Result<&str, StrError> {
    let cstr = CStr::from_bytes_until_nul(field).map_err(|_| StrError::Unterminated)?;
    cstr.to_str().map_err(|_| StrError::NotUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(code: &[u8]) -> Vec<u8> {
        ContainerWriter::new(magic::ELF_AICUBE)
            .version(7)
            .tiling_size(48)
            .core_type(1)
            .kernel("k0")
            .kernel("k1")
            .compile_info("abc")
            .build(code)
    }

    #[test]
    fn round_trip_preserves_fields() {
        let code: Vec<u8> = (0u8..=200).collect();
        let bytes = sample(&code);
        let meta = parse(&bytes).expect("well-formed container");
        assert_eq!(meta.header.version, 7);
        assert_eq!(meta.header.magic, 0x4149_4343);
        assert_eq!(meta.header.tiling_size, 48);
        assert_eq!(meta.header.core_type, 1);
        assert_eq!(meta.kernel_names, vec!["k0", "k1"]);
        assert_eq!(meta.compile_info, "abc");
        assert_eq!(meta.code, code.as_slice());
        let code_ptr = meta.code.as_ptr() as usize;
        let base = bytes.as_ptr() as usize;
        assert!(
            code_ptr >= base && code_ptr + meta.code.len() == base + bytes.len(),
            "code must be a view into the container tail"
        );
    }

    #[test]
    fn rejects_short_and_degenerate_headers() {
        assert_eq!(
            parse(&[0u8; HEADER_LEN]),
            Err(ContainerError::TooShort { len: HEADER_LEN })
        );
        assert_eq!(parse(&[]), Err(ContainerError::TooShort { len: 0 }));

        let mut bytes = sample(b"code");
        bytes[16..20].copy_from_slice(&0u32.to_ne_bytes());
        assert_eq!(parse(&bytes), Err(ContainerError::ZeroKernelCount));

        let mut bytes = sample(b"code");
        bytes[4..8].copy_from_slice(&0u32.to_ne_bytes());
        assert_eq!(parse(&bytes), Err(ContainerError::ZeroMagic));
    }

    #[test]
    fn truncation_before_name_table_end_never_parses() {
        let bytes = sample(b"payload");
        let meta = parse(&bytes).unwrap();
        let names_end = HEADER_LEN + meta.header.compile_info_offset as usize;
        for cut in HEADER_LEN + 1..names_end {
            let mut truncated = bytes[..cut].to_vec();
            assert!(parse(&truncated).is_err(), "cut at {cut} parsed");
            // Declaring more kernels than present must fail the same way.
            truncated[16..20].copy_from_slice(&9u32.to_ne_bytes());
            assert!(parse(&truncated).is_err(), "cut at {cut} with count 9 parsed");
        }
    }

    #[test]
    fn kernel_count_past_table_is_rejected() {
        let mut bytes = sample(b"payload");
        bytes[16..20].copy_from_slice(&1000u32.to_ne_bytes());
        assert!(matches!(
            parse(&bytes),
            Err(ContainerError::NameTableTruncated { .. }) | Err(ContainerError::NameUnterminated { .. })
        ));
    }

    #[test]
    fn code_length_must_match_exactly() {
        let mut longer = sample(b"abcd");
        longer.push(0);
        assert!(matches!(
            parse(&longer),
            Err(ContainerError::CodeLengthMismatch { .. })
        ));

        let shorter = sample(b"abcd");
        assert!(matches!(
            parse(&shorter[..shorter.len() - 1]),
            Err(ContainerError::CodeLengthMismatch { .. })
        ));

        let mut huge = sample(b"abcd");
        let meta = parse(&huge).unwrap();
        let len_at = HEADER_LEN + meta.header.kernel_code_offset as usize;
        huge[len_at..len_at + 4].copy_from_slice(&u32::MAX.to_ne_bytes());
        assert!(parse(&huge).is_err());
    }

    #[test]
    fn names_need_a_terminator_inside_their_length() {
        let mut bytes = sample(b"x");
        // First name field is "k0\0\0" with declared length 4; shrink it to 2.
        let at = HEADER_LEN;
        bytes[at..at + 4].copy_from_slice(&2u32.to_ne_bytes());
        assert!(parse(&bytes).is_err());
    }

    #[test]
    fn tiling_size_rounds_up_to_eight() {
        let bytes = ContainerWriter::new(magic::ELF)
            .tiling_size(13)
            .kernel("only")
            .build(b"c");
        let meta = parse(&bytes).unwrap();
        assert_eq!(meta.tiling_size(), 16);
        assert_eq!(meta.kernel_type(), KernelType::AiCore);
    }

    #[test]
    fn core_type_mapping() {
        assert_eq!(KernelType::from_core_type(2), KernelType::Aiv);
        assert_eq!(KernelType::from_core_type(4), KernelType::MixAic);
        assert_eq!(KernelType::from_core_type(9), KernelType::MixAic);
    }
}
