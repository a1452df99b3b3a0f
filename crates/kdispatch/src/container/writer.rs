use super::{FIELD_LEN, HEADER_LEN};

/// Builds containers in the layout [`super::parse`] accepts.
///
/// Names and compile info are NUL padded to the next 4-byte boundary (always at
/// least one NUL), and the last header word carries a zero CRC.
#[derive(Debug, Clone)]
pub struct ContainerWriter {
    version: u32,
    magic: u32,
    tiling_size: u32,
    core_type: u32,
    kernels: Vec<String>,
    compile_info: String,
}

impl ContainerWriter {
    pub fn new(magic: u32) -> Self {
        ContainerWriter {
            version: 0,
            magic,
            tiling_size: 0,
            core_type: 0,
            kernels: Vec::new(),
            compile_info: String::from("{}"),
        }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn tiling_size(mut self, bytes: u32) -> Self {
        self.tiling_size = bytes;
        self
    }

    pub fn core_type(mut self, tag: u32) -> Self {
        self.core_type = tag;
        self
    }

    pub fn kernel(mut self, name: impl Into<String>) -> Self {
        self.kernels.push(name.into());
        self
    }

    pub fn compile_info(mut self, info: impl Into<String>) -> Self {
        self.compile_info = info.into();
        self
    }

    pub fn build(&self, code: &[u8]) -> Vec<u8> {
        let names: Vec<Vec<u8>> = self.kernels.iter().map(|name| padded(name)).collect();
        let compile_info = padded(&self.compile_info);

        let name_offset = 0usize;
        let compile_info_offset = names
            .iter()
            .map(|name| FIELD_LEN + name.len())
            .sum::<usize>();
        let code_offset = compile_info_offset + FIELD_LEN + compile_info.len();

        let mut out = Vec::with_capacity(HEADER_LEN + code_offset + FIELD_LEN + code.len());
        for field in [
            self.version,
            self.magic,
            self.tiling_size,
            self.core_type,
            self.kernels.len() as u32,
            name_offset as u32,
            compile_info_offset as u32,
            code_offset as u32,
        ] {
            out.extend_from_slice(&field.to_ne_bytes());
        }
        out.resize(HEADER_LEN - FIELD_LEN, 0);
        out.extend_from_slice(&0u32.to_ne_bytes());

        for name in &names {
            push_prefixed(&mut out, name);
        }
        push_prefixed(&mut out, &compile_info);
        push_prefixed(&mut out, code);
        out
    }
}

fn padded(text: &str) -> Vec<u8> {
    let width = (text.len() / FIELD_LEN + 1) * FIELD_LEN;
    let mut bytes = text.as_bytes().to_vec();
    bytes.resize(width, 0);
    bytes
}

fn push_prefixed(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_ne_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padding_always_leaves_a_terminator() {
        assert_eq!(padded("abc"), b"abc\0".to_vec());
        assert_eq!(padded("abcd"), b"abcd\0\0\0\0".to_vec());
        assert_eq!(padded(""), vec![0; 4]);
    }

    #[test]
    fn header_is_fixed_size() {
        let bytes = ContainerWriter::new(1).kernel("k").build(&[]);
        // header + name(4 + 4) + compile info(4 + 4) + code length(4)
        assert_eq!(bytes.len(), HEADER_LEN + 8 + 8 + 4);
    }
}
