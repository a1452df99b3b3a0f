//! Shared test support: a recording device runtime plus container and tensor fixtures.

mod recording_runtime;

pub use recording_runtime::{
    BindRecord, LaunchKind, LaunchRecord, MemsetRecord, RecordingRuntime,
};

pub mod fixtures {
    use kdispatch::container::{magic, ContainerWriter};
    use kdispatch::tensor::{DType, Format, Tensor, TensorDesc};

    /// A device identity that resolves to the `ascend910b` family.
    pub const SOC_910B: &str = "Ascend910B2";

    /// A well-formed container holding `names` with `tiling_size` bytes of tiling.
    pub fn container(names: &[&str], tiling_size: u32, code: &[u8]) -> Vec<u8> {
        names
            .iter()
            .fold(ContainerWriter::new(magic::ELF_AIVEC), |writer, name| {
                writer.kernel(*name)
            })
            .tiling_size(tiling_size)
            .core_type(2)
            .build(code)
    }

    /// Same as [`container`] but with a `'static` lifetime, as registries require.
    pub fn leaked_container(names: &[&str], tiling_size: u32, code: &[u8]) -> &'static [u8] {
        Box::leak(container(names, tiling_size, code).into_boxed_slice())
    }

    pub fn nd_tensor(dtype: DType, dims: &[i64]) -> Tensor {
        Tensor::new(TensorDesc::new(dtype, Format::Nd, dims))
    }

    /// An ND tensor with device storage at `addr`.
    pub fn device_tensor(dtype: DType, dims: &[i64], addr: u64) -> Tensor {
        let tensor = nd_tensor(dtype, dims);
        let bytes = tensor
            .validate()
            .expect("fixture tensor should be valid");
        tensor.with_device_data(addr, bytes)
    }

    /// Routes `tracing` output to the test harness. Safe to call from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    }
}
