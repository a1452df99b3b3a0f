use std::sync::Arc;

use anyhow::Result;
use kdispatch::device::families;
use kdispatch::tensor::{DType, Tensor};
use kdispatch::{
    DispatchError, ErrorCode, KernelState, LaunchParam, Loader, LoaderOptions, Registry, RunInfo,
    StreamHandle,
};
use kdispatch_backend_tests::{fixtures, LaunchKind, RecordingRuntime};
use kdispatch_ops::params::{AddCustom, Unpad};
use kdispatch_ops::{AddCustomTiling, UnpadTiling};

fn load_ops() -> (Loader, Arc<RecordingRuntime>) {
    fixtures::init_tracing();
    let registry = Registry::builder()
        .with_static()
        .binary(
            "UnpadKernel",
            families::ASCEND910B,
            fixtures::leaked_container(&["unpad"], 8, &[0x11; 32]),
        )
        .binary(
            "AddCustomKernel",
            families::ASCEND910B,
            fixtures::leaked_container(&["add_custom"], 8, &[0x22; 32]),
        )
        .build();
    let runtime = Arc::new(RecordingRuntime::new(fixtures::SOC_910B));
    let loader = Loader::load_with(&registry, runtime.clone(), &LoaderOptions::default());
    (loader, runtime)
}

fn unpad_param(batch: i64, max_seq_len: i64) -> LaunchParam {
    let mut param = LaunchParam::with_param(Unpad);
    param.add_in_tensor(fixtures::device_tensor(DType::Int64, &[batch, max_seq_len], 0x100));
    param.add_in_tensor(fixtures::device_tensor(DType::Int32, &[batch, 1], 0x200));
    param.add_in_tensor(fixtures::device_tensor(DType::Int64, &[1, 1], 0x300));
    param.add_in_tensor(fixtures::device_tensor(DType::Int32, &[batch, 1], 0x400));
    for (idx, addr) in [0x500u64, 0x600, 0x700].into_iter().enumerate() {
        param.add_out_tensor(Tensor::default().with_device_data(addr, 64 * (idx as u64 + 1)));
    }
    param
}

#[test]
fn sample_operations_register_statically() {
    let registry = Registry::global();
    let mut ops: Vec<_> = registry.operations().iter().map(|op| op.name).collect();
    ops.sort_unstable();
    assert_eq!(ops, vec!["AddCustomOperation", "UnpadOperation"]);
    let mut kernels: Vec<_> = registry
        .kernels()
        .iter()
        .map(|kernel| (kernel.op_name, kernel.kernel_name))
        .collect();
    kernels.sort_unstable();
    assert_eq!(
        kernels,
        vec![
            ("AddCustomOperation", "AddCustomKernel"),
            ("UnpadOperation", "UnpadKernel"),
        ]
    );
}

#[test]
fn unpad_runs_end_to_end() -> Result<()> {
    let (loader, runtime) = load_ops();
    let unpad = loader.operation("UnpadOperation").expect("unpad loaded");
    assert_eq!(unpad.kernel_names(), vec!["UnpadKernel"]);

    let mut param = unpad_param(3, 5);
    unpad.infer_shape(&mut param)?;
    assert!(unpad.is_consistent(&param));
    assert_eq!(param.out_tensors()[0].dims().as_slice(), &[1, 15]);
    assert_eq!(param.out_tensors()[0].data, Some(0x500));

    let mut kernel = unpad.best_kernel(&param)?;
    kernel.init(&param)?;
    let info = kernel.kernel_info();
    assert_eq!(info.block_dim(), 1);
    assert_eq!(info.scratch_sizes(), &[16]);
    assert_eq!(
        bytemuck::pod_read_unaligned::<UnpadTiling>(&info.tiling_host()[..8]),
        UnpadTiling {
            pad_length: 5,
            batch: 3
        }
    );
    // 4 inputs, 3 outputs, scratch, tiling
    assert_eq!(kernel.args_layout().unwrap().arg_count, 9);

    kernel.run(&param, &RunInfo::new(StreamHandle(3)).with_scratch(0x8000))?;
    assert_eq!(kernel.state(), KernelState::Executed);
    let launch = runtime.last_launch();
    assert_eq!(launch.args.len(), 9 * 8 + 64);
    assert_eq!(
        (0..8).map(|slot| launch.slot(slot)).collect::<Vec<_>>(),
        vec![0x100, 0x200, 0x300, 0x400, 0x500, 0x600, 0x700, 0x8000]
    );
    let LaunchKind::Function { tiling, .. } = launch.kind else {
        panic!("expected a function launch");
    };
    let tiling = tiling.expect("inline tiling");
    assert_eq!((tiling.addr_offset, tiling.data_offset), (64, 72));
    Ok(())
}

#[test]
fn unpad_rejects_bad_shapes() {
    let (loader, _) = load_ops();
    let unpad = loader.operation("UnpadOperation").unwrap();

    let mut param = unpad_param(3, 5);
    param.in_tensors_mut()[3] = fixtures::nd_tensor(DType::Int32, &[2, 1]);
    let err = unpad.infer_shape(&mut param).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InferShapeError);

    let mut param = unpad_param(3, 5);
    unpad.infer_shape(&mut param).unwrap();
    param.in_tensors_mut()[0].desc.dtype = DType::Int32;
    let mut kernel = unpad.kernel_by_name("UnpadKernel").unwrap();
    assert!(matches!(kernel.init(&param), Err(DispatchError::Validation(_))));
}

#[test]
fn add_custom_tiles_over_two_cores() -> Result<()> {
    let (loader, runtime) = load_ops();
    let add = loader.operation("AddCustomOperation").expect("add loaded");

    let mut param = LaunchParam::with_param(AddCustom);
    param.add_in_tensor(fixtures::device_tensor(DType::Float16, &[128], 0x1000));
    param.add_in_tensor(fixtures::device_tensor(DType::Float16, &[128], 0x2000));
    param.add_out_tensor(Tensor::default().with_device_data(0x3000, 256));
    add.infer_shape(&mut param)?;

    let mut kernel = add.best_kernel(&param)?;
    assert_eq!(kernel.name(), "AddCustomKernel");
    kernel.init(&param)?;
    assert_eq!(kernel.kernel_info().block_dim(), 2);
    assert_eq!(
        bytemuck::pod_read_unaligned::<AddCustomTiling>(&kernel.kernel_info().tiling_host()[..8]),
        AddCustomTiling {
            total_length: 128,
            tile_num: 2
        }
    );
    kernel.run(&param, &RunInfo::default())?;
    let launch = runtime.last_launch();
    assert_eq!(launch.block_dim, 2);
    assert_eq!(
        (0..3).map(|slot| launch.slot(slot)).collect::<Vec<_>>(),
        vec![0x1000, 0x2000, 0x3000]
    );
    Ok(())
}

#[test]
fn add_custom_requires_its_param_and_float16() {
    let (loader, _) = load_ops();
    let add = loader.operation("AddCustomOperation").unwrap();

    assert_eq!(add.input_num(&LaunchParam::with_param(AddCustom)), 2);
    assert_eq!(add.output_num(&LaunchParam::with_param(AddCustom)), 1);

    let mut untyped = LaunchParam::new();
    untyped.add_in_tensor(fixtures::nd_tensor(DType::Float16, &[8]));
    untyped.add_in_tensor(fixtures::nd_tensor(DType::Float16, &[8]));
    untyped.add_out_tensor(Tensor::default());
    let err = add.infer_shape(&mut untyped).unwrap_err();
    assert_eq!(err.code(), ErrorCode::AttrInvalidType);

    let mut wide = LaunchParam::with_param(AddCustom);
    wide.add_in_tensor(fixtures::nd_tensor(DType::Float, &[8]));
    wide.add_in_tensor(fixtures::nd_tensor(DType::Float, &[8]));
    wide.add_out_tensor(Tensor::default());
    add.infer_shape(&mut wide).unwrap();
    assert!(matches!(add.best_kernel(&wide), Err(DispatchError::Validation(_))));

    // outputs that were never inferred are inconsistent
    let mut stale = wide.clone();
    stale.out_tensors_mut()[0] = Tensor::default();
    assert!(matches!(
        add.best_kernel(&stale),
        Err(DispatchError::NotConsistent { .. })
    ));
}
