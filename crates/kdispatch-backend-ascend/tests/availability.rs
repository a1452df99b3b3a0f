use kdispatch::{DeviceRuntime, DispatchError};
use kdispatch_backend_ascend::{is_available, AscendRuntime};
use kdispatch_backend_tests::fixtures;

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn runtime_is_shareable() {
    assert_send_sync::<AscendRuntime>();
}

#[test]
fn availability_is_stable_without_hardware() {
    fixtures::init_tracing();
    let available = is_available();
    assert_eq!(available, is_available());
    match AscendRuntime::new() {
        Ok(runtime) => {
            assert!(available);
            assert_eq!(runtime.name(), "ascend");
        }
        Err(err) => {
            assert!(!available);
            assert!(
                matches!(err, DispatchError::Runtime { call: "load_runtime", .. }),
                "{err}"
            );
        }
    }
}
