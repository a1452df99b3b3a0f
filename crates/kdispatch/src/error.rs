//! Error types shared by every stage of the dispatch engine.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::container::ContainerError;

/// Raw status code returned by the device collaborator.
///
/// Zero is never wrapped in this type; the collaborator reports success as `Ok(())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuntimeStatus(pub i32);

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Numeric status codes exposed to callers that bridge into foreign frameworks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ErrorCode {
    NoError = 0,
    InvalidValue = 1,
    OperationNotExist = 2,
    TacticNotExist = 3,
    KernelNotExist = 4,
    AttrNotExist = 5,
    AttrInvalidType = 6,
    LaunchKernelError = 7,
    SyncStreamError = 8,
    InferShapeError = 9,
    NotConsistent = 10,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Input tensors violate the shape/size invariants or a kernel's support predicate.
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{op}: expected {expected_inputs} inputs and {expected_outputs} outputs, got {inputs} and {outputs}")]
    Arity {
        op: String,
        expected_inputs: usize,
        expected_outputs: usize,
        inputs: usize,
        outputs: usize,
    },

    #[error("{op}: shape inference failed: {reason}")]
    InferShape { op: String, reason: String },

    #[error("{op}: inferred outputs do not match the launch param outputs")]
    NotConsistent { op: String },

    #[error("kernel {kernel}: {source}")]
    ContainerFormat {
        kernel: String,
        #[source]
        source: ContainerError,
    },

    #[error("device `{device}` does not belong to any known family")]
    DeviceResolution { device: String },

    #[error("kernel {kernel}: failed to bind device code: {reason}")]
    Bind { kernel: String, reason: String },

    #[error("kernel {kernel}: launch rejected by device runtime with status {status}")]
    Launch { kernel: String, status: RuntimeStatus },

    #[error("device runtime call {call} failed: {reason}")]
    Runtime { call: &'static str, reason: String },

    /// A registration bug; the affected subsystem must not continue.
    #[error("programming error: {0}")]
    Programming(String),

    #[error("kernel {kernel}: cannot {action} while {state}")]
    InvalidState {
        kernel: String,
        action: &'static str,
        state: &'static str,
    },

    #[error("operation {0} does not exist")]
    OperationNotFound(String),

    #[error("kernel {kernel} is not bound to {op}, maybe not supported on this device")]
    KernelNotFound { op: String, kernel: String },

    #[error("{context}: op param is not a {expected}")]
    ParamType {
        context: String,
        expected: &'static str,
    },

    #[error("argument block of {requested} bytes exceeds the {limit} byte limit")]
    ArgsOverflow { requested: u64, limit: u64 },

    #[error("tiling buffer: {0}")]
    Tiling(String),
}

impl DispatchError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DispatchError::Validation(msg.into())
    }

    pub fn programming(msg: impl Into<String>) -> Self {
        DispatchError::Programming(msg.into())
    }

    pub fn tiling(msg: impl Into<String>) -> Self {
        DispatchError::Tiling(msg.into())
    }

    pub fn runtime(call: &'static str, reason: impl Into<String>) -> Self {
        DispatchError::Runtime {
            call,
            reason: reason.into(),
        }
    }

    pub fn infer_shape(op: impl Into<String>, reason: impl Into<String>) -> Self {
        DispatchError::InferShape {
            op: op.into(),
            reason: reason.into(),
        }
    }

    pub fn param_type<T>(context: impl Into<String>) -> Self {
        DispatchError::ParamType {
            context: context.into(),
            expected: std::any::type_name::<T>(),
        }
    }

    /// Status code a foreign caller should observe for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::Validation(_)
            | DispatchError::ContainerFormat { .. }
            | DispatchError::DeviceResolution { .. }
            | DispatchError::Bind { .. }
            | DispatchError::Runtime { .. }
            | DispatchError::Programming(_)
            | DispatchError::InvalidState { .. }
            | DispatchError::ArgsOverflow { .. }
            | DispatchError::Tiling(_) => ErrorCode::InvalidValue,
            DispatchError::Arity { .. } | DispatchError::InferShape { .. } => {
                ErrorCode::InferShapeError
            }
            DispatchError::NotConsistent { .. } => ErrorCode::NotConsistent,
            DispatchError::Launch { .. } => ErrorCode::LaunchKernelError,
            DispatchError::OperationNotFound(_) => ErrorCode::OperationNotExist,
            DispatchError::KernelNotFound { .. } => ErrorCode::KernelNotExist,
            DispatchError::ParamType { .. } => ErrorCode::AttrInvalidType,
        }
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
