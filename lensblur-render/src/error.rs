//! Error types for the lens blur pipeline.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::buffers::BufferRole;
use crate::programs::KernelId;
use crate::schedule::StageId;

pub type Result<T, E = LensBlurError> = std::result::Result<T, E>;

/// Where a device operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStage {
    RequestDevice,
    CompileProgram(KernelId),
    AllocateBuffer(BufferRole),
    Dispatch(StageId),
    Drain,
    Readback,
}

impl fmt::Display for DeviceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStage::RequestDevice => write!(f, "device request"),
            DeviceStage::CompileProgram(kernel) => write!(f, "compiling {kernel}"),
            DeviceStage::AllocateBuffer(role) => write!(f, "allocating {role}"),
            DeviceStage::Dispatch(stage) => write!(f, "dispatching {stage}"),
            DeviceStage::Drain => write!(f, "queue drain"),
            DeviceStage::Readback => write!(f, "readback"),
        }
    }
}

/// Coarse classification of a device failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorCode {
    OutOfMemory,
    Validation,
    MapFailed,
    Other,
}

impl fmt::Display for DeviceErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceErrorCode::OutOfMemory => "out of memory",
            DeviceErrorCode::Validation => "validation",
            DeviceErrorCode::MapFailed => "buffer map failed",
            DeviceErrorCode::Other => "device failure",
        };
        f.write_str(name)
    }
}

/// A checked device operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device error during {stage}: {code}: {message}")]
pub struct DeviceError {
    pub stage: DeviceStage,
    pub code: DeviceErrorCode,
    pub message: String,
}

impl DeviceError {
    pub fn new(stage: DeviceStage, code: DeviceErrorCode, message: impl Into<String>) -> Self {
        Self { stage, code, message: message.into() }
    }

    pub(crate) fn from_wgpu(stage: DeviceStage, err: wgpu::Error) -> Self {
        let code = match &err {
            wgpu::Error::OutOfMemory { .. } => DeviceErrorCode::OutOfMemory,
            wgpu::Error::Validation { .. } => DeviceErrorCode::Validation,
            #[allow(unreachable_patterns)]
            _ => DeviceErrorCode::Other,
        };
        Self::new(stage, code, err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum LensBlurError {
    /// No adapter passed selection. The effect is skipped, never run on the CPU.
    #[error("no GPU-class compute adapter available")]
    NoPlatform,

    #[error("kernel source not found: {}", .path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("{role} needs {expected} elements but the host array holds {actual}")]
    BufferSize {
        role: BufferRole,
        expected: usize,
        actual: usize,
    },

    #[error("invalid image dimensions {width}x{height}")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("argument list does not match the {kernel} signature: {reason}")]
    AbiMismatch { kernel: KernelId, reason: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_message_names_stage_and_code() {
        let err = DeviceError::new(
            DeviceStage::Dispatch(StageId::VerticalBlur),
            DeviceErrorCode::Validation,
            "binding 3 is too small",
        );
        let msg = err.to_string();
        assert!(msg.contains("vertical blur"), "{msg}");
        assert!(msg.contains("validation"), "{msg}");
        assert!(msg.contains("binding 3"), "{msg}");
    }

    #[test]
    fn test_file_not_found_keeps_source() {
        use std::error::Error as _;
        let err = LensBlurError::FileNotFound {
            path: PathBuf::from("/nope/lens_blur.wgsl"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(err.to_string().contains("/nope/lens_blur.wgsl"));
        assert!(err.source().is_some());
    }
}
