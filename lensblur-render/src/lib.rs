//! Depth-of-field lens blur on a wgpu compute device.
//!
//! The blur is separable: a row-wise pass, a transpose of color, depth and
//! CoC, the same row-wise pass on the transposed image, and a transpose back.
//! [`LensBlurContext`] owns the device and compiled programs and is meant to
//! be created once and reused for every frame.

pub mod buffers;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod programs;
pub mod reference;
pub mod schedule;
pub mod session;
pub mod source;

pub use buffers::{BufferRole, Frame};
pub use config::{BuildOptions, KernelSource, SessionConfig};
pub use error::{DeviceError, DeviceErrorCode, DeviceStage, LensBlurError, Result};
pub use pipeline::{execute, KernelExecutor, LensBlurContext};
pub use programs::KernelId;
pub use session::DeviceSession;
