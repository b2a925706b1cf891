//! Kernel sources and uniform layouts for the lens blur pipeline.
//! Shared by the device pipeline and the host reference kernels.

pub mod shaders;
pub mod uniforms;
