use bytemuck::{Pod, Zeroable};

/// Workgroup size baked into every kernel: 16×8 = 128 invocations.
pub const WORKGROUP_SIZE: [u32; 2] = [16, 8];

/// Depth distance → CoC radius scale. Must match `COC_SCALE` in lens_blur.wgsl.
pub const COC_SCALE: f32 = 0.125;
/// Largest CoC radius in pixels. Must match `MAX_COC_RADIUS` in lens_blur.wgsl.
pub const MAX_COC_RADIUS: f32 = 8.0;

/// Scalar arguments of `lensBlur`; matches `BlurParams` in lens_blur.wgsl.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BlurParams {
    pub width: u32,
    pub height: u32,
    pub z_focus: i32,
    pub _pad: u32,
}

impl BlurParams {
    pub fn new(width: u32, height: u32, z_focus: i32) -> Self {
        Self { width, height, z_focus, _pad: 0 }
    }
}

/// Scalar arguments of `transposeInt` and `transposeFloat`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct TransposeParams {
    pub width: u32,
    pub height: u32,
    pub _pad: [u32; 2],
}

impl TransposeParams {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, _pad: [0; 2] }
    }
}
