//! Image planes, buffer roles and the per-invocation device buffer set.

use std::fmt;

use wgpu::util::DeviceExt;

use crate::error::{DeviceStage, LensBlurError, Result};
use crate::session::DeviceSession;

/// Element type of an image plane. Both kinds are 4 bytes wide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    /// Packed RGBA8 color or integer depth, `u32`.
    PackedInt,
    /// Circle of confusion, `f32`.
    Float,
}

impl ElementKind {
    pub const fn size(self) -> usize {
        4
    }
}

/// A `width × height` grid of 32-bit scalars.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImagePlane {
    pub width: u32,
    pub height: u32,
    pub kind: ElementKind,
}

impl ImagePlane {
    pub fn new(width: u32, height: u32, kind: ElementKind) -> Self {
        Self { width, height, kind }
    }

    /// Element count, or `InvalidDimensions` if it does not fit in `usize`.
    pub fn len(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .ok_or(LensBlurError::InvalidDimensions {
                width: self.width as i64,
                height: self.height as i64,
            })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn byte_size(&self) -> Result<u64> {
        let bytes = self
            .len()?
            .checked_mul(self.kind.size())
            .ok_or(LensBlurError::InvalidDimensions {
                width: self.width as i64,
                height: self.height as i64,
            })?;
        Ok(bytes as u64)
    }

    /// Same plane with width and height swapped.
    pub fn transposed(&self) -> Self {
        Self { width: self.height, height: self.width, kind: self.kind }
    }
}

/// How a buffer is initialized from the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferSemantics {
    /// Host contents copied once when the buffer is created.
    CopyIn,
    /// Scratch storage; no upload, contents undefined until the first device write.
    HostBacked,
}

/// Logical role of a device buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferRole {
    ColorInput,
    DepthInput,
    CocInput,
    BlurOutput,
    TransposedDepth,
    TransposedCoc,
}

impl BufferRole {
    pub const ALL: [BufferRole; 6] = [
        BufferRole::ColorInput,
        BufferRole::DepthInput,
        BufferRole::CocInput,
        BufferRole::BlurOutput,
        BufferRole::TransposedDepth,
        BufferRole::TransposedCoc,
    ];

    pub fn index(self) -> usize {
        match self {
            BufferRole::ColorInput => 0,
            BufferRole::DepthInput => 1,
            BufferRole::CocInput => 2,
            BufferRole::BlurOutput => 3,
            BufferRole::TransposedDepth => 4,
            BufferRole::TransposedCoc => 5,
        }
    }

    pub fn kind(self) -> ElementKind {
        match self {
            BufferRole::CocInput | BufferRole::TransposedCoc => ElementKind::Float,
            _ => ElementKind::PackedInt,
        }
    }

    pub fn semantics(self) -> BufferSemantics {
        match self {
            BufferRole::ColorInput | BufferRole::DepthInput | BufferRole::CocInput => {
                BufferSemantics::CopyIn
            }
            BufferRole::BlurOutput | BufferRole::TransposedDepth | BufferRole::TransposedCoc => {
                BufferSemantics::HostBacked
            }
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BufferRole::ColorInput => "LensBlur Color",
            BufferRole::DepthInput => "LensBlur Depth",
            BufferRole::CocInput => "LensBlur CoC",
            BufferRole::BlurOutput => "LensBlur Blur Output",
            BufferRole::TransposedDepth => "LensBlur Transposed Depth",
            BufferRole::TransposedCoc => "LensBlur Transposed CoC",
        }
    }
}

impl fmt::Display for BufferRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferRole::ColorInput => "color input",
            BufferRole::DepthInput => "depth input",
            BufferRole::CocInput => "CoC input",
            BufferRole::BlurOutput => "blur output",
            BufferRole::TransposedDepth => "transposed depth",
            BufferRole::TransposedCoc => "transposed CoC",
        };
        f.write_str(name)
    }
}

/// Host arrays and parameters for one effect invocation.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub color: &'a [u32],
    pub depth: &'a [u32],
    pub coc: &'a [f32],
    pub width: u32,
    pub height: u32,
    pub z_focus: i32,
}

impl<'a> Frame<'a> {
    pub fn plane(&self, role: BufferRole) -> ImagePlane {
        ImagePlane::new(self.width, self.height, role.kind())
    }

    /// Element count of every plane in this frame.
    pub fn pixel_count(&self) -> Result<usize> {
        self.plane(BufferRole::ColorInput).len()
    }

    /// Check every host array (and `output_len`) holds at least one full plane.
    pub fn validate(&self, output_len: usize) -> Result<usize> {
        let expected = self.pixel_count()?;
        let checks = [
            (BufferRole::ColorInput, self.color.len()),
            (BufferRole::DepthInput, self.depth.len()),
            (BufferRole::CocInput, self.coc.len()),
            (BufferRole::BlurOutput, output_len),
        ];
        for (role, actual) in checks {
            if actual < expected {
                return Err(LensBlurError::BufferSize { role, expected, actual });
            }
        }
        Ok(expected)
    }

    /// Host contents uploaded into a copy-in buffer, trimmed to one plane.
    /// `None` for scratch roles; `BufferSize` if the host array is short.
    fn copy_in_bytes(&self, role: BufferRole, len: usize) -> Result<Option<&'a [u8]>> {
        let Frame { color, depth, coc, .. } = *self;
        if role.semantics() == BufferSemantics::HostBacked {
            return Ok(None);
        }
        let short = |actual: usize| LensBlurError::BufferSize { role, expected: len, actual };
        let bytes: &'a [u8] = match role {
            BufferRole::ColorInput => bytemuck::cast_slice(color.get(..len).ok_or_else(|| short(color.len()))?),
            BufferRole::DepthInput => bytemuck::cast_slice(depth.get(..len).ok_or_else(|| short(depth.len()))?),
            BufferRole::CocInput => bytemuck::cast_slice(coc.get(..len).ok_or_else(|| short(coc.len()))?),
            _ => return Ok(None),
        };
        Ok(Some(bytes))
    }
}

/// Element count a role's buffer must hold. Reused buffers serve the native
/// and the transposed orientation, which have the same element count.
pub fn required_len(role: BufferRole, width: u32, height: u32) -> Result<usize> {
    let native = ImagePlane::new(width, height, role.kind()).len()?;
    let transposed = ImagePlane::new(width, height, role.kind()).transposed().len()?;
    Ok(native.max(transposed))
}

/// Usage flags for a role's buffer.
fn buffer_usage(role: BufferRole) -> wgpu::BufferUsages {
    let base = wgpu::BufferUsages::STORAGE;
    match role {
        // The final image is read back from the color buffer.
        BufferRole::ColorInput => base | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        _ => base | wgpu::BufferUsages::COPY_DST,
    }
}

/// The six device buffers of one pipeline invocation, indexed by role.
///
/// Owned by exactly one invocation; dropped when the effect call returns.
pub struct BufferSet {
    buffers: Vec<wgpu::Buffer>,
}

impl BufferSet {
    /// Allocate every role's buffer, copying host data into the copy-in roles.
    pub fn allocate(session: &DeviceSession, frame: &Frame<'_>) -> Result<Self> {
        let len = frame.pixel_count()?;
        let mut buffers = Vec::with_capacity(BufferRole::ALL.len());

        for role in BufferRole::ALL {
            // Transposing keeps the element count, so the native plane size
            // covers both orientations of a reused buffer.
            let size = frame.plane(role).byte_size()?;
            let usage = buffer_usage(role);
            let contents = frame.copy_in_bytes(role, len)?;

            let buffer = session.checked(DeviceStage::AllocateBuffer(role), |device| match contents {
                Some(contents) => device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(role.label()),
                    contents,
                    usage,
                }),
                None => device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(role.label()),
                    size,
                    usage,
                    mapped_at_creation: false,
                }),
            })?;

            buffers.push(buffer);
        }

        log::debug!(
            "Allocated lens blur buffer set ({}x{}, {} bytes per plane)",
            frame.width,
            frame.height,
            len * 4
        );

        Ok(Self { buffers })
    }

    pub fn get(&self, role: BufferRole) -> &wgpu::Buffer {
        &self.buffers[role.index()]
    }
}
