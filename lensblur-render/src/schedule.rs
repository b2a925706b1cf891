//! The six-stage dispatch sequence and its buffer reuse schedule.
//!
//! `REUSE_SCHEDULE` is the single place that decides which buffer each stage
//! reads and writes. `plan` turns it into concrete kernel invocations for one
//! image size; executors only ever see the plan.

use std::fmt;

use crate::buffers::{BufferRole, ElementKind};
use crate::error::{LensBlurError, Result};
use crate::programs::{ArgKind, KernelId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    HorizontalBlur,
    TransposeColor,
    TransposeDepth,
    TransposeCoc,
    VerticalBlur,
    TransposeBack,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageId::HorizontalBlur => "horizontal blur",
            StageId::TransposeColor => "transpose color",
            StageId::TransposeDepth => "transpose depth",
            StageId::TransposeCoc => "transpose CoC",
            StageId::VerticalBlur => "vertical blur",
            StageId::TransposeBack => "transpose back",
        };
        f.write_str(name)
    }
}

/// Which axis order a stage runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    /// `(width, height)` of the source image.
    Native,
    /// `(height, width)`: data has been transposed once.
    Transposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Orientation {
    pub fn extent(self, width: u32, height: u32) -> Extent {
        match self {
            Orientation::Native => Extent { width, height },
            Orientation::Transposed => Extent { width: height, height: width },
        }
    }
}

/// Buffer roles bound by a stage, in kernel argument order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageBuffers {
    Blur {
        color_in: BufferRole,
        depth_in: BufferRole,
        blur_out: BufferRole,
        coc: BufferRole,
    },
    Transpose {
        src: BufferRole,
        dst: BufferRole,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub id: StageId,
    pub kernel: KernelId,
    pub buffers: StageBuffers,
    pub orientation: Orientation,
}

impl Stage {
    /// Roles this stage reads.
    pub fn reads(&self) -> Vec<BufferRole> {
        match self.buffers {
            StageBuffers::Blur { color_in, depth_in, .. } => vec![color_in, depth_in],
            StageBuffers::Transpose { src, .. } => vec![src],
        }
    }

    /// Roles this stage writes.
    pub fn writes(&self) -> Vec<BufferRole> {
        match self.buffers {
            StageBuffers::Blur { blur_out, coc, .. } => vec![blur_out, coc],
            StageBuffers::Transpose { dst, .. } => vec![dst],
        }
    }
}

use BufferRole::*;

/// Stage → kernel, buffers and orientation.
///
/// The blur output of each blur stage is transposed straight back into the
/// color buffer, so the second blur reuses the first blur's input buffer and
/// the final image ends up in `ColorInput`.
pub const REUSE_SCHEDULE: [Stage; 6] = [
    Stage {
        id: StageId::HorizontalBlur,
        kernel: KernelId::LensBlur,
        buffers: StageBuffers::Blur {
            color_in: ColorInput,
            depth_in: DepthInput,
            blur_out: BlurOutput,
            coc: CocInput,
        },
        orientation: Orientation::Native,
    },
    Stage {
        id: StageId::TransposeColor,
        kernel: KernelId::TransposeInt,
        buffers: StageBuffers::Transpose { src: BlurOutput, dst: ColorInput },
        orientation: Orientation::Native,
    },
    Stage {
        id: StageId::TransposeDepth,
        kernel: KernelId::TransposeInt,
        buffers: StageBuffers::Transpose { src: DepthInput, dst: TransposedDepth },
        orientation: Orientation::Native,
    },
    Stage {
        id: StageId::TransposeCoc,
        kernel: KernelId::TransposeFloat,
        buffers: StageBuffers::Transpose { src: CocInput, dst: TransposedCoc },
        orientation: Orientation::Native,
    },
    Stage {
        id: StageId::VerticalBlur,
        kernel: KernelId::LensBlur,
        buffers: StageBuffers::Blur {
            color_in: ColorInput,
            depth_in: TransposedDepth,
            blur_out: BlurOutput,
            coc: TransposedCoc,
        },
        orientation: Orientation::Transposed,
    },
    Stage {
        id: StageId::TransposeBack,
        kernel: KernelId::TransposeInt,
        buffers: StageBuffers::Transpose { src: BlurOutput, dst: ColorInput },
        orientation: Orientation::Transposed,
    },
];

/// Role holding the finished image once the schedule has run.
pub const RESULT_ROLE: BufferRole = ColorInput;

/// One positional kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArg {
    Buffer(BufferRole),
    Dimension(u32),
    Focus(i32),
}

impl KernelArg {
    pub fn kind(&self) -> ArgKind {
        match self {
            KernelArg::Buffer(role) => match role.kind() {
                ElementKind::PackedInt => ArgKind::IntBuffer,
                ElementKind::Float => ArgKind::FloatBuffer,
            },
            KernelArg::Dimension(_) => ArgKind::Dimension,
            KernelArg::Focus(_) => ArgKind::Focus,
        }
    }
}

/// Bound arguments of a kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelArgs {
    LensBlur {
        color_in: BufferRole,
        depth_in: BufferRole,
        blur_out: BufferRole,
        coc_in: BufferRole,
        width: u32,
        height: u32,
        z_focus: i32,
    },
    Transpose {
        src: BufferRole,
        dst: BufferRole,
        width: u32,
        height: u32,
    },
}

impl KernelArgs {
    /// Arguments in ABI order.
    pub fn positional(&self) -> Vec<KernelArg> {
        match *self {
            KernelArgs::LensBlur { color_in, depth_in, blur_out, coc_in, width, height, z_focus } => vec![
                KernelArg::Buffer(color_in),
                KernelArg::Buffer(depth_in),
                KernelArg::Buffer(blur_out),
                KernelArg::Buffer(coc_in),
                KernelArg::Dimension(width),
                KernelArg::Dimension(height),
                KernelArg::Focus(z_focus),
            ],
            KernelArgs::Transpose { src, dst, width, height } => vec![
                KernelArg::Buffer(src),
                KernelArg::Buffer(dst),
                KernelArg::Dimension(width),
                KernelArg::Dimension(height),
            ],
        }
    }

    /// Buffer arguments in ABI order; binding `i` is the `i`-th buffer.
    pub fn buffers(&self) -> Vec<BufferRole> {
        self.positional()
            .into_iter()
            .filter_map(|arg| match arg {
                KernelArg::Buffer(role) => Some(role),
                _ => None,
            })
            .collect()
    }

    pub fn extent(&self) -> Extent {
        match *self {
            KernelArgs::LensBlur { width, height, .. } | KernelArgs::Transpose { width, height, .. } => {
                Extent { width, height }
            }
        }
    }
}

/// A kernel with its arguments bound, ready to enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelInvocation {
    pub stage: StageId,
    pub kernel: KernelId,
    pub args: KernelArgs,
}

impl KernelInvocation {
    /// Bind `args` to `kernel`, rejecting lists that break its ABI.
    pub fn new(stage: StageId, kernel: KernelId, args: KernelArgs) -> Result<Self> {
        let kinds: Vec<ArgKind> = args.positional().iter().map(KernelArg::kind).collect();
        if kinds.len() != kernel.signature().len() {
            return Err(LensBlurError::AbiMismatch { kernel, reason: "wrong argument count" });
        }
        if kinds != kernel.signature() {
            return Err(LensBlurError::AbiMismatch { kernel, reason: "wrong argument kind" });
        }

        let buffers = args.buffers();
        for (i, role) in buffers.iter().enumerate() {
            if buffers[i + 1..].contains(role) {
                return Err(LensBlurError::AbiMismatch { kernel, reason: "buffer bound twice" });
            }
        }

        Ok(Self { stage, kernel, args })
    }

    /// Global work extent. Always the `(width, height)` arguments of the call.
    pub fn extent(&self) -> Extent {
        self.args.extent()
    }
}

/// Bind every stage of [`REUSE_SCHEDULE`] for a `width × height` image.
pub fn plan(width: u32, height: u32, z_focus: i32) -> Result<Vec<KernelInvocation>> {
    REUSE_SCHEDULE
        .iter()
        .map(|stage| {
            let Extent { width, height } = stage.orientation.extent(width, height);
            let args = match stage.buffers {
                StageBuffers::Blur { color_in, depth_in, blur_out, coc } => KernelArgs::LensBlur {
                    color_in,
                    depth_in,
                    blur_out,
                    coc_in: coc,
                    width,
                    height,
                    z_focus,
                },
                StageBuffers::Transpose { src, dst } => KernelArgs::Transpose { src, dst, width, height },
            };
            KernelInvocation::new(stage.id, stage.kernel, args)
        })
        .collect()
}
