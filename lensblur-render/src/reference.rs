//! Host implementation of the three kernels.
//!
//! Mirrors the WGSL programs operation for operation so device output can be
//! checked against it, and so the dispatch schedule can be exercised without
//! an adapter. Device results may differ by one unit per channel where the
//! GPU's float rounding differs from the host's.

use std::mem;

use lensblur_gpu_shared::uniforms::{COC_SCALE, MAX_COC_RADIUS};

use crate::buffers::{required_len, BufferRole, Frame};
use crate::config::BuildOptions;
use crate::error::{LensBlurError, Result};
use crate::pipeline::{execute, KernelExecutor};
use crate::programs::KernelId;
use crate::schedule::{KernelArgs, KernelInvocation};

/// Blur radius contribution of a pixel at `depth` when focused at `z_focus`.
pub fn circle_of_confusion(depth: u32, z_focus: i32) -> f32 {
    let distance = (depth as f32 - z_focus as f32).abs();
    (distance * COC_SCALE).min(MAX_COC_RADIUS)
}

fn unpack_rgba8(p: u32) -> [f32; 4] {
    [
        (p & 0xff) as f32,
        ((p >> 8) & 0xff) as f32,
        ((p >> 16) & 0xff) as f32,
        ((p >> 24) & 0xff) as f32,
    ]
}

fn pack_rgba8(c: [f32; 4]) -> u32 {
    c.iter().enumerate().fold(0, |packed, (i, &v)| {
        let q = v.round_ties_even().clamp(0.0, 255.0) as u32;
        packed | (q << (8 * i))
    })
}

/// One row-wise blur pass over a `width × height` image.
#[derive(Debug, Clone, Copy)]
pub struct BlurPass {
    pub width: u32,
    pub height: u32,
    pub z_focus: i32,
    pub relaxed_math: bool,
}

impl BlurPass {
    /// Write the blurred image to `blur_out` and each pixel's CoC to `coc`.
    pub fn run(&self, color: &[u32], depth: &[u32], blur_out: &mut [u32], coc: &mut [f32]) {
        let width = self.width as usize;
        let last = self.width as i64 - 1;

        for y in 0..self.height as usize {
            let row = y * width;
            for x in 0..width {
                let idx = row + x;
                let own = circle_of_confusion(depth[idx], self.z_focus);
                coc[idx] = own;

                let radius = own as i64;
                if radius == 0 {
                    blur_out[idx] = color[idx];
                    continue;
                }

                let mut sum = [0.0f32; 4];
                let mut weight = 0.0f32;
                for dx in -radius..=radius {
                    let j = row + (x as i64 + dx).clamp(0, last) as usize;
                    let reach = circle_of_confusion(depth[j], self.z_focus);
                    if dx == 0 || reach >= dx.abs() as f32 {
                        for (s, c) in sum.iter_mut().zip(unpack_rgba8(color[j])) {
                            *s += c;
                        }
                        weight += 1.0;
                    }
                }

                let average = if self.relaxed_math {
                    let inv = 1.0 / weight;
                    sum.map(|s| s * inv)
                } else {
                    sum.map(|s| s / weight)
                };
                blur_out[idx] = pack_rgba8(average);
            }
        }
    }
}

/// `dst[x * height + y] = src[y * width + x]` for a row-major `width × height` source.
pub fn transpose<T: Copy>(src: &[T], dst: &mut [T], width: u32, height: u32) {
    let (width, height) = (width as usize, height as usize);
    for y in 0..height {
        for x in 0..width {
            dst[x * height + y] = src[y * width + x];
        }
    }
}

enum Plane {
    Int(Vec<u32>),
    Float(Vec<f32>),
}

impl Default for Plane {
    fn default() -> Self {
        Plane::Int(Vec::new())
    }
}

/// Runs invocations synchronously on host memory, one plane per buffer role.
pub struct HostExecutor {
    planes: Vec<Plane>,
    options: BuildOptions,
}

impl HostExecutor {
    /// Copy the frame's inputs into fresh planes. Scratch planes start zeroed.
    pub fn new(frame: &Frame<'_>, options: BuildOptions) -> Result<Self> {
        let len = frame.pixel_count()?;
        let mut planes = Vec::with_capacity(BufferRole::ALL.len());
        for role in BufferRole::ALL {
            let plane = match role {
                BufferRole::ColorInput => Plane::Int(copy_in(role, frame.color, len)?),
                BufferRole::DepthInput => Plane::Int(copy_in(role, frame.depth, len)?),
                BufferRole::CocInput => Plane::Float(copy_in(role, frame.coc, len)?),
                BufferRole::TransposedCoc => {
                    Plane::Float(vec![0.0; required_len(role, frame.width, frame.height)?])
                }
                BufferRole::BlurOutput | BufferRole::TransposedDepth => {
                    Plane::Int(vec![0; required_len(role, frame.width, frame.height)?])
                }
            };
            planes.push(plane);
        }
        Ok(Self { planes, options })
    }

    fn ints(&self, role: BufferRole, kernel: KernelId) -> Result<&[u32]> {
        match &self.planes[role.index()] {
            Plane::Int(v) => Ok(v),
            Plane::Float(_) => Err(LensBlurError::AbiMismatch { kernel, reason: "expected an int buffer" }),
        }
    }

    fn floats(&self, role: BufferRole, kernel: KernelId) -> Result<&[f32]> {
        match &self.planes[role.index()] {
            Plane::Float(v) => Ok(v),
            Plane::Int(_) => Err(LensBlurError::AbiMismatch { kernel, reason: "expected a float buffer" }),
        }
    }

    fn take(&mut self, role: BufferRole) -> Plane {
        mem::take(&mut self.planes[role.index()])
    }
}

fn copy_in<T: Copy>(role: BufferRole, src: &[T], len: usize) -> Result<Vec<T>> {
    src.get(..len)
        .map(<[T]>::to_vec)
        .ok_or(LensBlurError::BufferSize { role, expected: len, actual: src.len() })
}

impl KernelExecutor for HostExecutor {
    fn enqueue(&mut self, invocation: &KernelInvocation) -> Result<()> {
        let kernel = invocation.kernel;
        match invocation.args {
            KernelArgs::LensBlur { color_in, depth_in, blur_out, coc_in, width, height, z_focus } => {
                let (Plane::Int(mut out), Plane::Float(mut coc)) = (self.take(blur_out), self.take(coc_in)) else {
                    return Err(LensBlurError::AbiMismatch { kernel, reason: "blur output or CoC has the wrong element kind" });
                };

                let pass = BlurPass { width, height, z_focus, relaxed_math: self.options.fast_relaxed_math };
                pass.run(self.ints(color_in, kernel)?, self.ints(depth_in, kernel)?, &mut out, &mut coc);

                self.planes[blur_out.index()] = Plane::Int(out);
                self.planes[coc_in.index()] = Plane::Float(coc);
            }
            KernelArgs::Transpose { src, dst, width, height } => {
                let mut target = self.take(dst);
                match &mut target {
                    Plane::Int(d) => transpose(self.ints(src, kernel)?, d, width, height),
                    Plane::Float(d) => transpose(self.floats(src, kernel)?, d, width, height),
                }
                self.planes[dst.index()] = target;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    fn read_back(&mut self, role: BufferRole, output: &mut [u32]) -> Result<()> {
        let plane = self.ints(role, KernelId::TransposeInt)?;
        output.copy_from_slice(&plane[..output.len()]);
        Ok(())
    }
}

/// Run the whole effect on the host.
pub fn lens_blur(frame: &Frame<'_>, output: &mut [u32], options: BuildOptions) -> Result<()> {
    let mut executor = HostExecutor::new(frame, options)?;
    execute(&mut executor, frame, output)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
        u32::from_le_bytes([r, g, b, a])
    }

    #[test]
    fn test_coc_is_clamped() {
        assert_eq!(circle_of_confusion(10, 10), 0.0);
        assert_eq!(circle_of_confusion(18, 10), 1.0);
        assert_eq!(circle_of_confusion(2, 10), 1.0);
        assert_eq!(circle_of_confusion(10_000, 0), MAX_COC_RADIUS);
    }

    #[test]
    fn test_pack_unpack() {
        let p = rgba(1, 2, 3, 255);
        assert_eq!(pack_rgba8(unpack_rgba8(p)), p);
        assert_eq!(pack_rgba8([-4.0, 300.0, 2.5, 3.5]), rgba(0, 255, 2, 4));
    }

    #[test]
    fn test_in_focus_row_is_copied() {
        let color = [rgba(10, 0, 0, 255), rgba(0, 20, 0, 255), rgba(0, 0, 30, 255)];
        let depth = [5, 5, 5];
        let mut out = [0u32; 3];
        let mut coc = [9.0f32; 3];
        BlurPass { width: 3, height: 1, z_focus: 5, relaxed_math: true }.run(&color, &depth, &mut out, &mut coc);
        assert_eq!(out, color);
        assert_eq!(coc, [0.0; 3]);
    }

    #[test]
    fn test_out_of_focus_pixels_average_with_neighbours() {
        // Every pixel has CoC 1, so each averages itself with both neighbours.
        let color = [rgba(0, 0, 0, 0), rgba(90, 0, 0, 0), rgba(0, 0, 0, 0)];
        let depth = [8, 8, 8];
        let mut out = [0u32; 3];
        let mut coc = [0.0f32; 3];
        BlurPass { width: 3, height: 1, z_focus: 0, relaxed_math: false }.run(&color, &depth, &mut out, &mut coc);
        assert_eq!(out[1], rgba(30, 0, 0, 0));
        // Edge pixels clamp: left sees itself twice plus the centre.
        assert_eq!(out[0], rgba(30, 0, 0, 0));
        assert_eq!(coc, [1.0; 3]);
    }

    #[test]
    fn test_sharp_neighbour_does_not_bleed() {
        // Centre is blurred (CoC 1) but its neighbours are in focus.
        let color = [rgba(60, 0, 0, 0), rgba(0, 0, 0, 0), rgba(60, 0, 0, 0)];
        let depth = [0, 8, 0];
        let mut out = [0u32; 3];
        let mut coc = [0.0f32; 3];
        BlurPass { width: 3, height: 1, z_focus: 0, relaxed_math: true }.run(&color, &depth, &mut out, &mut coc);
        assert_eq!(out, color);
    }

    #[test]
    fn test_transpose() {
        let src = [1, 2, 3, 4, 5, 6];
        let mut dst = [0; 6];
        transpose(&src, &mut dst, 3, 2);
        assert_eq!(dst, [1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn test_host_executor_rejects_short_input() {
        let color = [0u32; 3];
        let coc = [0.0f32; 4];
        let frame = Frame { color: &color, depth: &color, coc: &coc, width: 2, height: 2, z_focus: 0 };
        assert!(matches!(
            HostExecutor::new(&frame, BuildOptions::default()),
            Err(LensBlurError::BufferSize { role: BufferRole::ColorInput, .. })
        ));
    }
}
