//! Program registry: compiles the blur and transpose programs into compute pipelines.

use std::fmt;

use lensblur_gpu_shared::shaders;

use crate::config::BuildOptions;
use crate::error::{DeviceStage, Result};
use crate::session::DeviceSession;
use crate::source::ProgramSources;

/// Kind of one positional kernel argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    IntBuffer,
    FloatBuffer,
    Dimension,
    Focus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KernelId {
    LensBlur,
    TransposeInt,
    TransposeFloat,
}

impl KernelId {
    pub const ALL: [KernelId; 3] = [KernelId::LensBlur, KernelId::TransposeInt, KernelId::TransposeFloat];

    pub fn entry_point(self) -> &'static str {
        match self {
            KernelId::LensBlur => shaders::LENS_BLUR_ENTRY,
            KernelId::TransposeInt => shaders::TRANSPOSE_INT_ENTRY,
            KernelId::TransposeFloat => shaders::TRANSPOSE_FLOAT_ENTRY,
        }
    }

    pub fn file_name(self) -> &'static str {
        match self {
            KernelId::LensBlur => shaders::LENS_BLUR_FILE,
            KernelId::TransposeInt => shaders::TRANSPOSE_INT_FILE,
            KernelId::TransposeFloat => shaders::TRANSPOSE_FLOAT_FILE,
        }
    }

    /// Positional argument kinds. Part of the kernel ABI.
    pub fn signature(self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            KernelId::LensBlur => &[IntBuffer, IntBuffer, IntBuffer, FloatBuffer, Dimension, Dimension, Focus],
            KernelId::TransposeInt => &[IntBuffer, IntBuffer, Dimension, Dimension],
            KernelId::TransposeFloat => &[FloatBuffer, FloatBuffer, Dimension, Dimension],
        }
    }

    /// For each buffer binding, whether the kernel only reads it.
    fn storage_read_only(self) -> &'static [bool] {
        match self {
            // color_in, depth_in, blur_out, coc
            KernelId::LensBlur => &[true, true, false, false],
            KernelId::TransposeInt | KernelId::TransposeFloat => &[true, false],
        }
    }
}

impl fmt::Display for KernelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.entry_point())
    }
}

/// Final WGSL text for a program: build options prelude + specialized template.
pub fn program_source(template: &str, options: BuildOptions, workgroup: [u32; 2]) -> String {
    let mut src = options.prelude();
    src.push_str(&shaders::specialize(template, workgroup));
    src
}

/// A compiled kernel and the bind group layout matching its signature.
pub struct Kernel {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// The three kernels every invocation needs. Built all-or-nothing.
pub struct ProgramRegistry {
    lens_blur: Kernel,
    transpose_int: Kernel,
    transpose_float: Kernel,
    pub build_options: BuildOptions,
}

impl ProgramRegistry {
    pub fn build(session: &DeviceSession, sources: &ProgramSources, options: BuildOptions) -> Result<Self> {
        let lens_blur = compile(session, KernelId::LensBlur, sources, options)?;
        let transpose_int = compile(session, KernelId::TransposeInt, sources, options)?;
        let transpose_float = compile(session, KernelId::TransposeFloat, sources, options)?;
        log::info!("Lens blur programs built ({:?})", options);
        Ok(Self { lens_blur, transpose_int, transpose_float, build_options: options })
    }

    pub fn kernel(&self, id: KernelId) -> &Kernel {
        match id {
            KernelId::LensBlur => &self.lens_blur,
            KernelId::TransposeInt => &self.transpose_int,
            KernelId::TransposeFloat => &self.transpose_float,
        }
    }
}

fn compile(
    session: &DeviceSession,
    id: KernelId,
    sources: &ProgramSources,
    options: BuildOptions,
) -> Result<Kernel> {
    let source = program_source(sources.get(id), options, session.workgroup_size);
    log::debug!("Compiling {} ({})", id, id.file_name());

    let kernel = session.checked(DeviceStage::CompileProgram(id), |device| {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(id.file_name()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });

        let bind_group_layout = create_bind_group_layout(device, id);

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(id.entry_point()),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(id.entry_point()),
            layout: Some(&layout),
            module: &module,
            entry_point: Some(id.entry_point()),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        Kernel { pipeline, bind_group_layout }
    })?;

    Ok(kernel)
}

/// Storage bindings in argument order, then one uniform for the scalars.
fn create_bind_group_layout(device: &wgpu::Device, id: KernelId) -> wgpu::BindGroupLayout {
    let read_only = id.storage_read_only();
    let mut entries: Vec<wgpu::BindGroupLayoutEntry> = read_only
        .iter()
        .enumerate()
        .map(|(binding, &read_only)| wgpu::BindGroupLayoutEntry {
            binding: binding as u32,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        })
        .collect();

    entries.push(wgpu::BindGroupLayoutEntry {
        binding: read_only.len() as u32,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    });

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(id.entry_point()),
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_points() {
        assert_eq!(KernelId::LensBlur.entry_point(), "lensBlur");
        assert_eq!(KernelId::TransposeInt.entry_point(), "transposeInt");
        assert_eq!(KernelId::TransposeFloat.entry_point(), "transposeFloat");
    }

    #[test]
    fn test_signatures() {
        assert_eq!(KernelId::LensBlur.signature().len(), 7);
        assert_eq!(KernelId::TransposeInt.signature().len(), 4);
        assert_eq!(KernelId::TransposeFloat.signature()[0], ArgKind::FloatBuffer);
    }

    #[test]
    fn test_storage_bindings_match_buffer_arguments() {
        for id in KernelId::ALL {
            let buffers = id
                .signature()
                .iter()
                .filter(|k| matches!(k, ArgKind::IntBuffer | ArgKind::FloatBuffer))
                .count();
            assert_eq!(id.storage_read_only().len(), buffers, "{id}");
        }
    }

    #[test]
    fn test_program_source_prepends_build_options() {
        let src = program_source(shaders::LENS_BLUR, BuildOptions::FAST_RELAXED_MATH, [8, 8]);
        assert!(src.starts_with("const RELAXED_MATH: bool = true;\n"));
        assert!(src.contains("@workgroup_size(8, 8, 1)"));
    }
}
