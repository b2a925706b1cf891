//! Blur pipeline: runs the dispatch plan on an executor and reads the result back.

use lensblur_gpu_shared::uniforms::{BlurParams, TransposeParams};
use wgpu::util::DeviceExt;

use crate::buffers::{BufferRole, BufferSet, Frame};
use crate::config::SessionConfig;
use crate::error::{DeviceError, DeviceErrorCode, DeviceStage, Result};
use crate::programs::ProgramRegistry;
use crate::schedule::{plan, KernelArgs, KernelInvocation, RESULT_ROLE};
use crate::session::DeviceSession;
use crate::source::ProgramSources;

/// Something that can run kernel invocations in submission order.
pub trait KernelExecutor {
    /// Queue one invocation. It must observe the writes of every earlier one.
    fn enqueue(&mut self, invocation: &KernelInvocation) -> Result<()>;

    /// Block until everything queued so far has completed.
    fn finish(&mut self) -> Result<()>;

    /// Copy the first `output.len()` elements of a packed-int buffer to the host.
    fn read_back(&mut self, role: BufferRole, output: &mut [u32]) -> Result<()>;
}

/// Run the full six-stage sequence on `executor`, then drain and copy the
/// result into `output[..width * height]`.
pub fn execute<E: KernelExecutor>(executor: &mut E, frame: &Frame<'_>, output: &mut [u32]) -> Result<()> {
    let len = frame.validate(output.len())?;
    let invocations = plan(frame.width, frame.height, frame.z_focus)?;

    for invocation in &invocations {
        log::debug!(
            "Enqueue {} ({}, {}x{})",
            invocation.stage,
            invocation.kernel,
            invocation.extent().width,
            invocation.extent().height
        );
        executor.enqueue(invocation)?;
    }

    executor.finish()?;
    executor.read_back(RESULT_ROLE, &mut output[..len])
}

// ============================================================
// Device executor
// ============================================================

/// Executes invocations on the session's queue, one submission per stage.
pub struct GpuExecutor<'a> {
    session: &'a DeviceSession,
    programs: &'a ProgramRegistry,
    buffers: BufferSet,
}

impl<'a> GpuExecutor<'a> {
    pub fn new(session: &'a DeviceSession, programs: &'a ProgramRegistry, buffers: BufferSet) -> Self {
        Self { session, programs, buffers }
    }
}

/// Scalar arguments of an invocation as uniform bytes.
fn params_bytes(args: &KernelArgs) -> Vec<u8> {
    match *args {
        KernelArgs::LensBlur { width, height, z_focus, .. } => {
            bytemuck::bytes_of(&BlurParams::new(width, height, z_focus)).to_vec()
        }
        KernelArgs::Transpose { width, height, .. } => {
            bytemuck::bytes_of(&TransposeParams::new(width, height)).to_vec()
        }
    }
}

impl KernelExecutor for GpuExecutor<'_> {
    fn enqueue(&mut self, invocation: &KernelInvocation) -> Result<()> {
        let kernel = self.programs.kernel(invocation.kernel);
        let (dx, dy) = self.session.dispatch_size(invocation.extent());
        let roles = invocation.args.buffers();
        let buffers = &self.buffers;
        let queue = &self.session.queue;

        self.session.checked(DeviceStage::Dispatch(invocation.stage), |device| {
            let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("LensBlur Params"),
                contents: &params_bytes(&invocation.args),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let mut entries: Vec<wgpu::BindGroupEntry> = roles
                .iter()
                .enumerate()
                .map(|(binding, &role)| wgpu::BindGroupEntry {
                    binding: binding as u32,
                    resource: buffers.get(role).as_entire_binding(),
                })
                .collect();
            entries.push(wgpu::BindGroupEntry {
                binding: roles.len() as u32,
                resource: params.as_entire_binding(),
            });

            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(invocation.kernel.entry_point()),
                layout: &kernel.bind_group_layout,
                entries: &entries,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(invocation.kernel.entry_point()),
            });
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some(invocation.kernel.entry_point()),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&kernel.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(dx, dy, 1);
            }
            queue.submit(std::iter::once(encoder.finish()));
        })?;

        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.session.drain()?;
        Ok(())
    }

    fn read_back(&mut self, role: BufferRole, output: &mut [u32]) -> Result<()> {
        if output.is_empty() {
            return Ok(());
        }
        let size = std::mem::size_of_val(output) as u64;
        let source = self.buffers.get(role);

        let staging = self.session.checked(DeviceStage::Readback, |device| {
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("LensBlur Readback"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("LensBlur Readback"),
            });
            encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
            self.session.queue.submit(std::iter::once(encoder.finish()));
            staging
        })?;

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.session.drain()?;

        let map_failed = |message: String| DeviceError::new(DeviceStage::Readback, DeviceErrorCode::MapFailed, message);
        rx.recv()
            .map_err(|_| map_failed("map callback never fired".into()))?
            .map_err(|e| map_failed(e.to_string()))?;

        {
            let mapped = slice.get_mapped_range();
            let words: &[u32] = bytemuck::cast_slice(&mapped[..]);
            output.copy_from_slice(words);
        }
        staging.unmap();
        Ok(())
    }
}

// ============================================================
// Context
// ============================================================

/// Device session plus compiled programs, built once and reused for every
/// effect invocation. Dropping it releases all device objects.
pub struct LensBlurContext {
    pub session: DeviceSession,
    pub programs: ProgramRegistry,
}

impl LensBlurContext {
    /// Load kernel sources, open the device and build the programs.
    ///
    /// Sources are read before any device object exists, so a missing kernel
    /// file never leaves a half-built session behind.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let sources = ProgramSources::resolve(&config.kernels)?;
        let session = DeviceSession::new(config)?;
        let programs = ProgramRegistry::build(&session, &sources, config.build_options)?;
        Ok(Self { session, programs })
    }

    /// Blur `frame` and write the result into `output[..width * height]`.
    ///
    /// A zero-sized frame completes without touching the device or `output`.
    pub fn apply(&self, frame: &Frame<'_>, output: &mut [u32]) -> Result<()> {
        frame.validate(output.len())?;
        if frame.plane(BufferRole::ColorInput).is_empty() {
            log::debug!("Skipping lens blur on empty {}x{} frame", frame.width, frame.height);
            return Ok(());
        }

        let buffers = BufferSet::allocate(&self.session, frame)?;
        let mut executor = GpuExecutor::new(&self.session, &self.programs, buffers);
        execute(&mut executor, frame, output)
    }
}
