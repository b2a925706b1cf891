//! Device session: one adapter, one device, one in-order queue.
//!
//! Adapters are enumerated explicitly instead of going through
//! `request_adapter`, which happily returns llvmpipe/WARP when no real GPU is
//! visible. Software adapters are rejected unless the config allows them; the
//! blur kernels are not meant to run on a CPU rasterizer.

use std::fmt;

use lensblur_gpu_shared::uniforms::WORKGROUP_SIZE;

use crate::config::SessionConfig;
use crate::error::{DeviceError, DeviceErrorCode, DeviceStage, LensBlurError, Result};
use crate::schedule::Extent;

/// Adapter details kept for logging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.backend, self.device_type)
    }
}

/// The compute device every program and buffer is created on.
///
/// Create once and reuse across effect invocations. Fields drop top to
/// bottom, so `_instance` is last and outlives the device and queue.
pub struct DeviceSession {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: AdapterInfo,
    pub workgroup_size: [u32; 2],
    _instance: wgpu::Instance,
}

impl DeviceSession {
    /// Select an adapter and open the device.
    ///
    /// # Errors
    /// `NoPlatform` when no acceptable adapter exists; a `DeviceError` when the
    /// device request itself fails.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        pollster::block_on(Self::init_async(config))
    }

    async fn init_async(config: &SessionConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(config.backends);
        for adapter in &adapters {
            let info = adapter.get_info();
            log::debug!("Found adapter: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        let adapter = adapters
            .into_iter()
            .filter_map(|a| {
                adapter_rank(a.get_info().device_type, config.power_preference, config.allow_software_adapter)
                    .map(|rank| (rank, a))
            })
            .min_by_key(|(rank, _)| *rank)
            .map(|(_, a)| a)
            .ok_or(LensBlurError::NoPlatform)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };
        if adapter_info.device_type == wgpu::DeviceType::Cpu {
            log::warn!("Using software adapter {adapter_info}; lens blur will be slow");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("LensBlur Compute Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: required_limits(&adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await
            .map_err(|e| DeviceError::new(DeviceStage::RequestDevice, DeviceErrorCode::Other, e.to_string()))?;

        install_device_error_handlers(&device);

        log::info!("Lens blur device session created: {adapter_info}");

        Ok(Self {
            device,
            queue,
            adapter_info,
            workgroup_size: WORKGROUP_SIZE,
            _instance: instance,
        })
    }

    /// Run `op` inside validation and out-of-memory error scopes.
    ///
    /// wgpu reports most failures asynchronously; without a scope they would
    /// reach the uncaptured handler and the returned handle would be invalid.
    pub fn checked<T>(
        &self,
        stage: DeviceStage,
        op: impl FnOnce(&wgpu::Device) -> T,
    ) -> Result<T, DeviceError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = op(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match validation.or(out_of_memory) {
            Some(err) => Err(DeviceError::from_wgpu(stage, err)),
            None => Ok(value),
        }
    }

    /// Block until every submitted command has finished.
    pub fn drain(&self) -> Result<(), DeviceError> {
        let result = self.device.poll(wgpu::Maintain::Wait);
        if result.is_queue_empty() {
            Ok(())
        } else {
            Err(DeviceError::new(
                DeviceStage::Drain,
                DeviceErrorCode::Other,
                "queue still busy after wait",
            ))
        }
    }

    /// Workgroups needed to cover `extent`, rounding up.
    ///
    /// Kernels discard invocations outside `(width, height)`.
    pub fn dispatch_size(&self, extent: Extent) -> (u32, u32) {
        dispatch_size(extent, self.workgroup_size)
    }
}

impl fmt::Display for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeviceSession {{ adapter: {}, workgroup: {}x{} }}",
            self.adapter_info, self.workgroup_size[0], self.workgroup_size[1]
        )
    }
}

pub(crate) fn dispatch_size(extent: Extent, workgroup: [u32; 2]) -> (u32, u32) {
    (
        extent.width.div_ceil(workgroup[0]),
        extent.height.div_ceil(workgroup[1]),
    )
}

/// Downlevel limits, raised to whatever buffer sizes the adapter supports.
///
/// Every plane is one storage binding, so the binding size caps the frame
/// size; a 48 MP frame needs 192 MiB per plane.
fn required_limits(adapter: &wgpu::Limits) -> wgpu::Limits {
    wgpu::Limits {
        max_storage_buffer_binding_size: adapter.max_storage_buffer_binding_size,
        max_buffer_size: adapter.max_buffer_size,
        ..wgpu::Limits::downlevel_defaults().using_resolution(adapter.clone())
    }
}

/// Lower is better; `None` rejects the adapter.
fn adapter_rank(
    device_type: wgpu::DeviceType,
    preference: wgpu::PowerPreference,
    allow_software: bool,
) -> Option<u8> {
    use wgpu::DeviceType::*;
    let low_power = preference == wgpu::PowerPreference::LowPower;
    match device_type {
        DiscreteGpu => Some(if low_power { 1 } else { 0 }),
        IntegratedGpu => Some(if low_power { 0 } else { 1 }),
        VirtualGpu => Some(2),
        Other => Some(3),
        Cpu if allow_software => Some(4),
        Cpu => None,
    }
}

fn install_device_error_handlers(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|error| {
        log::error!("wgpu uncaptured error: {error}");
    }));
    device.set_device_lost_callback(|reason, message| {
        log::error!("wgpu device lost: reason={reason:?}, message={message}");
    });
}
