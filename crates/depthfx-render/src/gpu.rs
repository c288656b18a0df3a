use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use depthfx_core::{CapabilitySignals, DepthFxError, DepthFxResult, QualityTier};
use wgpu::{Adapter, Device, Instance, Queue};

use crate::backend::BackendDescriptor;

/// The device, queue and adapter one renderer draws with.
///
/// A context is created from a resolved [`BackendDescriptor`]. When the
/// device is lost the context stays alive but [`GpuContext::is_lost`] flips,
/// and the renderer tears its resources down until the host supplies a
/// fresh context.
pub struct GpuContext {
    pub instance: Instance,
    pub adapter: Adapter,
    pub device: Device,
    pub queue: Queue,
    pub backend: BackendDescriptor,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    /// Instance restricted to the descriptor's backends.
    pub fn create_instance(backend: &BackendDescriptor) -> Instance {
        wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: backend.backends(),
            ..Default::default()
        })
    }

    /// Headless context (no presentation surface).
    pub async fn new(backend: BackendDescriptor) -> DepthFxResult<Self> {
        let instance = Self::create_instance(&backend);
        Self::from_instance(instance, backend, None).await
    }

    /// Blocking wrapper around [`GpuContext::new`].
    pub fn new_blocking(backend: BackendDescriptor) -> DepthFxResult<Self> {
        pollster::block_on(Self::new(backend))
    }

    /// Finish context creation on an instance the host already used to
    /// create its presentation surface.
    pub async fn from_instance(
        instance: Instance,
        backend: BackendDescriptor,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> DepthFxResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| {
                DepthFxError::BackendUnavailable(format!(
                    "no {} adapter available",
                    backend.kind
                ))
            })?;

        let info = adapter.get_info();
        tracing::info!(
            adapter = %info.name,
            backend = ?info.backend,
            device_type = ?info.device_type,
            "GPU adapter selected"
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("depthfx device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(DepthFxError::gpu)?;

        let lost = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&lost);
        device.set_device_lost_callback(move |reason, message| {
            tracing::warn!(?reason, %message, "GPU device lost");
            flag.store(true, Ordering::SeqCst);
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            backend,
            lost,
        })
    }

    /// Whether the device-lost callback has fired.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::SeqCst)
    }

    /// Mark the device as lost, as a host-signalled context loss would.
    pub fn mark_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }

    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    /// Capability signals for the quality resolver.
    pub fn capability_signals(&self, device_pixel_ratio: f32) -> CapabilitySignals {
        let tier_hint = match self.adapter.get_info().device_type {
            wgpu::DeviceType::DiscreteGpu => Some(QualityTier::High),
            wgpu::DeviceType::IntegratedGpu | wgpu::DeviceType::VirtualGpu => {
                Some(QualityTier::Medium)
            }
            wgpu::DeviceType::Cpu => Some(QualityTier::Low),
            wgpu::DeviceType::Other => None,
        };
        CapabilitySignals {
            max_texture_dimension: self.max_texture_dimension(),
            tier_hint,
            device_pixel_ratio,
        }
    }

    /// Whether `format` can be rendered to and filtered on this adapter.
    pub fn supports_render_target(&self, format: wgpu::TextureFormat) -> bool {
        let features = self.adapter.get_texture_format_features(format);
        features
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING)
            && features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
    }

    /// Run `create` inside a validation error scope; `None` if the driver
    /// rejected it.
    pub fn try_create<T>(&self, create: impl FnOnce(&Device) -> T) -> Option<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            None => Some(value),
            Some(err) => {
                tracing::debug!(error = %err, "GPU object creation rejected");
                None
            }
        }
    }
}
