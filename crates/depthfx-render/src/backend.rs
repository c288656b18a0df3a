//! GPU backend negotiation.
//!
//! [`detect_backend`] resolves a [`BackendPreference`] into a concrete
//! [`BackendDescriptor`] before any renderer is built, so the rest of the
//! engine never observes a pending negotiation. Only the `Auto` path is
//! time-bounded: the modern-backend probe races a timeout and any failure
//! degrades silently to the legacy backend.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use depthfx_core::{BackendPreference, DepthFxError, DepthFxResult};

/// Backend family a descriptor resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Vulkan, Metal or DX12.
    Modern,
    /// OpenGL / GLES.
    Legacy,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Modern => write!(f, "modern"),
            BackendKind::Legacy => write!(f, "legacy"),
        }
    }
}

/// What the modern-backend probe learned about the adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterSummary {
    pub name: String,
    pub backend: wgpu::Backend,
    pub device_type: wgpu::DeviceType,
    pub max_texture_dimension: u32,
}

/// A resolved backend choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub kind: BackendKind,
    /// Present when the choice came from a successful probe.
    pub adapter: Option<AdapterSummary>,
}

impl BackendDescriptor {
    pub fn legacy() -> Self {
        Self {
            kind: BackendKind::Legacy,
            adapter: None,
        }
    }

    pub fn modern(adapter: AdapterSummary) -> Self {
        Self {
            kind: BackendKind::Modern,
            adapter: Some(adapter),
        }
    }

    /// wgpu backend set to create instances with.
    pub fn backends(&self) -> wgpu::Backends {
        match self.kind {
            BackendKind::Modern => wgpu::Backends::PRIMARY,
            BackendKind::Legacy => wgpu::Backends::GL,
        }
    }
}

/// Platform capability probe for the modern backend.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Whether the platform exposes the modern API at all.
    fn is_supported(&self) -> bool;

    /// Try to acquire an adapter. `Ok(None)` means the API answered with
    /// nothing usable.
    async fn probe(&self) -> DepthFxResult<Option<AdapterSummary>>;
}

/// Probe backed by a real wgpu instance on the primary backends.
pub struct WgpuProbe {
    instance: wgpu::Instance,
}

impl WgpuProbe {
    pub fn new() -> Self {
        Self {
            instance: wgpu::Instance::new(wgpu::InstanceDescriptor {
                backends: wgpu::Backends::PRIMARY,
                ..Default::default()
            }),
        }
    }
}

impl Default for WgpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CapabilityProbe for WgpuProbe {
    fn is_supported(&self) -> bool {
        // Native builds always compile at least one primary backend.
        cfg!(not(target_arch = "wasm32"))
    }

    async fn probe(&self) -> DepthFxResult<Option<AdapterSummary>> {
        let adapter = self
            .instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await;

        Ok(adapter.map(|adapter| {
            let info = adapter.get_info();
            AdapterSummary {
                name: info.name,
                backend: info.backend,
                device_type: info.device_type,
                max_texture_dimension: adapter.limits().max_texture_dimension_2d,
            }
        }))
    }
}

async fn acquire_modern(probe: &dyn CapabilityProbe) -> DepthFxResult<BackendDescriptor> {
    if !probe.is_supported() {
        return Err(DepthFxError::BackendUnavailable(
            "platform does not expose a modern GPU API".into(),
        ));
    }
    match probe.probe().await {
        Ok(Some(adapter)) => Ok(BackendDescriptor::modern(adapter)),
        Ok(None) => Err(DepthFxError::BackendUnavailable(
            "capability probe returned no adapter".into(),
        )),
        Err(e) => Err(DepthFxError::BackendUnavailable(e.to_string())),
    }
}

/// Resolve a backend preference.
///
/// `Legacy` returns immediately. `Modern` reports every failure as
/// [`DepthFxError::BackendUnavailable`]. `Auto` never fails: it waits at
/// most `timeout` for the probe and otherwise falls back to legacy.
pub async fn detect_backend(
    preference: BackendPreference,
    probe: &dyn CapabilityProbe,
    timeout: Duration,
) -> DepthFxResult<BackendDescriptor> {
    match preference {
        BackendPreference::Legacy => Ok(BackendDescriptor::legacy()),
        BackendPreference::Modern => {
            let descriptor = acquire_modern(probe).await?;
            tracing::info!(backend = %descriptor.kind, "GPU backend negotiated");
            Ok(descriptor)
        }
        BackendPreference::Auto => {
            let descriptor = match tokio::time::timeout(timeout, acquire_modern(probe)).await {
                Ok(Ok(descriptor)) => descriptor,
                Ok(Err(e)) => {
                    tracing::info!(reason = %e, "Modern GPU backend unavailable, using legacy");
                    BackendDescriptor::legacy()
                }
                Err(_) => {
                    tracing::warn!(?timeout, "GPU capability probe timed out, using legacy");
                    BackendDescriptor::legacy()
                }
            };
            Ok(descriptor)
        }
    }
}
