//! # depthfx-render
//!
//! The depthfx rendering engine. Negotiates a GPU backend, builds an effect
//! pass graph on wgpu and drives it frame by frame from a media source and
//! a temporal depth sampler.

pub mod backend;
pub mod effects;
pub mod gpu;
pub mod graph;
pub mod host;
pub mod media;
pub mod passes;
pub mod present;
pub mod registry;
pub mod renderer;
pub mod viewport;

pub use backend::{detect_backend, AdapterSummary, BackendDescriptor, BackendKind, CapabilityProbe, WgpuProbe};
pub use depthfx_core::{DepthFxError, DepthFxResult};
pub use effects::{effect_by_name, EffectGraph, Parallax, RackFocus};
pub use gpu::GpuContext;
pub use graph::{PassGraph, PassTarget, RenderPass};
pub use host::{EventSink, FrameRequestId, FrameScheduler, ManualScheduler, RendererEvent};
pub use media::{MediaKind, MediaSource, StillImageSource};
pub use passes::CocEncoding;
pub use present::{OffscreenPresenter, Presenter, SurfacePresenter};
pub use registry::{GpuTexture, SlotState, TextureRegistry, TextureUnit};
pub use renderer::{Renderer, RendererState};
pub use viewport::{CoverFit, Viewport};
