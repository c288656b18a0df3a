//! # depthfx-core
//!
//! GPU-free building blocks of the depthfx engine: the depth keyframe store,
//! temporal depth samplers, CPU depth filters, quality tier policy,
//! rendering configuration and the shared error type.

pub mod config;
pub mod depth;
pub mod error;
pub mod filter;
pub mod quality;
pub mod sampler;

pub use config::{BackendPreference, RenderConfig, ResolvedConfig};
pub use depth::{DepthKeyframeSet, DepthMeta, KeyframePosition};
pub use error::{DepthFxError, DepthFxResult};
pub use quality::{resolve_quality, CapabilitySignals, QualityOverride, QualityParams, QualityTier};
pub use sampler::{
    select_sampler, DepthSample, DepthSampler, SamplerOptions, TemporalDepthSampler,
    WorkerDepthSampler,
};
