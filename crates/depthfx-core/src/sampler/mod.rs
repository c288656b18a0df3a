//! Temporal depth sampling.
//!
//! A [`DepthSampler`] turns continuous playback time into a smoothed depth
//! buffer at the renderer's target resolution. Two strategies implement it:
//! [`TemporalDepthSampler`] computes in-process, [`WorkerDepthSampler`]
//! computes on a dedicated thread and never blocks the caller. The strategy
//! is chosen once by [`select_sampler`]; callers only see the trait.
//!
//! Returned buffers are shared through [`Arc`]. A sampler hands back the same
//! allocation while the depth has not changed, so `Arc::ptr_eq` against the
//! previous result is a cheap "did depth change" test.

mod temporal;
mod worker;

pub use temporal::TemporalDepthSampler;
pub use worker::WorkerDepthSampler;

use std::sync::Arc;

use crate::config::ResolvedConfig;
use crate::depth::{DepthKeyframeSet, KeyframePosition};
use crate::filter::BilateralParams;
use crate::quality::QualityParams;

/// One sampled depth map at the sampler's target resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSample {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Keyframe pair and weight the buffer was generated from.
    pub position: KeyframePosition,
    /// Playback time of the query that produced the buffer.
    pub time: f64,
}

impl DepthSample {
    /// Mean depth value, useful for diagnostics and tests.
    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as u64).sum::<u64>() as f64 / self.data.len() as f64
    }
}

/// Construction options shared by both sampler strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerOptions {
    pub target_width: u32,
    pub target_height: u32,
    pub bilateral: BilateralParams,
    /// Seconds within which a query on the same keyframe pair reuses the cache.
    pub cache_epsilon: f64,
}

impl SamplerOptions {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        let config = ResolvedConfig::default();
        Self {
            target_width,
            target_height,
            bilateral: BilateralParams {
                radius: 3,
                sigma_space: config.bilateral_sigma_space,
                sigma_range: config.bilateral_sigma_range,
            },
            cache_epsilon: config.depth_cache_epsilon,
        }
    }

    /// Options derived from the renderer's quality tier and configuration.
    pub fn from_quality(
        target_width: u32,
        target_height: u32,
        quality: &QualityParams,
        config: &ResolvedConfig,
    ) -> Self {
        Self {
            target_width,
            target_height,
            bilateral: BilateralParams {
                radius: quality.bilateral_radius,
                sigma_space: config.bilateral_sigma_space,
                sigma_range: config.bilateral_sigma_range,
            },
            cache_epsilon: config.depth_cache_epsilon,
        }
    }
}

/// Continuous-time depth lookup.
pub trait DepthSampler: Send {
    /// Depth at `time_seconds`, sized to the sampler's target resolution.
    fn sample(&mut self, time_seconds: f64) -> Arc<DepthSample>;

    /// Target `(width, height)` of every returned buffer.
    fn target_size(&self) -> (u32, u32);

    /// Short strategy name for diagnostics.
    fn strategy(&self) -> &'static str;

    /// Release buffers and background work. Safe to call more than once.
    fn dispose(&mut self) {}
}

/// Pick a sampler strategy once at startup.
///
/// With `offload` set, a worker sampler is attempted first; any failure is
/// logged and the in-process sampler is returned instead.
pub async fn select_sampler(
    keyframes: DepthKeyframeSet,
    options: SamplerOptions,
    offload: bool,
) -> crate::DepthFxResult<Box<dyn DepthSampler>> {
    if offload {
        match WorkerDepthSampler::spawn(keyframes.clone(), options).await {
            Ok(worker) => {
                tracing::info!(strategy = worker.strategy(), "Depth sampler selected");
                return Ok(Box::new(worker));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Depth worker unavailable, sampling in-process");
            }
        }
    }

    let sampler = TemporalDepthSampler::new(keyframes, options)?;
    tracing::info!(strategy = sampler.strategy(), "Depth sampler selected");
    Ok(Box::new(sampler))
}
