use std::sync::Arc;

use super::{DepthSample, DepthSampler, SamplerOptions};
use crate::depth::{DepthKeyframeSet, DepthMeta};
use crate::error::{DepthFxError, DepthFxResult};
use crate::filter::{bilateral_filter, blend_planes, resize_bilinear};

/// In-process sampler: blend, bilateral filter, bilinear resize.
pub struct TemporalDepthSampler {
    keyframes: DepthKeyframeSet,
    options: SamplerOptions,
    blend_scratch: Vec<u8>,
    cache: Option<Arc<DepthSample>>,
}

impl TemporalDepthSampler {
    pub fn new(keyframes: DepthKeyframeSet, options: SamplerOptions) -> DepthFxResult<Self> {
        if options.target_width == 0 || options.target_height == 0 {
            return Err(DepthFxError::InvalidArgument(format!(
                "sampler target must be non-zero, got {}x{}",
                options.target_width, options.target_height
            )));
        }
        let plane = keyframes.meta().plane_len();
        Ok(Self {
            keyframes,
            options,
            blend_scratch: vec![0u8; plane],
            cache: None,
        })
    }

    /// Validate raw frames and build a sampler over them.
    pub fn from_frames(
        meta: DepthMeta,
        frames: Vec<Vec<u8>>,
        options: SamplerOptions,
    ) -> DepthFxResult<Self> {
        Self::new(DepthKeyframeSet::new(meta, frames)?, options)
    }

    pub fn keyframes(&self) -> &DepthKeyframeSet {
        &self.keyframes
    }

    fn cached_for(&self, time_seconds: f64) -> Option<Arc<DepthSample>> {
        let cached = self.cache.as_ref()?;
        let position = self.keyframes.position_at(time_seconds);
        if cached.position.pair() != position.pair() {
            return None;
        }
        let same_frame = position.lower == position.upper;
        if same_frame || (time_seconds - cached.time).abs() <= self.options.cache_epsilon {
            return Some(Arc::clone(cached));
        }
        None
    }

    fn compute(&mut self, time_seconds: f64) -> DepthSample {
        let position = self.keyframes.position_at(time_seconds);
        let width = self.keyframes.width();
        let height = self.keyframes.height();

        // Indices come from position_at and are always in range.
        let lower = self.keyframes.frame(position.lower).unwrap_or_default();
        let upper = self.keyframes.frame(position.upper).unwrap_or_default();
        blend_planes(lower, upper, position.weight, &mut self.blend_scratch);

        let filtered = bilateral_filter(&self.blend_scratch, width, height, self.options.bilateral);
        let data = resize_bilinear(
            &filtered,
            width,
            height,
            self.options.target_width,
            self.options.target_height,
        );

        DepthSample {
            data,
            width: self.options.target_width,
            height: self.options.target_height,
            position,
            time: time_seconds,
        }
    }
}

impl DepthSampler for TemporalDepthSampler {
    fn sample(&mut self, time_seconds: f64) -> Arc<DepthSample> {
        if let Some(hit) = self.cached_for(time_seconds) {
            return hit;
        }
        let sample = Arc::new(self.compute(time_seconds));
        tracing::trace!(
            lower = sample.position.lower,
            upper = sample.position.upper,
            weight = sample.position.weight,
            "Recomputed depth sample"
        );
        self.cache = Some(Arc::clone(&sample));
        sample
    }

    fn target_size(&self) -> (u32, u32) {
        (self.options.target_width, self.options.target_height)
    }

    fn strategy(&self) -> &'static str {
        "in-process"
    }

    fn dispose(&mut self) {
        self.cache = None;
    }
}
