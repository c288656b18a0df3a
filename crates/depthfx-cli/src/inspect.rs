//! Keyframe statistics for `depthfx inspect`.

use depthfx_core::{DepthKeyframeSet, DepthMeta};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStats {
    pub index: usize,
    pub min: u8,
    pub max: u8,
    pub mean: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    #[serde(flatten)]
    pub meta: DepthMeta,
    pub duration: f64,
    pub frames: Vec<FrameStats>,
}

pub fn frame_stats(index: usize, plane: &[u8]) -> FrameStats {
    let (min, max, sum) = plane
        .iter()
        .fold((u8::MAX, u8::MIN, 0u64), |(lo, hi, sum), &v| {
            (lo.min(v), hi.max(v), sum + v as u64)
        });
    let mean = if plane.is_empty() {
        0.0
    } else {
        sum as f64 / plane.len() as f64
    };
    FrameStats {
        index,
        min: if plane.is_empty() { 0 } else { min },
        max,
        mean,
    }
}

pub fn inspect(keyframes: &DepthKeyframeSet) -> InspectReport {
    let frames = (0..keyframes.frame_count())
        .filter_map(|i| keyframes.frame(i).map(|plane| frame_stats(i, plane)))
        .collect();
    InspectReport {
        meta: keyframes.meta().clone(),
        duration: keyframes.duration(),
        frames,
    }
}
