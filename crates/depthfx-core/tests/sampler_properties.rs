use std::sync::Arc;

use depthfx_core::quality::{resolve_quality, CapabilitySignals, QualityOverride, QualityTier};
use depthfx_core::{
    select_sampler, DepthKeyframeSet, DepthMeta, DepthSampler, SamplerOptions,
    TemporalDepthSampler,
};
use proptest::prelude::*;

fn gradient_set(frame_count: u32, fps: f64, width: u32, height: u32) -> DepthKeyframeSet {
    let meta = DepthMeta {
        frame_count,
        fps,
        width,
        height,
        source_fps: 30.0,
    };
    let frames = (0..frame_count)
        .map(|f| {
            (0..width * height)
                .map(|i| ((i + f * 17) % 256) as u8)
                .collect()
        })
        .collect();
    DepthKeyframeSet::new(meta, frames).expect("valid keyframes")
}

#[test]
fn end_of_range_query_clamps_and_resizes() {
    let set = gradient_set(10, 5.0, 64, 64);
    let position = set.position_at(2.03);
    assert_eq!(position.pair(), (9, 9));
    assert!((position.weight - 0.15).abs() < 1e-3);

    let mut sampler = TemporalDepthSampler::new(set, SamplerOptions::new(512, 512)).unwrap();
    let sample = sampler.sample(2.03);
    assert_eq!(sample.data.len(), 512 * 512);
    assert_eq!((sample.width, sample.height), (512, 512));
    assert_eq!(sample.position.pair(), (9, 9));
}

#[test]
fn successive_queries_are_byte_identical() {
    let mut sampler =
        TemporalDepthSampler::new(gradient_set(4, 5.0, 32, 24), SamplerOptions::new(40, 30))
            .unwrap();
    let a = sampler.sample(0.33);
    let b = sampler.sample(0.33);
    assert_eq!(a.data, b.data);
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn quality_tiers_are_monotonic() {
    for max_texture_dimension in [2048, 8192, 16384] {
        let caps = CapabilitySignals {
            max_texture_dimension,
            tier_hint: None,
            device_pixel_ratio: 2.0,
        };
        let low = resolve_quality(&caps, QualityOverride::Tier(QualityTier::Low));
        let medium = resolve_quality(&caps, QualityOverride::Tier(QualityTier::Medium));
        let high = resolve_quality(&caps, QualityOverride::Tier(QualityTier::High));

        assert!(low.working_resolution_divisor >= high.working_resolution_divisor);
        assert!(low.sample_count <= medium.sample_count);
        assert!(medium.sample_count <= high.sample_count);
        assert!(low.bilateral_radius <= high.bilateral_radius);
        assert!(low.device_pixel_ratio_cap <= high.device_pixel_ratio_cap);
        assert_eq!(resolve_quality(&caps, QualityOverride::Auto), resolve_quality(&caps, QualityOverride::Auto));
    }
}

#[tokio::test]
async fn select_sampler_prefers_worker_when_asked() {
    let set = gradient_set(3, 5.0, 16, 16);
    let offloaded = select_sampler(set.clone(), SamplerOptions::new(8, 8), true)
        .await
        .unwrap();
    assert_eq!(offloaded.strategy(), "worker");

    let local = select_sampler(set, SamplerOptions::new(8, 8), false)
        .await
        .unwrap();
    assert_eq!(local.strategy(), "in-process");
}

#[tokio::test]
async fn select_sampler_surfaces_invalid_target() {
    let set = gradient_set(3, 5.0, 16, 16);
    // The worker fails first, then the in-process fallback reports the error.
    assert!(select_sampler(set, SamplerOptions::new(0, 8), true).await.is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn sample_matches_target_size(
        frame_count in 1u32..6,
        src_w in 1u32..24,
        src_h in 1u32..24,
        dst_w in 1u32..48,
        dst_h in 1u32..48,
        time in -1.0f64..4.0,
    ) {
        let set = gradient_set(frame_count, 5.0, src_w, src_h);
        let mut sampler = TemporalDepthSampler::new(set, SamplerOptions::new(dst_w, dst_h)).unwrap();
        let sample = sampler.sample(time);
        prop_assert_eq!(sample.data.len(), (dst_w * dst_h) as usize);
        prop_assert_eq!(sampler.target_size(), (dst_w, dst_h));
    }
}
