use criterion::{criterion_group, criterion_main, Criterion};
use depthfx_core::filter::{bilateral_filter, BilateralParams};
use depthfx_core::{DepthKeyframeSet, DepthMeta, DepthSampler, SamplerOptions, TemporalDepthSampler};

fn create_keyframes() -> DepthKeyframeSet {
    let (width, height, frame_count) = (256u32, 144u32, 25u32);
    let meta = DepthMeta {
        frame_count,
        fps: 5.0,
        width,
        height,
        source_fps: 30.0,
    };
    let frames = (0..frame_count)
        .map(|f| {
            (0..width * height)
                .map(|i| {
                    let x = i % width;
                    let y = i / width;
                    ((x + y + f * 3) % 256) as u8
                })
                .collect()
        })
        .collect();
    DepthKeyframeSet::new(meta, frames).unwrap()
}

fn bench_sampler(c: &mut Criterion) {
    let mut group = c.benchmark_group("depthfx_sampler");
    group.sample_size(20);

    let keyframes = create_keyframes();

    for radius in [2u32, 3, 5] {
        let params = BilateralParams {
            radius,
            sigma_space: 2.0,
            sigma_range: 24.0,
        };
        let plane = keyframes.frame(0).unwrap().to_vec();
        group.bench_function(format!("bilateral_r{radius}_256x144"), |b| {
            b.iter(|| bilateral_filter(&plane, 256, 144, params));
        });
    }

    // One simulated second of 60 Hz queries; most should hit the cache.
    group.bench_function("sample_60hz_1s_to_1024x576", |b| {
        b.iter_custom(|iters| {
            let mut total_duration = std::time::Duration::from_nanos(0);

            for _ in 0..iters {
                let mut sampler =
                    TemporalDepthSampler::new(keyframes.clone(), SamplerOptions::new(1024, 576))
                        .unwrap();
                let start = std::time::Instant::now();
                for frame in 0..60 {
                    let _ = sampler.sample(frame as f64 / 60.0);
                }
                total_duration += start.elapsed();
            }

            total_duration
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sampler);
criterion_main!(benches);
