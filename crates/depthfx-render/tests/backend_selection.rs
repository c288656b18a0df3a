use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use depthfx_core::{BackendPreference, DepthFxError, DepthFxResult};
use depthfx_render::{detect_backend, AdapterSummary, BackendKind, CapabilityProbe};

/// Probe with a scripted answer that counts how often it was asked.
struct ScriptedProbe {
    supported: bool,
    answer: Answer,
    calls: AtomicUsize,
}

enum Answer {
    Adapter,
    Nothing,
    Fail,
    Hang,
}

impl ScriptedProbe {
    fn new(supported: bool, answer: Answer) -> Self {
        Self {
            supported,
            answer,
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn summary() -> AdapterSummary {
    AdapterSummary {
        name: "scripted".into(),
        backend: wgpu::Backend::Vulkan,
        device_type: wgpu::DeviceType::DiscreteGpu,
        max_texture_dimension: 16384,
    }
}

#[async_trait]
impl CapabilityProbe for ScriptedProbe {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn probe(&self) -> DepthFxResult<Option<AdapterSummary>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            Answer::Adapter => Ok(Some(summary())),
            Answer::Nothing => Ok(None),
            Answer::Fail => Err(DepthFxError::gpu("driver crashed")),
            Answer::Hang => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn test_legacy_resolves_without_probing() {
    let probe = ScriptedProbe::new(true, Answer::Adapter);
    let descriptor = detect_backend(BackendPreference::Legacy, &probe, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(descriptor.kind, BackendKind::Legacy);
    assert!(descriptor.adapter.is_none());
    assert_eq!(probe.calls(), 0);
}

#[tokio::test]
async fn test_modern_reports_every_failure() {
    for probe in [
        ScriptedProbe::new(false, Answer::Adapter),
        ScriptedProbe::new(true, Answer::Nothing),
        ScriptedProbe::new(true, Answer::Fail),
    ] {
        let err = detect_backend(BackendPreference::Modern, &probe, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, DepthFxError::BackendUnavailable(_)));
    }
}

#[tokio::test]
async fn test_modern_success_carries_adapter() {
    let probe = ScriptedProbe::new(true, Answer::Adapter);
    let descriptor = detect_backend(BackendPreference::Modern, &probe, Duration::from_millis(10))
        .await
        .unwrap();
    assert_eq!(descriptor.kind, BackendKind::Modern);
    assert_eq!(descriptor.adapter, Some(summary()));
    assert_eq!(descriptor.backends(), wgpu::Backends::PRIMARY);
}

#[tokio::test]
async fn test_auto_falls_back_on_failure() {
    for probe in [
        ScriptedProbe::new(false, Answer::Adapter),
        ScriptedProbe::new(true, Answer::Nothing),
        ScriptedProbe::new(true, Answer::Fail),
    ] {
        let descriptor = detect_backend(BackendPreference::Auto, &probe, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(descriptor.kind, BackendKind::Legacy);
        assert_eq!(descriptor.backends(), wgpu::Backends::GL);
    }
}

#[tokio::test]
async fn test_auto_times_out_on_hanging_probe() {
    let probe = ScriptedProbe::new(true, Answer::Hang);
    let timeout = Duration::from_millis(50);
    let started = Instant::now();
    let descriptor = detect_backend(BackendPreference::Auto, &probe, timeout)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(descriptor.kind, BackendKind::Legacy);
    assert_eq!(probe.calls(), 1);
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_millis(500), "took {elapsed:?}");
}
