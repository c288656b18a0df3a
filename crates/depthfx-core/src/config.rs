use serde::{Deserialize, Serialize};

use crate::error::{DepthFxError, DepthFxResult};
use crate::quality::QualityOverride;

/// Which GPU backend family the renderer should negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Vulkan / Metal / DX12. Fails loudly when unavailable.
    Modern,
    /// GL. Never negotiated.
    Legacy,
    /// Probe the modern backend with a timeout, fall back to legacy.
    #[default]
    Auto,
}

/// Caller-supplied rendering configuration.
///
/// Every field is optional; missing values take the engine defaults when the
/// configuration is resolved with [`ResolvedConfig::resolve`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub focal_depth: Option<f32>,
    pub aperture: Option<f32>,
    pub focus_range: Option<f32>,
    pub depth_scale: Option<f32>,
    pub max_blur_radius: Option<f32>,
    pub highlight_threshold: Option<f32>,
    pub highlight_gain: Option<f32>,
    pub vignette_strength: Option<f32>,
    pub parallax_strength: Option<f32>,
    pub parallax_focus: Option<f32>,
    pub breathing_amplitude: Option<f32>,
    pub breathing_frequency: Option<f32>,
    pub breathing_scale: Option<f32>,
    pub bilateral_sigma_space: Option<f32>,
    pub bilateral_sigma_range: Option<f32>,
    pub depth_cache_epsilon: Option<f64>,
    pub backend_timeout_ms: Option<u64>,
    pub quality: Option<QualityOverride>,
    pub backend: Option<BackendPreference>,
    pub offload_sampler: Option<bool>,
}

impl RenderConfig {
    pub fn load_from_file(path: &std::path::Path) -> DepthFxResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> DepthFxResult<Self> {
        toml::from_str(contents).map_err(|e| DepthFxError::Config(e.to_string()))
    }

    pub fn save_to_file(&self, path: &std::path::Path) -> DepthFxResult<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| DepthFxError::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

/// Fully merged, validated rendering parameters. Immutable per renderer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedConfig {
    /// Normalized depth (0 near, 1 far) that is in perfect focus.
    pub focal_depth: f32,
    /// Blur growth per unit of depth distance from the focal plane.
    pub aperture: f32,
    /// Width of the in-focus band around `focal_depth`, in normalized depth.
    pub focus_range: f32,
    /// Multiplier applied to raw depth differences.
    pub depth_scale: f32,
    /// Largest blur radius, in working-resolution pixels.
    pub max_blur_radius: f32,
    /// Luminance above which samples are boosted into bokeh highlights.
    pub highlight_threshold: f32,
    pub highlight_gain: f32,
    pub vignette_strength: f32,
    /// Maximum UV displacement for the parallax effect.
    pub parallax_strength: f32,
    /// Depth that stays fixed while the parallax effect moves.
    pub parallax_focus: f32,
    /// Focal depth oscillation ("focus breathing") amplitude.
    pub breathing_amplitude: f32,
    /// Focus breathing frequency in Hz.
    pub breathing_frequency: f32,
    /// Fractional swing of the blur magnitude in step with the breathing
    /// offset, so 0.2 scales the CoC between 0.8x and 1.2x.
    pub breathing_scale: f32,
    pub bilateral_sigma_space: f32,
    /// Range sigma in 8-bit depth units.
    pub bilateral_sigma_range: f32,
    /// Seconds within which a sampler query may reuse the cached buffer.
    pub depth_cache_epsilon: f64,
    pub backend_timeout_ms: u64,
    pub quality: QualityOverride,
    pub backend: BackendPreference,
    pub offload_sampler: bool,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            focal_depth: 0.35,
            aperture: 2.5,
            focus_range: 0.08,
            depth_scale: 1.0,
            max_blur_radius: 12.0,
            highlight_threshold: 0.8,
            highlight_gain: 2.0,
            vignette_strength: 0.25,
            parallax_strength: 0.035,
            parallax_focus: 0.5,
            breathing_amplitude: 0.0,
            breathing_frequency: 0.25,
            breathing_scale: 0.0,
            bilateral_sigma_space: 2.0,
            bilateral_sigma_range: 24.0,
            depth_cache_epsilon: 0.05,
            backend_timeout_ms: 1500,
            quality: QualityOverride::Auto,
            backend: BackendPreference::Auto,
            offload_sampler: true,
        }
    }
}

impl ResolvedConfig {
    /// Merge caller overrides onto the defaults and validate the result.
    pub fn resolve(overrides: &RenderConfig) -> DepthFxResult<Self> {
        let d = Self::default();
        let resolved = Self {
            focal_depth: overrides.focal_depth.unwrap_or(d.focal_depth),
            aperture: overrides.aperture.unwrap_or(d.aperture),
            focus_range: overrides.focus_range.unwrap_or(d.focus_range),
            depth_scale: overrides.depth_scale.unwrap_or(d.depth_scale),
            max_blur_radius: overrides.max_blur_radius.unwrap_or(d.max_blur_radius),
            highlight_threshold: overrides.highlight_threshold.unwrap_or(d.highlight_threshold),
            highlight_gain: overrides.highlight_gain.unwrap_or(d.highlight_gain),
            vignette_strength: overrides.vignette_strength.unwrap_or(d.vignette_strength),
            parallax_strength: overrides.parallax_strength.unwrap_or(d.parallax_strength),
            parallax_focus: overrides.parallax_focus.unwrap_or(d.parallax_focus),
            breathing_amplitude: overrides.breathing_amplitude.unwrap_or(d.breathing_amplitude),
            breathing_frequency: overrides.breathing_frequency.unwrap_or(d.breathing_frequency),
            breathing_scale: overrides.breathing_scale.unwrap_or(d.breathing_scale),
            bilateral_sigma_space: overrides
                .bilateral_sigma_space
                .unwrap_or(d.bilateral_sigma_space),
            bilateral_sigma_range: overrides
                .bilateral_sigma_range
                .unwrap_or(d.bilateral_sigma_range),
            depth_cache_epsilon: overrides.depth_cache_epsilon.unwrap_or(d.depth_cache_epsilon),
            backend_timeout_ms: overrides.backend_timeout_ms.unwrap_or(d.backend_timeout_ms),
            quality: overrides.quality.unwrap_or(d.quality),
            backend: overrides.backend.unwrap_or(d.backend),
            offload_sampler: overrides.offload_sampler.unwrap_or(d.offload_sampler),
        };
        resolved.validate()?;
        Ok(resolved)
    }

    fn validate(&self) -> DepthFxResult<()> {
        let unit_interval = [
            ("focal_depth", self.focal_depth),
            ("focus_range", self.focus_range),
            ("highlight_threshold", self.highlight_threshold),
            ("vignette_strength", self.vignette_strength),
            ("parallax_focus", self.parallax_focus),
            ("breathing_scale", self.breathing_scale),
        ];
        for (name, value) in unit_interval {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(DepthFxError::Config(format!(
                    "{name} must be within [0, 1], got {value}"
                )));
            }
        }

        let non_negative = [
            ("aperture", self.aperture),
            ("depth_scale", self.depth_scale),
            ("max_blur_radius", self.max_blur_radius),
            ("highlight_gain", self.highlight_gain),
            ("parallax_strength", self.parallax_strength),
            ("breathing_amplitude", self.breathing_amplitude),
            ("breathing_frequency", self.breathing_frequency),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(DepthFxError::Config(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        let positive = [
            ("bilateral_sigma_space", self.bilateral_sigma_space),
            ("bilateral_sigma_range", self.bilateral_sigma_range),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(DepthFxError::Config(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if !self.depth_cache_epsilon.is_finite() || self.depth_cache_epsilon < 0.0 {
            return Err(DepthFxError::Config(format!(
                "depth_cache_epsilon must be a non-negative number, got {}",
                self.depth_cache_epsilon
            )));
        }
        Ok(())
    }

    fn breathing_wave(&self, time_seconds: f64) -> f32 {
        let phase = std::f64::consts::TAU * self.breathing_frequency as f64 * time_seconds;
        phase.sin() as f32
    }

    /// Breathing offset added to the focal depth at `time_seconds`.
    pub fn breathing_offset(&self, time_seconds: f64) -> f32 {
        if self.breathing_amplitude == 0.0 {
            return 0.0;
        }
        self.breathing_amplitude * self.breathing_wave(time_seconds)
    }

    /// Multiplier on the CoC magnitude at `time_seconds`.
    pub fn breathing_coc_scale(&self, time_seconds: f64) -> f32 {
        if self.breathing_scale == 0.0 {
            return 1.0;
        }
        1.0 + self.breathing_scale * self.breathing_wave(time_seconds)
    }

    pub fn backend_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.backend_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::QualityTier;

    #[test]
    fn test_empty_overrides_resolve_to_defaults() {
        let resolved = ResolvedConfig::resolve(&RenderConfig::default()).unwrap();
        assert_eq!(resolved, ResolvedConfig::default());
    }

    #[test]
    fn test_toml_overrides_merge() {
        let config = RenderConfig::from_toml_str(
            r#"
            aperture = 4.0
            vignette_strength = 0.0
            quality = "low"
            backend = "legacy"
            "#,
        )
        .unwrap();
        let resolved = ResolvedConfig::resolve(&config).unwrap();
        assert_eq!(resolved.aperture, 4.0);
        assert_eq!(resolved.vignette_strength, 0.0);
        assert_eq!(resolved.quality, QualityOverride::Tier(QualityTier::Low));
        assert_eq!(resolved.backend, BackendPreference::Legacy);
        assert_eq!(resolved.focal_depth, ResolvedConfig::default().focal_depth);
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        assert!(RenderConfig::from_toml_str("apperture = 2.0").is_err());
    }

    #[test]
    fn test_out_of_range_focal_depth_is_rejected() {
        let config = RenderConfig {
            focal_depth: Some(1.5),
            ..Default::default()
        };
        let err = ResolvedConfig::resolve(&config).unwrap_err();
        assert!(err.to_string().contains("focal_depth"));
    }

    #[test]
    fn test_breathing_offset_is_zero_without_amplitude() {
        let resolved = ResolvedConfig::default();
        assert_eq!(resolved.breathing_offset(3.7), 0.0);

        let breathing = ResolvedConfig {
            breathing_amplitude: 0.1,
            breathing_frequency: 1.0,
            ..Default::default()
        };
        assert!((breathing.breathing_offset(0.25) - 0.1).abs() < 1e-5);
    }

    #[test]
    fn test_breathing_scale_modulates_coc() {
        assert_eq!(ResolvedConfig::default().breathing_coc_scale(1.3), 1.0);

        let config = RenderConfig::from_toml_str("breathing_scale = 0.2\nbreathing_frequency = 1.0").unwrap();
        let resolved = ResolvedConfig::resolve(&config).unwrap();
        assert!((resolved.breathing_coc_scale(0.25) - 1.2).abs() < 1e-5);
        assert!((resolved.breathing_coc_scale(0.75) - 0.8).abs() < 1e-5);
        // The focal offset stays off unless its own amplitude is set.
        assert_eq!(resolved.breathing_offset(0.25), 0.0);

        let too_wide = RenderConfig {
            breathing_scale: Some(1.5),
            ..Default::default()
        };
        assert!(ResolvedConfig::resolve(&too_wide).is_err());
    }
}
