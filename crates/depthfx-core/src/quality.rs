//! Quality tier policy.
//!
//! [`resolve_quality`] maps device capability signals and an optional
//! override to a [`QualityParams`] bundle. It is a pure function: the same
//! inputs always produce the same parameters, with no GPU context involved.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DepthFxError;

/// Named quality tier, ordered `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityTier::Low => write!(f, "low"),
            QualityTier::Medium => write!(f, "medium"),
            QualityTier::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for QualityTier {
    type Err = DepthFxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(QualityTier::Low),
            "medium" => Ok(QualityTier::Medium),
            "high" => Ok(QualityTier::High),
            other => Err(DepthFxError::InvalidArgument(format!(
                "unknown quality tier '{other}' (expected low, medium or high)"
            ))),
        }
    }
}

/// Caller override for tier selection. Serialized as `"auto"` or a tier name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum QualityOverride {
    #[default]
    Auto,
    Tier(QualityTier),
}

impl TryFrom<String> for QualityOverride {
    type Error = DepthFxError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<QualityOverride> for String {
    fn from(value: QualityOverride) -> Self {
        value.to_string()
    }
}

impl std::str::FromStr for QualityOverride {
    type Err = DepthFxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("auto") {
            return Ok(QualityOverride::Auto);
        }
        s.parse().map(QualityOverride::Tier)
    }
}

impl fmt::Display for QualityOverride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityOverride::Auto => write!(f, "auto"),
            QualityOverride::Tier(tier) => tier.fmt(f),
        }
    }
}

/// What the host knows about the device it is rendering on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapabilitySignals {
    /// Largest 2D texture edge the GPU accepts.
    pub max_texture_dimension: u32,
    /// Tier suggested by the platform (adapter class, power profile, ...).
    pub tier_hint: Option<QualityTier>,
    pub device_pixel_ratio: f32,
}

impl Default for CapabilitySignals {
    fn default() -> Self {
        Self {
            max_texture_dimension: 8192,
            tier_hint: None,
            device_pixel_ratio: 1.0,
        }
    }
}

/// Resolution and sample-count tradeoffs for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QualityParams {
    pub tier: QualityTier,
    pub device_pixel_ratio_cap: f32,
    /// Longest edge the sampled depth map is resized to.
    pub depth_max_dimension: u32,
    pub bilateral_radius: u32,
    /// Depth-of-field disc samples per pixel.
    pub sample_count: u32,
    /// Working (blur) resolution is the display buffer divided by this.
    pub working_resolution_divisor: u32,
}

impl QualityParams {
    /// Base parameters of a tier before device limits are applied.
    pub fn for_tier(tier: QualityTier) -> Self {
        match tier {
            QualityTier::Low => Self {
                tier,
                device_pixel_ratio_cap: 1.0,
                depth_max_dimension: 256,
                bilateral_radius: 2,
                sample_count: 12,
                working_resolution_divisor: 4,
            },
            QualityTier::Medium => Self {
                tier,
                device_pixel_ratio_cap: 1.5,
                depth_max_dimension: 512,
                bilateral_radius: 3,
                sample_count: 24,
                working_resolution_divisor: 2,
            },
            QualityTier::High => Self {
                tier,
                device_pixel_ratio_cap: 2.0,
                depth_max_dimension: 1024,
                bilateral_radius: 5,
                sample_count: 48,
                working_resolution_divisor: 1,
            },
        }
    }

    /// Effective device pixel ratio for a reported ratio.
    pub fn effective_pixel_ratio(&self, device_pixel_ratio: f32) -> f32 {
        if !device_pixel_ratio.is_finite() || device_pixel_ratio <= 0.0 {
            return 1.0;
        }
        device_pixel_ratio.min(self.device_pixel_ratio_cap)
    }

    /// Scale `(width, height)` so the longest edge fits `depth_max_dimension`.
    pub fn depth_target_size(&self, width: u32, height: u32) -> (u32, u32) {
        let longest = width.max(height);
        if longest <= self.depth_max_dimension || longest == 0 {
            return (width.max(1), height.max(1));
        }
        let scale = self.depth_max_dimension as f64 / longest as f64;
        (
            ((width as f64 * scale).round() as u32).max(1),
            ((height as f64 * scale).round() as u32).max(1),
        )
    }
}

/// Tier inferred from the texture limit when the platform gives no hint.
fn tier_from_texture_limit(max_texture_dimension: u32) -> QualityTier {
    match max_texture_dimension {
        d if d >= 16384 => QualityTier::High,
        d if d >= 8192 => QualityTier::Medium,
        _ => QualityTier::Low,
    }
}

/// Derive quality parameters from capability signals and an override.
pub fn resolve_quality(signals: &CapabilitySignals, quality: QualityOverride) -> QualityParams {
    let tier = match quality {
        QualityOverride::Tier(tier) => tier,
        QualityOverride::Auto => signals
            .tier_hint
            .unwrap_or_else(|| tier_from_texture_limit(signals.max_texture_dimension)),
    };

    let mut params = QualityParams::for_tier(tier);
    if signals.max_texture_dimension > 0 {
        params.depth_max_dimension = params.depth_max_dimension.min(signals.max_texture_dimension);
    }
    tracing::debug!(
        tier = %params.tier,
        divisor = params.working_resolution_divisor,
        samples = params.sample_count,
        radius = params.bilateral_radius,
        "Resolved quality tier"
    );
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_wins_over_hint() {
        let signals = CapabilitySignals {
            tier_hint: Some(QualityTier::High),
            ..Default::default()
        };
        let params = resolve_quality(&signals, QualityOverride::Tier(QualityTier::Low));
        assert_eq!(params.tier, QualityTier::Low);
    }

    #[test]
    fn test_auto_uses_texture_limit() {
        let small = CapabilitySignals {
            max_texture_dimension: 4096,
            ..Default::default()
        };
        let big = CapabilitySignals {
            max_texture_dimension: 16384,
            ..Default::default()
        };
        assert_eq!(resolve_quality(&small, QualityOverride::Auto).tier, QualityTier::Low);
        assert_eq!(resolve_quality(&big, QualityOverride::Auto).tier, QualityTier::High);
    }

    #[test]
    fn test_depth_dimension_respects_device_limit() {
        let signals = CapabilitySignals {
            max_texture_dimension: 300,
            ..Default::default()
        };
        let params = resolve_quality(&signals, QualityOverride::Tier(QualityTier::High));
        assert_eq!(params.depth_max_dimension, 300);
    }

    #[test]
    fn test_depth_target_size_keeps_aspect() {
        let params = QualityParams::for_tier(QualityTier::Medium);
        assert_eq!(params.depth_target_size(1920, 1080), (512, 288));
        assert_eq!(params.depth_target_size(320, 200), (320, 200));
    }

    #[test]
    fn test_pixel_ratio_cap() {
        let params = QualityParams::for_tier(QualityTier::Low);
        assert_eq!(params.effective_pixel_ratio(3.0), 1.0);
        assert_eq!(params.effective_pixel_ratio(f32::NAN), 1.0);
    }

    #[test]
    fn test_override_parse() {
        assert_eq!("auto".parse::<QualityOverride>().unwrap(), QualityOverride::Auto);
        assert_eq!(
            "HIGH".parse::<QualityOverride>().unwrap(),
            QualityOverride::Tier(QualityTier::High)
        );
        assert!("ultra".parse::<QualityOverride>().is_err());
    }
}
