//! Display buffer sizing and media-to-viewport mapping.

use depthfx_core::QualityParams;

/// Buffer dimensions derived from a container size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Display buffer size in physical pixels.
    pub width: u32,
    pub height: u32,
    /// Downscaled size used by the CoC and blur passes.
    pub working_width: u32,
    pub working_height: u32,
    pub pixel_ratio: f32,
}

impl Viewport {
    /// Size the display buffer for a container of `css_width x css_height`
    /// logical pixels, bounded by the tier's pixel-ratio cap and the device
    /// texture limit.
    pub fn from_container(
        css_width: f32,
        css_height: f32,
        device_pixel_ratio: f32,
        quality: &QualityParams,
        max_texture_dimension: u32,
    ) -> Self {
        let pixel_ratio = quality.effective_pixel_ratio(device_pixel_ratio);
        let limit = max_texture_dimension.max(1);
        let physical = |css: f32| -> u32 {
            if !css.is_finite() || css <= 0.0 {
                return 1;
            }
            ((css * pixel_ratio).round() as u32).clamp(1, limit)
        };
        let width = physical(css_width);
        let height = physical(css_height);
        let divisor = quality.working_resolution_divisor.max(1);

        Self {
            width,
            height,
            working_width: (width / divisor).max(1),
            working_height: (height / divisor).max(1),
            pixel_ratio,
        }
    }

    /// A viewport with explicit physical dimensions.
    pub fn from_physical(width: u32, height: u32, quality: &QualityParams) -> Self {
        Self::from_container(width as f32, height as f32, 1.0, quality, u32::MAX)
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn working_size(&self) -> (u32, u32) {
        (self.working_width, self.working_height)
    }

    /// `[1/width, 1/height]` of the display buffer.
    pub fn texel_size(&self) -> [f32; 2] {
        [1.0 / self.width as f32, 1.0 / self.height as f32]
    }

    pub fn working_texel_size(&self) -> [f32; 2] {
        [1.0 / self.working_width as f32, 1.0 / self.working_height as f32]
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Affine UV mapping that makes media fill the viewport without letterboxing.
///
/// Shaders map a viewport UV to a media UV as `uv * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: [f32; 2],
    pub offset: [f32; 2],
}

impl Default for CoverFit {
    fn default() -> Self {
        Self {
            scale: [1.0, 1.0],
            offset: [0.0, 0.0],
        }
    }
}

impl CoverFit {
    /// Crop the longer media axis so its aspect matches the viewport. With
    /// `mirror`, the horizontal axis is flipped (selfie-style camera output).
    pub fn compute(media_width: u32, media_height: u32, viewport: &Viewport, mirror: bool) -> Self {
        if media_width == 0 || media_height == 0 {
            return Self::default();
        }
        let media_aspect = media_width as f32 / media_height as f32;
        let view_aspect = viewport.aspect();

        let mut fit = if media_aspect > view_aspect {
            // Media is wider: crop left and right.
            let sx = view_aspect / media_aspect;
            Self {
                scale: [sx, 1.0],
                offset: [(1.0 - sx) * 0.5, 0.0],
            }
        } else {
            let sy = media_aspect / view_aspect;
            Self {
                scale: [1.0, sy],
                offset: [0.0, (1.0 - sy) * 0.5],
            }
        };

        if mirror {
            fit.offset[0] += fit.scale[0];
            fit.scale[0] = -fit.scale[0];
        }
        fit
    }

    pub fn apply(&self, uv: [f32; 2]) -> [f32; 2] {
        [
            uv[0] * self.scale[0] + self.offset[0],
            uv[1] * self.scale[1] + self.offset[1],
        ]
    }

    /// Packed as `vec4(scale, offset)` for uniform buffers.
    pub fn to_vec4(&self) -> [f32; 4] {
        [self.scale[0], self.scale[1], self.offset[0], self.offset[1]]
    }
}
