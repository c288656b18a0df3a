//! Media sources feeding the video slot.

use std::path::Path;

use depthfx_core::{DepthFxError, DepthFxResult};

/// Where frames come from. Camera sources are mirrored on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    File,
    Camera,
}

/// A source of RGBA8 frames with a playback clock.
pub trait MediaSource: Send {
    fn kind(&self) -> MediaKind;

    /// Frame size in pixels.
    fn size(&self) -> (u32, u32);

    /// Tightly packed RGBA8 pixels of the current frame.
    fn frame(&self) -> &[u8];

    /// Playback position in seconds.
    fn current_time(&self) -> f64;

    /// Move the playback position. Live sources ignore it.
    fn seek(&mut self, _time_seconds: f64) {}

    /// Total length, or `None` for live sources.
    fn duration(&self) -> Option<f64> {
        None
    }
}

/// A single decoded image presented as a clocked media source.
///
/// Used for headless rendering: the host moves the clock with
/// [`MediaSource::seek`] before each frame.
#[derive(Debug, Clone)]
pub struct StillImageSource {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    kind: MediaKind,
    time: f64,
    duration: Option<f64>,
}

impl StillImageSource {
    /// Wrap raw RGBA8 pixels.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> DepthFxResult<Self> {
        if width == 0 || height == 0 {
            return Err(DepthFxError::InvalidArgument(format!(
                "media frame must be non-empty, got {width}x{height}"
            )));
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(DepthFxError::InvalidArgument(format!(
                "media frame has {} bytes, expected {expected} for {width}x{height} RGBA",
                pixels.len()
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
            kind: MediaKind::File,
            time: 0.0,
            duration: None,
        })
    }

    /// Decode an image file.
    pub fn open(path: &Path) -> DepthFxResult<Self> {
        let img = image::open(path).map_err(|e| {
            DepthFxError::asset(
                format!("failed to load image '{}': {}", path.display(), e),
                path,
            )
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(width, height, rgba.into_raw())
    }

    /// Decode an in-memory image.
    pub fn from_bytes(data: &[u8]) -> DepthFxResult<Self> {
        let img = image::load_from_memory(data)
            .map_err(|e| DepthFxError::asset(format!("failed to decode image: {}", e), "<memory>"))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba(width, height, rgba.into_raw())
    }

    pub fn with_kind(mut self, kind: MediaKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration.max(0.0));
        self
    }

    /// Replace the pixels, e.g. with the next decoded video frame.
    pub fn replace_frame(&mut self, pixels: Vec<u8>) -> DepthFxResult<()> {
        if pixels.len() != self.pixels.len() {
            return Err(DepthFxError::InvalidArgument(format!(
                "replacement frame has {} bytes, expected {}",
                pixels.len(),
                self.pixels.len()
            )));
        }
        self.pixels = pixels;
        Ok(())
    }
}

impl MediaSource for StillImageSource {
    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame(&self) -> &[u8] {
        &self.pixels
    }

    fn current_time(&self) -> f64 {
        self.time
    }

    fn seek(&mut self, time_seconds: f64) {
        self.time = if time_seconds.is_finite() {
            time_seconds.max(0.0)
        } else {
            0.0
        };
    }

    fn duration(&self) -> Option<f64> {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file() {
        let result = StillImageSource::open(Path::new("/nonexistent/frame.png"));
        assert!(matches!(result, Err(DepthFxError::Asset { .. })));
    }

    #[test]
    fn test_from_rgba_validates_length() {
        assert!(StillImageSource::from_rgba(2, 2, vec![0; 15]).is_err());
        assert!(StillImageSource::from_rgba(0, 2, vec![]).is_err());
        let source = StillImageSource::from_rgba(2, 2, vec![0; 16]).unwrap();
        assert_eq!(source.size(), (2, 2));
        assert_eq!(source.kind(), MediaKind::File);
    }

    #[test]
    fn test_clock_and_duration() {
        let mut source = StillImageSource::from_rgba(1, 1, vec![255; 4])
            .unwrap()
            .with_kind(MediaKind::Camera)
            .with_duration(3.5);
        source.seek(-1.0);
        assert_eq!(source.current_time(), 0.0);
        source.seek(1.25);
        assert_eq!(source.current_time(), 1.25);
        assert_eq!(source.duration(), Some(3.5));
        assert_eq!(source.kind(), MediaKind::Camera);
    }

    #[test]
    fn test_replace_frame_requires_same_size() {
        let mut source = StillImageSource::from_rgba(1, 1, vec![0; 4]).unwrap();
        assert!(source.replace_frame(vec![1; 8]).is_err());
        source.replace_frame(vec![9; 4]).unwrap();
        assert_eq!(source.frame(), &[9, 9, 9, 9]);
    }
}
