//! Depth keyframe store.
//!
//! A [`DepthKeyframeSet`] holds the precomputed per-pixel depth maps of one
//! video, captured at a low fixed rate. Byte values are normalized depth:
//! `0` is nearest, `255` is farthest. The set is validated once when it is
//! built and treated as immutable for the rest of the session.
//!
//! The binary layout produced by the offline precompute step is a 4-byte
//! little-endian frame count followed by `frame_count` planes of
//! `width * height` bytes. Dimensions and rates travel in a separate JSON
//! metadata record ([`DepthMeta`]).

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DepthFxError, DepthFxResult};

/// Size of the frame-count header in the binary keyframe layout.
pub const HEADER_LEN: usize = 4;

/// Metadata describing a depth keyframe set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepthMeta {
    pub frame_count: u32,
    /// Keyframe capture rate.
    pub fps: f64,
    pub width: u32,
    pub height: u32,
    /// Frame rate of the source video the keyframes were captured from.
    pub source_fps: f64,
}

impl DepthMeta {
    pub fn load_from_file(path: &Path) -> DepthFxResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Bytes per keyframe plane.
    pub fn plane_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Where a playback time falls between two keyframes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyframePosition {
    /// Lower keyframe index, clamped to the valid range.
    pub lower: usize,
    /// Upper keyframe index, clamped to the valid range.
    pub upper: usize,
    /// Blend weight of `upper`, in `[0, 1)`.
    pub weight: f32,
}

impl KeyframePosition {
    /// The `(lower, upper)` pair used as the sampler cache key.
    pub fn pair(&self) -> (usize, usize) {
        (self.lower, self.upper)
    }
}

/// An immutable, validated sequence of depth keyframes.
#[derive(Debug, Clone)]
pub struct DepthKeyframeSet {
    meta: DepthMeta,
    frames: Arc<[Vec<u8>]>,
}

impl DepthKeyframeSet {
    /// Build a keyframe set, validating frame count and plane sizes.
    pub fn new(meta: DepthMeta, frames: Vec<Vec<u8>>) -> DepthFxResult<Self> {
        if frames.is_empty() {
            return Err(DepthFxError::keyframes("keyframe set is empty"));
        }
        if meta.width == 0 || meta.height == 0 {
            return Err(DepthFxError::keyframes(format!(
                "keyframe dimensions must be non-zero, got {}x{}",
                meta.width, meta.height
            )));
        }
        if !meta.fps.is_finite() || meta.fps <= 0.0 {
            return Err(DepthFxError::keyframes(format!(
                "keyframe fps must be positive, got {}",
                meta.fps
            )));
        }
        if frames.len() != meta.frame_count as usize {
            return Err(DepthFxError::keyframes(format!(
                "metadata declares {} frames but {} were supplied",
                meta.frame_count,
                frames.len()
            )));
        }

        let expected = meta.plane_len();
        if let Some((index, frame)) = frames
            .iter()
            .enumerate()
            .find(|(_, frame)| frame.len() != expected)
        {
            return Err(DepthFxError::keyframes(format!(
                "frame {index} has {} bytes, expected {expected} ({}x{})",
                frame.len(),
                meta.width,
                meta.height
            )));
        }

        Ok(Self {
            meta,
            frames: frames.into(),
        })
    }

    /// Parse the binary keyframe layout.
    pub fn from_bytes(meta: DepthMeta, bytes: &[u8]) -> DepthFxResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(DepthFxError::keyframes(format!(
                "keyframe data is {} bytes, too short for the frame-count header",
                bytes.len()
            )));
        }
        let (header, body) = bytes.split_at(HEADER_LEN);
        let frame_count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if frame_count != meta.frame_count {
            return Err(DepthFxError::keyframes(format!(
                "header declares {frame_count} frames, metadata declares {}",
                meta.frame_count
            )));
        }

        let plane = meta.plane_len();
        let expected = plane * frame_count as usize;
        if plane == 0 || body.len() != expected {
            return Err(DepthFxError::keyframes(format!(
                "keyframe body is {} bytes, expected {expected}",
                body.len()
            )));
        }

        let frames = body.chunks_exact(plane).map(<[u8]>::to_vec).collect();
        Self::new(meta, frames)
    }

    /// Load a keyframe set from a binary file and its JSON metadata file.
    pub fn load(data_path: &Path, meta_path: &Path) -> DepthFxResult<Self> {
        let meta = DepthMeta::load_from_file(meta_path)?;
        let bytes = std::fs::read(data_path)
            .map_err(|e| DepthFxError::asset(e.to_string(), data_path))?;
        let set = Self::from_bytes(meta, &bytes)?;
        tracing::info!(
            frames = set.frame_count(),
            width = set.meta.width,
            height = set.meta.height,
            fps = set.meta.fps,
            path = %data_path.display(),
            "Loaded depth keyframes"
        );
        Ok(set)
    }

    /// Serialize into the binary keyframe layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.meta.plane_len() * self.frames.len());
        out.extend_from_slice(&(self.frames.len() as u32).to_le_bytes());
        for frame in self.frames.iter() {
            out.extend_from_slice(frame);
        }
        out
    }

    pub fn meta(&self) -> &DepthMeta {
        &self.meta
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&[u8]> {
        self.frames.get(index).map(Vec::as_slice)
    }

    /// Playback span covered by the keyframes, in seconds.
    pub fn duration(&self) -> f64 {
        self.frames.len() as f64 / self.meta.fps
    }

    /// Resolve a playback time to the bracketing keyframe pair.
    ///
    /// The weight is the fractional keyframe position before clamping, so a
    /// time past the end still reports its fraction while both indices
    /// collapse onto the last keyframe.
    pub fn position_at(&self, time_seconds: f64) -> KeyframePosition {
        let last = self.frames.len() - 1;
        let p = if time_seconds.is_finite() {
            (time_seconds * self.meta.fps).max(0.0)
        } else {
            0.0
        };
        let base = p.floor();
        let weight = if p.is_finite() { (p - base) as f32 } else { 0.0 };
        // Clamp in floating point first; huge times would saturate the cast.
        let lower = base.min(last as f64) as usize;
        KeyframePosition {
            lower,
            upper: lower.saturating_add(1).min(last),
            weight,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(frame_count: u32, width: u32, height: u32) -> DepthMeta {
        DepthMeta {
            frame_count,
            fps: 5.0,
            width,
            height,
            source_fps: 30.0,
        }
    }

    #[test]
    fn test_empty_set_is_rejected() {
        let err = DepthKeyframeSet::new(meta(0, 2, 2), vec![]).unwrap_err();
        assert!(matches!(err, DepthFxError::InvalidKeyframes(_)));
    }

    #[test]
    fn test_plane_size_mismatch_is_rejected() {
        let frames = vec![vec![0u8; 4], vec![0u8; 3]];
        let err = DepthKeyframeSet::new(meta(2, 2, 2), frames).unwrap_err();
        assert!(err.to_string().contains("frame 1 has 3 bytes"));
    }

    #[test]
    fn test_frame_count_mismatch_is_rejected() {
        let frames = vec![vec![0u8; 4]];
        assert!(DepthKeyframeSet::new(meta(2, 2, 2), frames).is_err());
    }

    #[test]
    fn test_binary_layout_roundtrip() {
        let frames = vec![vec![1u8; 6], vec![200u8; 6], vec![7u8; 6]];
        let set = DepthKeyframeSet::new(meta(3, 3, 2), frames).unwrap();
        let bytes = set.to_bytes();
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + 18);

        let parsed = DepthKeyframeSet::from_bytes(set.meta().clone(), &bytes).unwrap();
        assert_eq!(parsed.frame(1), Some(&[200u8; 6][..]));
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let mut bytes = 2u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 7]);
        assert!(DepthKeyframeSet::from_bytes(meta(2, 2, 2), &bytes).is_err());
    }

    #[test]
    fn test_header_mismatch_is_rejected() {
        let mut bytes = 3u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 8]);
        let err = DepthKeyframeSet::from_bytes(meta(2, 2, 2), &bytes).unwrap_err();
        assert!(err.to_string().contains("header declares 3"));
    }

    #[test]
    fn test_position_interpolates_between_keyframes() {
        let set = DepthKeyframeSet::new(meta(4, 1, 1), vec![vec![0]; 4]).unwrap();
        let pos = set.position_at(0.3);
        assert_eq!(pos.pair(), (1, 2));
        assert!((pos.weight - 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_position_clamps_past_the_end() {
        let set = DepthKeyframeSet::new(meta(10, 1, 1), vec![vec![0]; 10]).unwrap();
        let pos = set.position_at(2.03);
        assert_eq!(pos.pair(), (9, 9));
        assert!((pos.weight - 0.15).abs() < 1e-3);
    }

    #[test]
    fn test_negative_time_clamps_to_first_keyframe() {
        let set = DepthKeyframeSet::new(meta(3, 1, 1), vec![vec![0]; 3]).unwrap();
        let pos = set.position_at(-4.0);
        assert_eq!(pos.pair(), (0, 1));
        assert_eq!(pos.weight, 0.0);
    }

    #[test]
    fn test_huge_time_stays_on_last_keyframe() {
        let set = DepthKeyframeSet::new(meta(3, 1, 1), vec![vec![0]; 3]).unwrap();
        for time in [1e300, f64::MAX, 1e18] {
            let pos = set.position_at(time);
            assert_eq!(pos.pair(), (2, 2), "t = {time}");
            assert!(pos.weight.is_finite());
        }
    }

    #[test]
    fn test_meta_json_is_camel_case() {
        let json = r#"{"frameCount":2,"fps":5,"width":64,"height":48,"sourceFps":29.97}"#;
        let meta: DepthMeta = serde_json::from_str(json).unwrap();
        assert_eq!(meta.frame_count, 2);
        assert_eq!(meta.plane_len(), 64 * 48);
    }
}
