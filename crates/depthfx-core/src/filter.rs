//! CPU depth-map filters used by the temporal sampler.

use rayon::prelude::*;

/// Parameters for the edge-preserving bilateral filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BilateralParams {
    /// Kernel radius in pixels. `0` disables the filter.
    pub radius: u32,
    pub sigma_space: f32,
    /// Range sigma in 8-bit depth units.
    pub sigma_range: f32,
}

/// Blend two equally sized depth planes: `a * (1 - weight) + b * weight`.
pub fn blend_planes(a: &[u8], b: &[u8], weight: f32, out: &mut [u8]) {
    debug_assert_eq!(a.len(), b.len());
    debug_assert_eq!(a.len(), out.len());

    if weight <= 0.0 {
        out.copy_from_slice(a);
        return;
    }
    if weight >= 1.0 {
        out.copy_from_slice(b);
        return;
    }

    let inv = 1.0 - weight;
    out.par_iter_mut()
        .zip(a.par_iter().zip(b.par_iter()))
        .for_each(|(dst, (&x, &y))| {
            *dst = (x as f32 * inv + y as f32 * weight).round().clamp(0.0, 255.0) as u8;
        });
}

/// Edge-preserving smoothing of a single-channel depth plane.
///
/// Weights combine a spatial gaussian over the kernel offset with a range
/// gaussian over the depth difference to the centre pixel, so smoothing
/// stops at depth discontinuities. Cost grows with the square of `radius`.
pub fn bilateral_filter(src: &[u8], width: u32, height: u32, params: BilateralParams) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    debug_assert_eq!(src.len(), w * h);

    if params.radius == 0 || w == 0 || h == 0 {
        return src.to_vec();
    }

    let r = params.radius as i32;
    let side = (2 * r + 1) as usize;

    let space_denom = 2.0 * params.sigma_space * params.sigma_space;
    let mut spatial = Vec::with_capacity(side * side);
    for dy in -r..=r {
        for dx in -r..=r {
            let d2 = (dx * dx + dy * dy) as f32;
            spatial.push((-d2 / space_denom).exp());
        }
    }

    let range_denom = 2.0 * params.sigma_range * params.sigma_range;
    let range: Vec<f32> = (0..256)
        .map(|d| {
            let d = d as f32;
            (-(d * d) / range_denom).exp()
        })
        .collect();

    let mut out = vec![0u8; w * h];
    out.par_chunks_mut(w).enumerate().for_each(|(y, row)| {
        for (x, dst) in row.iter_mut().enumerate() {
            let centre = src[y * w + x];
            let mut acc = 0.0f32;
            let mut norm = 0.0f32;
            let mut k = 0usize;
            for dy in -r..=r {
                let sy = (y as i32 + dy).clamp(0, h as i32 - 1) as usize;
                let src_row = &src[sy * w..(sy + 1) * w];
                for dx in -r..=r {
                    let sx = (x as i32 + dx).clamp(0, w as i32 - 1) as usize;
                    let v = src_row[sx];
                    let weight = spatial[k] * range[centre.abs_diff(v) as usize];
                    acc += weight * v as f32;
                    norm += weight;
                    k += 1;
                }
            }
            *dst = (acc / norm).round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// Bilinear resize of a single-channel plane using pixel-centre alignment.
pub fn resize_bilinear(
    src: &[u8],
    src_width: u32,
    src_height: u32,
    dst_width: u32,
    dst_height: u32,
) -> Vec<u8> {
    let (sw, sh) = (src_width as usize, src_height as usize);
    let (dw, dh) = (dst_width as usize, dst_height as usize);
    debug_assert_eq!(src.len(), sw * sh);

    if dw == 0 || dh == 0 {
        return Vec::new();
    }
    if sw == dw && sh == dh {
        return src.to_vec();
    }

    let scale_x = sw as f32 / dw as f32;
    let scale_y = sh as f32 / dh as f32;

    // Horizontal taps are identical for every row.
    let taps: Vec<(usize, usize, f32)> = (0..dw)
        .map(|x| {
            let fx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (sw - 1) as f32);
            let x0 = fx.floor() as usize;
            (x0, (x0 + 1).min(sw - 1), fx - x0 as f32)
        })
        .collect();

    let mut out = vec![0u8; dw * dh];
    out.par_chunks_mut(dw).enumerate().for_each(|(y, row)| {
        let fy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (sh - 1) as f32);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let ty = fy - y0 as f32;
        let top = &src[y0 * sw..(y0 + 1) * sw];
        let bottom = &src[y1 * sw..(y1 + 1) * sw];

        for (dst, &(x0, x1, tx)) in row.iter_mut().zip(taps.iter()) {
            let t = top[x0] as f32 + (top[x1] as f32 - top[x0] as f32) * tx;
            let b = bottom[x0] as f32 + (bottom[x1] as f32 - bottom[x0] as f32) * tx;
            *dst = (t + (b - t) * ty).round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}
