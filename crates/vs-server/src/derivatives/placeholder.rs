//! Synthesized placeholder thumbnail.
//!
//! A vertical gradient with a centred disc and play triangle. Output depends
//! only on the dimensions, so re-rendering is byte-stable.

use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use vs_core::{Error, Result};

const TOP: [f32; 3] = [38.0, 44.0, 66.0];
const BOTTOM: [f32; 3] = [14.0, 16.0, 26.0];
const DISC: Rgb<u8> = Rgb([236, 72, 72]);
const GLYPH: Rgb<u8> = Rgb([250, 250, 250]);

/// Render a `width` x `height` placeholder image.
pub fn render_placeholder(width: u32, height: u32) -> RgbImage {
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let radius = width.min(height) as f32 * 0.22;
    // Triangle pointing right, inscribed in the disc.
    let half = radius * 0.5;
    let a = (cx - half * 0.8, cy - half);
    let b = (cx - half * 0.8, cy + half);
    let c = (cx + half, cy);

    RgbImage::from_fn(width, height, |x, y| {
        let px = x as f32 + 0.5;
        let py = y as f32 + 0.5;

        if in_triangle((px, py), a, b, c) {
            return GLYPH;
        }
        let (dx, dy) = (px - cx, py - cy);
        if dx * dx + dy * dy <= radius * radius {
            return DISC;
        }

        let t = if height > 1 { y as f32 / (height - 1) as f32 } else { 0.0 };
        let mix = |i: usize| (TOP[i] + (BOTTOM[i] - TOP[i]) * t).round() as u8;
        Rgb([mix(0), mix(1), mix(2)])
    })
}

/// Render and write a PNG placeholder to `path`.
pub(crate) fn write_placeholder(path: &Path, width: u32, height: u32) -> Result<()> {
    render_placeholder(width.max(1), height.max(1))
        .save_with_format(path, ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(io) => Error::Io { source: io },
            other => Error::Internal(format!("failed to encode placeholder: {other}")),
        })
}

fn in_triangle(p: (f32, f32), a: (f32, f32), b: (f32, f32), c: (f32, f32)) -> bool {
    let sign = |p1: (f32, f32), p2: (f32, f32), p3: (f32, f32)| {
        (p1.0 - p3.0) * (p2.1 - p3.1) - (p2.0 - p3.0) * (p1.1 - p3.1)
    };
    let d1 = sign(p, a, b);
    let d2 = sign(p, b, c);
    let d3 = sign(p, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}
