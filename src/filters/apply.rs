/// Filter execution: one representation in, one pixel buffer out.
///
/// Every effect is a pure function over an `RgbaImage`. Color filters are
/// identity-sized; geometry computes its output size from the
/// representation. Parameter problems clamp to a safe default and keep
/// going; only resource problems (degenerate output regions, allocation)
/// abort, and then the whole render is discarded upstream.
use cgmath::Rotation as _;
use cgmath::{Basis2, Deg, Rad, Rotation2, Vector2};
use image::imageops;

use crate::error::PipelineError;
use crate::filters::geometry::{inscribed_rect, GeometryData, Mirror, Rect, Rotation};
use crate::filters::representation::{FilterParams, FilterRepresentation};
use crate::Bitmap;

/// Apply a single filter step. The source buffer is never mutated.
pub fn apply_filter(rep: &FilterRepresentation, src: &Bitmap) -> Result<Bitmap, PipelineError> {
    if src.width() == 0 || src.height() == 0 {
        return Err(PipelineError::Allocation {
            width: src.width(),
            height: src.height(),
        });
    }
    match *rep.params() {
        FilterParams::None => Ok(src.clone()),
        FilterParams::Basic { .. } => {
            let value = rep.value();
            match rep.serialization_name() {
                "SHARPEN" => Ok(sharpen(src, value)),
                "EXPOSURE" => Ok(exposure(src, value)),
                "CONTRAST" => Ok(contrast(src, value)),
                "SATURATION" => Ok(saturation(src, value)),
                "VIGNETTE" => Ok(vignette(src, value)),
                other => {
                    // A representation we can describe but not execute is
                    // a configuration error: pass the image through.
                    log::warn!("no executor for filter '{}', passing through", other);
                    Ok(src.clone())
                }
            }
        }
        FilterParams::WhiteBalance { temperature, tint } => {
            Ok(white_balance(src, temperature.clamp(-100, 100), tint.clamp(-100, 100)))
        }
        FilterParams::Geometry(data) => apply_geometry(&data, src),
    }
}

/// 3x3 convolution sharpen. Kernel center `8v + 1`, ring `-v`, with
/// `v = value / 100`; value 0 is the identity kernel.
fn sharpen(src: &Bitmap, value: i32) -> Bitmap {
    let v = value as f32 / 100.0;
    if v == 0.0 {
        return src.clone();
    }
    let (w, h) = src.dimensions();
    let center = 8.0 * v + 1.0;
    let mut out = Bitmap::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = [0.0f32; 3];
            for dy in -1i64..=1 {
                for dx in -1i64..=1 {
                    let sx = (x as i64 + dx).clamp(0, w as i64 - 1) as u32;
                    let sy = (y as i64 + dy).clamp(0, h as i64 - 1) as u32;
                    let p = src.get_pixel(sx, sy).0;
                    let k = if dx == 0 && dy == 0 { center } else { -v };
                    acc[0] += k * p[0] as f32;
                    acc[1] += k * p[1] as f32;
                    acc[2] += k * p[2] as f32;
                }
            }
            let alpha = src.get_pixel(x, y).0[3];
            out.put_pixel(
                x,
                y,
                image::Rgba([clamp_u8(acc[0]), clamp_u8(acc[1]), clamp_u8(acc[2]), alpha]),
            );
        }
    }
    out
}

/// Exposure: +/-100 maps to +/-2 stops.
fn exposure(src: &Bitmap, value: i32) -> Bitmap {
    let stops = value as f32 / 100.0 * 2.0;
    let factor = 2.0f32.powf(stops);
    map_rgb(src, |c| c * factor)
}

/// Contrast around mid-gray, classic 259-formula scaling.
fn contrast(src: &Bitmap, value: i32) -> Bitmap {
    let c = value as f32 * 1.28;
    let factor = (259.0 * (c + 255.0)) / (255.0 * (259.0 - c));
    map_rgb(src, move |ch| factor * (ch - 128.0) + 128.0)
}

/// Saturation: lerp between the luma gray and the source color.
fn saturation(src: &Bitmap, value: i32) -> Bitmap {
    let s = 1.0 + value as f32 / 100.0;
    let (w, h) = src.dimensions();
    let mut out = Bitmap::new(w, h);
    for (x, y, pixel) in src.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        out.put_pixel(
            x,
            y,
            image::Rgba([
                clamp_u8(luma + (r as f32 - luma) * s),
                clamp_u8(luma + (g as f32 - luma) * s),
                clamp_u8(luma + (b as f32 - luma) * s),
                a,
            ]),
        );
    }
    out
}

/// Vignette: quadratic radial falloff, normalized to the half-diagonal.
fn vignette(src: &Bitmap, value: i32) -> Bitmap {
    let strength = (value.clamp(0, 100)) as f32 / 100.0;
    if strength == 0.0 {
        return src.clone();
    }
    let (w, h) = src.dimensions();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let half_diag = (cx * cx + cy * cy).sqrt().max(1.0);
    let mut out = Bitmap::new(w, h);
    for (x, y, pixel) in src.enumerate_pixels() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let d = (dx * dx + dy * dy).sqrt() / half_diag;
        let factor = 1.0 - strength * d * d;
        let [r, g, b, a] = pixel.0;
        out.put_pixel(
            x,
            y,
            image::Rgba([
                clamp_u8(r as f32 * factor),
                clamp_u8(g as f32 * factor),
                clamp_u8(b as f32 * factor),
                a,
            ]),
        );
    }
    out
}

/// White balance: temperature shifts red/blue against each other, tint
/// trades green against magenta.
fn white_balance(src: &Bitmap, temperature: i32, tint: i32) -> Bitmap {
    let t = temperature as f32 / 200.0;
    let g = tint as f32 / 200.0;
    let (rm, gm, bm) = (1.0 + t, 1.0 - g, 1.0 - t);
    let (w, h) = src.dimensions();
    let mut out = Bitmap::new(w, h);
    for (x, y, pixel) in src.enumerate_pixels() {
        let [r, gr, b, a] = pixel.0;
        out.put_pixel(
            x,
            y,
            image::Rgba([
                clamp_u8(r as f32 * rm),
                clamp_u8(gr as f32 * gm),
                clamp_u8(b as f32 * bm),
                a,
            ]),
        );
    }
    out
}

/// Geometry: crop, quarter-turn rotation, mirror, straighten, in that
/// order. The output size is exactly `data.output_size(src dims)`.
fn apply_geometry(data: &GeometryData, src: &Bitmap) -> Result<Bitmap, PipelineError> {
    let full = Rect::new(0, 0, src.width(), src.height());
    let mut working = match data.crop {
        Some(crop) => {
            let region = full.intersect(&crop).ok_or(PipelineError::InvalidCrop)?;
            imageops::crop_imm(src, region.x, region.y, region.width, region.height).to_image()
        }
        None => src.clone(),
    };

    working = match data.rotation {
        Rotation::Zero => working,
        Rotation::Ninety => imageops::rotate90(&working),
        Rotation::OneEighty => imageops::rotate180(&working),
        Rotation::TwoSeventy => imageops::rotate270(&working),
    };

    working = match data.mirror {
        Mirror::None => working,
        Mirror::Horizontal => imageops::flip_horizontal(&working),
        Mirror::Vertical => imageops::flip_vertical(&working),
        Mirror::Both => imageops::flip_vertical(&imageops::flip_horizontal(&working)),
    };

    if data.straighten != 0.0 {
        working = straighten(&working, data.straighten)?;
    }
    Ok(working)
}

/// Rotate by a fine angle and crop to the largest inscribed rect, so the
/// result carries no transparent wedges. Nearest-neighbor sampling.
fn straighten(src: &Bitmap, degrees: f32) -> Result<Bitmap, PipelineError> {
    let (w, h) = src.dimensions();
    let (ow, oh) = inscribed_rect(w, h, degrees);
    if ow == 0 || oh == 0 {
        return Err(PipelineError::InvalidCrop);
    }
    // Dest pixels map back into the source through the inverse rotation
    // about the image center.
    let inverse: Basis2<f32> = Rotation2::from_angle(Rad::from(Deg(-degrees)));
    let src_cx = (w as f32 - 1.0) / 2.0;
    let src_cy = (h as f32 - 1.0) / 2.0;
    let dst_cx = (ow as f32 - 1.0) / 2.0;
    let dst_cy = (oh as f32 - 1.0) / 2.0;

    let mut out = Bitmap::new(ow, oh);
    for y in 0..oh {
        for x in 0..ow {
            let centered = Vector2::new(x as f32 - dst_cx, y as f32 - dst_cy);
            let mapped = inverse.rotate_vector(centered);
            let sx = (mapped.x + src_cx).round().clamp(0.0, w as f32 - 1.0) as u32;
            let sy = (mapped.y + src_cy).round().clamp(0.0, h as f32 - 1.0) as u32;
            out.put_pixel(x, y, *src.get_pixel(sx, sy));
        }
    }
    Ok(out)
}

fn map_rgb(src: &Bitmap, f: impl Fn(f32) -> f32) -> Bitmap {
    let (w, h) = src.dimensions();
    let mut out = Bitmap::new(w, h);
    for (x, y, pixel) in src.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        out.put_pixel(
            x,
            y,
            image::Rgba([
                clamp_u8(f(r as f32)),
                clamp_u8(f(g as f32)),
                clamp_u8(f(b as f32)),
                a,
            ]),
        );
    }
    out
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
