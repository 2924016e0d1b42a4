//! 4:2:0 chroma-subsampled frame decoding.
//!
//! Converts luma + two chroma planes into packed RGBA with
//!
//! ```text
//! R = Y + 1.370705 * V
//! G = Y - 0.698001 * V - 0.337633 * U
//! B = Y + 1.732446 * U
//! ```
//!
//! where `U` and `V` are centred on 128. Each channel is truncated toward
//! zero and clamped to `[0, 255]`; alpha is always 255.

use crate::color::ColorImage;
use crate::error::{GuardError, Result};
use crate::frame::{ChromaLayout, Plane, RawFrame};

const R_FROM_V: f32 = 1.370705;
const G_FROM_V: f32 = 0.698001;
const G_FROM_U: f32 = 0.337633;
const B_FROM_U: f32 = 1.732446;

/// Per-chroma-sample contributions, shared by the 2x2 luma block it covers.
#[derive(Clone, Copy, Debug)]
struct ChromaTerms {
    r: i32,
    g: i32,
    b: i32,
}

impl ChromaTerms {
    fn new(u: u8, v: u8) -> Self {
        let u = u as f32 - 128.0;
        let v = v as f32 - 128.0;
        // Y is an integer, so trunc(Y + t) == Y + floor(t) whenever the sum
        // is non-negative; negative sums clamp to 0 either way.
        Self {
            r: (R_FROM_V * v).floor() as i32,
            g: (-G_FROM_V * v - G_FROM_U * u).floor() as i32,
            b: (B_FROM_U * u).floor() as i32,
        }
    }
}

/// Decode a validated 4:2:0 frame into an RGBA `ColorImage`.
///
/// Works for planar and semi-planar chroma alike: only the stride pair of the
/// chroma planes is consulted. Deterministic; allocates the output and one
/// row of chroma terms, nothing per pixel.
pub fn decode_yuv420(frame: &RawFrame<'_>) -> ColorImage {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let luma = frame.luma();
    let chroma_u = frame.chroma_u();
    let chroma_v = frame.chroma_v();

    let mut rgba = vec![0u8; width * height * 4];
    let mut terms_row: Vec<ChromaTerms> = Vec::with_capacity(frame.chroma_width());

    for (y, out_row) in rgba.chunks_exact_mut(width * 4).enumerate() {
        if y % 2 == 0 {
            let cy = y / 2;
            terms_row.clear();
            terms_row.extend(
                (0..frame.chroma_width())
                    .map(|cx| ChromaTerms::new(chroma_u.sample(cx, cy), chroma_v.sample(cx, cy))),
            );
        }

        for (x, px) in out_row.chunks_exact_mut(4).enumerate() {
            let terms = terms_row[x / 2];
            let l = luma.sample(x, y) as i32;
            px[0] = clamp_channel(l + terms.r);
            px[1] = clamp_channel(l + terms.g);
            px[2] = clamp_channel(l + terms.b);
            px[3] = 255;
        }
    }

    ColorImage::from_rgba_parts(frame.width(), frame.height(), rgba)
}

/// Split a contiguous I420 or NV12 buffer into a `RawFrame`.
///
/// `luma_stride` is the byte length of one luma row (>= width). Chroma rows
/// are assumed to be half that (planar) or equal to it (semi-planar), which
/// is how V4L2 drivers lay out `YU12` and `NV12`.
pub fn frame_from_packed(
    data: &[u8],
    width: u32,
    height: u32,
    luma_stride: usize,
    layout: ChromaLayout,
) -> Result<RawFrame<'_>> {
    let h = height as usize;
    let ch = h.div_ceil(2);
    let luma_len = luma_stride
        .checked_mul(h)
        .ok_or_else(|| GuardError::Decode("frame dimensions overflow".to_string()))?;
    if data.len() < luma_len {
        return Err(GuardError::Decode(format!(
            "packed frame holds {} bytes, luma alone needs {}",
            data.len(),
            luma_len
        )));
    }
    let luma = Plane::new(&data[..luma_len], luma_stride, 1);

    match layout {
        ChromaLayout::Planar => {
            let chroma_stride = luma_stride.div_ceil(2);
            let u_end = (luma_len + chroma_stride * ch).min(data.len());
            let u = Plane::new(&data[luma_len..u_end], chroma_stride, 1);
            let v = Plane::new(&data[u_end..], chroma_stride, 1);
            RawFrame::new(width, height, luma, u, v)
        }
        ChromaLayout::SemiPlanar => {
            let uv = &data[luma_len..];
            let v = uv.get(1..).unwrap_or(&[]);
            RawFrame::new(
                width,
                height,
                luma,
                Plane::new(uv, luma_stride, 2),
                Plane::new(v, luma_stride, 2),
            )
        }
    }
}

fn clamp_channel(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
