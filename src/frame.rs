//! Sensor frame model.
//!
//! - `Plane`: borrowed view over one channel's bytes with its own stride pair.
//! - `RawFrame`: luma + two chroma planes of a 4:2:0 frame. Borrows the camera
//!   buffer, so it cannot outlive the frame callback that produced it.
//! - `Yuv420Buffer`: owned 4:2:0 storage (synthetic camera, fixtures).
//! - `Batch`: bounded, ordered set of decoded images awaiting inspection.

use zeroize::Zeroize;

use crate::color::ColorImage;
use crate::error::{GuardError, Result};

/// Default number of frames collected per detection cycle.
pub const DEFAULT_MAX_CAPTURES: usize = 10;

/// Upper bound accepted by configuration for `max_captures`.
pub const MAX_CAPTURES_LIMIT: usize = 64;

// ----------------------------------------------------------------------------
// Plane: one channel with row/pixel stride
// ----------------------------------------------------------------------------

#[derive(Clone, Copy)]
pub struct Plane<'a> {
    data: &'a [u8],
    row_stride: usize,
    pixel_stride: usize,
}

impl<'a> Plane<'a> {
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Sample at `(x, y)` in this plane's own coordinates.
    ///
    /// Bounds were checked when the owning `RawFrame` was built.
    #[inline]
    pub(crate) fn sample(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.row_stride + x * self.pixel_stride]
    }

    /// Verify that every sample of a `width` x `height` grid is addressable.
    fn check_covers(&self, name: &str, width: usize, height: usize) -> Result<()> {
        if self.pixel_stride == 0 {
            return Err(GuardError::Decode(format!("{} plane has zero pixel stride", name)));
        }
        let min_row = width
            .checked_mul(self.pixel_stride)
            .ok_or_else(|| GuardError::Decode(format!("{} plane stride overflow", name)))?;
        if self.row_stride < min_row {
            return Err(GuardError::Decode(format!(
                "{} row stride {} is smaller than width {} x pixel stride {}",
                name, self.row_stride, width, self.pixel_stride
            )));
        }
        let last = (height - 1)
            .checked_mul(self.row_stride)
            .and_then(|v| v.checked_add((width - 1) * self.pixel_stride))
            .ok_or_else(|| GuardError::Decode(format!("{} plane index overflow", name)))?;
        if last >= self.data.len() {
            return Err(GuardError::Decode(format!(
                "{} plane holds {} bytes, needs at least {}",
                name,
                self.data.len(),
                last + 1
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Plane<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// RawFrame: validated 4:2:0 frame
// ----------------------------------------------------------------------------

/// A 4:2:0 frame as delivered by the camera.
///
/// One chroma sample pair covers a 2x2 luma block. The two chroma planes
/// share a stride pair; whether they are fully planar (I420) or interleaved
/// (NV12/NV21) is expressed only through those strides.
///
/// Not `Clone`: the frame is released as soon as the callback returns.
#[derive(Debug)]
pub struct RawFrame<'a> {
    width: u32,
    height: u32,
    luma: Plane<'a>,
    chroma_u: Plane<'a>,
    chroma_v: Plane<'a>,
}

impl<'a> RawFrame<'a> {
    /// Validate plane geometry. Malformed strides or short planes yield
    /// `GuardError::Decode`; the frame is then dropped by the caller.
    pub fn new(
        width: u32,
        height: u32,
        luma: Plane<'a>,
        chroma_u: Plane<'a>,
        chroma_v: Plane<'a>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(GuardError::Decode(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        if chroma_u.row_stride != chroma_v.row_stride
            || chroma_u.pixel_stride != chroma_v.pixel_stride
        {
            return Err(GuardError::Decode(format!(
                "chroma planes disagree on strides: U={}/{} V={}/{}",
                chroma_u.row_stride,
                chroma_u.pixel_stride,
                chroma_v.row_stride,
                chroma_v.pixel_stride
            )));
        }

        let frame = Self {
            width,
            height,
            luma,
            chroma_u,
            chroma_v,
        };
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (frame.chroma_width(), frame.chroma_height());
        frame.luma.check_covers("luma", w, h)?;
        frame.chroma_u.check_covers("chroma U", cw, ch)?;
        frame.chroma_v.check_covers("chroma V", cw, ch)?;
        Ok(frame)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn luma(&self) -> &Plane<'a> {
        &self.luma
    }

    pub fn chroma_u(&self) -> &Plane<'a> {
        &self.chroma_u
    }

    pub fn chroma_v(&self) -> &Plane<'a> {
        &self.chroma_v
    }

    /// Chroma samples per row. Odd widths round up.
    pub fn chroma_width(&self) -> usize {
        (self.width as usize).div_ceil(2)
    }

    /// Chroma rows. Odd heights round up.
    pub fn chroma_height(&self) -> usize {
        (self.height as usize).div_ceil(2)
    }
}

// ----------------------------------------------------------------------------
// Yuv420Buffer: owned 4:2:0 storage
// ----------------------------------------------------------------------------

/// Memory arrangement of the chroma planes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChromaLayout {
    /// Separate U and V planes (I420 / YU12).
    Planar,
    /// One interleaved UV plane (NV12).
    SemiPlanar,
}

#[derive(Clone, Copy, Debug)]
struct PlaneSpan {
    offset: usize,
    end: usize,
    row_stride: usize,
    pixel_stride: usize,
}

/// Owned 4:2:0 frame storage with optional row padding.
pub struct Yuv420Buffer {
    width: u32,
    height: u32,
    layout: ChromaLayout,
    data: Vec<u8>,
    luma: PlaneSpan,
    chroma_u: PlaneSpan,
    chroma_v: PlaneSpan,
}

impl Yuv420Buffer {
    /// Allocate a frame filled with constant samples.
    ///
    /// `row_padding` extra bytes are appended to every row of every plane,
    /// which is how sensors commonly align rows.
    pub fn filled(
        width: u32,
        height: u32,
        layout: ChromaLayout,
        row_padding: usize,
        y: u8,
        u: u8,
        v: u8,
    ) -> Self {
        let (w, h) = (width as usize, height as usize);
        let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
        let luma_stride = w + row_padding;
        let luma_len = luma_stride * h;

        let (chroma_u, chroma_v, total) = match layout {
            ChromaLayout::Planar => {
                let stride = cw + row_padding;
                let u_off = luma_len;
                let v_off = u_off + stride * ch;
                let end = v_off + stride * ch;
                (
                    PlaneSpan {
                        offset: u_off,
                        end: v_off,
                        row_stride: stride,
                        pixel_stride: 1,
                    },
                    PlaneSpan {
                        offset: v_off,
                        end,
                        row_stride: stride,
                        pixel_stride: 1,
                    },
                    end,
                )
            }
            ChromaLayout::SemiPlanar => {
                let stride = cw * 2 + row_padding;
                let uv_off = luma_len;
                let end = uv_off + stride * ch;
                (
                    PlaneSpan {
                        offset: uv_off,
                        end,
                        row_stride: stride,
                        pixel_stride: 2,
                    },
                    PlaneSpan {
                        offset: uv_off + 1,
                        end,
                        row_stride: stride,
                        pixel_stride: 2,
                    },
                    end,
                )
            }
        };

        let mut buffer = Self {
            width,
            height,
            layout,
            data: vec![0u8; total],
            luma: PlaneSpan {
                offset: 0,
                end: luma_len,
                row_stride: luma_stride,
                pixel_stride: 1,
            },
            chroma_u,
            chroma_v,
        };
        for row in 0..h {
            for col in 0..w {
                buffer.set_luma(col as u32, row as u32, y);
            }
        }
        for row in 0..ch {
            for col in 0..cw {
                buffer.set_chroma(col as u32, row as u32, u, v);
            }
        }
        buffer
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChromaLayout {
        self.layout
    }

    pub fn set_luma(&mut self, x: u32, y: u32, value: u8) {
        let idx = self.luma.offset
            + y as usize * self.luma.row_stride
            + x as usize * self.luma.pixel_stride;
        self.data[idx] = value;
    }

    /// Set the chroma pair covering luma block `(2cx..2cx+1, 2cy..2cy+1)`.
    pub fn set_chroma(&mut self, cx: u32, cy: u32, u: u8, v: u8) {
        let rel = cy as usize * self.chroma_u.row_stride + cx as usize * self.chroma_u.pixel_stride;
        self.data[self.chroma_u.offset + rel] = u;
        self.data[self.chroma_v.offset + rel] = v;
    }

    /// Borrow as a validated frame.
    pub fn frame(&self) -> Result<RawFrame<'_>> {
        RawFrame::new(
            self.width,
            self.height,
            self.plane(self.luma),
            self.plane(self.chroma_u),
            self.plane(self.chroma_v),
        )
    }

    fn plane(&self, span: PlaneSpan) -> Plane<'_> {
        Plane::new(
            &self.data[span.offset..span.end],
            span.row_stride,
            span.pixel_stride,
        )
    }
}

impl Drop for Yuv420Buffer {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

// ----------------------------------------------------------------------------
// Batch: bounded accumulation for one detection cycle
// ----------------------------------------------------------------------------

/// Ordered, capacity-bounded set of decoded frames.
///
/// `len() <= capacity()` always holds: a push into a full batch is refused
/// and the image handed back.
#[derive(Debug)]
pub struct Batch {
    images: Vec<ColorImage>,
    capacity: usize,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            images: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append in delivery order. Returns the new length.
    pub fn push(&mut self, image: ColorImage) -> std::result::Result<usize, ColorImage> {
        if self.is_full() {
            return Err(image);
        }
        self.images.push(image);
        Ok(self.images.len())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.images.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ColorImage> {
        self.images.iter()
    }

    /// Move the contents out, leaving an empty batch of the same capacity.
    pub fn take(&mut self) -> Batch {
        std::mem::replace(self, Batch::with_capacity(self.capacity))
    }

    /// Drop every image (each zeroizes its pixels).
    pub fn clear(&mut self) {
        self.images.clear();
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a ColorImage;
    type IntoIter = std::slice::Iter<'a, ColorImage>;

    fn into_iter(self) -> Self::IntoIter {
        self.images.iter()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_CAPTURES)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
