//! Dense color images produced by the decoder and consumed by inspection.
//!
//! `ColorImage` owns its pixels exclusively. It is moved (never shared) from
//! the decoder into the batch and from the batch into inspection, and its
//! buffer is zeroized when dropped.

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageBuffer, Luma, Pixel, Rgb, Rgba};
use zeroize::Zeroize;

use crate::error::{GuardError, Result};

/// Channel layout of a `ColorImage` buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelLayout {
    /// Packed 8-bit R, G, B, A. Decoder output.
    Rgba8,
    /// Packed 8-bit R, G, B.
    Rgb8,
    /// Single 8-bit luminance channel.
    Gray8,
}

impl PixelLayout {
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgba8 => 4,
            PixelLayout::Rgb8 => 3,
            PixelLayout::Gray8 => 1,
        }
    }
}

/// Row-major pixel buffer without row padding.
pub struct ColorImage {
    width: u32,
    height: u32,
    layout: PixelLayout,
    pixels: Vec<u8>,
}

// No Clone: images move between stages, they are not duplicated.

impl ColorImage {
    pub fn new(width: u32, height: u32, layout: PixelLayout, pixels: Vec<u8>) -> Result<Self> {
        let expected = expected_len(width, height, layout)?;
        if pixels.len() != expected {
            return Err(GuardError::Format(format!(
                "{:?} buffer for {}x{} must be {} bytes, got {}",
                layout,
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            layout,
            pixels,
        })
    }

    /// Caller guarantees `pixels.len() == width * height * 4`.
    pub(crate) fn from_rgba_parts(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(pixels.len(), width as usize * height as usize * 4);
        Self {
            width,
            height,
            layout: PixelLayout::Rgba8,
            pixels,
        }
    }

    /// Convert a decoded still image (e.g. a file on disk) into RGBA.
    pub fn from_dynamic(img: DynamicImage) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::from_rgba_parts(width, height, rgba.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Channel bytes of the pixel at `(x, y)`. Panics when out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let channels = self.layout.channels();
        let offset = (y as usize * self.width as usize + x as usize) * channels;
        &self.pixels[offset..offset + channels]
    }

    /// Bilinear resample to `width` x `height`, keeping the pixel layout.
    pub fn scale_to(&self, width: u32, height: u32) -> Result<ColorImage> {
        if width == 0 || height == 0 {
            return Err(GuardError::Format(format!(
                "cannot scale to empty target {}x{}",
                width, height
            )));
        }
        let pixels = match self.layout {
            PixelLayout::Rgba8 => self.resize_as::<Rgba<u8>>(width, height)?,
            PixelLayout::Rgb8 => self.resize_as::<Rgb<u8>>(width, height)?,
            PixelLayout::Gray8 => self.resize_as::<Luma<u8>>(width, height)?,
        };
        ColorImage::new(width, height, self.layout, pixels)
    }

    fn resize_as<P>(&self, width: u32, height: u32) -> Result<Vec<u8>>
    where
        P: Pixel<Subpixel = u8> + 'static,
    {
        let view = ImageBuffer::<P, &[u8]>::from_raw(self.width, self.height, &self.pixels[..])
            .ok_or_else(|| {
                GuardError::Format(format!(
                    "buffer does not hold a {}x{} image",
                    self.width, self.height
                ))
            })?;
        Ok(imageops::resize(&view, width, height, FilterType::Triangle).into_raw())
    }

    /// Emit `R/255, G/255, B/255` per pixel in row-major order.
    ///
    /// This is the channel order and scale the classifier was trained on;
    /// alpha is dropped. Images without color channels are rejected.
    pub fn to_normalized_tensor(&self) -> Result<Vec<f32>> {
        let channels = self.color_channels()?;
        let mut tensor = Vec::with_capacity(self.pixel_count() * 3);
        for px in self.pixels.chunks_exact(channels) {
            tensor.push(px[0] as f32 / 255.0);
            tensor.push(px[1] as f32 / 255.0);
            tensor.push(px[2] as f32 / 255.0);
        }
        Ok(tensor)
    }

    /// Packed RGB bytes, for encoders that do not take alpha.
    pub fn to_rgb_bytes(&self) -> Result<Vec<u8>> {
        let channels = self.color_channels()?;
        if channels == 3 {
            return Ok(self.pixels.clone());
        }
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for px in self.pixels.chunks_exact(channels) {
            rgb.extend_from_slice(&px[..3]);
        }
        Ok(rgb)
    }

    fn color_channels(&self) -> Result<usize> {
        let channels = self.layout.channels();
        if channels < 3 {
            return Err(GuardError::Format(format!(
                "{:?} image has {} channel(s), expected R, G and B",
                self.layout, channels
            )));
        }
        if self.pixels.len() != self.pixel_count() * channels {
            return Err(GuardError::Format(format!(
                "buffer length {} does not match {}x{} {:?}",
                self.pixels.len(),
                self.width,
                self.height,
                self.layout
            )));
        }
        Ok(channels)
    }

    fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl std::fmt::Debug for ColorImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColorImage")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Drop for ColorImage {
    fn drop(&mut self) {
        self.pixels.zeroize();
    }
}

fn expected_len(width: u32, height: u32, layout: PixelLayout) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(layout.channels()))
        .ok_or_else(|| GuardError::Format("image dimensions overflow".to_string()))
}
