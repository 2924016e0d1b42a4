//! Geometric pre-filter applied before the classifier.
//!
//! `EdgeGate` measures the share of strong Sobel edges in the scaled frame's
//! Rec. 601 luminance. A featureless frame (lens covered, blank wall) cannot
//! show a camera body, so it is skipped without an inference call.

use std::fmt;
use std::str::FromStr;

use crate::color::{ColorImage, PixelLayout};

/// L1 Sobel magnitude above which a pixel counts as an edge.
const EDGE_MAGNITUDE: f32 = 96.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum Prefilter {
    /// Every frame reaches the classifier.
    #[default]
    None,
    /// Frames whose edge density is below the minimum are skipped.
    EdgeGate { min_edge_density: f32 },
}

impl Prefilter {
    /// Returns true when the frame should be classified.
    pub fn admits(&self, image: &ColorImage) -> bool {
        match self {
            Prefilter::None => true,
            Prefilter::EdgeGate { min_edge_density } => edge_density(image) >= *min_edge_density,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Prefilter::None => "none",
            Prefilter::EdgeGate { .. } => "edge-gate",
        }
    }
}

impl fmt::Display for Prefilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Prefilter kind as named in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrefilterKind {
    None,
    EdgeGate,
}

impl PrefilterKind {
    pub fn with_min_edge_density(self, min_edge_density: f32) -> Prefilter {
        match self {
            PrefilterKind::None => Prefilter::None,
            PrefilterKind::EdgeGate => Prefilter::EdgeGate { min_edge_density },
        }
    }
}

impl FromStr for PrefilterKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(PrefilterKind::None),
            "edge-gate" | "edge_gate" => Ok(PrefilterKind::EdgeGate),
            other => Err(format!(
                "unknown prefilter '{}' (expected none or edge-gate)",
                other
            )),
        }
    }
}

/// Fraction of interior pixels whose Sobel magnitude exceeds the edge
/// threshold. Images narrower or shorter than 3 pixels have no interior and
/// report 0.
pub fn edge_density(image: &ColorImage) -> f32 {
    let width = image.width() as usize;
    let height = image.height() as usize;
    if width < 3 || height < 3 {
        return 0.0;
    }
    let luma = luminance(image);
    let at = |x: usize, y: usize| luma[y * width + x];

    let mut edges = 0usize;
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let gx = (at(x + 1, y - 1) + 2.0 * at(x + 1, y) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x - 1, y) + at(x - 1, y + 1));
            let gy = (at(x - 1, y + 1) + 2.0 * at(x, y + 1) + at(x + 1, y + 1))
                - (at(x - 1, y - 1) + 2.0 * at(x, y - 1) + at(x + 1, y - 1));
            if gx.abs() + gy.abs() > EDGE_MAGNITUDE {
                edges += 1;
            }
        }
    }
    edges as f32 / ((width - 2) * (height - 2)) as f32
}

fn luminance(image: &ColorImage) -> Vec<f32> {
    let channels = image.layout().channels();
    image
        .pixels()
        .chunks_exact(channels)
        .map(|px| match image.layout() {
            PixelLayout::Gray8 => px[0] as f32,
            PixelLayout::Rgb8 | PixelLayout::Rgba8 => {
                0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
            }
        })
        .collect()
}
