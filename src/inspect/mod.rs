//! Batch inspection.
//!
//! Each image of a batch, in insertion order, is scaled to the classifier
//! input size, optionally pre-filtered, normalized and classified. The first
//! frame whose camera probability is strictly above the threshold decides the
//! batch and stops evaluation.

mod prefilter;

pub use prefilter::{edge_density, Prefilter, PrefilterKind};

use crate::color::ColorImage;
use crate::detect::ClassifierBackend;
use crate::error::{GuardError, Result};
use crate::frame::Batch;

pub const DEFAULT_THRESHOLD: f32 = 0.8;
pub const DEFAULT_INPUT_SIZE: u32 = 128;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InspectionConfig {
    /// Detection requires `camera_prob > threshold`.
    pub threshold: f32,
    /// Side length frames are scaled to before normalization.
    pub input_size: u32,
    pub prefilter: Prefilter,
}

impl Default for InspectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
            prefilter: Prefilter::None,
        }
    }
}

/// Outcome of inspecting one batch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Verdict {
    pub detected: bool,
    /// Index of the deciding frame.
    pub frame_index: Option<usize>,
    /// Highest camera probability seen, if anything was classified.
    pub best_camera_prob: Option<f32>,
    /// Classifier calls made.
    pub invocations: usize,
    /// Frames skipped by the pre-filter or by per-frame errors.
    pub skipped: usize,
}

#[derive(Clone, Debug, Default)]
pub struct Inspector {
    config: InspectionConfig,
}

impl Inspector {
    pub fn new(config: InspectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    /// Fail with `Configuration` when `classifier` expects a different input
    /// side length than frames are scaled to.
    pub fn check_backend(&self, classifier: &dyn ClassifierBackend) -> Result<()> {
        if classifier.input_size() != self.config.input_size {
            return Err(GuardError::Configuration(format!(
                "classifier '{}' expects {}x{} input, inspection scales to {}x{}",
                classifier.name(),
                classifier.input_size(),
                classifier.input_size(),
                self.config.input_size,
                self.config.input_size
            )));
        }
        Ok(())
    }

    /// Inspect `batch` with `classifier`.
    ///
    /// An empty batch is not a detection and makes no classifier call.
    /// Per-frame format errors skip the frame; classifier errors abort the
    /// inspection.
    pub fn inspect(
        &self,
        batch: &Batch,
        classifier: &mut dyn ClassifierBackend,
    ) -> Result<Verdict> {
        let mut verdict = Verdict::default();

        for (index, image) in batch.iter().enumerate() {
            let tensor = match self.prepare(image) {
                Ok(Some(tensor)) => tensor,
                Ok(None) => {
                    log::debug!("frame {} rejected by {} prefilter", index, self.config.prefilter);
                    verdict.skipped += 1;
                    continue;
                }
                Err(err) if err.is_per_frame() => {
                    log::warn!("skipping frame {}: {}", index, err);
                    verdict.skipped += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };

            let result = classifier.classify(&tensor)?;
            verdict.invocations += 1;
            verdict.best_camera_prob = Some(
                verdict
                    .best_camera_prob
                    .map_or(result.camera_prob, |best| best.max(result.camera_prob)),
            );
            log::debug!(
                "frame {}: no_camera={:.3} camera={:.3}",
                index,
                result.no_camera_prob,
                result.camera_prob
            );

            if result.exceeds(self.config.threshold) {
                verdict.detected = true;
                verdict.frame_index = Some(index);
                break;
            }
        }

        log::info!(
            "inspected {} frame(s): detected={} invocations={} skipped={}",
            batch.len(),
            verdict.detected,
            verdict.invocations,
            verdict.skipped
        );
        Ok(verdict)
    }

    fn prepare(&self, image: &ColorImage) -> Result<Option<Vec<f32>>> {
        let size = self.config.input_size;
        let scaled = image.scale_to(size, size)?;
        if !self.config.prefilter.admits(&scaled) {
            return Ok(None);
        }
        scaled.to_normalized_tensor().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::PixelLayout;
    use crate::detect::StubClassifier;
    use crate::error::GuardError;
    use crate::frame::{ChromaLayout, Yuv420Buffer};
    use crate::ingest::decode_yuv420;
    use std::sync::atomic::Ordering;

    fn decoded(luma: u8) -> Result<ColorImage> {
        let buffer = Yuv420Buffer::filled(4, 4, ChromaLayout::Planar, 0, luma, 128, 128);
        Ok(decode_yuv420(&buffer.frame()?))
    }

    fn batch_of(count: usize) -> Result<Batch> {
        let mut batch = Batch::with_capacity(count);
        for _ in 0..count {
            let _ = batch.push(decoded(235)?);
        }
        Ok(batch)
    }

    #[test]
    fn first_confident_frame_decides_after_one_call() -> Result<()> {
        let batch = batch_of(1)?;
        let mut classifier = StubClassifier::constant(0.9);
        let calls = classifier.calls();

        let verdict = Inspector::default().inspect(&batch, &mut classifier)?;
        assert!(verdict.detected);
        assert_eq!(verdict.frame_index, Some(0));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[test]
    fn low_probability_batch_evaluates_every_frame() -> Result<()> {
        let batch = batch_of(10)?;
        let mut classifier = StubClassifier::constant(0.1);
        let calls = classifier.calls();

        let verdict = Inspector::default().inspect(&batch, &mut classifier)?;
        assert!(!verdict.detected);
        assert_eq!(verdict.frame_index, None);
        assert_eq!(verdict.invocations, 10);
        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(verdict.best_camera_prob, Some(0.1));
        Ok(())
    }

    #[test]
    fn evaluation_stops_at_first_match() -> Result<()> {
        let batch = batch_of(10)?;
        let mut classifier = StubClassifier::new(vec![0.1, 0.5, 0.95, 0.99]);
        let calls = classifier.calls();

        let verdict = Inspector::default().inspect(&batch, &mut classifier)?;
        assert!(verdict.detected);
        assert_eq!(verdict.frame_index, Some(2));
        assert!(calls.load(Ordering::SeqCst) <= 3);
        Ok(())
    }

    #[test]
    fn threshold_equality_is_not_a_detection() -> Result<()> {
        let batch = batch_of(3)?;
        let mut classifier = StubClassifier::constant(0.8);
        let verdict = Inspector::default().inspect(&batch, &mut classifier)?;
        assert!(!verdict.detected);
        assert_eq!(verdict.invocations, 3);
        Ok(())
    }

    #[test]
    fn empty_batch_makes_no_calls() -> Result<()> {
        let batch = Batch::with_capacity(10);
        let mut classifier = StubClassifier::constant(0.99);
        let calls = classifier.calls();

        let verdict = Inspector::default().inspect(&batch, &mut classifier)?;
        assert!(!verdict.detected);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn edge_gate_skips_featureless_frames() -> Result<()> {
        let mut batch = Batch::with_capacity(2);
        let _ = batch.push(decoded(128)?);
        let mut checker = Vec::with_capacity(16 * 16 * 3);
        for y in 0..16u32 {
            for x in 0..16u32 {
                let value = if (x / 4 + y / 4) % 2 == 0 { 20 } else { 230 };
                checker.extend_from_slice(&[value, value, value]);
            }
        }
        let _ = batch.push(ColorImage::new(16, 16, PixelLayout::Rgb8, checker)?);

        let inspector = Inspector::new(InspectionConfig {
            input_size: 16,
            prefilter: Prefilter::EdgeGate {
                min_edge_density: 0.02,
            },
            ..InspectionConfig::default()
        });
        let mut classifier = StubClassifier::constant(0.1).with_input_size(16);

        let verdict = inspector.inspect(&batch, &mut classifier)?;
        assert_eq!(verdict.invocations, 1);
        assert_eq!(verdict.skipped, 1);
        Ok(())
    }

    #[test]
    fn classifier_failure_aborts_inspection() -> Result<()> {
        let batch = batch_of(2)?;
        let mut classifier = StubClassifier::constant(0.9).with_input_size(64);
        let err = Inspector::default()
            .inspect(&batch, &mut classifier)
            .unwrap_err();
        assert!(matches!(err, GuardError::Inference(_)));
        Ok(())
    }

    #[test]
    fn backend_input_size_must_match() {
        let inspector = Inspector::default();
        assert!(inspector
            .check_backend(&StubClassifier::constant(0.1))
            .is_ok());

        let err = inspector
            .check_backend(&StubClassifier::constant(0.1).with_input_size(64))
            .unwrap_err();
        assert!(matches!(err, GuardError::Configuration(_)));
    }
}
