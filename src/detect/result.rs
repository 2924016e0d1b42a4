/// Output of one classifier invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ClassificationResult {
    pub no_camera_prob: f32,
    pub camera_prob: f32,
}

impl ClassificationResult {
    pub fn new(no_camera_prob: f32, camera_prob: f32) -> Self {
        Self {
            no_camera_prob,
            camera_prob,
        }
    }

    /// Strictly above the threshold counts as a detection.
    pub fn exceeds(&self, threshold: f32) -> bool {
        self.camera_prob > threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        assert!(!ClassificationResult::new(0.2, 0.8).exceeds(0.8));
        assert!(ClassificationResult::new(0.19, 0.81).exceeds(0.8));
        assert!(!ClassificationResult::new(f32::NAN, f32::NAN).exceeds(0.5));
    }
}
