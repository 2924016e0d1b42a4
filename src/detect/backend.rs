use crate::error::Result;

use super::result::ClassificationResult;

/// Classifier backend trait.
///
/// # Audit Boundary
///
/// Implementations MUST:
/// - Treat the input tensor as read-only and ephemeral
/// - Not write to disk
/// - Not make network requests
///
/// Once loaded a backend behaves as a pure function of its input.
pub trait ClassifierBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32;

    /// Classify one normalized `input_size * input_size * 3` tensor
    /// (row-major, RGB in `[0, 1]`).
    fn classify(&mut self, tensor: &[f32]) -> Result<ClassificationResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
