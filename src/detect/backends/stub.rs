use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::detect::backend::ClassifierBackend;
use crate::detect::result::ClassificationResult;
use crate::error::{GuardError, Result};

/// Scripted classifier for tests and model-less runs.
///
/// Returns the scripted camera probabilities in call order; the last value
/// repeats once the script is exhausted.
pub struct StubClassifier {
    script: Vec<f32>,
    input_size: u32,
    calls: Arc<AtomicUsize>,
}

impl StubClassifier {
    pub fn new(script: Vec<f32>) -> Self {
        Self {
            script,
            input_size: 128,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Always answers `camera_prob`.
    pub fn constant(camera_prob: f32) -> Self {
        Self::new(vec![camera_prob])
    }

    pub fn with_input_size(mut self, input_size: u32) -> Self {
        self.input_size = input_size;
        self
    }

    /// Shared invocation counter, readable after the stub is installed.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl ClassifierBackend for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn classify(&mut self, tensor: &[f32]) -> Result<ClassificationResult> {
        let expected = (self.input_size as usize).pow(2) * 3;
        if tensor.len() != expected {
            return Err(GuardError::Inference(format!(
                "expected {} tensor values, received {}",
                expected,
                tensor.len()
            )));
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let camera_prob = self
            .script
            .get(call)
            .or_else(|| self.script.last())
            .copied()
            .unwrap_or(0.0);
        Ok(ClassificationResult::new(1.0 - camera_prob, camera_prob))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_replays_then_repeats_last() -> Result<()> {
        let mut stub = StubClassifier::new(vec![0.1, 0.7]).with_input_size(1);
        let calls = stub.calls();
        let probs: Vec<f32> = (0..4)
            .map(|_| stub.classify(&[0.0; 3]).map(|r| r.camera_prob))
            .collect::<Result<_>>()?;
        assert_eq!(probs, vec![0.1, 0.7, 0.7, 0.7]);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        Ok(())
    }

    #[test]
    fn wrong_tensor_length_is_rejected() {
        let mut stub = StubClassifier::constant(0.5).with_input_size(2);
        let err = stub.classify(&[0.0; 3]).unwrap_err();
        assert!(matches!(err, GuardError::Inference(_)));
        assert_eq!(stub.calls().load(Ordering::SeqCst), 0);
    }
}
