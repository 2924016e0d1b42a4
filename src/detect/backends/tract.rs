#![cfg(feature = "backend-tract")]

use std::io::Cursor;

use tract_onnx::prelude::*;

use crate::detect::backend::ClassifierBackend;
use crate::detect::result::ClassificationResult;
use crate::error::{GuardError, Result};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Tract-based two-class classifier for ONNX models.
///
/// The model takes a `[1, size, size, 3]` float tensor (RGB in `[0, 1]`) and
/// yields `[1, 2]` scores ordered `(no_camera, camera)`. No network I/O and no
/// disk access beyond what the caller hands to `load`.
pub struct TractClassifier {
    model: Plan,
    input_size: u32,
}

impl TractClassifier {
    /// Prepare a runnable model from serialized ONNX bytes.
    ///
    /// Any failure is a configuration error: the pipeline cannot run
    /// without a usable model.
    pub fn load(model_bytes: &[u8], input_size: u32) -> Result<Self> {
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_read(&mut Cursor::new(model_bytes))
            .map_err(|err| load_error("parse ONNX model", err))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, size, size, 3)),
            )
            .map_err(|err| load_error("set input fact", err))?
            .into_optimized()
            .map_err(|err| load_error("optimize ONNX model", err))?
            .into_runnable()
            .map_err(|err| load_error("build runnable ONNX model", err))?;

        Ok(Self { model, input_size })
    }

    fn build_input(&self, tensor: &[f32]) -> Result<Tensor> {
        let size = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_vec((1, size, size, 3), tensor.to_vec())
            .map_err(|err| {
                GuardError::Inference(format!(
                    "tensor of {} values does not fit {}x{}x3: {}",
                    tensor.len(),
                    size,
                    size,
                    err
                ))
            })?;
        Ok(input.into_tensor())
    }
}

fn load_error(stage: &str, err: impl std::fmt::Display) -> GuardError {
    GuardError::Configuration(format!("{}: {}", stage, err))
}

impl ClassifierBackend for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn classify(&mut self, tensor: &[f32]) -> Result<ClassificationResult> {
        let input = self.build_input(tensor)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|err| GuardError::Inference(format!("ONNX inference failed: {}", err)))?;
        let output = outputs
            .first()
            .ok_or_else(|| GuardError::Inference("model produced no outputs".to_string()))?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|err| GuardError::Inference(format!("model output was not f32: {}", err)))?;
        let mut scores = scores.iter().copied();
        match (scores.next(), scores.next()) {
            (Some(no_camera), Some(camera)) => Ok(ClassificationResult::new(no_camera, camera)),
            _ => Err(GuardError::Inference(
                "model produced fewer than two scores".to_string(),
            )),
        }
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size as usize;
        self.classify(&vec![0.0; size * size * 3]).map(|_| ())
    }
}
