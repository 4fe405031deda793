use std::path::Path;
use tract_onnx::prelude::*;

use super::model::{Classifier, InferenceError};
use super::preprocess::{INPUT_SIZE, PreprocessedTensor};

type OnnxPlan = TypedRunnableModel<TypedModel>;

/// ONNX export of the classifier, run with tract. The optimized plan is
/// immutable so concurrent forward passes need no lock.
pub struct OnnxClassifier {
    plan: OnnxPlan,
}

impl OnnxClassifier {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        log::info!("Loading ONNX model from {}", path.display());
        let side = INPUT_SIZE as usize;
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .and_then(|model| {
                model.with_input_fact(
                    0,
                    InferenceFact::dt_shape(f32::datum_type(), tvec!(1, side, side, 3)),
                )
            })
            .and_then(|model| model.into_optimized())
            .and_then(|model| model.into_runnable())
            .map_err(backend_error)?;
        log::info!("ONNX model ready");
        Ok(Self { plan })
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError> {
        let data = input.as_slice().ok_or(InferenceError::NonContiguousInput)?;
        let tensor = Tensor::from_shape(input.shape(), data).map_err(backend_error)?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(backend_error)?;
        let scores = outputs
            .first()
            .ok_or(InferenceError::EmptyOutput)?
            .to_array_view::<f32>()
            .map_err(backend_error)?
            .iter()
            .copied()
            .collect();
        Ok(scores)
    }
}

fn backend_error(err: TractError) -> InferenceError {
    InferenceError::Backend(err.to_string())
}
