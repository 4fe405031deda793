use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::model::{Classifier, InferenceError};
use super::preprocess::PreprocessedTensor;

impl From<tch::TchError> for InferenceError {
    fn from(err: tch::TchError) -> Self {
        InferenceError::Backend(err.to_string())
    }
}

/// TorchScript export of the classifier. libtorch modules are not safe to
/// drive from several threads at once, so forward passes take the lock.
pub struct TorchClassifier {
    model: Mutex<CModule>,
    device: Device,
}

impl TorchClassifier {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        let device = Device::cuda_if_available();
        log::info!("Loading TorchScript model from {} on {:?}", path.display(), device);
        let mut model = CModule::load_on_device(path, device)?;
        model.set_eval();
        Ok(Self {
            model: Mutex::new(model),
            device,
        })
    }
}

impl Classifier for TorchClassifier {
    fn predict(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError> {
        let data = input.as_slice().ok_or(InferenceError::NonContiguousInput)?;
        let shape: Vec<i64> = input.shape().iter().map(|&dim| dim as i64).collect();
        let tensor = Tensor::from_slice(data).view(shape.as_slice()).to_device(self.device);

        let output = {
            let model = self.model.lock().map_err(|_| InferenceError::Poisoned)?;
            tch::no_grad(|| model.forward_ts(&[tensor]))?
        };

        let scores: Vec<f32> = output
            .to_kind(Kind::Float)
            .to_device(Device::Cpu)
            .view([-1])
            .try_into()?;
        Ok(scores)
    }
}
