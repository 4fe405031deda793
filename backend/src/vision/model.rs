use std::path::Path;
use std::sync::Arc;

use super::preprocess::PreprocessedTensor;

#[allow(dead_code)]
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Model file not found: {0}")]
    MissingModel(String),
    #[error("Unsupported model format: {0}")]
    UnsupportedFormat(String),
    #[error("The {0} backend is not enabled in this build")]
    BackendDisabled(&'static str),
    #[error("Model error: {0}")]
    Backend(String),
    #[error("Input tensor is not contiguous")]
    NonContiguousInput,
    #[error("Model returned no class scores")]
    EmptyOutput,
    #[error("Model lock poisoned")]
    Poisoned,
}

/// A loaded classification network.
///
/// Implementations are shared across worker threads; any backend whose
/// forward pass is not reentrant must serialize calls itself.
pub trait Classifier: Send + Sync {
    fn predict(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError>;
}

/// Picks the backend from the artifact's extension.
pub fn load_classifier(path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    if !path.exists() {
        return Err(InferenceError::MissingModel(path.display().to_string()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    match extension.as_str() {
        "onnx" => load_onnx(path),
        "pt" | "pth" => load_torch(path),
        _ => Err(InferenceError::UnsupportedFormat(path.display().to_string())),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx(path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    Ok(Arc::new(super::onnx::OnnxClassifier::load(path)?))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx(_path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    Err(InferenceError::BackendDisabled("onnx"))
}

#[cfg(feature = "torch")]
fn load_torch(path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    Ok(Arc::new(super::torch::TorchClassifier::load(path)?))
}

#[cfg(not(feature = "torch"))]
fn load_torch(_path: &Path) -> Result<Arc<dyn Classifier>, InferenceError> {
    Err(InferenceError::BackendDisabled("torch"))
}

/// Index and value of the highest score. Ties go to the lowest index and NaN
/// never wins.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, score)| !score.is_nan())
        .fold(None, |best, (index, score)| match best {
            Some((_, best_score)) if score <= best_score => best,
            _ => Some((index, score)),
        })
}

pub fn format_confidence(probability: f32) -> String {
    format!("{:.2}%", probability * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_argmax_picks_highest() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn test_argmax_ties_go_to_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.25, 0.25, 0.25, 0.25]), Some((0, 0.25)));
    }

    #[test]
    fn test_argmax_skips_nan() {
        assert_eq!(argmax(&[f32::NAN, 0.3, 0.1]), Some((1, 0.3)));
        assert_eq!(argmax(&[f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_format_confidence() {
        assert_eq!(format_confidence(0.97314), "97.31%");
        assert_eq!(format_confidence(1.0), "100.00%");
        assert_eq!(format_confidence(0.0), "0.00%");
    }

    #[test]
    fn test_load_missing_model() {
        let result = load_classifier(Path::new("/nonexistent/model.onnx"));
        assert!(matches!(result, Err(InferenceError::MissingModel(_))));
    }

    #[test]
    fn test_load_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.h5");
        fs::write(&path, b"keras").unwrap();
        let result = load_classifier(&path);
        assert!(matches!(result, Err(InferenceError::UnsupportedFormat(_))));
    }
}
