pub mod intake;
pub mod metadata;
pub mod model;
#[cfg(feature = "onnx")]
mod onnx;
pub mod preprocess;
#[cfg(feature = "torch")]
mod torch;

use shared::PredictionResult;
use std::sync::Arc;

use intake::decode_image;
use metadata::ClassMetadata;
use model::{Classifier, InferenceError, argmax};
use preprocess::preprocess;

#[derive(Debug, thiserror::Error)]
pub enum PredictError {
    #[error("No file part in the request")]
    NoFilePart,
    #[error("No file selected")]
    NoFileSelected,
    #[error("Invalid file type. Only images are allowed.")]
    InvalidFileType,
    #[error("File too large")]
    FileTooLarge,
    #[error("Failed to read upload: {0}")]
    Upload(String),
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("Image processing failed: {0}")]
    Inference(#[from] InferenceError),
    #[error("Image processing failed: {0}")]
    Cancelled(String),
}

/// Decode, preprocess, classify and describe one uploaded image.
#[derive(Clone)]
pub struct PredictionService {
    classifier: Arc<dyn Classifier>,
    metadata: Arc<ClassMetadata>,
    upload_limit: usize,
}

impl PredictionService {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        metadata: Arc<ClassMetadata>,
        upload_limit: usize,
    ) -> Self {
        Self {
            classifier,
            metadata,
            upload_limit,
        }
    }

    pub fn upload_limit(&self) -> usize {
        self.upload_limit
    }

    /// Runs the whole pipeline. Blocking; call from a worker pool.
    pub fn predict(&self, bytes: &[u8]) -> Result<PredictionResult, PredictError> {
        let image = decode_image(bytes)?;
        let tensor = preprocess(&image);
        let scores = self.classifier.predict(&tensor)?;

        if scores.len() != self.metadata.len() {
            log::warn!(
                "Model produced {} scores but {} classes are described",
                scores.len(),
                self.metadata.len()
            );
        }

        let (class_index, probability) = argmax(&scores).ok_or(InferenceError::EmptyOutput)?;
        Ok(self.metadata.resolve(class_index, probability))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::model::{Classifier, InferenceError};
    use super::preprocess::PreprocessedTensor;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns the same scores for every input and counts its calls.
    pub struct FixedClassifier {
        pub scores: Vec<f32>,
        pub calls: AtomicUsize,
    }

    impl FixedClassifier {
        pub fn new(scores: Vec<f32>) -> Self {
            Self {
                scores,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Classifier for FixedClassifier {
        fn predict(&self, input: &PreprocessedTensor) -> Result<Vec<f32>, InferenceError> {
            assert_eq!(input.shape(), &[1, 224, 224, 3]);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.scores.clone())
        }
    }

    pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([34, 139, 34])));
        let mut buffer = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .expect("encode test png");
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FixedClassifier, png_bytes};
    use super::*;

    const CLASSES: &str = r#"{
        "0": {"Leaf Name": "Apple", "Status": "Scab", "Cause": "Venturia inaequalis",
              "Treatment": "Fungicide", "Prevention": "Prune"},
        "1": {"Leaf Name": "Apple", "Status": "Healthy", "Cause": "None",
              "Treatment": "None", "Prevention": "Keep monitoring"}
    }"#;

    fn service(scores: Vec<f32>) -> (PredictionService, Arc<FixedClassifier>) {
        let classifier = Arc::new(FixedClassifier::new(scores));
        let metadata = Arc::new(ClassMetadata::parse(CLASSES).unwrap());
        (
            PredictionService::new(classifier.clone(), metadata, 1024 * 1024),
            classifier,
        )
    }

    #[test]
    fn test_predict_maps_argmax_to_metadata() {
        let (service, classifier) = service(vec![0.15, 0.85]);
        let result = service.predict(&png_bytes(300, 200)).unwrap();
        assert_eq!(result.status, "Healthy");
        assert_eq!(result.confidence, "85.00%");
        assert_eq!(result.class_index, "1");
        assert_eq!(classifier.calls(), 1);
    }

    #[test]
    fn test_predict_out_of_table_index_degrades() {
        let (service, _) = service(vec![0.1, 0.1, 0.8]);
        let result = service.predict(&png_bytes(10, 10)).unwrap();
        assert_eq!(result.leaf_name, "Unknown");
        assert_eq!(result.class_index, "2");
    }

    #[test]
    fn test_corrupt_image_never_reaches_model() {
        let (service, classifier) = service(vec![1.0]);
        let bytes = png_bytes(64, 64);
        let result = service.predict(&bytes[..bytes.len() / 3]);
        assert!(matches!(result, Err(PredictError::Image(_))));
        assert_eq!(classifier.calls(), 0);
    }

    #[test]
    fn test_empty_scores_is_an_error() {
        let (service, _) = service(Vec::new());
        let result = service.predict(&png_bytes(10, 10));
        assert!(matches!(
            result,
            Err(PredictError::Inference(InferenceError::EmptyOutput))
        ));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(PredictError::NoFilePart.to_string(), "No file part in the request");
        assert_eq!(
            PredictError::Inference(InferenceError::EmptyOutput).to_string(),
            "Image processing failed: Model returned no class scores"
        );
    }
}
