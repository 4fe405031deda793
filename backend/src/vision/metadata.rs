use serde::Deserialize;
use shared::PredictionResult;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::model::format_confidence;

const UNKNOWN: &str = "Unknown";
const NOT_AVAILABLE: &str = "Not available";

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("Failed to open class names file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid class names file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One entry of the class names file. Any field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassRecord {
    #[serde(rename = "Leaf Name")]
    pub leaf_name: Option<String>,
    #[serde(rename = "Status")]
    pub status: Option<String>,
    #[serde(rename = "Cause")]
    pub cause: Option<String>,
    #[serde(rename = "Treatment")]
    pub treatment: Option<String>,
    #[serde(rename = "Prevention")]
    pub prevention: Option<String>,
}

/// Descriptions of every class the model can emit, keyed by the class index
/// rendered as a decimal string.
#[derive(Debug, Clone, Default)]
pub struct ClassMetadata {
    classes: HashMap<String, ClassRecord>,
}

impl ClassMetadata {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let json = fs::read_to_string(path).map_err(|source| MetadataError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata = Self::parse(&json)?;
        log::info!("Loaded {} classes from {}", metadata.len(), path.display());
        Ok(metadata)
    }

    pub fn parse(json: &str) -> Result<Self, MetadataError> {
        let classes = serde_json::from_str(json)?;
        Ok(Self { classes })
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn get(&self, class_index: usize) -> Option<&ClassRecord> {
        self.classes.get(&class_index.to_string())
    }

    pub fn resolve(&self, class_index: usize, probability: f32) -> PredictionResult {
        let record = match self.get(class_index) {
            Some(record) => record.clone(),
            None => {
                log::warn!("Class index {} has no metadata entry", class_index);
                ClassRecord::default()
            }
        };

        PredictionResult {
            leaf_name: record.leaf_name.unwrap_or_else(|| UNKNOWN.to_string()),
            status: record.status.unwrap_or_else(|| UNKNOWN.to_string()),
            confidence: format_confidence(probability),
            cause: record.cause.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            treatment: record.treatment.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            prevention: record.prevention.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            class_index: class_index.to_string(),
        }
    }
}
