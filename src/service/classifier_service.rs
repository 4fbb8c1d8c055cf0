//! Classifier Service - inference orchestration
//!
//! Turns uploaded bytes into a diagnosis using the loaded model.

use std::path::Path;
use std::time::Instant;

use anyhow::Result;
use tracing::debug;

use crate::engine::model::{CLASSIFIER_ENGINE, ML_LIBRARY_VERSION};
use crate::engine::preprocess::{features_from_bytes, features_from_path};
use crate::engine::ModelHandle;

use super::types::*;

/// Blood cell classification service
pub struct ClassifierService {
    model: ModelHandle,
}

impl ClassifierService {
    /// Create a new classifier service
    pub fn new(model: ModelHandle) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Classify an uploaded image
    pub async fn predict(&self, image_data: &[u8]) -> Result<PredictionResult> {
        let start = Instant::now();

        // Decode, resize and the forest walk are all CPU bound
        let image_data = image_data.to_vec();
        let model = self.model.clone();
        let (label, proba) = tokio::task::spawn_blocking(move || {
            let features = features_from_bytes(&image_data, model.image_size())?;
            model.predict(&features)
        })
        .await??;

        let confidence = proba.iter().copied().fold(0.0f32, f32::max) as f64;
        let inference_time_ms = start.elapsed().as_millis() as u64;
        let diagnosis = Diagnosis::from_label(label);

        debug!(
            "Predicted {} (label {}, confidence {:.3}) in {}ms",
            diagnosis.as_str(),
            label,
            confidence,
            inference_time_ms
        );

        Ok(PredictionResult {
            diagnosis,
            label,
            confidence,
            inference_time_ms,
        })
    }

    /// Classify an image file on disk
    pub fn predict_file(&self, path: &Path) -> Result<Diagnosis> {
        let features = features_from_path(path, self.model.image_size())?;
        let (label, _) = self.model.predict(&features)?;
        Ok(Diagnosis::from_label(label))
    }

    /// Get health status
    pub fn health(&self) -> HealthResult {
        HealthResult {
            version: env!("CARGO_PKG_VERSION").to_string(),
            classifier: CLASSIFIER_ENGINE.to_string(),
            ml_library_version: ML_LIBRARY_VERSION.to_string(),
            n_estimators: self.model.forest().n_estimators(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::tests::brightness_artifact;
    use image::{DynamicImage, Rgb, RgbImage};

    fn service() -> ClassifierService {
        ClassifierService::new(ModelHandle::from_artifact(brightness_artifact(8), "mem"))
    }

    fn png(value: u8) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([value; 3])));
        let mut buffer = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_predict_bright_and_dark() {
        let service = service();

        let bright = service.predict(&png(240)).await.unwrap();
        assert_eq!(bright.diagnosis, Diagnosis::CancerDetected);
        assert!(bright.confidence >= 0.5 && bright.confidence <= 1.0);

        let dark = service.predict(&png(10)).await.unwrap();
        assert_eq!(dark.diagnosis, Diagnosis::NoCancerDetected);
    }

    #[tokio::test]
    async fn test_predict_garbage_fails() {
        let err = service().predict(b"GIF89a but not really").await.unwrap_err();
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn test_predict_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cell.png");
        std::fs::write(&path, png(250)).unwrap();

        assert_eq!(service().predict_file(&path).unwrap(), Diagnosis::CancerDetected);
    }

    #[test]
    fn test_health() {
        let health = service().health();
        assert_eq!(health.ml_library_version, "linfa-trees 0.8");
        assert_eq!(health.n_estimators, 5);
        assert_eq!(health.version, env!("CARGO_PKG_VERSION"));
    }
}
