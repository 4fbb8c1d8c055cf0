//! Model artifact and the loaded-model handle
//!
//! The artifact is written once by the trainer and read once at server
//! startup. After that it is shared read-only behind an `Arc`.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::forest::RandomForest;

/// Bumped whenever the on-disk layout changes
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Identifier of the classifier implementation, reported by `/health`
pub const CLASSIFIER_ENGINE: &str = "linfa-trees random forest";

/// Version of the library that fits the trees, reported by `/health`
pub const ML_LIBRARY_VERSION: &str = "linfa-trees 0.8";

/// Everything written to disk after training
#[derive(Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// Images are resized to `image_size x image_size` before inference
    pub image_size: u32,
    /// Crate version that produced the artifact
    pub trained_with: String,
    /// Unix timestamp, seconds
    pub created_at: u64,
    pub forest: RandomForest,
}

impl ModelArtifact {
    pub fn new(forest: RandomForest, image_size: u32) -> Self {
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            image_size,
            trained_with: env!("CARGO_PKG_VERSION").to_string(),
            created_at,
            forest,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)
            .with_context(|| format!("Failed to create model file {}", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write model to {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open model file {}", path.display()))?;
        let artifact: ModelArtifact = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Failed to decode model file {}", path.display()))?;

        if artifact.format_version != ARTIFACT_FORMAT_VERSION {
            anyhow::bail!(
                "Unsupported model format version {} (expected {})",
                artifact.format_version,
                ARTIFACT_FORMAT_VERSION
            );
        }

        let expected = (artifact.image_size as usize).pow(2);
        if artifact.forest.n_features() != expected {
            anyhow::bail!(
                "Model expects {} features but image size {} gives {}",
                artifact.forest.n_features(),
                artifact.image_size,
                expected
            );
        }

        Ok(artifact)
    }
}

/// Status of the loaded model
#[derive(Debug, Clone)]
pub struct ModelStatus {
    pub path: PathBuf,
    pub n_estimators: usize,
    pub image_size: u32,
}

/// Immutable handle to the loaded artifact
#[derive(Clone)]
pub struct ModelHandle {
    artifact: Arc<ModelArtifact>,
    path: PathBuf,
}

impl ModelHandle {
    /// Load the artifact from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading model from {}", path.display());
        let start = Instant::now();

        let artifact = ModelArtifact::load(path)?;

        info!(
            "Model loaded in {:?} ({} trees, {}x{} input, trained with cellscan {})",
            start.elapsed(),
            artifact.forest.n_estimators(),
            artifact.image_size,
            artifact.image_size,
            artifact.trained_with
        );

        Ok(Self::from_artifact(artifact, path))
    }

    /// Wrap an artifact that is already in memory
    pub fn from_artifact(artifact: ModelArtifact, path: impl Into<PathBuf>) -> Self {
        Self {
            artifact: Arc::new(artifact),
            path: path.into(),
        }
    }

    pub fn forest(&self) -> &RandomForest {
        &self.artifact.forest
    }

    pub fn image_size(&self) -> u32 {
        self.artifact.image_size
    }

    /// Predicted label and class probabilities for one feature vector
    pub fn predict(&self, features: &Array1<f32>) -> Result<(usize, Array1<f32>)> {
        Ok(self.artifact.forest.predict_one(features)?)
    }

    pub fn status(&self) -> ModelStatus {
        ModelStatus {
            path: self.path.clone(),
            n_estimators: self.artifact.forest.n_estimators(),
            image_size: self.artifact.image_size,
        }
    }
}
