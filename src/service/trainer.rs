//! Training routine
//!
//! One shot, start to finish: fetch the dataset, read the label table,
//! load images, split, fit, evaluate, and write the artifact.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::Config;
use crate::dataset::{self, labels::class_distribution, DatasetHandle};
use crate::engine::{ConfusionMatrix, ForestParams, ModelArtifact, RandomForest};

use super::types::TrainingSummary;

pub struct Trainer {
    config: Config,
}

impl Trainer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn forest_params(&self) -> ForestParams {
        let training = &self.config.training;
        ForestParams {
            n_estimators: training.n_estimators,
            seed: training.seed,
            max_depth: training.max_depth,
            balanced: training.balanced,
            n_jobs: training.n_jobs,
        }
    }

    /// Download the dataset (or reuse the cache) and return its root
    pub async fn fetch_dataset(&self) -> Result<PathBuf> {
        let handle: DatasetHandle = self.config.dataset.handle.parse()?;
        let cache_root = self
            .config
            .dataset
            .cache_dir
            .clone()
            .unwrap_or_else(dataset::download::default_cache_root);

        let root = dataset::download(&handle, &cache_root).await?;
        info!("Path to dataset files: {}", root.display());
        Ok(root)
    }

    /// Run the whole pipeline and write the artifact
    pub async fn run(&self) -> Result<TrainingSummary> {
        let dataset_root = self.fetch_dataset().await?;
        let config = self.config.clone();
        let params = self.forest_params();

        let root = dataset_root.clone();
        tokio::task::spawn_blocking(move || train_from_root(&config, &params, root)).await?
    }
}

/// Everything after the download; blocking and CPU heavy
pub fn train_from_root(
    config: &Config,
    params: &ForestParams,
    dataset_root: PathBuf,
) -> Result<TrainingSummary> {
    let start = Instant::now();
    let image_size = config.training.image_size;

    let labels_path = dataset_root.join(&config.dataset.labels_csv);
    let entries = dataset::read_labels(&labels_path)?;
    if entries.is_empty() {
        anyhow::bail!("No labeled images in {}", labels_path.display());
    }

    info!("Class distribution:");
    for (label, count) in class_distribution(&entries) {
        info!("  {}: {}", label, count);
    }

    let image_dir = dataset_root.join(&config.dataset.images_dir);
    let features = dataset::load_features(&entries, &image_dir, image_size)?;
    info!("Loaded feature matrix {:?} in {:?}", features.records.dim(), start.elapsed());

    let (train_idx, test_idx) =
        dataset::train_test_split(features.len(), config.training.test_size, config.training.seed)?;
    let train = features.subset(&train_idx);
    let test = features.subset(&test_idx);
    drop(features);
    info!("Split into {} training and {} validation samples", train.len(), test.len());

    let fit_start = Instant::now();
    let forest = RandomForest::fit(params, &train.records, &train.targets)
        .context("Random forest fit failed")?;
    info!("Fitted {} trees in {:?}", forest.n_estimators(), fit_start.elapsed());

    let predicted = forest.predict(&test.records)?;
    let matrix = ConfusionMatrix::new(
        test.targets.as_slice().unwrap_or_default(),
        predicted.as_slice().unwrap_or_default(),
    );
    let report = matrix.report();
    info!("Confusion Matrix:\n{}", matrix);
    info!("Classification Report:\n{}", report);

    let artifact_path = config.model.artifact_path.clone();
    ModelArtifact::new(forest, image_size).save(&artifact_path)?;
    info!("Model saved as '{}'", artifact_path.display());

    Ok(TrainingSummary {
        n_train: train.len(),
        n_test: test.len(),
        accuracy: report.accuracy,
        artifact_path,
        dataset_root,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ModelHandle;
    use image::{DynamicImage, Rgb, RgbImage};

    /// Synthetic dataset: label 1 images are bright, label 0 images are dark
    fn synthetic_dataset(root: &std::path::Path) {
        let images = root.join("images");
        std::fs::create_dir_all(&images).unwrap();

        let mut csv = String::from("new_names,labels\n");
        for i in 0..20 {
            let label = i % 2;
            let value = if label == 1 { 200 + i as u8 } else { 20 + i as u8 };
            let name = format!("cell_{}.png", i);
            DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb([value, value, value])))
                .save(images.join(&name))
                .unwrap();
            csv.push_str(&format!("{},{}\n", name, label));
        }
        // Incomplete row is dropped
        csv.push_str("cell_missing.png,\n");
        std::fs::write(root.join("labels.csv"), csv).unwrap();
    }

    #[test]
    fn test_train_from_root() {
        let dir = tempfile::tempdir().unwrap();
        synthetic_dataset(dir.path());

        let mut config = Config::default();
        config.dataset.labels_csv = PathBuf::from("labels.csv");
        config.dataset.images_dir = PathBuf::from("images");
        config.training.image_size = 8;
        config.training.n_estimators = 7;
        config.model.artifact_path = dir.path().join("out").join("model.bin");

        let params = Trainer::new(config.clone()).forest_params();
        let summary = train_from_root(&config, &params, dir.path().to_path_buf()).unwrap();

        assert_eq!(summary.n_train, 16);
        assert_eq!(summary.n_test, 4);
        assert!((summary.accuracy - 1.0).abs() < 1e-9);

        let handle = ModelHandle::load(&summary.artifact_path).unwrap();
        assert_eq!(handle.forest().n_estimators(), 7);
        assert_eq!(handle.image_size(), 8);
    }

    #[test]
    fn test_train_from_root_without_labels() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let params = ForestParams::default();
        assert!(train_from_root(&config, &params, dir.path().to_path_buf()).is_err());
    }
}
