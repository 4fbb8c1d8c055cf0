//! Classifier service configuration

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub dataset: DatasetConfig,
    pub training: TrainingConfig,
    pub model: ModelConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Request body limit for uploads
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

fn default_max_upload_mb() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Kaggle dataset handle, `owner/name`
    pub handle: String,
    /// Download cache root, defaults to `~/.cache/cellscan/datasets`
    pub cache_dir: Option<PathBuf>,
    /// Label table, relative to the dataset root
    pub labels_csv: PathBuf,
    /// Image directory, relative to the dataset root
    pub images_dir: PathBuf,
    /// Image classified once after training, relative to the dataset root
    pub sample_image: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    pub n_estimators: usize,
    pub seed: u64,
    pub test_size: f64,
    /// Images are resized to `image_size x image_size`
    pub image_size: u32,
    pub balanced: bool,
    pub max_depth: Option<usize>,
    /// Worker threads for fitting; all cores when unset
    pub n_jobs: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub artifact_path: PathBuf,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn default_path() -> &'static str {
        "config.toml"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
                cors_origins: vec![
                    "http://localhost:5173".to_string(),
                    "http://localhost:3000".to_string(),
                ],
                max_upload_mb: default_max_upload_mb(),
            },
            dataset: DatasetConfig {
                handle: "andrewmvd/leukemia-classification".to_string(),
                cache_dir: None,
                labels_csv: PathBuf::from(
                    "C-NMC_Leukemia/validation_data/C-NMC_test_prelim_phase_data_labels.csv",
                ),
                images_dir: PathBuf::from(
                    "C-NMC_Leukemia/validation_data/C-NMC_test_prelim_phase_data",
                ),
                sample_image: Some(PathBuf::from(
                    "C-NMC_Leukemia/training_data/fold_0/hem/UID_H12_1_1_hem.bmp",
                )),
            },
            training: TrainingConfig {
                n_estimators: 100,
                seed: 1,
                test_size: 0.2,
                image_size: 128,
                balanced: true,
                max_depth: None,
                n_jobs: None,
            },
            model: ModelConfig {
                artifact_path: PathBuf::from("blood_cancer_model.bin"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shipped_config() {
        let content = include_str!("../config.toml");
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.server.max_upload_mb, 50);
        assert_eq!(config.training.n_estimators, 100);
        assert_eq!(config.training.image_size, 128);
        assert!(config.training.max_depth.is_none());
        assert_eq!(config.dataset.handle, "andrewmvd/leukemia-classification");
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(Config::load("does/not/exist.toml").is_err());
    }
}
