//! Service layer types

/// Label value the dataset uses for leukemic (ALL) cells
pub const POSITIVE_LABEL: usize = 1;

/// Outcome reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Diagnosis {
    CancerDetected,
    NoCancerDetected,
}

impl Diagnosis {
    pub fn from_label(label: usize) -> Self {
        if label == POSITIVE_LABEL {
            Diagnosis::CancerDetected
        } else {
            Diagnosis::NoCancerDetected
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Diagnosis::CancerDetected => "Cancer Detected",
            Diagnosis::NoCancerDetected => "No Cancer Detected",
        }
    }
}

/// Single image prediction result
#[derive(Debug, Clone)]
pub struct PredictionResult {
    pub diagnosis: Diagnosis,
    pub label: usize,
    /// Highest class probability
    pub confidence: f64,
    pub inference_time_ms: u64,
}

/// Health check result
#[derive(Debug, Clone)]
pub struct HealthResult {
    pub version: String,
    pub classifier: String,
    pub ml_library_version: String,
    pub n_estimators: usize,
}

/// Summary of a finished training run
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub n_train: usize,
    pub n_test: usize,
    pub accuracy: f64,
    pub artifact_path: std::path::PathBuf,
    pub dataset_root: std::path::PathBuf,
}
