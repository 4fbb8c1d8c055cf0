//! Inference engine module
//!
//! Provides the classifier core:
//! - Image preprocessing into feature vectors
//! - Random forest fitting and prediction
//! - Model artifact persistence and the loaded-model handle
//! - Held-out evaluation metrics

pub mod forest;
pub mod metrics;
pub mod model;
pub mod preprocess;

pub use forest::{ForestParams, RandomForest};
pub use metrics::ConfusionMatrix;
pub use model::{ModelArtifact, ModelHandle};
