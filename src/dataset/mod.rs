//! Dataset module
//!
//! Provides the training data pipeline:
//! - Kaggle download with a local cache
//! - Label table reading
//! - Parallel image loading into a feature matrix

pub mod download;
pub mod labels;
pub mod loader;

pub use download::{download, DatasetHandle};
pub use labels::{read_labels, LabeledImage};
pub use loader::{load_features, train_test_split, FeatureSet};
