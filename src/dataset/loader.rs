//! Feature matrix assembly and train/test split

use std::path::Path;

use anyhow::Result;
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::info;

use super::labels::LabeledImage;
use crate::engine::preprocess::features_from_path;

/// Feature matrix with one row per image and the matching labels
pub struct FeatureSet {
    pub records: Array2<f32>,
    pub targets: Array1<usize>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rows at the given indices, in that order
    pub fn subset(&self, indices: &[usize]) -> FeatureSet {
        FeatureSet {
            records: self.records.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
        }
    }
}

/// Decode every listed image into a `size*size`-wide feature row
///
/// Images are processed in parallel. The first unreadable image aborts the load.
pub fn load_features(entries: &[LabeledImage], image_dir: &Path, size: u32) -> Result<FeatureSet> {
    let n_features = (size as usize).pow(2);
    info!(
        "Loading {} images from {} at {}x{}",
        entries.len(),
        image_dir.display(),
        size,
        size
    );

    let rows: Vec<Array1<f32>> = entries
        .par_iter()
        .map(|entry| features_from_path(&image_dir.join(&entry.file_name), size))
        .collect::<Result<_>>()?;

    let mut records = Array2::<f32>::zeros((rows.len(), n_features));
    for (mut dst, src) in records.outer_iter_mut().zip(rows.iter()) {
        dst.assign(src);
    }
    let targets: Array1<usize> = entries.iter().map(|e| e.label).collect();

    Ok(FeatureSet { records, targets })
}

/// Shuffled split into `(train, test)` index lists
///
/// The test partition holds `ceil(n * test_size)` indices.
pub fn train_test_split(n: usize, test_size: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(0.0..1.0).contains(&test_size) || test_size == 0.0 {
        anyhow::bail!("test_size must be in (0, 1), got {}", test_size);
    }

    let n_test = (n as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= n {
        anyhow::bail!("Cannot split {} samples with test_size {}", n, test_size);
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}
