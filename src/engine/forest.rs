//! Random Forest Classifier
//!
//! Bagged ensemble of CART trees (`linfa-trees`, Gini impurity). Each tree
//! sees a bootstrap sample of the rows and one random subset of
//! `sqrt(n_features)` columns, drawn once per tree (random subspace). The
//! columns are not re-sampled at every split, since `linfa-trees` has no
//! hook for it. The forest answers with the majority vote. Class
//! probabilities are vote fractions, so each `predict_proba` row sums to one.

use std::collections::BTreeMap;

use linfa::prelude::*;
use linfa::Dataset;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::utils::math::argmax;

#[derive(Debug, Error)]
pub enum ForestError {
    #[error("cannot fit a forest on an empty training set")]
    EmptyTrainingSet,

    #[error("record count {records} does not match target count {targets}")]
    ShapeMismatch { records: usize, targets: usize },

    #[error("training targets contain a single class ({0}); need at least two")]
    SingleClass(usize),

    #[error("expected {expected} features per row, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    #[error("n_estimators must be at least 1")]
    NoEstimators,

    #[error("decision tree fit failed: {0}")]
    Tree(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Columns each tree may look at: `floor(sqrt(n_features))`, at least one
pub fn features_per_tree(n_features: usize) -> usize {
    ((n_features as f64).sqrt().floor() as usize).clamp(1, n_features.max(1))
}

/// Forest hyperparameters
#[derive(Debug, Clone)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub seed: u64,
    pub max_depth: Option<usize>,
    /// Reweight samples inversely to class frequency
    pub balanced: bool,
    /// Worker threads; `None` uses the global rayon pool (all cores)
    pub n_jobs: Option<usize>,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            seed: 1,
            max_depth: None,
            balanced: true,
            n_jobs: None,
        }
    }
}

/// One fitted tree together with the columns it was trained on
#[derive(Serialize, Deserialize)]
struct ForestTree {
    features: Vec<usize>,
    tree: DecisionTree<f32, usize>,
}

/// Fitted random forest
#[derive(Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<ForestTree>,
    classes: Vec<usize>,
    n_features: usize,
}

impl RandomForest {
    /// Fit a forest on `records` (one sample per row) and integer `targets`
    pub fn fit(
        params: &ForestParams,
        records: &Array2<f32>,
        targets: &Array1<usize>,
    ) -> Result<Self, ForestError> {
        let (n_samples, n_features) = records.dim();

        if params.n_estimators == 0 {
            return Err(ForestError::NoEstimators);
        }
        if n_samples == 0 || n_features == 0 {
            return Err(ForestError::EmptyTrainingSet);
        }
        if targets.len() != n_samples {
            return Err(ForestError::ShapeMismatch {
                records: n_samples,
                targets: targets.len(),
            });
        }

        let counts = class_counts(targets.view());
        let classes: Vec<usize> = counts.keys().copied().collect();
        if classes.len() < 2 {
            return Err(ForestError::SingleClass(classes[0]));
        }

        let weights = if params.balanced {
            balanced_sample_weights(targets.view())
        } else {
            Array1::ones(n_samples)
        };
        let max_features = features_per_tree(n_features);

        info!(
            "Fitting {} trees on {} samples x {} features ({} per tree)",
            params.n_estimators, n_samples, n_features, max_features
        );

        let fit_one =
            |index: usize| fit_tree(params, index, records, targets, &weights, max_features);

        let trees = match params.n_jobs {
            Some(n_jobs) => {
                let pool = rayon::ThreadPoolBuilder::new().num_threads(n_jobs).build()?;
                pool.install(|| {
                    (0..params.n_estimators)
                        .into_par_iter()
                        .map(fit_one)
                        .collect::<Result<Vec<_>, _>>()
                })?
            }
            None => (0..params.n_estimators)
                .into_par_iter()
                .map(fit_one)
                .collect::<Result<Vec<_>, _>>()?,
        };

        Ok(Self {
            trees,
            classes,
            n_features,
        })
    }

    /// Sorted class labels seen during fit; column order of `predict_proba`
    pub fn classes(&self) -> &[usize] {
        &self.classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }

    /// Per-class vote fractions, one row per input row
    pub fn predict_proba(&self, rows: &Array2<f32>) -> Result<Array2<f32>, ForestError> {
        if rows.ncols() != self.n_features {
            return Err(ForestError::FeatureMismatch {
                expected: self.n_features,
                actual: rows.ncols(),
            });
        }

        let mut votes = Array2::<f32>::zeros((rows.nrows(), self.classes.len()));
        for member in &self.trees {
            let subset = rows.select(Axis(1), &member.features);
            let predicted: Array1<usize> = member.tree.predict(&subset);
            for (row, label) in predicted.iter().enumerate() {
                if let Ok(col) = self.classes.binary_search(label) {
                    votes[[row, col]] += 1.0;
                }
            }
        }

        votes /= self.trees.len() as f32;
        Ok(votes)
    }

    /// Majority-vote class per input row
    pub fn predict(&self, rows: &Array2<f32>) -> Result<Array1<usize>, ForestError> {
        let proba = self.predict_proba(rows)?;
        Ok(proba
            .outer_iter()
            .map(|row| self.classes[argmax(&row.to_vec())])
            .collect())
    }

    /// Convenience wrapper for a single feature vector
    pub fn predict_one(&self, features: &Array1<f32>) -> Result<(usize, Array1<f32>), ForestError> {
        let row = features.view().insert_axis(Axis(0)).to_owned();
        let proba = self.predict_proba(&row)?;
        let proba = proba.row(0).to_owned();
        let label = self.classes[argmax(&proba.to_vec())];
        Ok((label, proba))
    }
}

fn fit_tree(
    params: &ForestParams,
    index: usize,
    records: &Array2<f32>,
    targets: &Array1<usize>,
    weights: &Array1<f32>,
    max_features: usize,
) -> Result<ForestTree, ForestError> {
    let (n_samples, n_features) = records.dim();

    // Seed per tree so the result does not depend on scheduling
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));

    let mut features = rand::seq::index::sample(&mut rng, n_features, max_features).into_vec();
    features.sort_unstable();

    let rows: Vec<usize> = (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect();

    let x = records.select(Axis(1), &features).select(Axis(0), &rows);
    let y = targets.select(Axis(0), &rows);
    let w = weights.select(Axis(0), &rows);

    // A leaf may hold a single sample of the lightest class
    let min_weight = w.iter().copied().fold(f32::INFINITY, f32::min);
    let dataset = Dataset::new(x, y).with_weights(w);

    let tree = DecisionTree::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(params.max_depth)
        .min_weight_split(2.0 * min_weight)
        .min_weight_leaf(min_weight)
        .fit(&dataset)
        .map_err(|e| ForestError::Tree(e.to_string()))?;

    debug!("Fitted tree {} on {} columns", index, features.len());

    Ok(ForestTree { features, tree })
}

/// Sample count per class label, sorted by label
pub fn class_counts(targets: ArrayView1<usize>) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for label in targets.iter() {
        *counts.entry(*label).or_insert(0) += 1;
    }
    counts
}

/// `n_samples / (n_classes * count(class))` for every sample
pub fn balanced_sample_weights(targets: ArrayView1<usize>) -> Array1<f32> {
    let counts = class_counts(targets);
    let n_samples = targets.len() as f32;
    let n_classes = counts.len() as f32;

    targets
        .iter()
        .map(|label| n_samples / (n_classes * counts[label] as f32))
        .collect()
}
