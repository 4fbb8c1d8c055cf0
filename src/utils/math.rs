//! Math utility functions

/// Argmax - index of the maximum value, first one wins on ties
pub fn argmax(x: &[f32]) -> usize {
    x.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_idx, best), (idx, &v)| {
            if v > best {
                (idx, v)
            } else {
                (best_idx, best)
            }
        })
        .0
}

/// Division that yields 0.0 for a zero denominator
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

/// Harmonic mean of precision and recall
pub fn f1(precision: f64, recall: f64) -> f64 {
    safe_div(2.0 * precision * recall, precision + recall)
}
