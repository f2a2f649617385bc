//! Train/validation split
//!
//! A seeded random permutation of `0..n` cut at `floor(train_fraction * n)`.
//! The two index sets are disjoint and together cover every sample.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::utils::error::{CatDogError, Result};

/// Indices into the source collection for each side of the split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl SplitIndices {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len()
    }
}

/// Number of training samples for a collection of `n`
///
/// Products that land within float error of a whole number count as that
/// number, so `0.29 * 100` gives 29 rather than 28.
pub fn train_len(n: usize, train_fraction: f64) -> usize {
    let exact = (n as f64) * train_fraction;
    let nearest = exact.round();
    if (exact - nearest).abs() <= 1e-9 * nearest.max(1.0) {
        nearest as usize
    } else {
        exact.floor() as usize
    }
}

/// Split `0..n` into training and validation indices
///
/// Deterministic for a given `seed`.
pub fn split_indices(n: usize, train_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(CatDogError::Config(format!(
            "train_fraction must be in (0, 1), got {train_fraction}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let validation = indices.split_off(train_len(n, train_fraction).min(n));

    Ok(SplitIndices {
        train: indices,
        validation,
    })
}
