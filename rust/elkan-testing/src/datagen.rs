// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Data generation utilities for unit tests
//!
//! Everything here returns plain vectors so that any crate of the workspace
//! can use it without depending on the vector types.

use std::iter::repeat_with;
use std::ops::Range;

use rand::distributions::Uniform;
use rand::prelude::Distribution;
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Create `k` random centers of `dimension` values, each uniformly
/// distributed between [0..1].
pub fn generate_random_centers(k: usize, dimension: usize, seed: [u8; 32]) -> Vec<Vec<f32>> {
    let mut rng = StdRng::from_seed(seed);
    (0..k)
        .map(|_| {
            repeat_with(|| rng.gen::<f32>())
                .take(dimension)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Create `k` random centers with values uniformly distributed in `range`.
pub fn generate_scaled_random_centers(
    k: usize,
    dimension: usize,
    range: Range<f32>,
    seed: [u8; 32],
) -> Vec<Vec<f32>> {
    let mut rng = StdRng::from_seed(seed);
    let distribution = Uniform::new(range.start, range.end);
    (0..k)
        .map(|_| {
            repeat_with(|| distribution.sample(&mut rng))
                .take(dimension)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Keep each value of `dense` with probability `density`.
///
/// Returns the `(indices, values)` of the kept, nonzero entries. Indices are
/// strictly increasing.
pub fn sparsify(dense: &[f32], density: f64, seed: [u8; 32]) -> (Vec<u32>, Vec<f32>) {
    let mut rng = StdRng::from_seed(seed);
    dense
        .iter()
        .enumerate()
        .filter(|(_, v)| rng.gen_bool(density.clamp(0.0, 1.0)) && **v != 0.0)
        .map(|(i, v)| (i as u32, *v))
        .unzip()
}

/// The dense counterpart of a sparse `(indices, values)` pair.
pub fn densify(dimension: usize, indices: &[u32], values: &[f32]) -> Vec<f32> {
    let mut dense = vec![0.0; dimension];
    for (i, v) in indices.iter().zip(values) {
        dense[*i as usize] = *v;
    }
    dense
}
