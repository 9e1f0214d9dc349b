// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! L2 (Euclidean) distance.
//!

use elkan_core::Result;

use crate::vector::{paired_entries, Vector};

/// Squared L2 distance, `sum((a_k - b_k)^2)`.
#[inline]
pub fn l2_squared(a: &Vector, b: &Vector) -> Result<f32> {
    Ok(paired_entries(a, b)?.fold(0.0_f32, |acc, (x, y)| {
        let d = x - y;
        acc + d * d
    }))
}

/// Euclidean distance, `sqrt(sum((a_k - b_k)^2))`.
#[inline]
pub fn euclidean_distance(a: &Vector, b: &Vector) -> Result<f32> {
    l2_squared(a, b).map(f32::sqrt)
}
