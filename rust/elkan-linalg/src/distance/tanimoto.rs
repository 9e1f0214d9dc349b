// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Tanimoto (extended Jaccard) distance.

use elkan_core::Result;

use super::dot::dot_and_norms;
use crate::vector::Vector;

/// `1 - a·b / (|a|^2 + |b|^2 - a·b)`
///
/// Returns 0 when the denominator vanishes, i.e. both vectors are zero.
#[inline]
pub fn tanimoto_distance(a: &Vector, b: &Vector) -> Result<f32> {
    let r = dot_and_norms(a, b)?;
    let mut denominator = r.norm_sq_a + r.norm_sq_b - r.dot;
    if denominator < r.dot {
        denominator = r.dot;
    }
    if denominator > 0.0 {
        Ok(1.0 - r.dot / denominator)
    } else {
        Ok(0.0)
    }
}
