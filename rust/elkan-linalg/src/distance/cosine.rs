// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Cosine distance
//!
//! <https://en.wikipedia.org/wiki/Cosine_similarity>

use elkan_core::Result;

use super::dot::dot_and_norms;
use crate::vector::Vector;

/// Cosine distance, `1 - a·b / (|a| * |b|)`.
///
/// A zero vector has no direction, and is reported at distance 0 from any
/// other vector. Rounding can push `a·b` above
/// `|a| * |b|`; the result is clamped so it never goes negative.
#[inline]
pub fn cosine_distance(a: &Vector, b: &Vector) -> Result<f32> {
    let r = dot_and_norms(a, b)?;
    let mut denominator = r.norm_sq_a.sqrt() * r.norm_sq_b.sqrt();
    if denominator < r.dot {
        denominator = r.dot;
    }
    if denominator == 0.0 && r.dot == 0.0 {
        return Ok(0.0);
    }
    Ok(1.0 - r.dot / denominator)
}
