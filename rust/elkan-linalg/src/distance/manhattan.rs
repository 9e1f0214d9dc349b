// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! L1 (Manhattan) distance.

use elkan_core::Result;

use crate::vector::{paired_entries, Vector};

/// `sum(|a_k - b_k|)`
#[inline]
pub fn manhattan_distance(a: &Vector, b: &Vector) -> Result<f32> {
    Ok(paired_entries(a, b)?.fold(0.0_f32, |acc, (x, y)| acc + (x - y).abs()))
}
