// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! L-infinity (Chebyshev) distance.

use elkan_core::Result;

use crate::vector::{paired_entries, Vector};

/// `max(|a_k - b_k|)`
#[inline]
pub fn chebyshev_distance(a: &Vector, b: &Vector) -> Result<f32> {
    Ok(paired_entries(a, b)?.fold(0.0_f32, |acc, (x, y)| acc.max((x - y).abs())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chebyshev() {
        let a = Vector::dense(vec![1.0, -2.0, 3.0]);
        let b = Vector::dense(vec![4.0, 2.0, 3.0]);
        assert_eq!(chebyshev_distance(&a, &b).unwrap(), 4.0);
        assert_eq!(chebyshev_distance(&a, &a).unwrap(), 0.0);
    }
}
