// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Dot product.

use elkan_core::Result;

use crate::vector::{paired_entries, Vector};

/// Dot product and squared L2 norms of both vectors, computed in one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotAndNorms {
    pub dot: f32,
    pub norm_sq_a: f32,
    pub norm_sq_b: f32,
}

#[inline]
pub fn dot_and_norms(a: &Vector, b: &Vector) -> Result<DotAndNorms> {
    Ok(paired_entries(a, b)?.fold(
        DotAndNorms {
            dot: 0.0,
            norm_sq_a: 0.0,
            norm_sq_b: 0.0,
        },
        |acc, (x, y)| DotAndNorms {
            dot: acc.dot + x * y,
            norm_sq_a: acc.norm_sq_a + x * x,
            norm_sq_b: acc.norm_sq_b + y * y,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_and_norms() {
        let a = Vector::dense(vec![1.0, 2.0, 0.0]);
        let b = Vector::sparse(3, vec![1, 2], vec![3.0, 4.0]).unwrap();
        let r = dot_and_norms(&a, &b).unwrap();
        assert_eq!(r.dot, 6.0);
        assert_eq!(r.norm_sq_a, 5.0);
        assert_eq!(r.norm_sq_b, 25.0);
        let dense = dot_and_norms(&a, &Vector::dense(b.to_dense())).unwrap();
        assert_eq!(dense, r);
    }
}
