// SPDX-License-Identifier: Apache-2.0
// SPDX-FileCopyrightText: Copyright The Lance Authors

//! Dense and sparse vectors.
//!
//! Both representations expose the same read API, so distance measures never
//! need to know which one they received. All iteration happens in increasing
//! index order.

use std::cmp::Ordering;
use std::iter::Peekable;

use deepsize::DeepSizeOf;
use elkan_core::{Error, Result};
use snafu::location;

/// A sparse vector. Only the stored entries are kept, ordered by index.
#[derive(Debug, Clone, PartialEq, DeepSizeOf)]
pub struct SparseVector {
    dimension: usize,
    indices: Vec<u32>,
    values: Vec<f32>,
}

impl SparseVector {
    /// Create a sparse vector.
    ///
    /// `indices` must be strictly increasing and smaller than `dimension`, and
    /// match `values` in length.
    pub fn try_new(dimension: usize, indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(Error::InvalidVector {
                message: format!(
                    "sparse vector has {} indices but {} values",
                    indices.len(),
                    values.len()
                ),
                location: location!(),
            });
        }
        if let Some(w) = indices.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidVector {
                message: format!(
                    "sparse indices must be strictly increasing, found {} followed by {}",
                    w[0], w[1]
                ),
                location: location!(),
            });
        }
        if let Some(&last) = indices.last() {
            if last as usize >= dimension {
                return Err(Error::InvalidVector {
                    message: format!("sparse index {last} out of range for dimension {dimension}"),
                    location: location!(),
                });
            }
        }
        Ok(Self {
            dimension,
            indices,
            values,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Number of explicitly stored entries.
    pub fn num_stored(&self) -> usize {
        self.indices.len()
    }
}

/// A vector of `f32`, stored densely or sparsely.
#[derive(Debug, Clone, PartialEq, DeepSizeOf)]
pub enum Vector {
    Dense(Vec<f32>),
    Sparse(SparseVector),
}

impl Vector {
    pub fn dense(values: impl Into<Vec<f32>>) -> Self {
        Self::Dense(values.into())
    }

    pub fn sparse(dimension: usize, indices: Vec<u32>, values: Vec<f32>) -> Result<Self> {
        SparseVector::try_new(dimension, indices, values).map(Self::Sparse)
    }

    /// Build a sparse vector keeping only the nonzero values of `dense`.
    pub fn sparse_from_dense(dense: &[f32]) -> Self {
        let (indices, values): (Vec<u32>, Vec<f32>) = dense
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i as u32, *v))
            .unzip();
        Self::Sparse(SparseVector {
            dimension: dense.len(),
            indices,
            values,
        })
    }

    /// Number of logical values `D`.
    pub fn dimension(&self) -> usize {
        match self {
            Self::Dense(values) => values.len(),
            Self::Sparse(sparse) => sparse.dimension,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Self::Sparse(_))
    }

    /// Number of values physically stored.
    pub fn num_stored(&self) -> usize {
        match self {
            Self::Dense(values) => values.len(),
            Self::Sparse(sparse) => sparse.num_stored(),
        }
    }

    /// Value at `index`. Implicit entries of a sparse vector read as zero.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.dimension()`.
    pub fn get(&self, index: usize) -> f32 {
        assert!(
            index < self.dimension(),
            "index {index} out of range for dimension {}",
            self.dimension()
        );
        match self {
            Self::Dense(values) => values[index],
            Self::Sparse(sparse) => sparse
                .indices
                .binary_search(&(index as u32))
                .map_or(0.0, |pos| sparse.values[pos]),
        }
    }

    /// Stored `(index, value)` entries in increasing index order.
    pub fn entries(&self) -> Entries<'_> {
        match self {
            Self::Dense(values) => Entries::Dense(values.iter().enumerate()),
            Self::Sparse(sparse) => Entries::Sparse(sparse.indices.iter().zip(sparse.values.iter())),
        }
    }

    /// Materialize all `D` values.
    pub fn to_dense(&self) -> Vec<f32> {
        match self {
            Self::Dense(values) => values.clone(),
            Self::Sparse(sparse) => {
                let mut dense = vec![0.0; sparse.dimension];
                for (i, v) in sparse.indices.iter().zip(sparse.values.iter()) {
                    dense[*i as usize] = *v;
                }
                dense
            }
        }
    }

    /// Both vectors must share the same dimension. `self` is the value being
    /// checked and `expected` the reference dimension.
    pub fn check_dimension(&self, expected: usize) -> Result<()> {
        if self.dimension() != expected {
            return Err(Error::DimensionMismatch {
                expected,
                actual: self.dimension(),
                location: location!(),
            });
        }
        Ok(())
    }
}

impl From<Vec<f32>> for Vector {
    fn from(values: Vec<f32>) -> Self {
        Self::Dense(values)
    }
}

impl From<SparseVector> for Vector {
    fn from(sparse: SparseVector) -> Self {
        Self::Sparse(sparse)
    }
}

/// Iterator over the stored entries of a [`Vector`].
pub enum Entries<'a> {
    Dense(std::iter::Enumerate<std::slice::Iter<'a, f32>>),
    Sparse(std::iter::Zip<std::slice::Iter<'a, u32>, std::slice::Iter<'a, f32>>),
}

impl Iterator for Entries<'_> {
    type Item = (usize, f32);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Self::Dense(it) => it.next().map(|(i, v)| (i, *v)),
            Self::Sparse(it) => it.next().map(|(i, v)| (*i as usize, *v)),
        }
    }
}

/// Walks two vectors together, yielding `(a_i, b_i)` for every index stored in
/// either side, in increasing index order. Indices stored in neither vector are
/// skipped, since both values are zero there.
pub struct PairedEntries<'a> {
    left: Peekable<Entries<'a>>,
    right: Peekable<Entries<'a>>,
}

impl Iterator for PairedEntries<'_> {
    type Item = (f32, f32);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        match (self.left.peek().copied(), self.right.peek().copied()) {
            (None, None) => None,
            (Some((_, x)), None) => {
                self.left.next();
                Some((x, 0.0))
            }
            (None, Some((_, y))) => {
                self.right.next();
                Some((0.0, y))
            }
            (Some((i, x)), Some((j, y))) => match i.cmp(&j) {
                Ordering::Less => {
                    self.left.next();
                    Some((x, 0.0))
                }
                Ordering::Greater => {
                    self.right.next();
                    Some((0.0, y))
                }
                Ordering::Equal => {
                    self.left.next();
                    self.right.next();
                    Some((x, y))
                }
            },
        }
    }
}

/// Pair up the entries of `a` and `b`.
///
/// Fails with [`Error::DimensionMismatch`] if the dimensions differ, with `b`
/// taken as the reference dimension.
pub fn paired_entries<'a>(a: &'a Vector, b: &'a Vector) -> Result<PairedEntries<'a>> {
    a.check_dimension(b.dimension())?;
    Ok(PairedEntries {
        left: a.entries().peekable(),
        right: b.entries().peekable(),
    })
}
